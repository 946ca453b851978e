//! Coalescing of concurrent remote lookups for the same number.
//!
//! When two requests for one normalized number miss the cache at the same
//! time, only the first starts a remote lookup. The second awaits a clone of
//! the same [`Shared`] future and observes the identical result. Entries are
//! removed as soon as their lookup completes or its caller goes away, so a
//! later request for the number goes through the cache again.
//!
//! A remote lookup that panics resolves to [`LookupError::Remote`] for every
//! caller sharing it. The panic never outlives the burst it happened in.

use callerid_core::{LookupError, RemoteMatch};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use std::{collections::HashMap, panic::AssertUnwindSafe};

pub type RemoteResult = Result<Option<RemoteMatch>, LookupError>;

type SharedLookup = Shared<BoxFuture<'static, RemoteResult>>;

/// Registry of remote lookups currently in progress, keyed by normalized
/// number.
#[derive(Default)]
pub struct InflightLookups {
    entries: Mutex<HashMap<String, (u64, SharedLookup)>>,
    next_id: AtomicU64,
}

impl InflightLookups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lookups currently in progress.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Awaits the in-progress lookup for `key`, or starts one with `start`.
    ///
    /// `start` runs at most once per concurrent burst and only when nothing is
    /// in flight for `key`.
    pub async fn resolve<F>(&self, key: &str, start: F) -> RemoteResult
    where
        F: FnOnce() -> BoxFuture<'static, RemoteResult>,
    {
        let (id, lookup) = {
            let mut entries = self.entries.lock();
            if let Some((id, lookup)) = entries.get(key) {
                tracing::debug!(number = key, "Joining in-flight lookup");
                (*id, lookup.clone())
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let lookup = contain_panics(key, start()).shared();
                entries.insert(key.to_owned(), (id, lookup.clone()));
                (id, lookup)
            }
        };

        let _entry = EntryGuard {
            entries: &self.entries,
            key,
            id,
        };
        lookup.await
    }
}

/// Turns a panic inside `lookup` into a remote error, so a [`Shared`] clone
/// never re-raises it in the callers that joined.
fn contain_panics(
    key: &str,
    lookup: BoxFuture<'static, RemoteResult>,
) -> BoxFuture<'static, RemoteResult> {
    let number = key.to_owned();
    AssertUnwindSafe(lookup)
        .catch_unwind()
        .map(move |outcome| {
            outcome.unwrap_or_else(|_| {
                tracing::error!(number, "Remote lookup panicked");
                Err(LookupError::Remote {
                    reason: "lookup panicked".into(),
                })
            })
        })
        .boxed()
}

/// Removes the registry entry of one lookup when its caller finishes or is
/// dropped.
struct EntryGuard<'a> {
    entries: &'a Mutex<HashMap<String, (u64, SharedLookup)>>,
    key: &'a str,
    id: u64,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        // A newer lookup may already have replaced this one; leave it alone.
        let mut entries = self.entries.lock();
        if entries
            .get(self.key)
            .is_some_and(|(current, _)| *current == self.id)
        {
            entries.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callerid_core::{LookupContext, PhoneNumberInfo};
    use core::time::Duration;
    use portable_atomic::AtomicUsize;
    use std::sync::Arc;

    fn slow_lookup(calls: Arc<AtomicUsize>) -> BoxFuture<'static, RemoteResult> {
        async move {
            calls.fetch_add(1, Ordering::AcqRel);
            tokio::time::sleep(Duration::from_millis(50)).await;
            let info = PhoneNumberInfo::builder("+15551234")
                .display_name("Alice")
                .build();
            Ok(Some(RemoteMatch::new(info, LookupContext::empty())))
        }
        .boxed()
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_lookup() {
        let inflight = InflightLookups::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            inflight.resolve("+15551234", || slow_lookup(Arc::clone(&calls))),
            inflight.resolve("+15551234", || slow_lookup(Arc::clone(&calls))),
        );

        assert_eq!(calls.load(Ordering::Acquire), 1);
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert_eq!(a.info, b.info);
        assert!(inflight.is_empty());
    }

    fn crashing_lookup(calls: Arc<AtomicUsize>) -> BoxFuture<'static, RemoteResult> {
        async move {
            let previous = calls.fetch_add(1, Ordering::AcqRel);
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(previous == usize::MAX, "directory crashed");
            Ok(None)
        }
        .boxed()
    }

    #[tokio::test]
    async fn completed_lookups_are_not_reused() {
        let inflight = InflightLookups::new();
        let calls = Arc::new(AtomicUsize::new(0));

        inflight
            .resolve("+15551234", || slow_lookup(Arc::clone(&calls)))
            .await
            .unwrap();
        inflight
            .resolve("+15551234", || slow_lookup(Arc::clone(&calls)))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn distinct_numbers_do_not_coalesce() {
        let inflight = InflightLookups::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _ = tokio::join!(
            inflight.resolve("+15551234", || slow_lookup(Arc::clone(&calls))),
            inflight.resolve("+15559876", || slow_lookup(Arc::clone(&calls))),
        );

        assert_eq!(calls.load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn errors_are_shared_too() {
        let inflight = InflightLookups::new();
        let failing = || -> BoxFuture<'static, RemoteResult> {
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(LookupError::Transport {
                    reason: "offline".into(),
                })
            }
            .boxed()
        };

        let (a, b) = tokio::join!(
            inflight.resolve("+15551234", failing),
            inflight.resolve("+15551234", failing),
        );
        assert_eq!(a.unwrap_err(), b.unwrap_err());
    }

    #[tokio::test]
    async fn panicking_lookup_fails_its_callers_and_is_forgotten() {
        let inflight = InflightLookups::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            inflight.resolve("+15551234", || crashing_lookup(Arc::clone(&calls))),
            inflight.resolve("+15551234", || crashing_lookup(Arc::clone(&calls))),
        );
        let expected = LookupError::Remote {
            reason: "lookup panicked".into(),
        };
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
        assert!(inflight.is_empty());

        let next = inflight
            .resolve("+15551234", || slow_lookup(Arc::clone(&calls)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.info.display_name(), Some("Alice"));
        assert_eq!(calls.load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn abandoned_lookup_is_forgotten() {
        let inflight = InflightLookups::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            inflight.resolve("+15551234", || slow_lookup(Arc::clone(&calls))),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(inflight.is_empty());

        inflight
            .resolve("+15551234", || slow_lookup(Arc::clone(&calls)))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::Acquire), 2);
    }
}
