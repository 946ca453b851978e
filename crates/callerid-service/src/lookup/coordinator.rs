//! The number lookup pipeline.
//!
//! For each [`LookupRequest`] the coordinator:
//!
//! 1. normalizes the raw number to E.164, dropping the request if that fails;
//! 2. drops the request if reverse lookup is disabled;
//! 3. consults the cache and answers from a full record without any remote
//!    traffic;
//! 4. otherwise asks the remote directory (coalescing concurrent asks for the
//!    same number) and persists a named answer to the cache;
//! 5. delivers the result through the [`ResultDispatcher`], then schedules
//!    the photo fetch when the result carries an image URL.
//!
//! An extended cache record is only a hint: it triggers a remote lookup and
//! is delivered as-is only when the directory has nothing better.

use super::{
    inflight::{InflightLookups, RemoteResult},
    request::{ImageFetchRequest, LookupOutcome, LookupRequest},
};
use crate::{
    pool::{manager::WorkerPool, worker::JobHandler},
    service::dispatcher::ResultDispatcher,
    telemetry::{increment_cache_hits, increment_lookups_dropped, increment_remote_lookups},
};
use callerid_core::{
    CacheStore, CachedContactRecord, LookupSettings, NumberNormalizer, RemoteLookupClient,
};
use futures::FutureExt;
use std::{future::Future, sync::Arc};

/// Executes [`LookupRequest`]s on the lookup pool.
pub struct LookupCoordinator {
    normalizer: NumberNormalizer,
    skip_cache_reads: bool,
    remote: Arc<dyn RemoteLookupClient>,
    cache: Arc<dyn CacheStore>,
    settings: Arc<dyn LookupSettings>,
    inflight: InflightLookups,
    images: Arc<WorkerPool<ImageFetchRequest>>,
    results: ResultDispatcher,
}

impl LookupCoordinator {
    pub fn new(
        normalizer: NumberNormalizer,
        skip_cache_reads: bool,
        remote: Arc<dyn RemoteLookupClient>,
        cache: Arc<dyn CacheStore>,
        settings: Arc<dyn LookupSettings>,
        images: Arc<WorkerPool<ImageFetchRequest>>,
        results: ResultDispatcher,
    ) -> Self {
        Self {
            normalizer,
            skip_cache_reads,
            remote,
            cache,
            settings,
            inflight: InflightLookups::new(),
            images,
            results,
        }
    }

    /// Runs steps 1 to 4 for one raw number.
    #[tracing::instrument(skip(self), fields(normalized = tracing::field::Empty))]
    pub async fn resolve(&self, phone_number: &str, is_incoming: bool) -> LookupOutcome {
        let normalized = match self.normalizer.normalize(phone_number) {
            Ok(normalized) => normalized,
            Err(e) => return LookupOutcome::InvalidNumber(e),
        };
        tracing::Span::current().record("normalized", normalized.as_str());

        if !self.settings.is_reverse_lookup_enabled() {
            return LookupOutcome::Disabled;
        }

        let cached = self.read_cache(&normalized);
        let tentative = match cached {
            Some(record) if record.is_full() => match record.to_info() {
                Some(info) => {
                    tracing::debug!("Cache hit");
                    increment_cache_hits();
                    return info.into();
                }
                None => None,
            },
            Some(record) => record.to_info(),
            None => None,
        };

        let formatted = self.normalizer.format(phone_number, Some(&normalized));
        let result = self
            .inflight
            .resolve(&normalized, || {
                self.remote_lookup(normalized.clone(), formatted, is_incoming)
            })
            .await;

        match (result, tentative) {
            (Ok(Some(found)), _) => found.into(),
            (Ok(None), Some(info)) => {
                tracing::debug!("Directory has no entry; using extended record");
                info.into()
            }
            (Ok(None), None) => LookupOutcome::NotFound,
            (Err(e), Some(info)) => {
                tracing::warn!("Remote lookup failed; using extended record: {e}");
                info.into()
            }
            (Err(e), None) => LookupOutcome::Failed(e.into()),
        }
    }

    fn read_cache(&self, normalized: &str) -> Option<CachedContactRecord> {
        if self.skip_cache_reads {
            tracing::trace!("Skipping cache read");
            return None;
        }
        match self.cache.get(normalized) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Cache read failed; treating as miss: {e}");
                None
            }
        }
    }

    /// The remote call plus cache fill, shared by coalesced callers.
    ///
    /// Answers without a display name are reported as `Ok(None)` and never
    /// cached.
    fn remote_lookup(
        &self,
        normalized: String,
        formatted: String,
        is_incoming: bool,
    ) -> futures::future::BoxFuture<'static, RemoteResult> {
        let remote = Arc::clone(&self.remote);
        let cache = Arc::clone(&self.cache);

        async move {
            increment_remote_lookups();
            let Some(found) = remote
                .lookup_number(&normalized, &formatted, is_incoming)
                .await?
            else {
                return Ok(None);
            };

            let Some(mut record) = CachedContactRecord::from_info(&found.info, &formatted) else {
                tracing::debug!(number = %normalized, "Directory match has no name");
                return Ok(None);
            };
            record.normalized_number.clone_from(&normalized);

            if let Err(e) = cache.put(record) {
                tracing::warn!(number = %normalized, "Failed to cache lookup result: {e}");
            }
            Ok(Some(found))
        }
        .boxed()
    }

    /// Step 5: hands the outcome to the listeners.
    fn complete(&self, request: LookupRequest, outcome: LookupOutcome) {
        if !outcome.notifies_listener() {
            increment_lookups_dropped();
        }

        match outcome {
            LookupOutcome::Found { info, context } => {
                let image = info
                    .image_url()
                    .filter(|_| info.has_display_name())
                    .map(|url| ImageFetchRequest {
                        normalized_number: info.normalized_number().to_owned(),
                        url: url.to_owned(),
                        context,
                        listener: Arc::clone(&request.image_listener),
                    });

                if let Err(e) = self.results.deliver_info(request.listener, Some(info)) {
                    tracing::warn!("Dropping lookup result: {e}");
                    return;
                }

                if let Some(image) = image {
                    if let Err(e) = self.images.submit(image) {
                        tracing::warn!("Image fetch not scheduled: {e}");
                    }
                }
            }
            LookupOutcome::NotFound => {
                if let Err(e) = self.results.deliver_info(request.listener, None) {
                    tracing::warn!("Dropping lookup result: {e}");
                }
            }
            LookupOutcome::Disabled => {
                tracing::debug!("Reverse lookup disabled; dropping request");
            }
            LookupOutcome::InvalidNumber(e) => {
                tracing::debug!("Could not format phone number to E.164; dropping request: {e}");
            }
            LookupOutcome::Failed(e) => {
                tracing::error!("Lookup failed: {e}");
            }
        }
    }
}

impl JobHandler<LookupRequest> for LookupCoordinator {
    fn handle(&self, worker_id: usize, request: LookupRequest) -> impl Future<Output = ()> + Send {
        async move {
            tracing::trace!("Worker {worker_id} looking up {:?}", request.phone_number);
            let outcome = self
                .resolve(&request.phone_number, request.is_incoming)
                .await;
            self.complete(request, outcome);
        }
    }
}
