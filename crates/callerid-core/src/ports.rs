//! Capabilities the lookup service consumes but does not implement.
//!
//! The remote directory, the contact cache, the content resolver behind
//! `content://` photo URIs and the image decoder all live outside the service.
//! They are injected as trait objects so hosts can plug in platform code and
//! tests can plug in counters.

use crate::{
    error::{CacheError, ImageError, LookupError},
    model::{CachedContactRecord, DecodedImage, LookupContext, RemoteMatch},
};
use bytes::Bytes;
use futures::future::BoxFuture;
use portable_atomic::{AtomicBool, Ordering};
use std::io::{self, Read};

/// Remote reverse-lookup directory.
pub trait RemoteLookupClient: Send + Sync {
    /// Resolves a normalized number to a caller identity.
    ///
    /// `Ok(None)` means the directory has no entry for the number. The
    /// returned [`LookupContext`] is passed back verbatim to
    /// [`lookup_image`](Self::lookup_image).
    fn lookup_number<'a>(
        &'a self,
        normalized_number: &'a str,
        formatted_number: &'a str,
        is_incoming: bool,
    ) -> BoxFuture<'a, Result<Option<RemoteMatch>, LookupError>>;

    /// Downloads the raw bytes behind an `http`/`https` image URL.
    fn lookup_image<'a>(
        &'a self,
        url: &'a str,
        context: &'a LookupContext,
    ) -> BoxFuture<'a, Result<Bytes, LookupError>>;
}

/// Persistent contact cache keyed by normalized number.
///
/// Calls are made from pool workers and are expected to be short. Concurrent
/// writes for the same number are last-writer-wins.
pub trait CacheStore: Send + Sync {
    fn get(&self, normalized_number: &str) -> Result<Option<CachedContactRecord>, CacheError>;

    fn put(&self, record: CachedContactRecord) -> Result<(), CacheError>;

    /// Stores photo bytes for a cached contact.
    fn add_photo(&self, normalized_number: &str, photo: &[u8]) -> Result<(), CacheError>;

    /// Whether `uri` points back into this cache.
    fn is_cache_uri(&self, uri: &str) -> bool;
}

/// Runtime switch for the reverse lookup feature.
pub trait LookupSettings: Send + Sync {
    fn is_reverse_lookup_enabled(&self) -> bool;
}

/// [`LookupSettings`] backed by an atomic flag that can be flipped while the
/// service runs.
#[derive(Debug)]
pub struct StaticSettings {
    reverse_lookup_enabled: AtomicBool,
}

impl StaticSettings {
    pub const fn new(reverse_lookup_enabled: bool) -> Self {
        Self {
            reverse_lookup_enabled: AtomicBool::new(reverse_lookup_enabled),
        }
    }

    pub fn set_reverse_lookup_enabled(&self, enabled: bool) {
        self.reverse_lookup_enabled.store(enabled, Ordering::Release);
    }
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LookupSettings for StaticSettings {
    fn is_reverse_lookup_enabled(&self) -> bool {
        self.reverse_lookup_enabled.load(Ordering::Acquire)
    }
}

/// Opens `content://` and `android.resource://` URIs for reading.
pub trait ContentResolver: Send + Sync {
    /// Returns `Ok(None)` when the URI resolves to nothing.
    fn open(&self, uri: &str) -> io::Result<Option<Box<dyn Read + Send>>>;
}

/// A [`ContentResolver`] that never resolves anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoContent;

impl ContentResolver for NoContent {
    fn open(&self, _uri: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
        Ok(None)
    }
}

/// Turns encoded photo bytes into a renderable image.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, ImageError>;
}
