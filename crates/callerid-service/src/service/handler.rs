//! Entry point of the lookup service.
//!
//! [`PhoneNumberService`] owns two bounded worker pools and a result
//! dispatcher:
//!
//! - the lookup pool runs the [`LookupCoordinator`] pipeline for each
//!   request;
//! - the image pool runs [`ImageFetcher`] for requests whose result carries a
//!   photo URL;
//! - the [`ResultDispatcher`] invokes listeners serially on its own task.
//!
//! Submission never blocks and never fails visibly: requests made after
//! shutdown has begun are logged and dropped.

use crate::{
    config::ServiceConfig,
    lookup::{
        coordinator::LookupCoordinator,
        image::ImageFetcher,
        request::{ImageFetchRequest, LookupRequest},
    },
    pool::manager::WorkerPool,
    service::dispatcher::ResultDispatcher,
    telemetry::increment_lookups_requested,
};
use callerid_core::{
    CacheStore, ContentResolver, Error, ImageDecoder, ImageLookupListener, LookupSettings,
    NoContent, NumberLookupListener, RasterDecoder, RemoteLookupClient,
};
use std::sync::Arc;

/// External capabilities the service depends on.
#[derive(Clone)]
pub struct Capabilities {
    pub remote: Arc<dyn RemoteLookupClient>,
    pub cache: Arc<dyn CacheStore>,
    pub settings: Arc<dyn LookupSettings>,
    pub content: Arc<dyn ContentResolver>,
    pub decoder: Arc<dyn ImageDecoder>,
}

impl Capabilities {
    /// Capabilities with no content resolver and the stock raster decoder.
    pub fn new(
        remote: Arc<dyn RemoteLookupClient>,
        cache: Arc<dyn CacheStore>,
        settings: Arc<dyn LookupSettings>,
    ) -> Self {
        Self {
            remote,
            cache,
            settings,
            content: Arc::new(NoContent),
            decoder: Arc::new(RasterDecoder),
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: Arc<dyn ContentResolver>) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }
}

/// Asynchronous reverse phone-number lookup with caching.
///
/// Cloning yields another handle to the same pools.
#[derive(Clone)]
pub struct PhoneNumberService {
    config: ServiceConfig,
    lookups: Arc<WorkerPool<LookupRequest>>,
    images: Arc<WorkerPool<ImageFetchRequest>>,
    results: ResultDispatcher,
}

impl PhoneNumberService {
    /// Creates the service and spawns its workers and result dispatcher on
    /// the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: ServiceConfig, capabilities: Capabilities) -> anyhow::Result<Self> {
        Self::with_dispatcher(config, capabilities, ResultDispatcher::spawn())
    }

    /// Like [`new`](Self::new), delivering results through a caller-owned
    /// dispatcher whose [`DispatchLoop`](super::dispatcher::DispatchLoop) the
    /// caller runs.
    pub fn with_dispatcher(
        config: ServiceConfig,
        capabilities: Capabilities,
        results: ResultDispatcher,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let normalizer = config.normalizer()?;

        let fetcher = ImageFetcher::new(
            Arc::clone(&capabilities.remote),
            Arc::clone(&capabilities.cache),
            capabilities.content,
            capabilities.decoder,
            config.content_read_chunk,
            results.clone(),
        );
        let images = Arc::new(WorkerPool::spawn(
            "image",
            config.image_workers,
            Arc::new(fetcher),
            config.shutdown_timeout,
        ));

        let coordinator = LookupCoordinator::new(
            normalizer,
            config.skip_cache_reads,
            capabilities.remote,
            capabilities.cache,
            capabilities.settings,
            Arc::clone(&images),
            results.clone(),
        );
        let lookups = Arc::new(WorkerPool::spawn(
            "lookup",
            config.lookup_workers,
            Arc::new(coordinator),
            config.shutdown_timeout,
        ));

        tracing::info!(
            country = %config.country_iso,
            lookup_workers = config.lookup_workers,
            image_workers = config.image_workers,
            "Phone number service started"
        );

        Ok(Self {
            config,
            lookups,
            images,
            results,
        })
    }

    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Starts an asynchronous lookup of a raw phone number.
    ///
    /// Returns immediately. `listener` is called at most once, with the
    /// caller's info or `None` if nobody was found. It is not called at all
    /// when the number cannot be normalized, reverse lookup is disabled or
    /// the lookup fails. `image_listener` is called exactly once if the
    /// result carries a photo URL.
    pub fn get_phone_number_info(
        &self,
        phone_number: impl Into<String>,
        listener: Arc<dyn NumberLookupListener>,
        image_listener: Arc<dyn ImageLookupListener>,
        is_incoming: bool,
    ) {
        increment_lookups_requested();

        let request = LookupRequest {
            phone_number: phone_number.into(),
            is_incoming,
            listener,
            image_listener,
        };
        if let Err(e) = self.lookups.submit(request) {
            tracing::warn!("Lookup request dropped: {e}");
        }
    }

    /// Lookups accepted but not finished yet.
    pub fn pending_lookups(&self) -> usize {
        self.lookups.pending()
    }

    /// Stops accepting requests and completes everything already accepted.
    ///
    /// The lookup pool drains first, since finishing lookups can still
    /// schedule photo fetches; then the image pool; then the remaining
    /// listener callbacks are delivered.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.lookups.shutdown().await?;
        self.images.shutdown().await?;
        self.results.shutdown(self.config.shutdown_timeout).await
    }
}
