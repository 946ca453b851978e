//! # Telemetry Features
//!
//! Logging always goes through `tracing` and a `tracing-subscriber` `fmt`
//! layer. OpenTelemetry export is optional.
//!
//! ## Feature matrix
//!
//! - `otel-tracing`: Exports spans through an OpenTelemetry tracer provider.
//! - `metrics`: Enables OpenTelemetry counters for lookups and photo fetches.
//! - `stdout`: Enables the stdout exporter for whichever signal is enabled.
//!
//! ## Feature constraints
//!
//! - `stdout` requires at least one of `otel-tracing` or `metrics`.
//!
//! ## Metrics
//!
//! - `lookups_requested`: calls to `get_phone_number_info`
//! - `cache_hits`: lookups answered from a full cache record
//! - `remote_lookups`: remote directory calls actually made
//! - `lookups_dropped`: lookups that ended without notifying the listener
//! - `images_fetched` / `image_failures`: photo fetch outcomes
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features otel-tracing,metrics,stdout -- --country-iso US 555-1234
//! ```

// Disallow using `stdout` without `otel-tracing` or `metrics`
#[cfg(all(
    feature = "stdout",
    not(any(feature = "otel-tracing", feature = "metrics"))
))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "otel-tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "callerid";

/// Providers that must outlive the process's telemetry and be flushed on
/// exit.
pub struct TelemetryProviders {
    #[cfg(feature = "otel-tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every provider, reporting failures on stderr.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-tracing")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "metrics", feature = "otel-tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .with_writer(std::io::stderr)
                .pretty(),
        );

    #[cfg(feature = "otel-tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "otel-tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "otel-tracing")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let exporter = SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static LOOKUPS_REQUESTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CACHE_HITS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REMOTE_LOOKUPS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static LOOKUPS_DROPPED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static IMAGES_FETCHED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static IMAGE_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let counters = [
        (&LOOKUPS_REQUESTED, "lookups_requested", "Number lookups submitted"),
        (&CACHE_HITS, "cache_hits", "Lookups answered from a full cache record"),
        (&REMOTE_LOOKUPS, "remote_lookups", "Remote directory lookups performed"),
        (&LOOKUPS_DROPPED, "lookups_dropped", "Lookups that ended without a callback"),
        (&IMAGES_FETCHED, "images_fetched", "Contact photos fetched and decoded"),
        (&IMAGE_FAILURES, "image_failures", "Contact photo fetches that failed"),
    ];

    for (handle, name, description) in counters {
        let _ = handle.set(
            meter
                .u64_counter(name)
                .with_description(description)
                .build(),
        );
    }
}

#[cfg(feature = "metrics")]
fn bump(counter: &OnceLock<Counter<u64>>) {
    if let Some(counter) = counter.get() {
        counter.add(1, &[]);
    }
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_lookups_requested() {
    bump(&LOOKUPS_REQUESTED);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_lookups_requested() {}

#[cfg(feature = "metrics")]
pub fn increment_cache_hits() {
    bump(&CACHE_HITS);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_cache_hits() {}

#[cfg(feature = "metrics")]
pub fn increment_remote_lookups() {
    bump(&REMOTE_LOOKUPS);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_remote_lookups() {}

#[cfg(feature = "metrics")]
pub fn increment_lookups_dropped() {
    bump(&LOOKUPS_DROPPED);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_lookups_dropped() {}

#[cfg(feature = "metrics")]
pub fn increment_images_fetched() {
    bump(&IMAGES_FETCHED);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_images_fetched() {}

#[cfg(feature = "metrics")]
pub fn increment_image_failures() {
    bump(&IMAGE_FAILURES);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_image_failures() {}
