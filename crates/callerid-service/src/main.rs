mod fixture;

use callerid_service::{
    Capabilities, PhoneNumberService, ServiceConfig,
    callerid_core::{DecodedImage, InMemoryCacheStore, PhoneNumberInfo, StaticSettings},
    config::CliArgs,
    telemetry::init_telemetry,
};
use clap::Parser;
use fixture::{FixtureDirectory, FsContentResolver};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// One delivered callback, printed as a JSON line.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Report {
    Info {
        number: String,
        info: Option<PhoneNumberInfo>,
    },
    Image {
        number: String,
        image: Option<ImageSummary>,
    },
}

#[derive(Debug, Serialize)]
struct ImageSummary {
    width: u32,
    height: u32,
    bytes: usize,
}

impl From<DecodedImage> for ImageSummary {
    fn from(image: DecodedImage) -> Self {
        Self {
            width: image.width,
            height: image.height,
            bytes: image.pixels.len(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let directory_path = args.directory.clone();
    let content_root = args.content_root.clone();
    let numbers = args.numbers.clone();
    let settings = Arc::new(StaticSettings::new(args.reverse_lookup_enabled));
    let config = ServiceConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let directory = FixtureDirectory::load(&directory_path)?;
    log_startup_info(&config, &directory);

    let mut capabilities = Capabilities::new(
        Arc::new(directory),
        Arc::new(InMemoryCacheStore::new()),
        settings,
    );
    if let Some(root) = content_root {
        capabilities = capabilities.with_content(Arc::new(FsContentResolver::new(root)));
    }
    let service = PhoneNumberService::new(config, capabilities)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    for number in numbers {
        let (info_tx, image_tx) = (tx.clone(), tx.clone());
        let (info_number, image_number) = (number.clone(), number.clone());

        service.get_phone_number_info(
            number,
            Arc::new(move |info: Option<PhoneNumberInfo>| {
                let _ = info_tx.send(Report::Info {
                    number: info_number.clone(),
                    info,
                });
            }),
            Arc::new(move |image: Option<DecodedImage>| {
                let _ = image_tx.send(Report::Image {
                    number: image_number.clone(),
                    image: image.map(ImageSummary::from),
                });
            }),
            true,
        );
    }

    // Completes every accepted lookup before returning.
    if let Err(e) = service.shutdown().await {
        tracing::error!("Error during service shutdown: {e:?}");
    }

    while let Ok(report) = rx.try_recv() {
        println!("{}", serde_json::to_string(&report)?);
    }

    tracing::info!("Service shut down successfully");
    providers.shutdown();
    Ok(())
}

fn log_startup_info(config: &ServiceConfig, directory: &FixtureDirectory) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting lookup service with {} directory entries and full config: {:#?}",
            directory.len(),
            config
        );
    } else {
        tracing::info!(
            "Starting lookup service with {} directory entries and {} lookup workers",
            directory.len(),
            config.lookup_workers
        );
    }
}
