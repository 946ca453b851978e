use anyhow::bail;
use callerid_core::NumberNormalizer;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `callerid-lookup` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults matching a handset: two lookup
/// workers, two image workers.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "callerid-lookup",
    version,
    about = "Reverse phone-number lookup against a local JSON directory"
)]
pub struct CliArgs {
    /// ISO 3166-1 alpha-2 country of the SIM, used to normalize numbers
    /// without a country code.
    ///
    /// Environment variable: `COUNTRY_ISO`
    #[arg(long, env = "COUNTRY_ISO", default_value_t = String::from("US"))]
    pub country_iso: String,

    /// Country of the current network, used when formatting numbers for
    /// display. Defaults to `COUNTRY_ISO`.
    ///
    /// Environment variable: `CURRENT_COUNTRY_ISO`
    #[arg(long, env = "CURRENT_COUNTRY_ISO")]
    pub current_country_iso: Option<String>,

    /// Maximum number of concurrent number lookups.
    ///
    /// Environment variable: `LOOKUP_WORKERS`
    #[arg(long, env = "LOOKUP_WORKERS", default_value_t = 2)]
    pub lookup_workers: usize,

    /// Maximum number of concurrent photo fetches.
    ///
    /// Environment variable: `IMAGE_WORKERS`
    #[arg(long, env = "IMAGE_WORKERS", default_value_t = 2)]
    pub image_workers: usize,

    /// Buffer size, in bytes, for reading `content://` photos.
    ///
    /// Environment variable: `CONTENT_READ_CHUNK`
    #[arg(long, env = "CONTENT_READ_CHUNK", default_value_t = 16_384)]
    pub content_read_chunk: usize,

    /// Always go to the remote directory, ignoring cached entries. Results
    /// are still written to the cache.
    ///
    /// Environment variable: `SKIP_CACHE_READS`
    #[arg(long, env = "SKIP_CACHE_READS", default_value_t = false)]
    pub skip_cache_reads: bool,

    /// Whether reverse lookup is enabled at all.
    ///
    /// Environment variable: `REVERSE_LOOKUP_ENABLED`
    #[arg(long, env = "REVERSE_LOOKUP_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub reverse_lookup_enabled: bool,

    /// Seconds to wait for each worker to acknowledge shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// JSON directory file answering remote lookups.
    ///
    /// Environment variable: `DIRECTORY`
    #[arg(long, env = "DIRECTORY", default_value = "fixtures/directory.json")]
    pub directory: PathBuf,

    /// Directory that `content://<authority>/<path>` photo URIs resolve into.
    /// Content URIs resolve to nothing when unset.
    ///
    /// Environment variable: `CONTENT_ROOT`
    #[arg(long, env = "CONTENT_ROOT")]
    pub content_root: Option<PathBuf>,

    /// Raw phone numbers to look up, as a user would type them.
    #[arg(required = true)]
    pub numbers: Vec<String>,
}

/// Settings of a [`PhoneNumberService`](crate::PhoneNumberService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub country_iso: String,
    pub current_country_iso: Option<String>,
    pub lookup_workers: usize,
    pub image_workers: usize,
    pub content_read_chunk: usize,
    pub skip_cache_reads: bool,
    pub shutdown_timeout: Duration,
}

impl ServiceConfig {
    pub const DEFAULT_WORKERS: usize = 2;
    pub const DEFAULT_CONTENT_READ_CHUNK: usize = 16_384;
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

    /// Default configuration for a SIM registered in `country_iso`.
    pub fn new(country_iso: impl Into<String>) -> Self {
        Self {
            country_iso: country_iso.into().to_ascii_uppercase(),
            current_country_iso: None,
            lookup_workers: Self::DEFAULT_WORKERS,
            image_workers: Self::DEFAULT_WORKERS,
            content_read_chunk: Self::DEFAULT_CONTENT_READ_CHUNK,
            skip_cache_reads: false,
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// The normalizer this configuration describes.
    ///
    /// # Errors
    ///
    /// Fails if either country is not supported.
    pub fn normalizer(&self) -> anyhow::Result<NumberNormalizer> {
        let normalizer = NumberNormalizer::new(&self.country_iso)?;
        Ok(match &self.current_country_iso {
            Some(current) => normalizer.with_display_country(current)?,
            None => normalizer,
        })
    }

    /// Checks the constraints `TryFrom<CliArgs>` enforces.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lookup_workers == 0 {
            bail!("LOOKUP_WORKERS must be greater than 0");
        }
        if self.image_workers == 0 {
            bail!("IMAGE_WORKERS must be greater than 0");
        }
        if self.content_read_chunk == 0 {
            bail!("CONTENT_READ_CHUNK must be greater than 0");
        }

        for iso in core::iter::once(&self.country_iso).chain(&self.current_country_iso) {
            if iso.len() != 2 || !iso.bytes().all(|b| b.is_ascii_alphabetic()) {
                bail!("Country ISO {iso:?} must be two ASCII letters");
            }
            if !NumberNormalizer::supports(iso) {
                bail!("Country ISO {iso:?} is not supported");
            }
        }
        Ok(())
    }
}

impl TryFrom<CliArgs> for ServiceConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let config = Self {
            country_iso: args.country_iso.to_ascii_uppercase(),
            current_country_iso: args.current_country_iso.map(|iso| iso.to_ascii_uppercase()),
            lookup_workers: args.lookup_workers,
            image_workers: args.image_workers,
            content_read_chunk: args.content_read_chunk,
            skip_cache_reads: args.skip_cache_reads,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        };
        config.validate()?;
        Ok(config)
    }
}
