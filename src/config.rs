//! Configuration types for wwdc-dl
//!
//! A [`Config`] is built once by the caller (usually the command line layer),
//! validated with [`Config::validate`], and then handed to the core as an
//! immutable value.

use crate::error::{Error, Result};
use crate::types::{AssetSelection, Resolution, Selection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Earliest conference year the catalog publishes videos for
pub const FIRST_CATALOG_YEAR: u16 = 2012;

/// Latest year accepted by validation
pub const LAST_CATALOG_YEAR: u16 = 2099;

/// Where the catalog lives and how its URLs are shaped
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Scheme and host of the catalog (default: "https://developer.apple.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Event slug prefix combined with the year, e.g. "wwdc" + 2016 (default: "wwdc")
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            event_prefix: default_event_prefix(),
        }
    }
}

impl CatalogConfig {
    /// Event slug for a year (e.g. "wwdc2016")
    pub fn event(&self, year: u16) -> String {
        format!("{}{}", self.event_prefix, year)
    }
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for a single page request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Transfer behavior (timeouts, progress, concurrency, temp files)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// A download with no data for this long fails with a timeout (default: 60 seconds)
    #[serde(default = "default_stall_timeout", with = "duration_serde")]
    pub stall_timeout: Duration,

    /// Progress is reported each time this many more bytes were written (default: 500000)
    #[serde(default = "default_progress_interval")]
    pub progress_interval_bytes: u64,

    /// Maximum downloads in flight at once (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Directory for in-progress files (None = next to the final file)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            stall_timeout: default_stall_timeout(),
            progress_interval_bytes: default_progress_interval(),
            max_concurrent_downloads: default_max_concurrent(),
            temp_dir: None,
        }
    }
}

/// Retry configuration for transient page fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Main configuration for a download run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Conference year (default: 2016)
    #[serde(default = "default_year")]
    pub year: u16,

    /// Requested video quality (default: SD)
    #[serde(default)]
    pub resolution: Resolution,

    /// Sessions to process (default: all)
    #[serde(default)]
    pub selection: Selection,

    /// Root directory for downloaded files (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Asset kinds to fetch per session (default: video and PDF)
    #[serde(default)]
    pub assets: AssetSelection,

    /// Catalog location
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Transfer behavior
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Retry policy for page fetches
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            year: default_year(),
            resolution: Resolution::default(),
            selection: Selection::default(),
            download_dir: default_download_dir(),
            assets: AssetSelection::default(),
            catalog: CatalogConfig::default(),
            http: HttpConfig::default(),
            transfer: TransferConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Check the invariants the core relies on
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if !(FIRST_CATALOG_YEAR..=LAST_CATALOG_YEAR).contains(&self.year) {
            return Err(Error::config(
                "year",
                format!(
                    "year {} is outside {}..={}",
                    self.year, FIRST_CATALOG_YEAR, LAST_CATALOG_YEAR
                ),
            ));
        }

        if let Selection::Explicit(ids) = &self.selection {
            if ids.is_empty() {
                return Err(Error::config("selection", "explicit session list is empty"));
            }
            if let Some(bad) = ids
                .iter()
                .find(|id| id.as_str().is_empty() || id.as_str().contains('/'))
            {
                return Err(Error::config(
                    "selection",
                    format!("'{}' is not a valid session identifier", bad),
                ));
            }
        }

        if self.assets.is_empty() {
            return Err(Error::config("assets", "nothing to download"));
        }

        if self.transfer.max_concurrent_downloads == 0 {
            return Err(Error::config(
                "transfer.max_concurrent_downloads",
                "must be at least 1",
            ));
        }

        if self.transfer.progress_interval_bytes == 0 {
            return Err(Error::config(
                "transfer.progress_interval_bytes",
                "must be at least 1",
            ));
        }

        if self.catalog.event_prefix.is_empty() {
            return Err(Error::config("catalog.event_prefix", "must not be empty"));
        }

        match url::Url::parse(&self.catalog.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
            Ok(_) => Err(Error::config(
                "catalog.base_url",
                format!("'{}' is not an http(s) URL", self.catalog.base_url),
            )),
            Err(e) => Err(Error::config(
                "catalog.base_url",
                format!("'{}': {}", self.catalog.base_url, e),
            )),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_year() -> u16 {
    2016
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_base_url() -> String {
    "https://developer.apple.com".to_string()
}

fn default_event_prefix() -> String {
    "wwdc".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("wwdc-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_progress_interval() -> u64 {
    500_000
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
