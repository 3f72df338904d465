//! Test configuration builders

use std::path::Path;
use std::time::Duration;
use wiremock::MockServer;
use wwdc_dl::config::{CatalogConfig, RetryConfig, TransferConfig};
use wwdc_dl::{AssetSelection, Config, Resolution, Selection};

/// Year used by every fixture
pub const TEST_YEAR: u16 = 2016;

/// Config pointing the catalog at `server` and saving into `dir`
///
/// Retries are disabled and timeouts kept short so failures surface fast.
pub fn test_config(server: &MockServer, dir: &Path, selection: Selection) -> Config {
    Config {
        year: TEST_YEAR,
        resolution: Resolution::Hd,
        selection,
        download_dir: dir.to_path_buf(),
        assets: AssetSelection::default(),
        catalog: CatalogConfig {
            base_url: server.uri(),
            ..Default::default()
        },
        transfer: TransferConfig {
            stall_timeout: Duration::from_secs(5),
            progress_interval_bytes: 1_000,
            max_concurrent_downloads: 2,
            temp_dir: None,
        },
        retry: RetryConfig::none(),
        ..Default::default()
    }
}

/// Same as [`test_config`] but only fetching videos
pub fn video_only_config(server: &MockServer, dir: &Path, selection: Selection) -> Config {
    Config {
        assets: AssetSelection::video_only(),
        ..test_config(server, dir, selection)
    }
}
