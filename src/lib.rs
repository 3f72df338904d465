//! # wwdc-dl
//!
//! Downloads session videos and slides from the WWDC video catalog.
//!
//! The library scrapes the year index page for session links (or takes an
//! explicit list), reads each session page for the download link matching
//! the requested resolution, and retrieves the files with progress reporting.
//! A failing session never stops the batch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wwdc_dl::{Config, Pipeline, Resolution, Selection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         year: 2016,
//!         resolution: Resolution::Hd,
//!         selection: Selection::explicit(["101", "402"]),
//!         ..Default::default()
//!     };
//!
//!     let pipeline = Pipeline::new(config)?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline.run().await?;
//!     println!("{} sessions downloaded", summary.succeeded());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// File retrieval with progress and atomic placement
pub mod download;
/// Error types
pub mod error;
/// Link extraction from catalog pages
pub mod extract;
/// Page fetching and catalog URLs
pub mod fetcher;
/// Batch orchestration
pub mod pipeline;
/// Session selection resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use download::{DownloadManager, DownloadObserver, StatusLineObserver};
pub use error::{DownloadError, Error, FailureReason, Result};
pub use extract::LinkExtractor;
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use pipeline::Pipeline;
pub use resolver::SessionResolver;
pub use types::{
    AssetKind, AssetSelection, BatchSummary, DownloadTask, Event, Progress, Resolution,
    Selection, SessionId, SessionOutcome,
};

/// Cancel `token` when the process receives a termination signal
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// In-flight downloads observing the token stop and remove their partial
/// files; completed files are untouched.
pub fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received Ctrl+C signal");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
