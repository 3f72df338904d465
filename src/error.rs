//! Error types for wwdc-dl
//!
//! This module provides the error taxonomy for the library:
//! - Discovery errors (invalid URLs, network failures) that are fatal when
//!   resolving the "all sessions" set
//! - Per-item download failures that are recorded and isolated per session
//! - Programmer errors (malformed extraction patterns)

use crate::types::{AssetKind, SessionId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for wwdc-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for wwdc-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "selection")
        key: Option<String>,
    },

    /// A catalog or download URL could not be built or parsed
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL text
        url: String,
        /// Why the URL was rejected
        reason: String,
    },

    /// Page fetch failed (connection, timeout, non-success status)
    #[error("network error fetching {url}: {message}")]
    Network {
        /// The URL being fetched
        url: String,
        /// HTTP status code, when the server answered
        status: Option<u16>,
        /// Whether the failure was a timeout
        timeout: bool,
        /// Whether the failure happened while connecting
        connect: bool,
        /// Description of the failure
        message: String,
    },

    /// Extraction pattern failed to compile
    #[error("invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The session page had no link for the requested asset
    #[error("no {kind} link found for session {session}")]
    NoMatchingLink {
        /// Session whose page was searched
        session: SessionId,
        /// Asset kind that was searched for
        kind: AssetKind,
    },

    /// A single download failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Every session of the batch failed
    #[error("none of the {attempted} sessions could be downloaded")]
    NoSessionsSucceeded {
        /// Number of sessions attempted
        attempted: usize,
    },
}

impl Error {
    /// Build a network error from a reqwest failure
    pub fn network(url: &str, err: &reqwest::Error) -> Self {
        Error::Network {
            url: url.to_string(),
            status: err.status().map(|s| s.as_u16()),
            timeout: err.is_timeout(),
            connect: err.is_connect(),
            message: err.to_string(),
        }
    }

    /// Build a network error for a non-success HTTP status
    pub fn http_status(url: &str, status: reqwest::StatusCode) -> Self {
        Error::Network {
            url: url.to_string(),
            status: Some(status.as_u16()),
            timeout: false,
            connect: false,
            message: format!("HTTP {}", status),
        }
    }

    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Short machine-readable reason, used in status events and summaries
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::Network { .. } => "fetch",
            Error::Pattern(_) => "pattern",
            Error::NoMatchingLink { .. } => "no_matching_link",
            Error::Download(e) => e.reason.as_str(),
            Error::NoSessionsSucceeded { .. } => "no_sessions_succeeded",
        }
    }
}

/// Why a single download failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The remote resource could not be requested or read
    Fetch,
    /// The payload could not be written to its destination
    Save,
    /// The stream broke off mid-transfer
    Transport,
    /// No data arrived within the stall timeout
    Timeout,
    /// The download was abandoned (shutdown)
    Cancelled,
}

impl FailureReason {
    /// Lowercase name of the reason
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Fetch => "fetch",
            FailureReason::Save => "save",
            FailureReason::Transport => "transport",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed download, recoverable at the batch level
#[derive(Debug, Error)]
#[error("{reason} failure for {url}: {message}")]
pub struct DownloadError {
    /// Failure category
    pub reason: FailureReason,
    /// Source URL of the download
    pub url: String,
    /// Final destination path, when it was known
    pub path: Option<PathBuf>,
    /// Description of the underlying failure
    pub message: String,
}

impl DownloadError {
    /// Create a new download error
    pub fn new(reason: FailureReason, url: &str, message: impl Into<String>) -> Self {
        Self {
            reason,
            url: url.to_string(),
            path: None,
            message: message.into(),
        }
    }

    /// Attach the destination path
    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}
