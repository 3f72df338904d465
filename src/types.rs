//! Core types for wwdc-dl

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::{Error, FailureReason, Result};

/// Identifier of a catalog session
///
/// Observed as numeric on the catalog, but handled as an opaque token:
/// identifiers are only compared and ordered lexically.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new SessionId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested video quality
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Resolution {
    /// High definition
    Hd,
    /// Standard definition
    #[default]
    Sd,
}

impl Resolution {
    /// Visible anchor label on a session page for this tier
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Hd => "HD Video",
            Resolution::Sd => "SD Video",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Hd => f.write_str("HD"),
            Resolution::Sd => f.write_str("SD"),
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HD" => Ok(Resolution::Hd),
            "SD" => Ok(Resolution::Sd),
            other => Err(format!("unknown resolution '{}', expected HD or SD", other)),
        }
    }
}

/// Which sessions to process
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Every session linked from the year index page
    #[default]
    All,
    /// An explicit list of session identifiers
    Explicit(Vec<SessionId>),
}

impl Selection {
    /// Build an explicit selection from anything that yields identifiers
    pub fn explicit<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SessionId>,
    {
        Selection::Explicit(ids.into_iter().map(Into::into).collect())
    }
}

/// Kind of asset downloaded for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Session video at the requested resolution
    Video,
    /// Slide deck
    Pdf,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Video => f.write_str("video"),
            AssetKind::Pdf => f.write_str("pdf"),
        }
    }
}

/// Which asset kinds to fetch for every session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSelection {
    /// Download the session video
    pub video: bool,
    /// Download the slides PDF
    pub pdf: bool,
}

impl Default for AssetSelection {
    fn default() -> Self {
        Self {
            video: true,
            pdf: true,
        }
    }
}

impl AssetSelection {
    /// Videos only
    pub fn video_only() -> Self {
        Self {
            video: true,
            pdf: false,
        }
    }

    /// Slides only
    pub fn pdf_only() -> Self {
        Self {
            video: false,
            pdf: true,
        }
    }

    /// Requested kinds in processing order
    pub fn kinds(&self) -> Vec<AssetKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.video {
            kinds.push(AssetKind::Video);
        }
        if self.pdf {
            kinds.push(AssetKind::Pdf);
        }
        kinds
    }

    /// True when nothing would be downloaded
    pub fn is_empty(&self) -> bool {
        !self.video && !self.pdf
    }
}

/// How a download is transferred to disk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Read into memory, then write atomically (small payloads)
    Immediate,
    /// Stream to a temp file with progress reporting (large payloads)
    Progressive,
}

impl From<AssetKind> for TransferMode {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Video => TransferMode::Progressive,
            AssetKind::Pdf => TransferMode::Immediate,
        }
    }
}

/// Transfer progress of a single download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Bytes written so far
    pub bytes_written: u64,
    /// Expected total, when the server announced one
    pub bytes_expected: Option<u64>,
}

impl Progress {
    /// Completed fraction as a percentage (0.0 when the total is unknown or zero)
    pub fn percent(&self) -> f64 {
        match self.bytes_expected {
            Some(expected) if expected > 0 => {
                (self.bytes_written as f64 / expected as f64 * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }
}

/// One unit of download work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Remote file URL
    pub source_url: String,
    /// Root directory for downloads
    pub destination_dir: PathBuf,
    /// Sub-directory name and label used in status output
    pub display_name: String,
}

/// Phase of a session in the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Fetching the session detail page
    ResolvingPage,
    /// Searching the page for asset links
    ExtractingLink,
    /// Transferring files
    Downloading,
    /// All requested assets were saved
    Done,
    /// At least one requested asset failed
    Failed,
}

/// Outcome of a single asset of a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOutcome {
    /// Asset kind
    pub kind: AssetKind,
    /// Saved file on success
    pub path: Option<PathBuf>,
    /// Failure reason code on failure
    pub error: Option<String>,
}

impl AssetOutcome {
    /// True when the asset was saved
    pub fn succeeded(&self) -> bool {
        self.path.is_some()
    }
}

/// Final state of a session after the pipeline ran
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Session identifier
    pub session: SessionId,
    /// `Done` or `Failed`
    pub phase: SessionPhase,
    /// Per-asset results
    pub assets: Vec<AssetOutcome>,
    /// Reason for a failure that happened before any asset was attempted
    pub error: Option<String>,
}

impl SessionOutcome {
    /// True when every requested asset was saved
    pub fn succeeded(&self) -> bool {
        self.phase == SessionPhase::Done
    }
}

/// Summary of a whole batch run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Per-session outcomes, in resolved order
    pub sessions: Vec<SessionOutcome>,
}

impl BatchSummary {
    /// Number of sessions that finished with every asset saved
    pub fn succeeded(&self) -> usize {
        self.sessions.iter().filter(|s| s.succeeded()).count()
    }

    /// Number of sessions with at least one failure
    pub fn failed(&self) -> usize {
        self.sessions.len() - self.succeeded()
    }

    /// Sessions that failed
    pub fn failures(&self) -> impl Iterator<Item = &SessionOutcome> {
        self.sessions.iter().filter(|s| !s.succeeded())
    }

    /// A batch succeeds when at least one session succeeded
    pub fn is_success(&self) -> bool {
        self.succeeded() > 0
    }

    /// Check the batch-level outcome
    ///
    /// # Errors
    /// Returns [`Error::NoSessionsSucceeded`] when no session succeeded,
    /// including when the batch was empty.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::NoSessionsSucceeded {
                attempted: self.sessions.len(),
            })
        }
    }
}

/// Status events emitted while a batch runs
///
/// Consumers subscribe through [`crate::Pipeline::subscribe`] and render the
/// events however they like.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Session selection resolved
    SelectionResolved {
        /// Resolved identifiers in processing order
        sessions: Vec<SessionId>,
        /// Whether they were discovered from the index page
        discovered: bool,
    },

    /// Session processing started
    SessionStarted {
        /// Session identifier
        session: SessionId,
    },

    /// A download link was found on the session page
    LinkResolved {
        /// Session identifier
        session: SessionId,
        /// Asset kind
        kind: AssetKind,
        /// Resolved download URL
        url: String,
    },

    /// A download started
    DownloadStarted {
        /// Session identifier
        session: SessionId,
        /// Asset kind
        kind: AssetKind,
        /// Source URL
        url: String,
    },

    /// Download progress update
    DownloadProgress {
        /// Session identifier
        session: SessionId,
        /// Asset kind
        kind: AssetKind,
        /// Bytes written so far
        bytes_written: u64,
        /// Expected total, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        bytes_expected: Option<u64>,
    },

    /// Download saved to its final path
    DownloadComplete {
        /// Session identifier
        session: SessionId,
        /// Asset kind
        kind: AssetKind,
        /// Final path
        path: PathBuf,
    },

    /// Download failed
    DownloadFailed {
        /// Session identifier
        session: SessionId,
        /// Asset kind
        kind: AssetKind,
        /// Failure category
        reason: FailureReason,
        /// Error message
        error: String,
    },

    /// Every requested asset of the session was saved
    SessionComplete {
        /// Session identifier
        session: SessionId,
    },

    /// The session failed
    SessionFailed {
        /// Session identifier
        session: SessionId,
        /// Reason code (fetch, no_matching_link, transport, ...)
        reason: String,
        /// Error message
        error: String,
    },

    /// Batch finished
    BatchFinished {
        /// Sessions that succeeded
        succeeded: usize,
        /// Sessions that failed
        failed: usize,
    },
}

/// Remove duplicate identifiers, keeping the first occurrence of each
pub fn dedup_preserving_order(ids: &[SessionId]) -> Vec<SessionId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}
