//! Download execution
//!
//! [`DownloadManager`] retrieves one remote file per [`DownloadTask`] and
//! places it at `<destination_dir>/<display_name>/<url basename>`:
//! - [`TransferMode::Immediate`] reads the whole body into memory, then writes
//!   it atomically (slides)
//! - [`TransferMode::Progressive`] streams into a partial file with progress
//!   reports, then moves it into place (videos)
//!
//! Progress and completion are delivered to a [`DownloadObserver`], which may
//! be called from any tokio worker thread.

mod atomic;
mod progress;
mod stream;

pub use atomic::write_atomic;
pub use progress::ProgressTracker;

use crate::config::TransferConfig;
use crate::error::{DownloadError, FailureReason};
use crate::types::{DownloadTask, Progress, TransferMode};
use crate::utils::{file_name_from_url, format_bytes, format_percent, partial_path};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stream::{StreamLimits, read_to_memory, stream_to_file};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives notifications about a single download
pub trait DownloadObserver: Send + Sync {
    /// Bytes were written
    fn on_progress(&self, task: &DownloadTask, progress: Progress);

    /// The file was placed at `path`
    fn on_success(&self, task: &DownloadTask, path: &Path);

    /// The download failed
    fn on_failure(&self, task: &DownloadTask, error: &DownloadError);
}

/// Observer that ignores every notification
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentObserver;

impl DownloadObserver for SilentObserver {
    fn on_progress(&self, _task: &DownloadTask, _progress: Progress) {}
    fn on_success(&self, _task: &DownloadTask, _path: &Path) {}
    fn on_failure(&self, _task: &DownloadTask, _error: &DownloadError) {}
}

/// Prints download status to stderr
///
/// In inline mode a single terminal line is rewritten in place, which suits
/// one download at a time. Otherwise every update is its own line, prefixed
/// with the download's display name so concurrent downloads stay readable.
#[derive(Clone, Copy, Debug)]
pub struct StatusLineObserver {
    inline: bool,
}

impl StatusLineObserver {
    /// Rewrite one line in place
    pub fn inline() -> Self {
        Self { inline: true }
    }

    /// One line per update
    pub fn per_line() -> Self {
        Self { inline: false }
    }

    /// Inline when only one download runs at a time
    pub fn for_concurrency(max_concurrent: usize) -> Self {
        Self {
            inline: max_concurrent <= 1,
        }
    }

    fn write(&self, line: &str, terminal: bool) {
        let mut err = std::io::stderr().lock();
        let result = if self.inline {
            let end = if terminal { "\n" } else { "" };
            write!(err, "\r\x1b[2K{}{}", line, end)
        } else {
            writeln!(err, "{}", line)
        };
        let _ = result.and_then(|_| err.flush());
    }
}

/// Label naming one download, e.g. "101/s101_hd.mov"
///
/// The video and the slides of a session share a display name, so the file
/// name is part of the label.
pub fn download_label(task: &DownloadTask) -> String {
    match file_name_from_url(&task.source_url) {
        Ok(file) => format!("{}/{}", task.display_name, file),
        Err(_) => task.display_name.clone(),
    }
}

/// Status text for a progress update, e.g. "101/s101_hd.mov: 1.5 MB (42.0%)"
pub fn status_line(name: &str, progress: Progress) -> String {
    format!(
        "{}: {} ({})",
        name,
        format_bytes(progress.bytes_written),
        format_percent(progress.percent())
    )
}

impl DownloadObserver for StatusLineObserver {
    fn on_progress(&self, task: &DownloadTask, progress: Progress) {
        self.write(&status_line(&download_label(task), progress), false);
    }

    fn on_success(&self, task: &DownloadTask, path: &Path) {
        self.write(
            &format!("{}: saved {}", download_label(task), path.display()),
            true,
        );
    }

    fn on_failure(&self, task: &DownloadTask, error: &DownloadError) {
        self.write(
            &format!(
                "{}: failed ({}) {}",
                download_label(task),
                error.reason,
                error.message
            ),
            true,
        );
    }
}

/// Executes downloads
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    transfer: TransferConfig,
    /// Bounds spawned downloads to `max_concurrent_downloads`
    concurrent_limit: Arc<Semaphore>,
}

impl DownloadManager {
    /// Create a manager sharing `client`
    pub fn new(client: reqwest::Client, transfer: TransferConfig) -> Self {
        let concurrent_limit = Arc::new(Semaphore::new(transfer.max_concurrent_downloads.max(1)));
        Self {
            client,
            transfer,
            concurrent_limit,
        }
    }

    /// Final path of a task: `<destination_dir>/<display_name>/<url basename>`
    ///
    /// # Errors
    /// Fails with [`FailureReason::Fetch`] when the URL has no file name.
    pub fn destination_for(task: &DownloadTask) -> Result<PathBuf, DownloadError> {
        let file_name = file_name_from_url(&task.source_url)
            .map_err(|e| DownloadError::new(FailureReason::Fetch, &task.source_url, e.to_string()))?;
        Ok(task
            .destination_dir
            .join(&task.display_name)
            .join(file_name))
    }

    /// Start a download on the runtime and return immediately
    ///
    /// The download waits for a free slot (`max_concurrent_downloads`) before
    /// transferring. The outcome is delivered to `observer` and through the
    /// returned handle. Cancelling `cancel` abandons the transfer, leaving no
    /// partial file.
    pub fn spawn(
        self: &Arc<Self>,
        task: DownloadTask,
        mode: TransferMode,
        observer: Arc<dyn DownloadObserver>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<PathBuf, DownloadError>> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = manager.concurrent_limit.clone().acquire_owned() => permit.ok(),
            };

            let Some(_permit) = permit else {
                let err = DownloadError::new(
                    FailureReason::Cancelled,
                    &task.source_url,
                    "abandoned before start",
                );
                observer.on_failure(&task, &err);
                return Err(err);
            };

            manager
                .retrieve(&task, mode, observer.as_ref(), &cancel)
                .await
        })
    }

    /// Retrieve `task` and place the file, notifying `observer`
    ///
    /// # Errors
    /// Returns a [`DownloadError`] whose reason tells where it failed:
    /// `Fetch` (request/read), `Save` (disk), `Transport` (broken stream),
    /// `Timeout` (stalled) or `Cancelled`. No partial file is left at the
    /// final path in any case.
    pub async fn retrieve(
        &self,
        task: &DownloadTask,
        mode: TransferMode,
        observer: &dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let result = self.execute(task, mode, observer, cancel).await;
        match &result {
            Ok(path) => {
                info!(
                    name = %task.display_name,
                    path = %path.display(),
                    "Download complete"
                );
                observer.on_success(task, path);
            }
            Err(e) => {
                warn!(
                    name = %task.display_name,
                    url = %task.source_url,
                    reason = %e.reason,
                    error = %e.message,
                    "Download failed"
                );
                observer.on_failure(task, e);
            }
        }
        result
    }

    async fn execute(
        &self,
        task: &DownloadTask,
        mode: TransferMode,
        observer: &dyn DownloadObserver,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let final_path = Self::destination_for(task)?;
        let url = task.source_url.as_str();
        let stall = self.transfer.stall_timeout;
        let fail = |reason: FailureReason, message: String| {
            DownloadError::new(reason, url, message).at(&final_path)
        };

        debug!(url, mode = ?mode, path = %final_path.display(), "Starting download");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(fail(FailureReason::Cancelled, "download abandoned".to_string()));
            }
            sent = tokio::time::timeout(stall, self.client.get(url).send()) => match sent {
                Err(_) => return Err(fail(FailureReason::Timeout, format!("no response within {:?}", stall))),
                Ok(Err(e)) => return Err(fail(FailureReason::Fetch, e.to_string())),
                Ok(Ok(response)) => response,
            },
        };

        let status = response.status();
        if !status.is_success() {
            return Err(fail(FailureReason::Fetch, format!("HTTP {}", status)));
        }

        match mode {
            TransferMode::Immediate => {
                let expected = response.content_length();
                let body = read_to_memory(
                    response.bytes_stream(),
                    expected,
                    url,
                    &final_path,
                    stall,
                    cancel,
                )
                .await?;

                write_atomic(&final_path, &body, self.transfer.temp_dir.as_deref())
                    .await
                    .map_err(|e| fail(FailureReason::Save, e.to_string()))?;

                let size = body.len() as u64;
                observer.on_progress(
                    task,
                    Progress {
                        bytes_written: size,
                        bytes_expected: Some(size),
                    },
                );
            }
            TransferMode::Progressive => {
                let partial = partial_path(&final_path, self.transfer.temp_dir.as_deref());
                let expected = response.content_length();
                let limits = StreamLimits {
                    stall_timeout: stall,
                    progress_interval: self.transfer.progress_interval_bytes,
                };
                stream_to_file(
                    response.bytes_stream(),
                    expected,
                    url,
                    &partial,
                    &final_path,
                    limits,
                    cancel,
                    |progress| observer.on_progress(task, progress),
                )
                .await?;
            }
        }

        Ok(final_path)
    }
}
