//! Batch orchestration
//!
//! For every resolved session the pipeline fetches the detail page, extracts
//! one download link per requested asset kind and dispatches the downloads.
//! Page work runs session by session; downloads run in the background,
//! bounded by `max_concurrent_downloads`. A failing session is recorded and
//! the batch moves on.

use crate::config::Config;
use crate::download::{DownloadManager, DownloadObserver, SilentObserver};
use crate::error::{DownloadError, Error, FailureReason, Result};
use crate::extract::LinkExtractor;
use crate::fetcher::{HttpPageFetcher, PageFetcher, build_client, session_url};
use crate::resolver::SessionResolver;
use crate::retry::fetch_with_retry;
use crate::types::{
    AssetKind, AssetOutcome, BatchSummary, DownloadTask, Event, Progress, SessionId,
    SessionOutcome, SessionPhase, TransferMode,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the status event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runs a whole batch: resolve, scrape, download
pub struct Pipeline {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: LinkExtractor,
    downloads: Arc<DownloadManager>,
    observer: Arc<dyn DownloadObserver>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

/// A download that was dispatched for one asset
struct PendingAsset {
    kind: AssetKind,
    handle: JoinHandle<std::result::Result<PathBuf, DownloadError>>,
}

/// Work recorded for one session while its downloads run
struct SessionWork {
    session: SessionId,
    /// Set when the session failed before any download was dispatched
    error: Option<Error>,
    finished: Vec<AssetOutcome>,
    pending: Vec<PendingAsset>,
}

impl Pipeline {
    /// Create a pipeline talking to the configured catalog over HTTP
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid or the HTTP
    /// client cannot be built, [`Error::Pattern`] if a pattern fails to compile.
    pub fn new(config: Config) -> Result<Self> {
        let client = build_client(&config.http)?;
        let fetcher = Arc::new(HttpPageFetcher::with_client(
            client.clone(),
            config.http.request_timeout,
        ));
        Self::with_parts(config, fetcher, client)
    }

    /// Create a pipeline with a custom page fetcher
    ///
    /// # Errors
    /// Same as [`Pipeline::new`].
    pub fn with_parts(
        config: Config,
        fetcher: Arc<dyn PageFetcher>,
        client: reqwest::Client,
    ) -> Result<Self> {
        config.validate()?;

        let extractor = LinkExtractor::new(&config.catalog.event(config.year), config.resolution)?;
        let downloads = Arc::new(DownloadManager::new(client, config.transfer.clone()));
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            extractor,
            downloads,
            observer: Arc::new(SilentObserver),
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `observer` for per-download progress and completion
    pub fn with_observer(mut self, observer: Arc<dyn DownloadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Subscribe to status events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that abandons the run when cancelled
    ///
    /// Sessions not yet started are skipped and in-flight downloads stop,
    /// leaving no partial files behind.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configuration of this run
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the selection and process every session
    ///
    /// # Errors
    /// Fails only when the session selection cannot be resolved (index page
    /// unreachable). Per-session failures are reported in the summary.
    pub async fn run(&self) -> Result<BatchSummary> {
        let resolver = SessionResolver::new(self.fetcher.clone(), self.extractor.clone());
        let sessions = match resolver.resolve(&self.config).await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, "Could not resolve session selection");
                return Err(e);
            }
        };

        self.emit(Event::SelectionResolved {
            sessions: sessions.clone(),
            discovered: matches!(self.config.selection, crate::types::Selection::All),
        });

        Ok(self.process(&sessions).await)
    }

    /// Process an already resolved list of sessions
    pub async fn process(&self, sessions: &[SessionId]) -> BatchSummary {
        info!(
            count = sessions.len(),
            year = self.config.year,
            resolution = %self.config.resolution,
            "Processing sessions"
        );

        let mut work = Vec::with_capacity(sessions.len());
        for session in sessions {
            if self.cancel.is_cancelled() {
                work.push(SessionWork::failed(
                    session.clone(),
                    Error::Download(DownloadError::new(
                        FailureReason::Cancelled,
                        session.as_str(),
                        "run cancelled before session started",
                    )),
                ));
                continue;
            }
            work.push(self.dispatch_session(session).await);
        }

        let mut summary = BatchSummary::default();
        for item in work {
            summary.sessions.push(self.finish_session(item).await);
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Batch finished"
        );
        self.emit(Event::BatchFinished {
            succeeded: summary.succeeded(),
            failed: summary.failed(),
        });
        summary
    }

    /// Fetch the page, extract links and start the downloads of one session
    async fn dispatch_session(&self, session: &SessionId) -> SessionWork {
        self.emit(Event::SessionStarted {
            session: session.clone(),
        });
        debug!(session = %session, phase = ?SessionPhase::ResolvingPage, "Session phase");

        let html = match self.fetch_session_page(session).await {
            Ok(html) => html,
            Err(e) => {
                warn!(session = %session, error = %e, "Could not fetch session page");
                return SessionWork::failed(session.clone(), e);
            }
        };

        debug!(session = %session, phase = ?SessionPhase::ExtractingLink, "Session phase");

        let mut work = SessionWork::new(session.clone());
        for kind in self.config.assets.kinds() {
            let links = self.extractor.asset_links(kind, &html);
            let Some(url) = links.first() else {
                let err = Error::NoMatchingLink {
                    session: session.clone(),
                    kind,
                };
                warn!(session = %session, kind = %kind, "No download link on session page");
                work.finished.push(AssetOutcome {
                    kind,
                    path: None,
                    error: Some(err.reason().to_string()),
                });
                continue;
            };

            if links.len() > 1 {
                warn!(
                    session = %session,
                    kind = %kind,
                    chosen = %url,
                    ignored = ?&links[1..],
                    "Several download links found, using the first in sorted order"
                );
            }

            self.emit(Event::LinkResolved {
                session: session.clone(),
                kind,
                url: url.clone(),
            });

            debug!(session = %session, kind = %kind, phase = ?SessionPhase::Downloading, "Session phase");
            work.pending.push(self.dispatch_download(session, kind, url));
        }

        work
    }

    async fn fetch_session_page(&self, session: &SessionId) -> Result<String> {
        let url = session_url(&self.config.catalog, self.config.year, session)?;
        fetch_with_retry(&self.config.retry, || self.fetcher.fetch(&url)).await
    }

    fn dispatch_download(&self, session: &SessionId, kind: AssetKind, url: &str) -> PendingAsset {
        let task = DownloadTask {
            source_url: url.to_string(),
            destination_dir: self.config.download_dir.clone(),
            display_name: session.to_string(),
        };

        self.emit(Event::DownloadStarted {
            session: session.clone(),
            kind,
            url: url.to_string(),
        });

        let observer: Arc<dyn DownloadObserver> = Arc::new(EventObserver {
            session: session.clone(),
            kind,
            inner: self.observer.clone(),
            events: self.event_tx.clone(),
        });

        let handle = self.downloads.spawn(
            task,
            TransferMode::from(kind),
            observer,
            self.cancel.child_token(),
        );

        PendingAsset { kind, handle }
    }

    /// Wait for the session's downloads and settle its outcome
    async fn finish_session(&self, mut work: SessionWork) -> SessionOutcome {
        let session = work.session.clone();

        if let Some(err) = work.error.take() {
            self.emit(Event::SessionFailed {
                session: session.clone(),
                reason: err.reason().to_string(),
                error: err.to_string(),
            });
            return SessionOutcome {
                session,
                phase: SessionPhase::Failed,
                assets: Vec::new(),
                error: Some(err.reason().to_string()),
            };
        }

        for pending in work.pending {
            let outcome = match pending.handle.await {
                Ok(Ok(path)) => AssetOutcome {
                    kind: pending.kind,
                    path: Some(path),
                    error: None,
                },
                Ok(Err(e)) => AssetOutcome {
                    kind: pending.kind,
                    path: None,
                    error: Some(e.reason.to_string()),
                },
                Err(join_err) => {
                    error!(session = %session, error = %join_err, "Download task panicked");
                    AssetOutcome {
                        kind: pending.kind,
                        path: None,
                        error: Some(FailureReason::Transport.to_string()),
                    }
                }
            };
            work.finished.push(outcome);
        }
        work.finished.sort_by_key(|a| a.kind);

        let first_failure = work.finished.iter().find_map(|a| a.error.clone());
        match first_failure {
            None => {
                info!(session = %session, "Session complete");
                self.emit(Event::SessionComplete {
                    session: session.clone(),
                });
                SessionOutcome {
                    session,
                    phase: SessionPhase::Done,
                    assets: work.finished,
                    error: None,
                }
            }
            Some(reason) => {
                let failed: Vec<String> = work
                    .finished
                    .iter()
                    .filter(|a| !a.succeeded())
                    .map(|a| a.kind.to_string())
                    .collect();
                warn!(session = %session, reason = %reason, assets = ?failed, "Session failed");
                self.emit(Event::SessionFailed {
                    session: session.clone(),
                    reason: reason.clone(),
                    error: format!("{} failed", failed.join(", ")),
                });
                SessionOutcome {
                    session,
                    phase: SessionPhase::Failed,
                    assets: work.finished,
                    error: None,
                }
            }
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl SessionWork {
    fn new(session: SessionId) -> Self {
        Self {
            session,
            error: None,
            finished: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn failed(session: SessionId, error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::new(session)
        }
    }
}

/// Turns download callbacks into status events, then forwards them
struct EventObserver {
    session: SessionId,
    kind: AssetKind,
    inner: Arc<dyn DownloadObserver>,
    events: broadcast::Sender<Event>,
}

impl DownloadObserver for EventObserver {
    fn on_progress(&self, task: &DownloadTask, progress: Progress) {
        let _ = self.events.send(Event::DownloadProgress {
            session: self.session.clone(),
            kind: self.kind,
            bytes_written: progress.bytes_written,
            bytes_expected: progress.bytes_expected,
        });
        self.inner.on_progress(task, progress);
    }

    fn on_success(&self, task: &DownloadTask, path: &Path) {
        let _ = self.events.send(Event::DownloadComplete {
            session: self.session.clone(),
            kind: self.kind,
            path: path.to_path_buf(),
        });
        self.inner.on_success(task, path);
    }

    fn on_failure(&self, task: &DownloadTask, error: &DownloadError) {
        let _ = self.events.send(Event::DownloadFailed {
            session: self.session.clone(),
            kind: self.kind,
            reason: error.reason,
            error: error.message.clone(),
        });
        self.inner.on_failure(task, error);
    }
}
