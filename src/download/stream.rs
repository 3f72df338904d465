//! Progressive transfer: stream chunks into a partial file

use super::atomic::{discard_partial, persist, prepare_dirs};
use super::progress::ProgressTracker;
use crate::error::{DownloadError, FailureReason};
use crate::types::Progress;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Limits applied while streaming
#[derive(Clone, Copy, Debug)]
pub(crate) struct StreamLimits {
    /// Maximum wait for the next chunk
    pub stall_timeout: Duration,
    /// Report progress every this many bytes
    pub progress_interval: u64,
}

/// Stream `chunks` into `partial`, then move it to `final_path`
///
/// `report` receives threshold progress updates and a final complete state.
/// On any failure the partial file is removed and `final_path` is untouched.
/// Returns the number of bytes written.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn stream_to_file<S, B, E>(
    chunks: S,
    expected: Option<u64>,
    url: &str,
    partial: &Path,
    final_path: &Path,
    limits: StreamLimits,
    cancel: &CancellationToken,
    mut report: impl FnMut(Progress),
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let fail = |reason: FailureReason, message: String| {
        DownloadError::new(reason, url, message).at(final_path)
    };

    prepare_dirs(final_path, partial)
        .await
        .map_err(|e| fail(FailureReason::Save, format!("cannot create directories: {}", e)))?;

    let mut file = tokio::fs::File::create(partial).await.map_err(|e| {
        fail(
            FailureReason::Save,
            format!("cannot create {}: {}", partial.display(), e),
        )
    })?;

    let mut tracker = ProgressTracker::new(expected, limits.progress_interval);
    let mut chunks = std::pin::pin!(chunks);

    let transfer: Result<(), DownloadError> = async {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(fail(FailureReason::Cancelled, "download abandoned".to_string()));
                }
                next = tokio::time::timeout(limits.stall_timeout, chunks.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return Err(fail(
                        FailureReason::Timeout,
                        format!("no data for {:?}", limits.stall_timeout),
                    ));
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(fail(FailureReason::Transport, e.to_string())),
                Ok(Some(Ok(chunk))) => chunk,
            };

            let bytes = chunk.as_ref();
            file.write_all(bytes)
                .await
                .map_err(|e| fail(FailureReason::Save, e.to_string()))?;

            if let Some(progress) = tracker.advance(bytes.len() as u64) {
                report(progress);
            }
        }

        if let Some(expected) = tracker.expected()
            && tracker.written() < expected
        {
            return Err(fail(
                FailureReason::Transport,
                format!(
                    "stream ended after {} of {} bytes",
                    tracker.written(),
                    expected
                ),
            ));
        }

        file.flush()
            .await
            .map_err(|e| fail(FailureReason::Save, e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| fail(FailureReason::Save, e.to_string()))?;
        Ok(())
    }
    .await;

    drop(file);

    if let Err(e) = transfer {
        discard_partial(partial).await;
        return Err(e);
    }

    if let Some(progress) = tracker.finish() {
        report(progress);
    }

    if let Err(e) = persist(partial, final_path).await {
        discard_partial(partial).await;
        return Err(fail(
            FailureReason::Save,
            format!("cannot move into place: {}", e),
        ));
    }

    Ok(tracker.written())
}

/// Read `chunks` into memory
///
/// The stall timeout applies to each chunk, never to the body as a whole.
/// A body shorter than `expected` is a transport failure.
pub(crate) async fn read_to_memory<S, B, E>(
    chunks: S,
    expected: Option<u64>,
    url: &str,
    final_path: &Path,
    stall_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let fail = |reason: FailureReason, message: String| {
        DownloadError::new(reason, url, message).at(final_path)
    };

    let capacity = expected.and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
    let mut body = Vec::with_capacity(capacity);
    let mut chunks = std::pin::pin!(chunks);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(fail(FailureReason::Cancelled, "download abandoned".to_string()));
            }
            next = tokio::time::timeout(stall_timeout, chunks.next()) => next,
        };

        match next {
            Err(_) => {
                return Err(fail(
                    FailureReason::Timeout,
                    format!("no data for {:?}", stall_timeout),
                ));
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => return Err(fail(FailureReason::Fetch, e.to_string())),
            Ok(Some(Ok(chunk))) => body.extend_from_slice(chunk.as_ref()),
        }
    }

    if let Some(expected) = expected
        && (body.len() as u64) < expected
    {
        return Err(fail(
            FailureReason::Transport,
            format!("body ended after {} of {} bytes", body.len(), expected),
        ));
    }

    Ok(body)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::partial_path;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::tempdir;

    const URL: &str = "https://cdn.example.com/s101_hd.mov?dl=1";

    fn limits() -> StreamLimits {
        StreamLimits {
            stall_timeout: Duration::from_millis(200),
            progress_interval: 500_000,
        }
    }

    fn chunks(total: usize, size: usize) -> Vec<Result<Bytes, String>> {
        let mut out = Vec::new();
        let mut remaining = total;
        while remaining > 0 {
            let n = size.min(remaining);
            out.push(Ok(Bytes::from(vec![7u8; n])));
            remaining -= n;
        }
        out
    }

    #[tokio::test]
    async fn test_stream_writes_file_and_reports_progress() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("101").join("s101_hd.mov");
        let partial = partial_path(&final_path, None);
        let mut reports = Vec::new();

        let written = stream_to_file(
            stream::iter(chunks(3_500_000, 500_000)),
            Some(3_500_000),
            URL,
            &partial,
            &final_path,
            limits(),
            &CancellationToken::new(),
            |p| reports.push(p),
        )
        .await
        .unwrap();

        assert_eq!(written, 3_500_000);
        assert_eq!(std::fs::metadata(&final_path).unwrap().len(), 3_500_000);
        assert!(!partial.exists());

        assert_eq!(reports.len(), 7);
        assert!(
            reports
                .iter()
                .all(|p| p.bytes_written <= p.bytes_expected.unwrap())
        );
        let last = reports.last().unwrap();
        assert_eq!(last.bytes_written, 3_500_000);
        assert_eq!(last.bytes_expected, Some(3_500_000));
    }

    #[tokio::test]
    async fn test_mid_stream_error_leaves_no_file() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("s101_hd.mov");
        let partial = partial_path(&final_path, None);

        let mut items = chunks(1_000_000, 250_000);
        items.insert(2, Err("connection reset".to_string()));

        let err = stream_to_file(
            stream::iter(items),
            Some(1_000_000),
            URL,
            &partial,
            &final_path,
            limits(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.reason, FailureReason::Transport);
        assert!(!final_path.exists());
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_short_stream_is_transport_failure() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("s101_hd.mov");
        let partial = partial_path(&final_path, None);

        let err = stream_to_file(
            stream::iter(chunks(600, 100)),
            Some(1_000),
            URL,
            &partial,
            &final_path,
            limits(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.reason, FailureReason::Transport);
        assert!(!final_path.exists());
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("s101_hd.mov");
        let partial = partial_path(&final_path, None);

        let stalled = stream::iter(chunks(100, 100)).chain(stream::pending());

        let err = stream_to_file(
            stalled,
            None,
            URL,
            &partial,
            &final_path,
            StreamLimits {
                stall_timeout: Duration::from_millis(50),
                progress_interval: 10,
            },
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.reason, FailureReason::Timeout);
        assert!(!final_path.exists());
        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_cancelled_download_is_abandoned() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("s101_hd.mov");
        let partial = partial_path(&final_path, None);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = stream_to_file(
            stream::pending::<Result<Bytes, String>>(),
            None,
            URL,
            &partial,
            &final_path,
            StreamLimits {
                stall_timeout: Duration::from_secs(10),
                progress_interval: 10,
            },
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.reason, FailureReason::Cancelled);
        assert!(!final_path.exists());
    }

    #[tokio::test]
    async fn test_read_to_memory_tolerates_slow_steady_body() {
        // 10 chunks 30ms apart: 300ms in total, never 100ms without data
        let trickle = stream::iter(chunks(1_000, 100)).then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            chunk
        });

        let body = read_to_memory(
            trickle,
            Some(1_000),
            URL,
            Path::new("slides.pdf"),
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(body.len(), 1_000);
    }

    #[tokio::test]
    async fn test_read_to_memory_stall_times_out() {
        let stalled = stream::iter(chunks(100, 100)).chain(stream::pending());

        let err = read_to_memory(
            stalled,
            None,
            URL,
            Path::new("slides.pdf"),
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.reason, FailureReason::Timeout);
    }

    #[tokio::test]
    async fn test_read_to_memory_short_body_is_transport_failure() {
        let err = read_to_memory(
            stream::iter(chunks(300, 100)),
            Some(500),
            URL,
            Path::new("slides.pdf"),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.reason, FailureReason::Transport);
    }

    #[tokio::test]
    async fn test_existing_final_file_survives_failed_transfer() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("s101_hd.mov");
        std::fs::write(&final_path, b"complete earlier copy").unwrap();
        let partial = partial_path(&final_path, None);

        let items = vec![
            Ok(Bytes::from_static(&[1u8; 10])),
            Err("broken pipe".to_string()),
        ];
        let result = stream_to_file(
            stream::iter(items),
            Some(20),
            URL,
            &partial,
            &final_path,
            limits(),
            &CancellationToken::new(),
            |_| {},
        )
        .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"complete earlier copy");
    }
}
