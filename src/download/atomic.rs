//! Atomic file placement
//!
//! Downloads are written to a partial file first and only moved to their
//! final name once complete, so the final path either does not exist or holds
//! the whole payload.

use crate::utils::partial_path;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Write `data` to `final_path` through a partial file
///
/// Parent directories are created as needed. On failure the partial file is
/// removed and nothing is left at `final_path`.
pub async fn write_atomic(final_path: &Path, data: &[u8], temp_dir: Option<&Path>) -> io::Result<()> {
    let partial = partial_path(final_path, temp_dir);
    prepare_dirs(final_path, &partial).await?;

    let result = async {
        let mut file = tokio::fs::File::create(&partial).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        persist(&partial, final_path).await
    }
    .await;

    if result.is_err() {
        discard_partial(&partial).await;
    }
    result
}

/// Create the directories holding the final and the partial file
pub async fn prepare_dirs(final_path: &Path, partial: &Path) -> io::Result<()> {
    for dir in [final_path.parent(), partial.parent()].into_iter().flatten() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }
    Ok(())
}

/// Move a finished partial file into place
///
/// A same-filesystem rename is atomic. When the partial file lives on another
/// filesystem the data is first copied next to the final path and renamed
/// from there. Failing to delete the original partial file afterwards is only
/// logged: the payload is already in place.
pub async fn persist(partial: &Path, final_path: &Path) -> io::Result<()> {
    match tokio::fs::rename(partial, final_path).await {
        Ok(()) => {
            debug!(path = %final_path.display(), "Placed file");
            Ok(())
        }
        Err(rename_err) => {
            let staging = staging_path(final_path);
            if staging == partial {
                return Err(rename_err);
            }

            debug!(
                error = %rename_err,
                from = %partial.display(),
                "Rename failed, copying through staging file"
            );

            if let Err(e) = copy_then_rename(partial, &staging, final_path).await {
                discard_partial(&staging).await;
                return Err(e);
            }

            if let Err(e) = tokio::fs::remove_file(partial).await {
                warn!(
                    error = %e,
                    path = %partial.display(),
                    "Could not delete temporary file after placing download"
                );
            }
            Ok(())
        }
    }
}

async fn copy_then_rename(partial: &Path, staging: &Path, final_path: &Path) -> io::Result<()> {
    tokio::fs::copy(partial, staging).await?;
    tokio::fs::rename(staging, final_path).await
}

/// Partial-file path next to the final file
fn staging_path(final_path: &Path) -> PathBuf {
    partial_path(final_path, None)
}

/// Best-effort removal of an abandoned partial file
pub async fn discard_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => debug!(path = %partial.display(), "Removed partial file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, path = %partial.display(), "Could not remove partial file"),
    }
}
