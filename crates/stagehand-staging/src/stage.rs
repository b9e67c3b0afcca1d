//! Working directory creation and artifact staging.

use crate::artifact::{Artifact, ArtifactReader};
use stagehand_common::{StagingError, StagingResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Create `base` and `target` if they do not exist yet.
pub async fn ensure_directory(base: &Path, target: &Path) -> StagingResult<()> {
    for dir in [base, target] {
        let unavailable = |e| StagingError::directory_unavailable(target.display().to_string(), e);

        tokio::fs::create_dir_all(dir).await.map_err(unavailable)?;
        let metadata = tokio::fs::metadata(dir).await.map_err(unavailable)?;
        if !metadata.is_dir() {
            return Err(unavailable(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} is not a directory", dir.display()),
            )));
        }
    }
    Ok(())
}

/// Copy every artifact into `target`, one atomic rename per artifact.
///
/// Stops at the first failure. Returns the number of staged artifacts.
pub async fn stage_artifacts(target: &Path, artifacts: &[Arc<dyn Artifact>]) -> StagingResult<usize> {
    for artifact in artifacts {
        let path = stage_artifact(target, artifact.as_ref()).await?;
        debug!("Staged {}", path.display());
    }
    Ok(artifacts.len())
}

/// Copy one artifact into `target` and return its final path.
pub async fn stage_artifact(target: &Path, artifact: &dyn Artifact) -> StagingResult<PathBuf> {
    let filename = artifact.filename();
    validate_filename(filename)?;

    let final_path = target.join(filename);
    let partial_path = target.join(format!(".{}.partial", filename));
    let copy_error = |e| StagingError::artifact_copy(filename, target.display().to_string(), e);

    let mut reader = artifact.open().await.map_err(copy_error)?;

    if let Err(e) = write_partial(&mut reader, &partial_path).await {
        // Consume the rest of the source so its producer is not left blocked.
        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
        remove_partial(&partial_path).await;
        return Err(copy_error(e));
    }
    drop(reader);

    if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
        remove_partial(&partial_path).await;
        return Err(copy_error(e));
    }

    Ok(final_path)
}

async fn write_partial(reader: &mut ArtifactReader, partial_path: &Path) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::create(partial_path).await?;
    let copied = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(copied)
}

async fn remove_partial(partial_path: &Path) {
    match tokio::fs::remove_file(partial_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", partial_path.display(), e),
    }
}

/// Artifact names must be a single plain path component.
fn validate_filename(filename: &str) -> StagingResult<()> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0');

    if invalid {
        return Err(StagingError::invalid_artifact_name(filename));
    }
    Ok(())
}
