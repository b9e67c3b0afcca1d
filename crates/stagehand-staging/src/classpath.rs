//! Classpath construction from a staged working directory.

use stagehand_common::{StagingError, StagingResult};
use std::path::{Path, PathBuf};

/// Host path-list separator.
#[cfg(windows)]
pub const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
pub const CLASSPATH_SEPARATOR: &str = ":";

/// Sorted absolute paths of every entry in `target`.
pub async fn classpath_entries(target: &Path) -> StagingResult<Vec<PathBuf>> {
    let listing_error = |e| StagingError::listing(target.display().to_string(), e);

    let dir = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir().map_err(listing_error)?.join(target)
    };

    let mut entries = tokio::fs::read_dir(&dir).await.map_err(listing_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_error)? {
        paths.push(dir.join(entry.file_name()));
    }
    paths.sort();
    Ok(paths)
}

/// Classpath string for `target`: its entries joined with
/// [`CLASSPATH_SEPARATOR`]. An empty directory gives an empty string.
pub async fn classpath(target: &Path) -> StagingResult<String> {
    let entries = classpath_entries(target).await?;
    Ok(entries
        .iter()
        .map(|p| p.to_string_lossy())
        .collect::<Vec<_>>()
        .join(CLASSPATH_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_classpath_is_sorted_and_absolute() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("z.jar"), b"").unwrap();
        std::fs::write(dir.path().join("a.jar"), b"").unwrap();

        let cp = classpath(dir.path()).await.unwrap();
        let parts: Vec<&str> = cp.split(CLASSPATH_SEPARATOR).collect();

        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("a.jar"));
        assert!(parts[1].ends_with("z.jar"));
        assert!(parts.iter().all(|p| Path::new(p).is_absolute()));
    }

    #[tokio::test]
    async fn test_empty_directory_gives_empty_classpath() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(classpath(dir.path()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_missing_directory_is_a_listing_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = classpath(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, StagingError::Listing { .. }));
    }
}
