//! Artifacts and the stores that provide them.

use async_trait::async_trait;
use stagehand_common::{StagingError, StagingResult};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Byte stream returned by [`Artifact::open`].
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// A named binary blob to be copied into a working directory.
#[async_trait]
pub trait Artifact: Send + Sync + fmt::Debug {
    /// File name inside the working directory. Never a path.
    fn filename(&self) -> &str;

    /// Open a fresh stream over the artifact's bytes.
    async fn open(&self) -> io::Result<ArtifactReader>;
}

/// Artifact backed by a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileArtifact {
    filename: String,
    path: PathBuf,
}

impl FileArtifact {
    /// Artifact named after the last component of `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> StagingResult<Self> {
        let path = path.into();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StagingError::invalid_artifact_name(path.display().to_string()))?
            .to_string();
        Ok(Self { filename, path })
    }

    /// Artifact with an explicit name, read from `path`.
    pub fn with_name(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Artifact for FileArtifact {
    fn filename(&self) -> &str {
        &self.filename
    }

    async fn open(&self) -> io::Result<ArtifactReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

/// Artifact held in memory.
#[derive(Clone)]
pub struct InMemoryArtifact {
    filename: String,
    bytes: Arc<[u8]>,
}

impl InMemoryArtifact {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for InMemoryArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryArtifact")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[async_trait]
impl Artifact for InMemoryArtifact {
    fn filename(&self) -> &str {
        &self.filename
    }

    async fn open(&self) -> io::Result<ArtifactReader> {
        Ok(Box::new(io::Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// A local directory whose regular files are the artifacts of one group.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    root: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One [`FileArtifact`] per regular file, ordered by file name.
    pub async fn artifacts(&self) -> StagingResult<Vec<Arc<dyn Artifact>>> {
        let listing_error = |e| StagingError::listing(self.root.display().to_string(), e);

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(listing_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(listing_error)? {
            let file_type = entry.file_type().await.map_err(listing_error)?;
            if file_type.is_file() {
                files.push(FileArtifact::from_path(entry.path())?);
            }
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files
            .into_iter()
            .map(|f| Arc::new(f) as Arc<dyn Artifact>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_in_memory_artifact_can_be_opened_twice() {
        let artifact = InMemoryArtifact::new("stage.jar", b"PK\x03\x04".to_vec());

        for _ in 0..2 {
            let mut buf = Vec::new();
            artifact.open().await.unwrap().read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, b"PK\x03\x04");
        }
    }

    #[tokio::test]
    async fn test_directory_store_lists_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jar"), b"b").unwrap();
        std::fs::write(dir.path().join("a.jar"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let store = DirectoryArtifactStore::new(dir.path());
        let artifacts = store.artifacts().await.unwrap();

        let names: Vec<&str> = artifacts.iter().map(|a| a.filename()).collect();
        assert_eq!(names, vec!["a.jar", "b.jar"]);

        let mut buf = String::new();
        artifacts[1].open().await.unwrap().read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "b");
    }

    #[tokio::test]
    async fn test_directory_store_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryArtifactStore::new(dir.path().join("missing"));
        assert!(matches!(
            store.artifacts().await,
            Err(StagingError::Listing { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_artifact_missing_file_fails_on_open() {
        let artifact = FileArtifact::with_name("gone.jar", "/nonexistent/gone.jar");
        assert!(artifact.open().await.is_err());
    }
}
