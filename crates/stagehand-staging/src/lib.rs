//! # Stagehand Staging
//!
//! Prepares the working directory of a stage group:
//! - [`ensure_directory`] creates the base and group directories
//! - [`stage_artifacts`] copies artifacts in atomically
//! - [`classpath`] lists the staged files as a launch classpath
//! - [`remove_files`] deletes the directory with bounded retry
//!
//! Artifacts come from any [`Artifact`] implementation; [`FileArtifact`],
//! [`InMemoryArtifact`] and [`DirectoryArtifactStore`] cover the local cases.

pub mod artifact;
pub mod classpath;
pub mod cleanup;
pub mod stage;

pub use artifact::{Artifact, ArtifactReader, DirectoryArtifactStore, FileArtifact, InMemoryArtifact};
pub use classpath::{classpath, classpath_entries, CLASSPATH_SEPARATOR};
pub use cleanup::{remove_files, remove_files_with, REMOVE_RETRY_INTERVAL, REMOVE_TIMEOUT};
pub use stage::{ensure_directory, stage_artifact, stage_artifacts};
