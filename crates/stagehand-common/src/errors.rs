//! Error types for the stagehand crates.
//!
//! Each layer has its own error enum so callers can match on exactly the
//! failures that layer can produce:
//!
//! - [`ProcessError`] - OS-level process operations (spawn, signal, wait)
//! - [`StagingError`] - working directory and artifact staging
//! - [`SupervisorError`] - supervisor lifecycle (prepare, run, destroy)
//!
//! ```rust
//! use stagehand_common::{SupervisorError, SupervisorResult};
//!
//! fn destroy() -> SupervisorResult<()> {
//!     Err(SupervisorError::orphaned_process("ocr"))
//! }
//!
//! assert!(destroy().unwrap_err().to_string().contains("Orphaned process"));
//! ```

use thiserror::Error;

// ==============================================================================
// Process Errors
// ==============================================================================

/// Errors raised by low-level process operations.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Process not found: {id}")]
    NotFound { id: String },

    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Process check failed: {id} - {reason}")]
    CheckFailed { id: String, reason: String },

    #[error("Process operation not supported on this platform: {operation}")]
    Unsupported { operation: String },
}

impl ProcessError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn check_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CheckFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// True if the error means the target process no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

// ==============================================================================
// Staging Errors
// ==============================================================================

/// Errors raised while preparing a working directory.
#[derive(Error, Debug)]
pub enum StagingError {
    /// The base or target directory could not be created.
    #[error("Unable to write files, target ({path}) is not a directory: {source}")]
    DirectoryUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An artifact could not be copied into the working directory.
    #[error("Failed to stage artifact {filename} into {path}: {source}")]
    ArtifactCopy {
        filename: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An artifact name would place the file outside the working directory.
    #[error("Invalid artifact filename: {filename}")]
    InvalidArtifactName { filename: String },

    /// The working directory could not be listed.
    #[error("Failed to list directory {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    pub fn directory_unavailable(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::DirectoryUnavailable {
            path: path.into(),
            source,
        }
    }

    pub fn artifact_copy(
        filename: impl Into<String>,
        path: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::ArtifactCopy {
            filename: filename.into(),
            path: path.into(),
            source,
        }
    }

    pub fn invalid_artifact_name(filename: impl Into<String>) -> Self {
        Self::InvalidArtifactName {
            filename: filename.into(),
        }
    }

    pub fn listing(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Listing {
            path: path.into(),
            source,
        }
    }
}

/// Result type for staging operations.
pub type StagingResult<T> = std::result::Result<T, StagingError>;

// ==============================================================================
// Supervisor Errors
// ==============================================================================

/// Errors surfaced by a stage group supervisor.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// `prepare()` failed; the supervisor cannot be started.
    #[error("Preparation failed for stage group {group}: {source}")]
    Preparation {
        group: String,
        #[source]
        source: StagingError,
    },

    /// An operation was requested in a state that does not allow it.
    #[error("Invalid state for stage group {group}: expected {expected}, got {actual}")]
    InvalidState {
        group: String,
        expected: String,
        actual: String,
    },

    /// `destroy()` could not terminate every tracked process.
    #[error("Orphaned process for {group}")]
    OrphanedProcess { group: String },

    /// The wait on a child process was interrupted. Only expected during an
    /// abnormal host shutdown, so it is never retried.
    #[error("Caught interrupt while waiting for process exit in stage group {group}")]
    Interrupted { group: String },

    /// A stage group name failed validation.
    #[error("Invalid stage group name '{name}': {reason}")]
    InvalidGroupName { name: String, reason: String },

    /// The fleet has no supervisor for the named group.
    #[error("Unknown stage group: {group}")]
    UnknownGroup { group: String },

    /// A group with the same name is already supervised.
    #[error("Stage group already exists: {group}")]
    DuplicateGroup { group: String },

    /// The supervisor's run task panicked or was aborted.
    #[error("Run task failed for stage group {group}: {reason}")]
    TaskFailed { group: String, reason: String },
}

impl SupervisorError {
    pub fn preparation(group: impl Into<String>, source: StagingError) -> Self {
        Self::Preparation {
            group: group.into(),
            source,
        }
    }

    pub fn invalid_state(
        group: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            group: group.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn orphaned_process(group: impl Into<String>) -> Self {
        Self::OrphanedProcess {
            group: group.into(),
        }
    }

    pub fn interrupted(group: impl Into<String>) -> Self {
        Self::Interrupted {
            group: group.into(),
        }
    }

    pub fn invalid_group_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGroupName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_group(group: impl Into<String>) -> Self {
        Self::UnknownGroup {
            group: group.into(),
        }
    }

    pub fn duplicate_group(group: impl Into<String>) -> Self {
        Self::DuplicateGroup {
            group: group.into(),
        }
    }

    pub fn task_failed(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            group: group.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_error_construction() {
        let error = ProcessError::not_found("1234");
        assert!(error.is_not_found());
        assert_eq!(format!("{}", error), "Process not found: 1234");

        let error = ProcessError::spawn_failed("ocr", "executable not found");
        assert!(matches!(error, ProcessError::SpawnFailed { .. }));
        assert!(!error.is_not_found());
        assert!(format!("{}", error).contains("spawn failed"));
    }

    #[test]
    fn test_preparation_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SupervisorError::preparation(
            "ocr",
            StagingError::directory_unavailable("/base/ocr", io),
        );

        let message = err.to_string();
        assert!(message.contains("ocr"));
        assert!(message.contains("/base/ocr"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_orphaned_process_message() {
        let err = SupervisorError::orphaned_process("ocr");
        assert_eq!(err.to_string(), "Orphaned process for ocr");
    }
}
