//! # Stagehand Supervisor
//!
//! Supervision of stage groups: each group runs as one child process whose
//! working directory is staged from artifacts, whose output is relayed into
//! the host log, and which is restarted according to its retry budget.
//!
//! This crate provides:
//! - [`ProcessSupervisor`] - prepare, run (restart loop) and destroy one group
//! - [`Fleet`] - many supervisors, one tokio task each
//! - Configuration loading and validation
//! - Exit classification and restart policy

pub mod config;
pub mod fleet;
pub mod group;
pub mod policy;
pub mod runtime;
pub mod supervisor;

// Re-export main types
pub use config::{FleetConfig, GroupConfig, PropertyMap, StageConfig, SupervisorOptions};
pub use fleet::{Fleet, GroupStatus};
pub use group::StageGroupSpec;
pub use policy::{classify, ExitClassification, Retries};
pub use runtime::{tokenize_parameters, RuntimeConfig};
pub use supervisor::{ProcessSupervisor, RunOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
