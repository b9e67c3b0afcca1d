//! # Stagehand Common
//!
//! Common types and error definitions shared across the stagehand crates.
//!
//! This crate provides the foundational pieces every other crate builds on:
//! the per-layer error enums and the validated [`GroupName`] identifier.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{
    ProcessError, ProcessResult, StagingError, StagingResult, SupervisorError, SupervisorResult,
};
pub use types::{GroupName, StreamType};
