//! # Stagehand Process
//!
//! Low-level process operations for stagehand.
//!
//! This crate provides:
//! - Launch commands with late placeholder substitution
//! - Process termination and existence checks
//! - Per-group process registries that prevent orphaned children
//! - The host lifecycle that kills every tracked child on exit
//!
//! Signalling is implemented for Unix (SIGTERM/SIGKILL) and Windows
//! (Ctrl+Break to the child's process group, then `TerminateProcess`). On
//! any other target the termination functions return
//! [`ProcessError::Unsupported`](stagehand_common::ProcessError::Unsupported),
//! so `destroy()` reports the child as orphaned.

pub mod check;
pub mod execute;
pub mod host;
pub mod registry;
pub mod shutdown;
pub mod terminate;
#[cfg(windows)]
mod terminate_windows;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use host::HostLifecycle;
pub use registry::{OsProcess, ProcessRegistry, RegistrationGuard, TrackedProcess};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use terminate::*;
