//! # Stagehand Log Relay
//!
//! Drains child process stdout and stderr so the child never blocks on a
//! full pipe, and forwards each line to one or more output writers.
//!
//! This crate provides:
//! - [`LogRelay`], one task per attached stream
//! - Output writers: `tracing` (default), file, in-memory ring buffer

pub mod output;
pub mod relay;
pub mod types;

// Re-export main types
pub use output::{CircularBufferOutputWriter, FileOutputWriter, OutputWriter, TracingOutputWriter};
pub use relay::{LogRelay, MAX_LINE_BYTES};
pub use types::{LogEntry, RelayStats, StreamType};
