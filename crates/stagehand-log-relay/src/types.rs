//! Core types for stream relaying

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use stagehand_common::StreamType;

/// One line read from a child's output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub group: String,
    pub stream: StreamType,
    /// Line content without its terminator
    pub line: String,
    /// 1-based line number within the stream
    pub line_num: u64,
}

/// Counters across every stream a relay has handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    pub total_lines: u64,
    pub total_bytes: u64,
    pub active_streams: u64,
    pub finished_streams: u64,
}
