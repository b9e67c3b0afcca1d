//! Output writers for relayed lines

use crate::types::{LogEntry, StreamType};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Trait for writing relayed lines to various outputs
pub trait OutputWriter: Send + Sync {
    /// Write a log entry
    fn write(&mut self, entry: &LogEntry) -> io::Result<()>;

    /// Flush any buffered output
    fn flush(&mut self) -> io::Result<()>;

    /// Close the output writer
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Re-emits every line as a `tracing` event tagged with group and stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOutputWriter;

impl OutputWriter for TracingOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        match entry.stream {
            StreamType::Stdout => tracing::info!(
                target: "stagehand::child",
                group = %entry.group,
                stream = %entry.stream,
                "{}",
                entry.line
            ),
            StreamType::Stderr => tracing::warn!(
                target: "stagehand::child",
                group = %entry.group,
                stream = %entry.stream,
                "{}",
                entry.line
            ),
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Appends formatted lines to a file
pub struct FileOutputWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileOutputWriter {
    /// Open (or create) `path` for appending, creating parent directories
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputWriter for FileOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        // Format: [timestamp] [group/stream] line
        writeln!(
            self.writer,
            "[{}] [{}/{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.group,
            entry.stream,
            entry.line
        )
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Circular buffer output writer (keeps last N log entries)
///
/// Clones share the same buffer, so a test can keep one clone and hand the
/// other to a relay.
#[derive(Clone)]
pub struct CircularBufferOutputWriter {
    buffer: Arc<Mutex<VecDeque<LogEntry>>>,
    max_size: usize,
}

impl CircularBufferOutputWriter {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(max_size))),
            max_size,
        }
    }

    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.buffer.lock().iter().cloned().collect()
    }

    /// Lines of one stream, in order
    pub fn lines(&self, stream: StreamType) -> Vec<String> {
        self.buffer
            .lock()
            .iter()
            .filter(|e| e.stream == stream)
            .map(|e| e.line.clone())
            .collect()
    }
}

impl OutputWriter for CircularBufferOutputWriter {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        let mut buffer = self.buffer.lock();
        buffer.push_back(entry.clone());
        while buffer.len() > self.max_size {
            buffer.pop_front();
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(line: &str, stream: StreamType) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            group: "ocr".to_string(),
            stream,
            line: line.to_string(),
            line_num: 1,
        }
    }

    #[test]
    fn test_circular_buffer_keeps_last_entries() {
        let buffer = CircularBufferOutputWriter::new(2);
        let mut writer = buffer.clone();

        writer.write(&entry("one", StreamType::Stdout)).unwrap();
        writer.write(&entry("two", StreamType::Stderr)).unwrap();
        writer.write(&entry("three", StreamType::Stdout)).unwrap();

        let logs = buffer.get_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].line, "two");
        assert_eq!(buffer.lines(StreamType::Stdout), vec!["three"]);
    }

    #[test]
    fn test_file_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ocr.log");

        let mut writer = FileOutputWriter::new(&path).unwrap();
        writer.write(&entry("hello", StreamType::Stdout)).unwrap();
        writer.close().unwrap();

        let mut writer = FileOutputWriter::new(&path).unwrap();
        writer.write(&entry("again", StreamType::Stderr)).unwrap();
        writer.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[ocr/stdout] hello"));
        assert!(lines[1].ends_with("[ocr/stderr] again"));
    }

    #[test]
    fn test_tracing_writer_never_fails() {
        let mut writer = TracingOutputWriter;
        assert!(writer.write(&entry("x", StreamType::Stderr)).is_ok());
        assert!(writer.flush().is_ok());
    }
}
