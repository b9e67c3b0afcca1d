//! Stream relay implementation

use crate::output::{OutputWriter, TracingOutputWriter};
use crate::types::{LogEntry, RelayStats, StreamType};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Longest chunk, newline included, emitted as one entry. Longer lines are
/// split so a child that never writes `\n` cannot grow the buffer unbounded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Copies child output streams line by line into a set of output writers.
///
/// Every attached stream gets its own task, so a child blocked writing to
/// one pipe never stalls the other.
pub struct LogRelay {
    outputs: Arc<RwLock<Vec<Box<dyn OutputWriter>>>>,
    counters: Arc<Counters>,
    max_line_bytes: usize,
}

#[derive(Default)]
struct Counters {
    total_lines: AtomicU64,
    total_bytes: AtomicU64,
    active_streams: AtomicU64,
    finished_streams: AtomicU64,
}

impl std::fmt::Debug for LogRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRelay")
            .field("outputs_count", &self.outputs.read().len())
            .field("max_line_bytes", &self.max_line_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for LogRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRelay {
    /// Relay into the host's `tracing` log.
    pub fn new() -> Self {
        Self::with_outputs(vec![Box::new(TracingOutputWriter)])
    }

    pub fn with_outputs(outputs: Vec<Box<dyn OutputWriter>>) -> Self {
        Self {
            outputs: Arc::new(RwLock::new(outputs)),
            counters: Arc::new(Counters::default()),
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    pub fn add_output(&self, output: Box<dyn OutputWriter>) {
        self.outputs.write().push(output);
    }

    /// Start relaying a child's stdout and stderr.
    ///
    /// Returns the reader tasks; each finishes when its stream reaches EOF.
    pub fn attach(
        &self,
        group: &str,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> Vec<JoinHandle<u64>> {
        let mut tasks = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            tasks.push(self.attach_stream(group, stdout, StreamType::Stdout));
        }
        if let Some(stderr) = stderr {
            tasks.push(self.attach_stream(group, stderr, StreamType::Stderr));
        }
        tasks
    }

    /// Start relaying any byte stream. The task yields the number of lines read.
    pub fn attach_stream(
        &self,
        group: &str,
        stream: impl AsyncRead + Unpin + Send + 'static,
        stream_type: StreamType,
    ) -> JoinHandle<u64> {
        let group = group.to_string();
        let outputs = Arc::clone(&self.outputs);
        let counters = Arc::clone(&self.counters);
        let max_line_bytes = self.max_line_bytes;

        counters.active_streams.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let lines =
                stream_reader(stream, stream_type, &group, max_line_bytes, &outputs, &counters)
                    .await;
            counters.active_streams.fetch_sub(1, Ordering::SeqCst);
            counters.finished_streams.fetch_add(1, Ordering::SeqCst);
            lines
        })
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            total_lines: self.counters.total_lines.load(Ordering::SeqCst),
            total_bytes: self.counters.total_bytes.load(Ordering::SeqCst),
            active_streams: self.counters.active_streams.load(Ordering::SeqCst),
            finished_streams: self.counters.finished_streams.load(Ordering::SeqCst),
        }
    }

    /// Flush and close every output writer.
    pub fn close(&self) {
        let mut outputs = self.outputs.write();
        for output in outputs.iter_mut() {
            if let Err(e) = output.close() {
                warn!(error = %e, "Error closing output writer");
            }
        }
    }
}

async fn stream_reader(
    stream: impl AsyncRead + Unpin,
    stream_type: StreamType,
    group: &str,
    max_line_bytes: usize,
    outputs: &RwLock<Vec<Box<dyn OutputWriter>>>,
    counters: &Counters,
) -> u64 {
    debug!(group = %group, stream = %stream_type, "Stream relay started");
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut line_num = 0u64;

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(max_line_bytes as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => {
                debug!(group = %group, stream = %stream_type, "Stream ended");
                break;
            }
            Ok(n) => {
                line_num += 1;
                counters.total_lines.fetch_add(1, Ordering::SeqCst);
                counters.total_bytes.fetch_add(n as u64, Ordering::SeqCst);

                let entry = LogEntry {
                    timestamp: Utc::now(),
                    group: group.to_string(),
                    stream: stream_type,
                    line: decode_line(&buf),
                    line_num,
                };

                let mut outputs = outputs.write();
                for output in outputs.iter_mut() {
                    if let Err(e) = output.write(&entry) {
                        warn!(group = %group, error = %e, "Failed to write relayed line");
                    }
                }
            }
            Err(e) => {
                warn!(group = %group, stream = %stream_type, error = %e, "Error reading from stream");
                break;
            }
        }
    }

    debug!(group = %group, stream = %stream_type, lines = line_num, "Stream relay finished");
    line_num
}

/// Lossy UTF-8 with the trailing `\n` or `\r\n` removed.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CircularBufferOutputWriter;
    use tokio::io::AsyncWriteExt;

    fn relay_with_buffer() -> (LogRelay, CircularBufferOutputWriter) {
        let buffer = CircularBufferOutputWriter::new(100);
        let relay = LogRelay::with_outputs(vec![Box::new(buffer.clone())]);
        (relay, buffer)
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"abc\n"), "abc");
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"a\xffb\n"), "a\u{fffd}b");
    }

    #[tokio::test]
    async fn test_relays_lines_with_group_and_stream() {
        let (relay, buffer) = relay_with_buffer();

        let stdout = relay.attach_stream("ocr", &b"first\nsecond\r\nlast"[..], StreamType::Stdout);
        let stderr = relay.attach_stream("ocr", &b"oops\n"[..], StreamType::Stderr);

        assert_eq!(stdout.await.unwrap(), 3);
        assert_eq!(stderr.await.unwrap(), 1);

        assert_eq!(buffer.lines(StreamType::Stdout), vec!["first", "second", "last"]);
        assert_eq!(buffer.lines(StreamType::Stderr), vec!["oops"]);
        assert!(buffer.get_logs().iter().all(|e| e.group == "ocr"));

        let stats = relay.stats();
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.active_streams, 0);
        assert_eq!(stats.finished_streams, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_draining() {
        let (relay, buffer) = relay_with_buffer();

        let task = relay.attach_stream("ocr", &b"\xc3\x28\nafter\n"[..], StreamType::Stdout);
        assert_eq!(task.await.unwrap(), 2);
        assert_eq!(buffer.lines(StreamType::Stdout)[1], "after");
    }

    #[tokio::test]
    async fn test_streams_are_independent() {
        let (relay, buffer) = relay_with_buffer();
        let (mut stdout_tx, stdout_rx) = tokio::io::duplex(64);
        let (stderr_tx, stderr_rx) = tokio::io::duplex(64);

        let out = relay.attach_stream("ocr", stdout_rx, StreamType::Stdout);
        let err = relay.attach_stream("ocr", stderr_rx, StreamType::Stderr);

        // stderr stays open while stdout completes
        stdout_tx.write_all(b"progress\n").await.unwrap();
        drop(stdout_tx);
        assert_eq!(out.await.unwrap(), 1);
        assert_eq!(buffer.lines(StreamType::Stdout), vec!["progress"]);
        assert_eq!(relay.stats().active_streams, 1);

        drop(stderr_tx);
        assert_eq!(err.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unterminated_line_is_split_at_cap() {
        let buffer = CircularBufferOutputWriter::new(100);
        let relay =
            LogRelay::with_outputs(vec![Box::new(buffer.clone())]).with_max_line_bytes(10);

        let input = b"abcdefghijklmnopqrstuvwxy";
        let task = relay.attach_stream("ocr", &input[..], StreamType::Stdout);

        assert_eq!(task.await.unwrap(), 3);
        assert_eq!(
            buffer.lines(StreamType::Stdout),
            vec!["abcdefghij", "klmnopqrst", "uvwxy"]
        );
        assert_eq!(relay.stats().total_bytes, 25);
    }

    #[tokio::test]
    async fn test_short_lines_unaffected_by_cap() {
        let buffer = CircularBufferOutputWriter::new(100);
        let relay =
            LogRelay::with_outputs(vec![Box::new(buffer.clone())]).with_max_line_bytes(10);

        let task = relay.attach_stream("ocr", &b"short
ok
"[..], StreamType::Stdout);

        assert_eq!(task.await.unwrap(), 2);
        assert_eq!(buffer.lines(StreamType::Stdout), vec!["short", "ok"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_attach_child_process() {
        let (relay, buffer) = relay_with_buffer();
        let mut child = tokio::process::Command::new("/bin/sh")
            .args(["-c", "echo out; echo err 1>&2"])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let tasks = relay.attach("ocr", child.stdout.take(), child.stderr.take());
        assert_eq!(tasks.len(), 2);
        child.wait().await.unwrap();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(buffer.lines(StreamType::Stdout), vec!["out"]);
        assert_eq!(buffer.lines(StreamType::Stderr), vec!["err"]);
    }
}
