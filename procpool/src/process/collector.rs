//! Per-process output collection.
//!
//! An [`OutputCollector`] owns one running child and its two pipes. It
//! waits on both pipes and on process exit at once, so a quiet stream never
//! holds back a busy one, and publishes every line into the pool's shared
//! channel. After the child exits it keeps reading until both pipes hit EOF,
//! so output still sitting in the OS pipe is not lost, then emits the
//! terminal record.

use std::io;
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::record::{OutputRecord, ProcessId, ProcessOutput};

/// Lifecycle of a collector as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Still reading output or waiting for the process.
    Running,
    /// Terminal record has been sent.
    Finished,
}

/// Line-framed reader over one output pipe.
///
/// Lines keep their `\n`, so a blank line comes back as `"\n"` and only a
/// zero-byte read means EOF. The buffer lives across calls, which makes
/// `next_line` safe to drop mid-read inside `select!`.
struct LineReader<R> {
    reader: Option<BufReader<R>>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(stream: Option<R>) -> Self {
        Self {
            reader: stream.map(BufReader::new),
            buf: Vec::new(),
        }
    }

    const fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Read the next line. Returns `None` once the stream is exhausted; a
    /// trailing fragment without a newline is returned before that.
    async fn next_line(&mut self, pid: ProcessId, name: &str) -> Option<String> {
        let reader = self.reader.as_mut()?;

        match reader.read_until(b'\n', &mut self.buf).await {
            Ok(_) if self.buf.ends_with(b"\n") => {}
            Ok(_) => self.reader = None,
            Err(e) => {
                warn!(pid, stream = name, error = %e, "Read failed, treating as end of stream");
                self.reader = None;
            }
        }

        if self.buf.is_empty() {
            return None;
        }

        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}

/// Drains one child's stdout and stderr into the pool's result channel.
pub struct OutputCollector {
    pid: ProcessId,
    child: Child,
    output_tx: mpsc::UnboundedSender<OutputRecord>,
}

impl OutputCollector {
    /// Bind a collector to a freshly spawned child.
    pub(crate) const fn new(
        pid: ProcessId,
        child: Child,
        output_tx: mpsc::UnboundedSender<OutputRecord>,
    ) -> Self {
        Self {
            pid,
            child,
            output_tx,
        }
    }

    /// Collect everything the process writes, then its exit code.
    ///
    /// Pushes zero or more line records followed by exactly one terminal
    /// record. Never fails: read errors end that stream, and a failed reap
    /// produces an unknown exit code.
    pub async fn run(self) {
        let Self {
            pid,
            mut child,
            output_tx,
        } = self;

        let send = |output: ProcessOutput| {
            // Receiver gone means the pool was dropped; keep going so the
            // child still gets reaped.
            let _ = output_tx.send(OutputRecord::new(pid, output));
        };

        let mut stdout = LineReader::new(child.stdout.take());
        let mut stderr = LineReader::new(child.stderr.take());
        let mut exited: Option<io::Result<ExitStatus>> = None;

        debug!(pid, "Checking output");

        while stdout.is_open() || stderr.is_open() {
            tokio::select! {
                line = stdout.next_line(pid, "stdout"), if stdout.is_open() => {
                    if let Some(line) = line {
                        send(ProcessOutput::Stdout(line));
                    }
                }
                line = stderr.next_line(pid, "stderr"), if stderr.is_open() => {
                    if let Some(line) = line {
                        send(ProcessOutput::Stderr(line));
                    }
                }
                status = child.wait(), if exited.is_none() => {
                    debug!(pid, "Process exited, draining remaining output");
                    exited = Some(status);
                }
            }
        }

        debug!(pid, "Collected all output");

        let status = match exited {
            Some(status) => status,
            None => child.wait().await,
        };

        let code = match status {
            Ok(status) => exit_code(status),
            Err(e) => {
                warn!(pid, error = %e, "Failed to wait for process to exit");
                None
            }
        };

        match code {
            Some(code) => debug!(pid, code, "Finished"),
            None => debug!(pid, "Finished with unknown status"),
        }

        send(ProcessOutput::Exit(code));
    }
}

/// Exit code, with signal deaths reported as the negated signal number.
#[cfg(unix)]
fn exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|signal| -signal))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("boom")))
        }
    }

    async fn read_all<R: AsyncRead + Unpin>(mut reader: LineReader<R>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line(0, "test").await {
            lines.push(line);
        }
        assert!(!reader.is_open());
        lines
    }

    #[tokio::test]
    async fn test_line_reader_keeps_blank_lines() {
        let lines = read_all(LineReader::new(Some(&b"a\n\nb\n"[..]))).await;
        assert_eq!(lines, vec!["a\n", "\n", "b\n"]);
    }

    #[tokio::test]
    async fn test_line_reader_returns_trailing_fragment() {
        let lines = read_all(LineReader::new(Some(&b"first\nlast"[..]))).await;
        assert_eq!(lines, vec!["first\n", "last"]);
    }

    #[tokio::test]
    async fn test_line_reader_empty_and_missing_streams() {
        assert!(read_all(LineReader::new(Some(&b""[..]))).await.is_empty());
        assert!(read_all(LineReader::<&[u8]>::new(None)).await.is_empty());
    }

    #[tokio::test]
    async fn test_line_reader_replaces_invalid_utf8() {
        let lines = read_all(LineReader::new(Some(&b"ok\xff\n"[..]))).await;
        assert_eq!(lines, vec!["ok\u{FFFD}\n"]);
    }

    #[tokio::test]
    async fn test_line_reader_error_is_eof() {
        assert!(read_all(LineReader::new(Some(Broken))).await.is_empty());
    }

    #[cfg(unix)]
    async fn collect(command: &str) -> Vec<ProcessOutput> {
        use crate::process::PoolOptions;

        let child = PoolOptions::new().command(command).spawn().unwrap();
        let pid = child.id().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        OutputCollector::new(pid, child, tx).run().await;

        let mut outputs = Vec::new();
        while let Ok(record) = rx.try_recv() {
            assert_eq!(record.pid, pid);
            outputs.push(record.output);
        }
        outputs
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_stdout_then_exit() {
        let outputs = collect("echo hello").await;
        assert_eq!(
            outputs,
            vec![
                ProcessOutput::Stdout("hello\n".into()),
                ProcessOutput::Exit(Some(0)),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_both_streams_and_exit_code() {
        let outputs = collect("echo out; echo err >&2; exit 2").await;
        assert_eq!(outputs.len(), 3);
        assert!(outputs.contains(&ProcessOutput::Stdout("out\n".into())));
        assert!(outputs.contains(&ProcessOutput::Stderr("err\n".into())));
        assert_eq!(outputs.last(), Some(&ProcessOutput::Exit(Some(2))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_no_loss_interleaved() {
        let outputs =
            collect("i=0; while [ $i -lt 200 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done")
                .await;

        let stdout: Vec<_> = outputs
            .iter()
            .filter_map(|o| match o {
                ProcessOutput::Stdout(line) => Some(line.clone()),
                _ => None,
            })
            .collect();
        let stderr_count = outputs
            .iter()
            .filter(|o| matches!(o, ProcessOutput::Stderr(_)))
            .count();

        assert_eq!(stdout.len(), 200);
        assert_eq!(stderr_count, 200);
        // Per-stream order is preserved.
        assert_eq!(stdout[0], "out0\n");
        assert_eq!(stdout[199], "out199\n");
        assert_eq!(outputs.len(), 401);
        assert_eq!(outputs.last(), Some(&ProcessOutput::Exit(Some(0))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_fragment_written_right_before_exit() {
        let outputs = collect("printf 'done'; exit 0").await;
        assert_eq!(
            outputs,
            vec![
                ProcessOutput::Stdout("done".into()),
                ProcessOutput::Exit(Some(0)),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_signal_exit() {
        let outputs = collect("kill -9 $$").await;
        assert_eq!(outputs, vec![ProcessOutput::Exit(Some(-9))]);
    }
}
