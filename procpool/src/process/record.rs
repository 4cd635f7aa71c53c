//! Records pushed by collectors and handed out by the pool.

use serde::{Deserialize, Serialize};

/// A unique identifier for a pooled process (its OS pid).
pub type ProcessId = u32;

/// One unit of output from a spawned process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutput {
    /// Line from stdout, terminator included. Decoded lossily: invalid
    /// UTF-8 comes through as U+FFFD.
    Stdout(String),
    /// Line from stderr, terminator included. Decoded like `Stdout`.
    Stderr(String),
    /// Process has exited. `None` when the exit status could not be read.
    Exit(Option<i32>),
}

/// Output tagged with the process it came from.
///
/// Serializes flat, e.g. `{"pid":42,"stdout":"hello\n"}` or
/// `{"pid":42,"exit":0}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub pid: ProcessId,
    #[serde(flatten)]
    pub output: ProcessOutput,
}

impl OutputRecord {
    pub const fn new(pid: ProcessId, output: ProcessOutput) -> Self {
        Self { pid, output }
    }

    /// Whether this is the last record the process will produce.
    pub const fn is_terminal(&self) -> bool {
        matches!(self.output, ProcessOutput::Exit(_))
    }

    /// Exit code carried by the terminal record.
    pub const fn exit_code(&self) -> Option<i32> {
        match self.output {
            ProcessOutput::Exit(code) => code,
            _ => None,
        }
    }

    pub fn stdout_line(&self) -> Option<&str> {
        match &self.output {
            ProcessOutput::Stdout(line) => Some(line),
            _ => None,
        }
    }

    pub fn stderr_line(&self) -> Option<&str> {
        match &self.output {
            ProcessOutput::Stderr(line) => Some(line),
            _ => None,
        }
    }
}
