//! Asynchronous process execution with polled, line-framed output.
//!
//! A [`ProcessPool`] launches shell commands, attaches an
//! [`OutputCollector`] task to each one, and buffers every line they write
//! until the host drains it.

mod collector;
mod options;
mod pool;
mod record;

pub use collector::{CollectorState, OutputCollector};
pub use options::{PoolOptions, DEFAULT_SHUTDOWN_TIMEOUT};
pub use pool::ProcessPool;
pub use record::{OutputRecord, ProcessId, ProcessOutput};
