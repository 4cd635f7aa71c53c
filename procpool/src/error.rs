//! Errors surfaced synchronously by the process pool.

use thiserror::Error;

/// Failures reported directly to the caller of [`ProcessPool::submit`].
///
/// Everything that goes wrong after a process has started (read errors,
/// reap errors) degrades into the normal record stream instead.
///
/// [`ProcessPool::submit`]: crate::process::ProcessPool::submit
#[derive(Debug, Error)]
pub enum PoolError {
    /// The OS refused to create the process.
    #[error("Failed to spawn process for command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The child was created but has no pid to report.
    #[error("Spawned process for command `{command}` has no pid")]
    MissingPid { command: String },
}

pub type Result<T> = std::result::Result<T, PoolError>;
