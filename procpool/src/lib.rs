//! procpool - run shell commands in the background and poll their output.
//!
//! The library half is the [`process`] module: a pool that spawns commands,
//! collects stdout/stderr line by line on background tasks, and hands the
//! accumulated records to a host that polls it (an editor, or the bundled
//! CLI).

pub mod error;
pub mod logging;
pub mod process;

pub use error::PoolError;
