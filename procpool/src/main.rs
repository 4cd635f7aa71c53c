//! procpool - Run shell commands concurrently and stream their output.
//!
//! Submits each command to a process pool, then polls the pool on an
//! interval and prints stdout/stderr lines and exit codes as they arrive.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    execute(cli).await
}
