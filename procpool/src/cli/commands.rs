//! CLI command execution.
//!
//! Acts as a host for the pool: submit everything, then poll on an interval
//! the way an editor would, printing records as they arrive.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use procpool::logging;
use procpool::process::{OutputRecord, ProcessOutput, ProcessPool};
use tracing::error;

use super::args::Cli;

/// `tokio::time::interval` panics on a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Render a record for terminal output.
fn format_record(record: &OutputRecord) -> String {
    let pid = record.pid;
    match &record.output {
        ProcessOutput::Stdout(line) => format!("[{pid}] out| {}", trim_newline(line)),
        ProcessOutput::Stderr(line) => format!("[{pid}] err| {}", trim_newline(line)),
        ProcessOutput::Exit(Some(code)) => format!("[{pid}] exit {code}"),
        ProcessOutput::Exit(None) => format!("[{pid}] exit ?"),
    }
}

fn trim_newline(line: &str) -> &str {
    line.strip_suffix('\n')
        .map_or(line, |l| l.strip_suffix('\r').unwrap_or(l))
}

/// Prints records and remembers whether any process failed.
struct Reporter {
    json: bool,
    failed: bool,
}

impl Reporter {
    const fn new(json: bool) -> Self {
        Self {
            json,
            failed: false,
        }
    }

    fn report(&mut self, out: &mut impl Write, record: &OutputRecord) -> Result<()> {
        if record.is_terminal() && record.exit_code() != Some(0) {
            self.failed = true;
        }

        if self.json {
            let line = serde_json::to_string(record).context("Failed to serialize record")?;
            writeln!(out, "{line}")?;
        } else {
            writeln!(out, "{}", format_record(record))?;
        }
        Ok(())
    }
}

/// Submit every command, reporting spawn failures without stopping.
/// Returns how many commands started.
fn submit_all(pool: &ProcessPool, commands: &[String], reporter: &mut Reporter) -> usize {
    let mut submitted = 0;

    for command in commands {
        match pool.submit(command) {
            Ok(_) => submitted += 1,
            Err(e) => {
                error!(command = command.as_str(), error = %e, "Submit failed");
                eprintln!("Error: {e}");
                reporter.failed = true;
            }
        }
    }

    submitted
}

/// Execute the CLI: run every command and stream output until all finish.
pub async fn execute(cli: Cli) -> Result<ExitCode> {
    logging::init(cli.verbose, cli.log_json).context("Failed to initialize logging")?;

    let pool = ProcessPool::new(cli.pool_options());
    let mut reporter = Reporter::new(cli.json);

    if submit_all(&pool, &cli.commands, &mut reporter) == 0 {
        anyhow::bail!("None of the commands could be started");
    }

    let mut interval = tokio::time::interval(cli.poll_interval().max(MIN_POLL_INTERVAL));
    let stdout = io::stdout();

    loop {
        interval.tick().await;

        // Checked before draining: once nothing is running, every terminal
        // record is already queued and this drain is the last one needed.
        let running = pool.any_running();

        let mut out = stdout.lock();
        for record in pool.drain_outputs() {
            reporter.report(&mut out, &record)?;
        }
        out.flush()?;

        if !running {
            break;
        }
    }

    pool.shutdown().await;

    Ok(if reporter.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
