//! Process pool serving buffered output to a polling host.
//!
//! Every submitted command gets its own collector task. Collectors push into
//! one shared channel, and the host pulls whatever has accumulated with
//! [`ProcessPool::drain_outputs`] without ever waiting on a process.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::collector::{CollectorState, OutputCollector};
use super::options::PoolOptions;
use super::record::{OutputRecord, ProcessId};
use crate::error::{PoolError, Result};

/// Registry entry for a collector the pool has not reclaimed yet.
#[derive(Debug)]
struct TrackedCollector {
    pid: ProcessId,
    handle: JoinHandle<()>,

    /// Flipped to `Finished` right after the terminal record is sent.
    state_rx: watch::Receiver<CollectorState>,
}

impl TrackedCollector {
    fn state(&self) -> CollectorState {
        // A task that ended without flipping the state panicked; it will
        // never send anything else either.
        if *self.state_rx.borrow() == CollectorState::Finished || self.handle.is_finished() {
            CollectorState::Finished
        } else {
            CollectorState::Running
        }
    }
}

/// A pool of running processes with a non-blocking poll interface.
///
/// `submit`, `any_running` and `drain_outputs` return promptly; only
/// `shutdown` waits. The pool is `Send + Sync` and can be shared behind an
/// `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use procpool::process::{PoolOptions, ProcessPool};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let pool = ProcessPool::new(PoolOptions::new());
///     let pid = pool.submit("make test")?;
///
///     while pool.any_running() {
///         for record in pool.drain_outputs() {
///             println!("{record:?}");
///         }
///         tokio::time::sleep(Duration::from_millis(100)).await;
///     }
///
///     // Anything sent just before the last collector finished.
///     for record in pool.drain_outputs() {
///         println!("{record:?}");
///     }
///
///     pool.shutdown().await;
///     println!("{pid} done");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ProcessPool {
    options: PoolOptions,

    /// Collectors not yet reclaimed.
    collectors: Mutex<Vec<TrackedCollector>>,

    /// Cloned into every collector.
    output_tx: mpsc::UnboundedSender<OutputRecord>,

    output_rx: Mutex<mpsc::UnboundedReceiver<OutputRecord>>,
}

impl Default for ProcessPool {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}

impl ProcessPool {
    /// Create an empty pool that launches commands with `options`.
    pub fn new(options: PoolOptions) -> Self {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        Self {
            options,
            collectors: Mutex::new(Vec::new()),
            output_tx,
            output_rx: Mutex::new(output_rx),
        }
    }

    /// The options processes are launched with.
    pub const fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Spawn `command` and start collecting its output.
    ///
    /// Returns the process id immediately. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if the process could not be created. No
    /// record is ever produced for a failed submit.
    pub fn submit(&self, command: &str) -> Result<ProcessId> {
        let child = self
            .options
            .command(command)
            .spawn()
            .map_err(|source| PoolError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // `id()` is only `None` once the child has been reaped, which cannot
        // have happened yet right after `spawn`.
        let pid = child.id().ok_or_else(|| PoolError::MissingPid {
            command: command.to_string(),
        })?;

        info!(pid, command, "Spawned process");

        let collector = OutputCollector::new(pid, child, self.output_tx.clone());
        let (state_tx, state_rx) = watch::channel(CollectorState::Running);
        let handle = tokio::spawn(async move {
            collector.run().await;
            state_tx.send_replace(CollectorState::Finished);
        });

        self.lock_collectors().push(TrackedCollector {
            pid,
            handle,
            state_rx,
        });

        Ok(pid)
    }

    /// Whether any collector has yet to emit its terminal record.
    ///
    /// Finished collectors are reclaimed first, so a collector that is done
    /// never counts as running.
    pub fn any_running(&self) -> bool {
        let mut collectors = self.lock_collectors();
        reclaim(&mut collectors);
        !collectors.is_empty()
    }

    /// Drop bookkeeping for finished collectors. Returns how many were removed.
    pub fn reclaim_finished(&self) -> usize {
        reclaim(&mut self.lock_collectors())
    }

    /// Pids whose collectors are still running.
    pub fn running(&self) -> Vec<ProcessId> {
        let mut collectors = self.lock_collectors();
        reclaim(&mut collectors);
        collectors.iter().map(|c| c.pid).collect()
    }

    /// Take every record buffered so far, oldest first.
    ///
    /// Never waits for more records to arrive; returns an empty batch when
    /// nothing is pending.
    pub fn drain_outputs(&self) -> Vec<OutputRecord> {
        let mut output_rx = self
            .output_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut records = Vec::new();
        while let Ok(record) = output_rx.try_recv() {
            records.push(record);
        }
        records
    }

    /// Wait for in-flight collectors to finish.
    ///
    /// Each collector gets up to `shutdown_timeout`. Processes are never
    /// killed; a collector that outlives its wait keeps running. Collectors
    /// stay registered while they are waited on, so `any_running` keeps
    /// answering truthfully from other tasks. Records produced meanwhile
    /// remain available to [`drain_outputs`](Self::drain_outputs).
    pub async fn shutdown(&self) {
        let pending: Vec<_> = self
            .lock_collectors()
            .iter()
            .filter(|c| c.state() == CollectorState::Running)
            .map(|c| (c.pid, c.state_rx.clone()))
            .collect();

        for (pid, mut state_rx) in pending {
            debug!(pid, "Waiting for collector");
            let finished = state_rx.wait_for(|state| *state == CollectorState::Finished);

            match timeout(self.options.shutdown_timeout, finished).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => warn!(pid, "Collector task ended without finishing"),
                Err(_) => warn!(
                    pid,
                    timeout = ?self.options.shutdown_timeout,
                    "Gave up waiting for collector"
                ),
            }
        }

        self.reclaim_finished();
    }

    fn lock_collectors(&self) -> MutexGuard<'_, Vec<TrackedCollector>> {
        self.collectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn reclaim(collectors: &mut Vec<TrackedCollector>) -> usize {
    let before = collectors.len();
    collectors.retain(|c| c.state() == CollectorState::Running);
    let removed = before - collectors.len();
    if removed > 0 {
        debug!(removed, "Reclaimed finished collectors");
    }
    removed
}
