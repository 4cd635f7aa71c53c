//! Launch configuration shared by every process in a pool.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(windows)]
const DEFAULT_SHELL: (&str, &str) = ("cmd", "/C");
#[cfg(not(windows))]
const DEFAULT_SHELL: (&str, &str) = ("sh", "-c");

/// How long `shutdown` waits for each collector before giving up on it.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1000);

/// Configuration options for a [`ProcessPool`](super::ProcessPool).
///
/// Commands are opaque strings handed to `shell` as `shell shell_arg command`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// The shell program that interprets command strings.
    pub shell: String,

    /// Flag telling the shell to run the next argument as a command.
    pub shell_arg: String,

    /// Working directory for spawned processes.
    pub working_dir: Option<PathBuf>,

    /// Environment variables to set (merged with current env).
    pub env: HashMap<String, String>,

    /// Environment variables to remove.
    pub env_remove: Vec<String>,

    /// Whether to clear the environment before adding env vars.
    pub env_clear: bool,

    /// Per-collector wait bound used by `shutdown`.
    pub shutdown_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolOptions {
    /// Options using the platform shell and inheriting the environment.
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.0.to_string(),
            shell_arg: DEFAULT_SHELL.1.to_string(),
            working_dir: None,
            env: HashMap::new(),
            env_remove: Vec::new(),
            env_clear: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the shell program.
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Set the flag passed to the shell before the command string.
    pub fn shell_arg(mut self, arg: impl Into<String>) -> Self {
        self.shell_arg = arg.into();
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Clear the environment before setting variables.
    pub const fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Set the per-collector shutdown wait.
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Build the command for `command`: both output pipes captured, stdin
    /// not connected.
    pub(crate) fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.shell_arg).arg(command);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        if self.env_clear {
            cmd.env_clear();
        }

        for key in &self.env_remove {
            cmd.env_remove(key);
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        cmd
    }
}
