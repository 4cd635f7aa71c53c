//! CLI argument definitions.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use procpool::process::{PoolOptions, DEFAULT_SHUTDOWN_TIMEOUT};

/// procpool - Run shell commands concurrently and stream their output
#[derive(Parser, Debug)]
#[command(name = "procpool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print each record as a JSON line
    #[arg(long)]
    pub json: bool,

    // === Logging Options ===
    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit log lines as JSON
    #[arg(long)]
    pub log_json: bool,

    // === Pool Options ===
    /// How often to poll for output, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// Seconds to wait for each process during shutdown
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT.as_secs())]
    pub shutdown_timeout_secs: u64,

    /// Shell that interprets the commands
    #[arg(long, env = "PROCPOOL_SHELL")]
    pub shell: Option<String>,

    /// Flag passed to the shell before each command (e.g. -c)
    #[arg(long, allow_hyphen_values = true)]
    pub shell_arg: Option<String>,

    /// Directory to run the commands in
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Set an environment variable for every command (KEY=VALUE)
    #[arg(short = 'e', long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Commands to run, each passed to the shell as-is
    #[arg(required = true)]
    pub commands: Vec<String>,
}

impl Cli {
    /// Pool options assembled from the flags.
    pub fn pool_options(&self) -> PoolOptions {
        let mut options = PoolOptions::new()
            .envs(self.env.iter().cloned())
            .shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs));

        if let Some(ref shell) = self.shell {
            options = options.shell(shell);
        }
        if let Some(ref arg) = self.shell_arg {
            options = options.shell_arg(arg);
        }
        if let Some(ref dir) = self.dir {
            options = options.working_dir(dir);
        }

        options
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;

    if key.is_empty() {
        return Err(format!("empty variable name in `{s}`"));
    }

    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_and_options() {
        let cli = Cli::try_parse_from([
            "procpool",
            "--json",
            "--shell",
            "bash",
            "--shell-arg",
            "-lc",
            "-e",
            "FOO=bar=baz",
            "--dir",
            "/tmp",
            "make",
            "cargo test",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.commands, vec!["make", "cargo test"]);

        let options = cli.pool_options();
        assert_eq!(options.shell, "bash");
        assert_eq!(options.shell_arg, "-lc");
        assert_eq!(options.env.get("FOO").map(String::as_str), Some("bar=baz"));
        assert_eq!(options.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(options.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn test_requires_a_command() {
        assert!(Cli::try_parse_from(["procpool"]).is_err());
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("A=1"),
            Ok(("A".to_string(), "1".to_string()))
        );
        assert_eq!(parse_env_pair("A="), Ok(("A".to_string(), String::new())));
        assert!(parse_env_pair("A").is_err());
        assert!(parse_env_pair("=1").is_err());
    }
}
