// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::engine::CleanupPolicy;

/// Command-line arguments for `taskdock`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdock",
    version,
    about = "Run declaratively-defined tasks in ephemeral Docker containers.",
    long_about = None
)]
pub struct CliArgs {
    /// Name of the task to run, as declared under `[task.<name>]`.
    #[arg(value_name = "TASK")]
    pub task: String,

    /// Path to the config file (TOML).
    ///
    /// Default: `Taskdock.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Taskdock.toml")]
    pub config: String,

    /// Print the resolved execution plan without talking to the daemon.
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum number of steps executed in parallel.
    ///
    /// Defaults to the number of available CPUs (at least 2).
    #[arg(long, value_name = "N")]
    pub max_parallelism: Option<usize>,

    /// Leave containers and the task network behind when the task fails.
    #[arg(long)]
    pub no_cleanup_after_failure: bool,

    /// Leave containers and the task network behind when the task succeeds.
    #[arg(long)]
    pub no_cleanup_after_success: bool,

    /// Never clean up, regardless of the task outcome.
    #[arg(long)]
    pub no_cleanup: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDOCK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl CliArgs {
    /// Translate the cleanup flags into a single [`CleanupPolicy`].
    pub fn cleanup_policy(&self) -> CleanupPolicy {
        match (
            self.no_cleanup,
            self.no_cleanup_after_failure,
            self.no_cleanup_after_success,
        ) {
            (true, _, _) | (_, true, true) => CleanupPolicy::NeverCleanup,
            (_, true, false) => CleanupPolicy::DontCleanupOnFailure,
            (_, false, true) => CleanupPolicy::DontCleanupOnSuccess,
            (_, false, false) => CleanupPolicy::CleanupAlways,
        }
    }

    /// Effective worker-pool size for the dispatcher.
    pub fn effective_parallelism(&self) -> usize {
        self.max_parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
                .max(2)
        })
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
