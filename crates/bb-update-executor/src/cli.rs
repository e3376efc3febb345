//! CLI argument definitions for the update executor.

use std::path::PathBuf;

use bb_updater::ExecutorConfig;
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Debug, Parser)]
#[command(
    name = "bb-update-executor",
    version,
    about = "Install a Bazaar Buddy update and restart the application",
    long_about = "Downloads the package, waits for the running application to exit, \
                  replaces its executable (keeping a backup until the new build is \
                  running), relaunches it, and cleans up.\n\n\
                  Normally started by the application itself."
)]
pub struct Cli {
    /// Package to install: http(s) URL, file:// URL, or local path.
    #[arg(value_name = "PACKAGE")]
    pub package: String,

    /// Path of the installed executable to replace.
    #[arg(value_name = "EXECUTABLE")]
    pub executable: PathBuf,

    /// Expected SHA256 of the package (`sha256:<hex>` or bare hex).
    #[arg(long = "sha256", value_name = "DIGEST")]
    pub sha256: Option<String>,

    /// Executor configuration file (TOML).
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Attempt log to append to (default: per-user log directory).
    #[arg(long = "attempt-log", value_name = "PATH")]
    pub attempt_log: Option<PathBuf>,

    /// Number of unlock probes before giving up.
    #[arg(long = "probe-attempts", value_name = "N")]
    pub probe_attempts: Option<u32>,

    /// Milliseconds between unlock probes.
    #[arg(long = "probe-interval-ms", value_name = "MS")]
    pub probe_interval_ms: Option<u64>,

    /// Upper bound for the whole download, in seconds.
    #[arg(long = "download-timeout-secs", value_name = "SECS")]
    pub download_timeout_secs: Option<u64>,

    /// Delay before the backup and staging files are removed.
    #[arg(long = "cleanup-delay-ms", value_name = "MS")]
    pub cleanup_delay_ms: Option<u64>,

    /// Install without starting the application afterwards.
    #[arg(long = "no-relaunch")]
    pub no_relaunch: bool,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(long = "log-format", value_enum, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Applies command-line overrides on top of file configuration.
    pub fn apply_overrides(&self, config: &mut ExecutorConfig) {
        if let Some(attempts) = self.probe_attempts {
            config.probe_attempts = attempts;
        }
        if let Some(interval) = self.probe_interval_ms {
            config.probe_interval_ms = interval;
        }
        if let Some(timeout) = self.download_timeout_secs {
            config.download_timeout_secs = timeout;
        }
        if let Some(delay) = self.cleanup_delay_ms {
            config.cleanup_delay_ms = delay;
        }
        if self.no_relaunch {
            config.relaunch = false;
        }
    }
}

/// CLI log level choices.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
