//! Bazaar Buddy update executor.

use std::io::{self, IsTerminal};

use anyhow::Context;
use bb_update_executor::cli::{Cli, LogFormatArg, LogLevelArg};
use bb_update_executor::logging::{LogConfig, LogFormat, init_logging};
use bb_updater::journal::default_journal_path;
use bb_updater::{
    AttemptLog, Executor, ExecutorConfig, ExitStatus, Outcome, UpdateError, UpdateReport,
    UpdateRequest,
};
use clap::{ColorChoice, Parser};
use tracing::level_filters::LevelFilter;

/// Printed after failures that left the installation untouched and may pass on a later run.
const RETRY_HINT: &str = "Nothing was changed. Running the update again later may succeed.";

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(i32::from(ExitStatus::Internal.code()));
    }

    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let mut request = UpdateRequest::new(cli.package.clone(), cli.executable.clone());
    if let Some(digest) = &cli.sha256 {
        request = request.with_sha256(digest.clone());
    }
    let mut journal = open_journal(cli);

    let report = match load_config(cli) {
        Ok(mut config) => {
            cli.apply_overrides(&mut config);
            Executor::new(config, request, journal).run()
        }
        Err(error) => {
            tracing::error!("{error:#}");
            UpdateReport::rejected(&request, &mut journal, UpdateError::Config(format!("{error:#}")))
        }
    };

    match &report.result {
        Ok(Outcome::Installed) => tracing::info!("Update installed"),
        Ok(Outcome::AlreadyCurrent) => tracing::info!("Already up to date"),
        Err(error) => {
            eprintln!("error: {error}\n{}", error.user_message());
            if error.is_retryable() {
                eprintln!("{RETRY_HINT}");
            }
        }
    }
    report.exit_code()
}

fn load_config(cli: &Cli) -> anyhow::Result<ExecutorConfig> {
    match &cli.config {
        Some(path) => ExecutorConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => ExecutorConfig::load_default().context("failed to load executor configuration"),
    }
}

/// Opens the attempt log, falling back to tracing-only when the file is unusable.
fn open_journal(cli: &Cli) -> AttemptLog {
    let path = cli.attempt_log.clone().unwrap_or_else(default_journal_path);
    match AttemptLog::open(&path) {
        Ok(journal) => journal,
        Err(error) => {
            tracing::warn!("Attempt log unavailable, continuing without it: {error}");
            AttemptLog::disabled()
        }
    }
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
