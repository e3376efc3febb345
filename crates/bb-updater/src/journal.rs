//! Durable, append-only log of update attempts.
//!
//! One line per state transition and per error. Lines are flushed and synced
//! as they are written so a killed executor still leaves a readable record.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::attempt::{Transition, UpdateAttempt};
use crate::error::{Result, UpdateError};

/// File name of the attempt log inside the log directory.
pub const JOURNAL_FILE_NAME: &str = "update-executor.log";

/// Gets the default log directory (per-user local data dir).
pub fn default_log_dir() -> PathBuf {
    crate::project_dirs()
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("bazaar-buddy-logs"))
}

/// Gets the default attempt log path.
pub fn default_journal_path() -> PathBuf {
    default_log_dir().join(JOURNAL_FILE_NAME)
}

/// Append-only attempt log.
#[derive(Debug)]
pub struct AttemptLog {
    path: PathBuf,
    file: Option<File>,
}

impl AttemptLog {
    /// Opens (creating if needed) the attempt log at `path` in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UpdateError::Io(format!("Failed to create log directory {}: {e}", parent.display()))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| UpdateError::Io(format!("Failed to open log {}: {e}", path.display())))?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// A log that only forwards to `tracing`. Used when the file cannot be opened.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            file: None,
        }
    }

    /// Path of the log file (empty when disabled).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the header line that opens an attempt.
    pub fn begin(&mut self, attempt: &UpdateAttempt, package: &str, executable: &Path) {
        self.write_line(&format!(
            "=== attempt={} started={} package={} executable={} ===",
            attempt.id(),
            attempt.started_at().format("%Y-%m-%d %H:%M:%S"),
            package,
            executable.display()
        ));
    }

    /// Writes one transition of `attempt`.
    pub fn transition(&mut self, attempt: &UpdateAttempt, transition: &Transition) {
        let line = format!(
            "attempt={} step={} state={} elapsed_ms={} {}",
            attempt.id(),
            attempt.step(),
            transition.state,
            transition.elapsed_ms,
            transition.detail
        );

        if transition.state.is_failure() {
            tracing::error!(state = %transition.state, "{}", transition.detail);
        } else {
            tracing::info!(state = %transition.state, "{}", transition.detail);
        }
        self.write_line(&line);
    }

    /// Writes a non-transition note (recovery actions, skipped steps).
    pub fn note(&mut self, attempt: &UpdateAttempt, message: &str) {
        tracing::info!("{message}");
        self.write_line(&format!("attempt={} note {message}", attempt.id()));
    }

    fn write_line(&mut self, message: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("[{timestamp}] {message}\n");

        // A failing log write must never abort the update itself.
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.sync_data()) {
            tracing::warn!("Failed to write attempt log {}: {e}", self.path.display());
        }
    }
}
