//! Remove what the run left behind once the new build is running.

use std::fs;
use std::io;
use std::thread;
use std::time::Duration;

use crate::target::InstallationTarget;

/// What cleanup managed to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    /// The backup slot was removed.
    pub removed_backup: bool,
    /// The staging directory was removed.
    pub removed_staging: bool,
}

/// Waits `delay`, then removes the backup and the staging directory.
///
/// Failures are logged and otherwise ignored; the next run's recovery
/// removes a stale backup anyway.
pub fn cleanup(
    target: &InstallationTarget,
    staging: Option<tempfile::TempDir>,
    delay: Duration,
) -> CleanupReport {
    if !delay.is_zero() {
        tracing::debug!("Waiting {delay:?} before cleanup");
        thread::sleep(delay);
    }

    let mut report = CleanupReport::default();

    match fs::remove_file(target.backup()) {
        Ok(()) => report.removed_backup = true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove backup {}: {e}", target.backup().display()),
    }

    if let Some(staging) = staging {
        let path = staging.path().to_path_buf();
        match staging.close() {
            Ok(()) => report.removed_staging = true,
            Err(e) => tracing::warn!("Failed to remove staging directory {}: {e}", path.display()),
        }
    }

    report
}
