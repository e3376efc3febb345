//! Swap the staged executable into place, with rollback.
//!
//! Two strategies exist. Renaming is atomic but only works within one file
//! system. Copying goes through `<app>.partial` next to the target and is
//! renamed over it after the copy is synced and its hash checked, so the
//! target path never holds a half-written file with either strategy.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use crate::error::{Result, UpdateError};
use crate::steps::verify::sha256_file;
use crate::target::{InstallationTarget, remove_if_present};

/// One way of moving the staged executable onto the target path.
pub trait ReplaceStrategy: Send {
    /// Short name used in the attempt log.
    fn name(&self) -> &str;

    /// Moves or copies `staged` to `target.executable()`.
    fn replace(&self, staged: &Path, target: &InstallationTarget) -> io::Result<()>;
}

/// Atomic rename of the staged file over the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameReplace;

impl ReplaceStrategy for RenameReplace {
    fn name(&self) -> &str {
        "rename"
    }

    fn replace(&self, staged: &Path, target: &InstallationTarget) -> io::Result<()> {
        fs::rename(staged, target.executable())
    }
}

/// Copy to a sibling scratch file, verify, then rename into place.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyVerifyReplace;

impl ReplaceStrategy for CopyVerifyReplace {
    fn name(&self) -> &str {
        "copy-verify"
    }

    fn replace(&self, staged: &Path, target: &InstallationTarget) -> io::Result<()> {
        let partial = target.partial();
        let result = copy_and_verify(staged, partial)
            .and_then(|()| fs::rename(partial, target.executable()));
        if result.is_err() {
            let _ = fs::remove_file(partial);
        }
        result
    }
}

fn copy_and_verify(staged: &Path, partial: &Path) -> io::Result<()> {
    fs::copy(staged, partial)?;
    File::open(partial)?.sync_all()?;

    let expected = sha256_file(staged)?;
    let actual = sha256_file(partial)?;
    if expected != actual {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("copied file hash {actual} does not match staged {expected}"),
        ));
    }
    Ok(())
}

/// Picks the strategy for this platform and these two locations.
///
/// Windows always copies (staging usually lives on another volume and
/// scanners hold fresh downloads open). Elsewhere, rename is used when the
/// staged file and the install directory are on the same device.
#[must_use]
pub fn select_strategy(staged: &Path, target: &InstallationTarget) -> Box<dyn ReplaceStrategy> {
    if same_device(staged, target.install_dir()) {
        Box::new(RenameReplace)
    } else {
        Box::new(CopyVerifyReplace)
    }
}

#[cfg(unix)]
fn same_device(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_device(_a: &Path, _b: &Path) -> bool {
    false
}

/// Rolls back after `replace_err` and returns the error the run ends with.
///
/// `had_backup` tells whether the probe moved an executable to the backup
/// slot; for a fresh install a failed replace simply leaves nothing behind.
pub fn roll_back_after(
    replace_err: &io::Error,
    target: &InstallationTarget,
    had_backup: bool,
) -> UpdateError {
    tracing::error!("Replace failed: {replace_err}; rolling back");
    match rollback(target, had_backup) {
        Ok(()) => UpdateError::ReplaceFailed(replace_err.to_string()),
        Err(rollback_err) => UpdateError::RollbackFailed {
            replace: replace_err.to_string(),
            rollback: rollback_err.to_string(),
        },
    }
}

/// Puts the backup back on the target path, discarding whatever is there.
pub fn rollback(target: &InstallationTarget, had_backup: bool) -> Result<()> {
    remove_if_present(target.partial())?;
    remove_if_present(target.executable())?;

    if had_backup {
        fs::rename(target.backup(), target.executable()).map_err(|e| {
            UpdateError::Io(format!(
                "Failed to restore {} from {}: {e}",
                target.executable().display(),
                target.backup().display()
            ))
        })?;
        tracing::info!("Rollback complete: {} restored", target.executable().display());
    }
    Ok(())
}
