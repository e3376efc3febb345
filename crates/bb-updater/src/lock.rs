//! Advisory lock that keeps two executors off the same installation.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{Result, UpdateError};
use crate::target::remove_if_present;

/// Held lock file. Removed when dropped.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    /// Takes the lock at `path`.
    ///
    /// A lock file older than `stale_after` belongs to an executor that died
    /// and is taken over.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        match create_lock_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !is_stale(path, stale_after) {
                    let holder = fs::read_to_string(path).unwrap_or_default();
                    return Err(UpdateError::Locked(format!(
                        "{} held by {}",
                        path.display(),
                        holder.trim()
                    )));
                }
                tracing::warn!("Taking over stale update lock {}", path.display());
                remove_if_present(path)?;
                create_lock_file(path).map_err(|e| lock_error(path, &e))?;
            }
            Err(e) => return Err(lock_error(path, &e)),
        }

        tracing::debug!("Acquired update lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Path of the held lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release update lock {}: {e}", self.path.display());
        }
    }
}

fn create_lock_file(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(
        file,
        "pid={} since={}",
        std::process::id(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    file.sync_all()
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= stale_after)
}

fn lock_error(path: &Path, err: &io::Error) -> UpdateError {
    UpdateError::Locked(format!("cannot create {}: {err}", path.display()))
}
