//! The installation an executor run operates on.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, UpdateError};

/// The installed executable and its sibling files.
///
/// ```text
/// <install-dir>/<app>               installed executable
/// <install-dir>/<app>.<suffix>      backup slot (default suffix "old")
/// <install-dir>/<app>.partial       copy in progress (copy strategy only)
/// <install-dir>/<app>.update-lock   held while an executor runs
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationTarget {
    install_dir: PathBuf,
    executable: PathBuf,
    backup: PathBuf,
    partial: PathBuf,
    lock: PathBuf,
}

/// What [`InstallationTarget::recover`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Recovery {
    /// The executable was missing and the backup was moved back.
    pub restored_backup: bool,
    /// A stale backup next to a present executable was removed.
    pub removed_stale_backup: bool,
    /// A leftover partial copy was removed.
    pub removed_partial: bool,
}

impl Recovery {
    /// Whether anything was changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.restored_backup || self.removed_stale_backup || self.removed_partial)
    }
}

impl InstallationTarget {
    /// Derives the target from the installed executable's path.
    ///
    /// The executable itself may be missing (fresh install), its directory
    /// may not.
    pub fn from_executable(path: &Path, backup_suffix: &str) -> Result<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| UpdateError::InvalidTarget(format!("{} has no file name", path.display())))?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Err(UpdateError::TargetDirMissing(parent));
        }
        let install_dir = fs::canonicalize(&parent).map_err(|_| UpdateError::TargetDirMissing(parent))?;

        let executable = install_dir.join(file_name);
        if executable.is_dir() {
            return Err(UpdateError::InvalidTarget(format!(
                "{} is a directory",
                executable.display()
            )));
        }

        Ok(Self {
            backup: sibling(&install_dir, file_name, backup_suffix),
            partial: sibling(&install_dir, file_name, "partial"),
            lock: sibling(&install_dir, file_name, "update-lock"),
            executable,
            install_dir,
        })
    }

    /// Directory containing the executable.
    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Path of the installed executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Backup slot.
    #[must_use]
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Scratch path used while copying into the install directory.
    #[must_use]
    pub fn partial(&self) -> &Path {
        &self.partial
    }

    /// Lock file path.
    #[must_use]
    pub fn lock_file(&self) -> &Path {
        &self.lock
    }

    /// File name of the executable (used to find it inside archives).
    #[must_use]
    pub fn executable_name(&self) -> OsString {
        self.executable
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_default()
    }

    /// Whether the executable currently exists.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.executable.is_file()
    }

    /// Reconciles files left behind by an interrupted run.
    pub fn recover(&self) -> Result<Recovery> {
        let mut recovery = Recovery::default();

        if remove_if_present(&self.partial)? {
            recovery.removed_partial = true;
        }

        if self.backup.is_file() {
            if self.executable.exists() {
                fs::remove_file(&self.backup).map_err(|e| {
                    UpdateError::Io(format!(
                        "Failed to remove stale backup {}: {e}",
                        self.backup.display()
                    ))
                })?;
                recovery.removed_stale_backup = true;
            } else {
                fs::rename(&self.backup, &self.executable).map_err(|e| {
                    UpdateError::Io(format!(
                        "Failed to restore backup {}: {e}",
                        self.backup.display()
                    ))
                })?;
                recovery.restored_backup = true;
            }
        }

        Ok(recovery)
    }
}

fn sibling(dir: &Path, file_name: &std::ffi::OsStr, suffix: &str) -> PathBuf {
    let mut name = file_name.to_os_string();
    name.push(".");
    name.push(suffix);
    dir.join(name)
}

/// Removes a file, treating "already gone" as success. Returns whether it existed.
pub(crate) fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(UpdateError::Io(format!(
            "Failed to remove {}: {e}",
            path.display()
        ))),
    }
}
