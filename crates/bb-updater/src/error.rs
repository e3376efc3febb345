//! Error types for the self-update system.

use std::path::PathBuf;

use thiserror::Error;

use crate::attempt::UpdateState;

/// Errors that can occur while checking for, downloading, or installing an update.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// The package locator does not point at anything readable.
    #[error("update package not found: {0}")]
    PackageMissing(String),

    /// The package locator could not be parsed.
    #[error("invalid package locator: {0}")]
    InvalidLocator(String),

    /// The expected package digest is not a SHA256 hex string.
    #[error("invalid package digest: {0}")]
    InvalidDigest(String),

    /// The directory that should contain the installed executable does not exist.
    #[error("install directory not found: {}", .0.display())]
    TargetDirMissing(PathBuf),

    /// The installed executable path is unusable (no file name, a directory, ...).
    #[error("invalid executable path: {0}")]
    InvalidTarget(String),

    /// Another executor already holds the installation lock.
    #[error("another update is already running: {0}")]
    Locked(String),

    /// Network request failed or timed out.
    #[error("network error: {0}")]
    Network(String),

    /// The package could not be written to the staging area.
    #[error("staging error: {0}")]
    Staging(String),

    /// SHA256 checksum verification failed.
    #[error("checksum verification failed: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected SHA256 hash.
        expected: String,
        /// Actual SHA256 hash of the staged artifact.
        actual: String,
    },

    /// The staged artifact is not a usable package.
    #[error("invalid package: {0}")]
    InvalidPackage(String),

    /// Archive extraction failed.
    #[error("archive extraction error: {0}")]
    ArchiveExtraction(String),

    /// The installed executable stayed locked for the whole probe budget.
    #[error("executable still in use after {attempts} attempts: {last_error}")]
    WaitTimeout {
        /// Number of probe attempts made.
        attempts: u32,
        /// Error reported by the last probe.
        last_error: String,
    },

    /// The swap failed and the previous executable was restored.
    #[error("replace failed, previous version restored: {0}")]
    ReplaceFailed(String),

    /// The swap failed and the previous executable could not be restored.
    #[error("replace failed ({replace}) and rollback failed ({rollback})")]
    RollbackFailed {
        /// Why the replace failed.
        replace: String,
        /// Why the rollback failed.
        rollback: String,
    },

    /// The new executable is installed but could not be started.
    #[error("failed to launch updated executable: {0}")]
    Launch(String),

    /// Failed to parse a version string.
    #[error("invalid version format: {0}")]
    InvalidVersion(String),

    /// No suitable release asset found for the current platform.
    #[error("no release asset found for target: {0}")]
    NoAssetFound(String),

    /// GitHub API rate limit exceeded.
    #[error("GitHub API rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited {
        /// Seconds until rate limit resets.
        retry_after: u64,
    },

    /// The executor binary could not be found or spawned.
    #[error("could not start update executor: {0}")]
    ExecutorUnavailable(String),

    /// Failed to parse JSON response.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error outside of any specific step.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Broad category of an [`UpdateError`].
///
/// The category decides what the executor may have touched on disk and
/// which exit code the process reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad arguments or paths. Nothing was modified.
    Input,
    /// Download failed. Nothing in the install directory was modified.
    Transport,
    /// Validation failed. The staged artifact is discarded.
    Integrity,
    /// Unlock probe exhausted its budget. Nothing was modified.
    Wait,
    /// Swap failed after the backup was taken.
    Replace,
    /// Installed but not relaunched.
    Launch,
    /// Release discovery or hand-off failed (coordinator side).
    Coordinator,
    /// Anything else.
    Internal,
}

/// Process exit status of the executor, one per distinct failure cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Replaced (or already current) and relaunched.
    Success = 0,
    /// Logging or configuration setup failed.
    Internal = 1,
    /// Bad command line (clap reports this itself).
    Usage = 2,
    /// Package missing or locator invalid.
    PackageMissing = 3,
    /// Install directory missing or executable path invalid.
    TargetDirMissing = 4,
    /// Download failed or timed out.
    DownloadFailed = 5,
    /// Validation failed.
    ValidationFailed = 6,
    /// Executable still locked after the probe budget.
    WaitTimeout = 7,
    /// Replace failed, previous version restored.
    ReplaceFailed = 8,
    /// Replace failed and rollback failed.
    RollbackFailed = 9,
    /// Installed but relaunch failed.
    LaunchFailed = 10,
    /// Another executor holds the installation lock.
    Locked = 11,
}

impl ExitStatus {
    /// Numeric process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl UpdateError {
    /// Returns the category this error belongs to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PackageMissing(_)
            | Self::InvalidLocator(_)
            | Self::InvalidDigest(_)
            | Self::TargetDirMissing(_)
            | Self::InvalidTarget(_)
            | Self::Locked(_) => ErrorClass::Input,
            Self::Network(_) | Self::Staging(_) => ErrorClass::Transport,
            Self::ChecksumMismatch { .. }
            | Self::InvalidPackage(_)
            | Self::ArchiveExtraction(_) => ErrorClass::Integrity,
            Self::WaitTimeout { .. } => ErrorClass::Wait,
            Self::ReplaceFailed(_) | Self::RollbackFailed { .. } => ErrorClass::Replace,
            Self::Launch(_) => ErrorClass::Launch,
            Self::InvalidVersion(_)
            | Self::NoAssetFound(_)
            | Self::RateLimited { .. }
            | Self::ExecutorUnavailable(_)
            | Self::JsonParse(_) => ErrorClass::Coordinator,
            Self::Config(_) | Self::Io(_) => ErrorClass::Internal,
        }
    }

    /// Returns the exit status the executor reports for this error.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::PackageMissing(_) | Self::InvalidLocator(_) | Self::InvalidDigest(_) => {
                ExitStatus::PackageMissing
            }
            Self::TargetDirMissing(_) | Self::InvalidTarget(_) => ExitStatus::TargetDirMissing,
            Self::Locked(_) => ExitStatus::Locked,
            Self::Network(_) | Self::Staging(_) => ExitStatus::DownloadFailed,
            Self::ChecksumMismatch { .. } | Self::InvalidPackage(_) | Self::ArchiveExtraction(_) => {
                ExitStatus::ValidationFailed
            }
            Self::WaitTimeout { .. } => ExitStatus::WaitTimeout,
            Self::ReplaceFailed(_) => ExitStatus::ReplaceFailed,
            Self::RollbackFailed { .. } => ExitStatus::RollbackFailed,
            Self::Launch(_) => ExitStatus::LaunchFailed,
            _ => ExitStatus::Internal,
        }
    }

    /// Returns the terminal state an executor run ends in when failing with this error.
    #[must_use]
    pub fn terminal_state(&self) -> UpdateState {
        match self {
            Self::Locked(_) => UpdateState::Locked,
            Self::RollbackFailed { .. } => UpdateState::RollbackFailed,
            _ => match self.class() {
                ErrorClass::Transport => UpdateState::DownloadFailed,
                ErrorClass::Integrity => UpdateState::ValidateFailed,
                ErrorClass::Wait => UpdateState::WaitTimedOut,
                ErrorClass::Replace => UpdateState::ReplaceFailed,
                ErrorClass::Launch => UpdateState::LaunchFailed,
                ErrorClass::Input | ErrorClass::Coordinator | ErrorClass::Internal => {
                    UpdateState::InputRejected
                }
            },
        }
    }

    /// Returns a user-friendly error message suitable for display in the UI.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self.class() {
            ErrorClass::Input => "The update could not start. Your installation was not changed.",
            ErrorClass::Transport => {
                "Could not download the update. Please check your internet connection."
            }
            ErrorClass::Integrity => {
                "The downloaded update failed verification and was discarded."
            }
            ErrorClass::Wait => {
                "Bazaar Buddy is still running, so the update could not be applied."
            }
            ErrorClass::Replace => match self {
                Self::RollbackFailed { .. } => {
                    "The update failed and the previous version could not be restored. Please reinstall."
                }
                _ => "The update could not be installed. The previous version was kept.",
            },
            ErrorClass::Launch => "The update was installed but Bazaar Buddy could not be restarted.",
            ErrorClass::Coordinator => "Could not check for updates. Please try again later.",
            ErrorClass::Internal => "An unexpected error occurred.",
        }
    }

    /// Returns whether this error is potentially recoverable with a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::WaitTimeout { .. } | Self::Locked(_)
        )
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

impl From<toml::de::Error> for UpdateError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveExtraction(err.to_string())
    }
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
