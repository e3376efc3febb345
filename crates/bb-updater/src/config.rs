//! Configuration types for the update system.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};
use crate::version::Version;

/// File name of the executor configuration inside the config directory.
pub const EXECUTOR_CONFIG_FILE_NAME: &str = "update-executor.toml";

/// Tunables of the update executor.
///
/// Serialized to TOML. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How many times the unlock probe tries to rename the executable.
    pub probe_attempts: u32,

    /// Pause between probe attempts, in milliseconds.
    pub probe_interval_ms: u64,

    /// Connection timeout for package downloads, in seconds.
    pub connect_timeout_secs: u64,

    /// Upper bound for a whole package download, in seconds.
    pub download_timeout_secs: u64,

    /// Delay before the backup and staging files are removed, in milliseconds.
    pub cleanup_delay_ms: u64,

    /// Age after which an existing lock file is treated as abandoned, in seconds.
    pub lock_stale_after_secs: u64,

    /// Whether to start the new executable after installing it.
    pub relaunch: bool,

    /// Where staging directories are created (system temp dir when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,

    /// Extension appended to the executable's file name for the backup.
    pub backup_suffix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            probe_attempts: 30,
            probe_interval_ms: 1000,
            connect_timeout_secs: 15,
            download_timeout_secs: 300,
            cleanup_delay_ms: 2000,
            lock_stale_after_secs: 900,
            relaunch: true,
            staging_dir: None,
            backup_suffix: "old".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Loads the configuration from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            UpdateError::Config(format!("Failed to read config file '{}': {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the per-user configuration file if it exists, defaults otherwise.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Gets the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        crate::project_dirs().map(|dirs| dirs.config_dir().join(EXECUTOR_CONFIG_FILE_NAME))
    }

    /// Rejects settings that would make a wait unbounded or meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.probe_attempts == 0 {
            return Err(UpdateError::Config(
                "probe_attempts must be at least 1".to_string(),
            ));
        }
        if self.download_timeout_secs == 0 {
            return Err(UpdateError::Config(
                "download_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.backup_suffix.is_empty() || self.backup_suffix.contains(['/', '\\']) {
            return Err(UpdateError::Config(format!(
                "invalid backup_suffix '{}'",
                self.backup_suffix
            )));
        }
        if self.lock_stale_after() <= self.longest_run() {
            return Err(UpdateError::Config(format!(
                "lock_stale_after_secs ({}) must exceed the longest possible run ({:?})",
                self.lock_stale_after_secs,
                self.longest_run()
            )));
        }
        Ok(())
    }

    /// Upper bound on how long one run holds the installation lock: the whole
    /// download, the full probe budget and the cleanup delay.
    #[must_use]
    pub fn longest_run(&self) -> Duration {
        let probing = self
            .probe_interval()
            .saturating_mul(self.probe_attempts);
        self.download_timeout()
            .saturating_add(probing)
            .saturating_add(self.cleanup_delay())
    }

    /// Pause between probe attempts.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Connection timeout for downloads.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Total timeout for downloads.
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Delay before cleanup.
    #[must_use]
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    /// Age after which a lock file is abandoned.
    #[must_use]
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    /// Directory staging areas are created in.
    #[must_use]
    pub fn staging_root(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Update channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateChannel {
    /// Only receive stable releases.
    #[default]
    Stable,
    /// Receive beta and stable releases.
    Beta,
}

impl UpdateChannel {
    /// Check if a version should be offered on this channel.
    #[must_use]
    pub fn includes(&self, version: &Version) -> bool {
        match self {
            Self::Stable => version.is_stable(),
            Self::Beta => true,
        }
    }

    /// Whether releases GitHub marks as pre-releases are offered.
    #[must_use]
    pub const fn includes_prereleases(&self) -> bool {
        matches!(self, Self::Beta)
    }

    /// Get a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::Beta => "Beta",
        }
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which GitHub repository releases are taken from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReleaseSource {
    /// The public release repository.
    #[default]
    Production,
    /// The test release repository, optionally pinned to one tag.
    Test {
        /// Release tag to install instead of the latest one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
}

impl ReleaseSource {
    /// Repository name for this source.
    #[must_use]
    pub fn repo_name(&self) -> &'static str {
        match self {
            Self::Production => crate::REPO_NAME,
            Self::Test { .. } => crate::TEST_REPO_NAME,
        }
    }

    /// Pinned tag, if any.
    #[must_use]
    pub fn pinned_tag(&self) -> Option<&str> {
        match self {
            Self::Production => None,
            Self::Test { tag } => tag.as_deref(),
        }
    }
}

/// Coordinator settings, stored with the application's own settings.
///
/// Update checking is on by default; builds run from source turn it off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    /// Whether update checking is enabled.
    pub enabled: bool,

    /// Which release channel to follow.
    pub channel: UpdateChannel,

    /// Which repository releases come from.
    pub source: ReleaseSource,

    /// Version to skip (user chose "Not Now" for it).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_version: Option<String>,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: UpdateChannel::default(),
            source: ReleaseSource::default(),
            skipped_version: None,
        }
    }
}

impl UpdateSettings {
    /// Check if a version should be skipped based on user preference.
    #[must_use]
    pub fn should_skip_version(&self, version: &str) -> bool {
        match &self.skipped_version {
            Some(skipped) => {
                let skipped = skipped.strip_prefix('v').unwrap_or(skipped);
                skipped == version.strip_prefix('v').unwrap_or(version)
            }
            None => false,
        }
    }

    /// Set a version to skip.
    pub fn skip_version(&mut self, version: impl Into<String>) {
        self.skipped_version = Some(version.into());
    }

    /// Clear the skipped version.
    pub fn clear_skipped_version(&mut self) {
        self.skipped_version = None;
    }
}
