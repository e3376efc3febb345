//! In-application side of the update: detect a release, hand off to the
//! executor, and get out of its way.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use crate::config::UpdateSettings;
use crate::error::{Result, UpdateError};
use crate::github::{GitHubClient, GitHubRelease, Platform};
use crate::package::UpdatePackage;
use crate::steps::launch::spawn_detached;
use crate::version::{Version, is_update};

/// File name of the executor binary shipped next to the application.
#[cfg(windows)]
pub const EXECUTOR_NAME: &str = "bb-update-executor.exe";
/// File name of the executor binary shipped next to the application.
#[cfg(not(windows))]
pub const EXECUTOR_NAME: &str = "bb-update-executor";

/// An update that is ready to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Release tag as published (e.g., "v0.5.0").
    pub tag: String,
    /// Version without the "v" prefix.
    pub version: String,
    /// Release notes.
    pub changelog: String,
    /// Release page.
    pub html_url: String,
    /// Name of the selected asset.
    pub asset_name: String,
    /// Download URL of the selected asset.
    pub package_url: String,
    /// Asset size in bytes.
    pub size: u64,
    /// SHA256 digest reported by GitHub, without prefix.
    pub sha256: Option<String>,
}

impl PendingUpdate {
    /// The package the executor will install.
    pub fn package(&self) -> Result<UpdatePackage> {
        Ok(UpdatePackage::from_locator(&self.package_url)?
            .with_sha256(self.sha256.clone())
            .with_version(self.version.clone()))
    }

    /// Arguments passed to the executor for `executable`.
    #[must_use]
    pub fn executor_args(&self, executable: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if let Some(digest) = &self.sha256 {
            args.push("--sha256".to_string());
            args.push(digest.clone());
        }
        args.push(self.package_url.clone());
        args.push(executable.display().to_string());
        args
    }
}

/// Detects updates for the running application and starts the executor.
#[derive(Debug, Clone)]
pub struct UpdateCoordinator {
    settings: UpdateSettings,
    current_version: String,
    client: GitHubClient,
    platform: Platform,
}

impl UpdateCoordinator {
    /// Creates a coordinator reading releases from the repository chosen in `settings`.
    pub fn new(settings: UpdateSettings, current_version: impl Into<String>) -> Result<Self> {
        let client = GitHubClient::new(crate::REPO_OWNER, settings.source.repo_name())?;
        Ok(Self {
            settings,
            current_version: current_version.into(),
            client,
            platform: Platform::current(),
        })
    }

    /// Uses `client` instead of the default GitHub client.
    #[must_use]
    pub fn with_client(mut self, client: GitHubClient) -> Self {
        self.client = client;
        self
    }

    /// Selects assets for `platform` instead of the running one.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    /// Asks GitHub for the release to offer, if any.
    pub fn check(&self) -> Result<Option<PendingUpdate>> {
        if !self.settings.enabled {
            tracing::debug!("Update checking is disabled");
            return Ok(None);
        }

        tracing::info!(
            "Checking {} for updates (current: {}, channel: {})",
            self.client.repository(),
            self.current_version,
            self.settings.channel
        );

        let release = match self.settings.source.pinned_tag() {
            Some(tag) => self.client.get_release_by_tag(tag)?,
            None => self.client.get_latest_release()?,
        };
        self.evaluate(&release)
    }

    /// Decides whether `release` should be offered.
    pub fn evaluate(&self, release: &GitHubRelease) -> Result<Option<PendingUpdate>> {
        if release.draft {
            tracing::debug!("Ignoring draft release {}", release.tag_name);
            return Ok(None);
        }

        if !is_update(&self.current_version, &release.tag_name) {
            tracing::info!("Already running the latest version ({})", self.current_version);
            return Ok(None);
        }

        if !self.offered_on_channel(release) {
            tracing::info!(
                "Release {} is not on the {} channel",
                release.tag_name,
                self.settings.channel
            );
            return Ok(None);
        }

        if self.settings.should_skip_version(release.version()) {
            tracing::info!("Skipping version {} (user preference)", release.version());
            return Ok(None);
        }

        let asset = release
            .find_asset_for_platform(self.platform)
            .ok_or_else(|| UpdateError::NoAssetFound(self.platform.label().to_string()))?;

        if !asset.has_verification() {
            tracing::warn!("Asset {} has no SHA256 digest", asset.name);
        }

        tracing::info!("Update available: {} ({})", release.tag_name, asset.name);
        Ok(Some(PendingUpdate {
            tag: release.tag_name.clone(),
            version: release.version().to_string(),
            changelog: release.changelog().to_string(),
            html_url: release.html_url.clone(),
            asset_name: asset.name.clone(),
            package_url: asset.browser_download_url.clone(),
            size: asset.size,
            sha256: asset.sha256().map(str::to_string),
        }))
    }

    fn offered_on_channel(&self, release: &GitHubRelease) -> bool {
        match Version::from_tag(&release.tag_name) {
            Ok(version) => self.settings.channel.includes(&version),
            // Unversioned tags are only excluded when GitHub flags them.
            Err(_) => !release.prerelease || self.settings.channel.includes_prereleases(),
        }
    }

    /// Starts the executor for `update` against `executable` and returns its pid.
    ///
    /// The executor is looked up next to the running binary.
    pub fn launch_executor(&self, update: &PendingUpdate, executable: &Path) -> Result<u32> {
        launch_executor_at(&executor_path()?, update, executable)
    }

    /// Starts the executor and terminates the calling process.
    ///
    /// Returns only if the executor could not be started.
    pub fn hand_off_and_exit(&self, update: &PendingUpdate, executable: &Path) -> Result<Infallible> {
        let pid = self.launch_executor(update, executable)?;
        tracing::info!("Update executor started (pid {pid}); exiting");
        std::process::exit(0)
    }
}

/// Location of the executor binary: beside the running executable.
pub fn executor_path() -> Result<PathBuf> {
    let current = std::env::current_exe()
        .map_err(|e| UpdateError::ExecutorUnavailable(format!("cannot locate running binary: {e}")))?;
    let dir = current.parent().ok_or_else(|| {
        UpdateError::ExecutorUnavailable(format!("{} has no parent directory", current.display()))
    })?;
    Ok(dir.join(EXECUTOR_NAME))
}

/// Starts the executor at `executor` detached from the caller.
pub fn launch_executor_at(executor: &Path, update: &PendingUpdate, executable: &Path) -> Result<u32> {
    if !executor.is_file() {
        return Err(UpdateError::ExecutorUnavailable(format!(
            "{} not found",
            executor.display()
        )));
    }

    tracing::info!(
        "Starting {} for {} -> {}",
        executor.display(),
        update.package_url,
        executable.display()
    );
    spawn_detached(executor, update.executor_args(executable))
        .map_err(|e| UpdateError::ExecutorUnavailable(format!("{}: {e}", executor.display())))
}
