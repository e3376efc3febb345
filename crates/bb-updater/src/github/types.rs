//! GitHub API types.

use serde::Deserialize;

/// Raw release data from the GitHub API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    /// The release tag name (e.g., "v0.3.1").
    pub tag_name: String,

    /// The release title/name.
    #[serde(default)]
    pub name: Option<String>,

    /// Release notes/body in markdown format.
    #[serde(default)]
    pub body: Option<String>,

    /// Whether this is a pre-release.
    #[serde(default)]
    pub prerelease: bool,

    /// Whether this is a draft release.
    #[serde(default)]
    pub draft: bool,

    /// Release assets.
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,

    /// HTML URL to the release page.
    #[serde(default)]
    pub html_url: String,

    /// Publication timestamp.
    #[serde(default)]
    pub published_at: Option<String>,
}

impl GitHubRelease {
    /// Returns the version string without the "v" prefix if present.
    #[must_use]
    pub fn version(&self) -> &str {
        self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name)
    }

    /// Returns the changelog/release notes.
    #[must_use]
    pub fn changelog(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Finds the package for `platform` among the fully uploaded assets.
    ///
    /// Windows ships a bare `.exe`, macOS a `.zip` holding the app, Linux a
    /// `.tar.gz` (or, failing that, a bare binary without extension).
    #[must_use]
    pub fn find_asset_for_platform(&self, platform: Platform) -> Option<&GitHubAsset> {
        let uploaded = || self.assets.iter().filter(|a| a.is_uploaded());

        match platform {
            Platform::Windows => uploaded().find(|a| has_extension(a, ".exe")),
            Platform::MacOs => uploaded().find(|a| has_extension(a, ".zip")),
            Platform::Linux => uploaded()
                .find(|a| has_extension(a, ".tar.gz") || has_extension(a, ".tgz"))
                .or_else(|| uploaded().find(|a| !a.name.contains('.'))),
        }
    }
}

fn has_extension(asset: &GitHubAsset, ext: &str) -> bool {
    asset.name.to_lowercase().ends_with(ext)
}

/// Release asset data from the GitHub API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    /// Asset filename (e.g., "BazaarBuddy.exe").
    pub name: String,

    /// Direct download URL.
    pub browser_download_url: String,

    /// Upload state: "uploaded" (complete) or "open" (still uploading).
    #[serde(default)]
    pub state: String,

    /// SHA256 digest (format: "sha256:..."); null until GitHub computes it.
    #[serde(default)]
    pub digest: Option<String>,

    /// File size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Content type (e.g., "application/zip").
    #[serde(default)]
    pub content_type: String,
}

impl GitHubAsset {
    /// Returns whether this asset is fully uploaded and ready for download.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.state == "uploaded"
    }

    /// Returns the SHA256 hash from the digest field, if available.
    #[must_use]
    pub fn sha256(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
    }

    /// Returns whether this asset has verification available.
    #[must_use]
    pub fn has_verification(&self) -> bool {
        self.sha256().is_some()
    }
}

/// Desktop platform a release asset is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows.
    Windows,
    /// macOS.
    MacOs,
    /// Linux and other Unix systems.
    Linux,
}

impl Platform {
    /// The platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Get a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        }
    }
}
