//! The update package handed to the executor.

use std::fmt;
use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::error::{Result, UpdateError};

/// Where the package comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLocator {
    /// Remote package fetched over HTTP(S).
    Remote(Url),
    /// Package already on the local file system.
    Local(PathBuf),
}

impl PackageLocator {
    /// Parses a locator argument.
    ///
    /// `http://` and `https://` become [`PackageLocator::Remote`], `file://`
    /// URLs and everything else are treated as local paths.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UpdateError::InvalidLocator("empty package locator".to_string()));
        }

        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(raw)
                .map_err(|e| UpdateError::InvalidLocator(format!("{raw}: {e}")))?;
            return Ok(Self::Remote(url));
        }
        if lower.starts_with("file://") {
            let url = Url::parse(raw)
                .map_err(|e| UpdateError::InvalidLocator(format!("{raw}: {e}")))?;
            let path = url
                .to_file_path()
                .map_err(|()| UpdateError::InvalidLocator(format!("{raw}: not a file path")))?;
            return Ok(Self::Local(path));
        }
        if lower.contains("://") {
            return Err(UpdateError::InvalidLocator(format!(
                "{raw}: unsupported scheme"
            )));
        }
        Ok(Self::Local(PathBuf::from(raw)))
    }

    /// File name of the package, used to detect its format.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or("package")
                .to_string(),
            Self::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "package".to_string()),
        }
    }
}

impl fmt::Display for PackageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Package container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    /// The package is the executable itself.
    Executable,
    /// ZIP archive containing the executable.
    Zip,
    /// Gzipped tar archive containing the executable.
    TarGz,
}

impl PackageKind {
    /// Detects the format from a file name.
    #[must_use]
    pub fn detect(file_name: &str) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Self::Zip
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else {
            Self::Executable
        }
    }

    /// Get a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Executable => "executable",
            Self::Zip => "ZIP",
            Self::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A new build to install.
///
/// Created by the coordinator when an update is detected and consumed once
/// by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePackage {
    /// Where to fetch it from.
    pub locator: PackageLocator,
    /// Container format.
    pub kind: PackageKind,
    /// Version label, when known.
    pub version: Option<String>,
    /// Expected SHA256 digest of the package (`sha256:<hex>` or bare hex).
    pub sha256: Option<String>,
}

impl UpdatePackage {
    /// Builds a package from a raw locator argument.
    pub fn from_locator(raw: &str) -> Result<Self> {
        let locator = PackageLocator::parse(raw)?;
        let kind = PackageKind::detect(&locator.file_name());
        Ok(Self {
            locator,
            kind,
            version: None,
            sha256: None,
        })
    }

    /// Attaches an expected digest.
    #[must_use]
    pub fn with_sha256(mut self, digest: Option<String>) -> Self {
        self.sha256 = digest.filter(|d| !d.trim().is_empty());
        self
    }

    /// Attaches a version label.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Checks that a local package exists and is a readable file.
    ///
    /// Remote packages are checked when they are downloaded.
    pub fn ensure_available(&self) -> Result<()> {
        if let PackageLocator::Local(path) = &self.locator {
            ensure_readable_file(path)?;
        }
        Ok(())
    }
}

fn ensure_readable_file(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| UpdateError::PackageMissing(format!("{}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(UpdateError::PackageMissing(format!(
            "{} is not a file",
            path.display()
        )));
    }
    std::fs::File::open(path)
        .map_err(|e| UpdateError::PackageMissing(format!("{}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote() {
        let locator = PackageLocator::parse(
            "https://github.com/stonehenge-collective/bazaar-buddy-client/releases/download/v1.0.0/BazaarBuddy.zip",
        )
        .unwrap();
        assert!(matches!(locator, PackageLocator::Remote(_)));
        assert_eq!(locator.file_name(), "BazaarBuddy.zip");
    }

    #[test]
    fn test_parse_local_and_file_url() {
        let locator = PackageLocator::parse("/tmp/bb_update/BazaarBuddy").unwrap();
        assert_eq!(locator, PackageLocator::Local(PathBuf::from("/tmp/bb_update/BazaarBuddy")));

        #[cfg(unix)]
        {
            let locator = PackageLocator::parse("file:///tmp/bb_update/BazaarBuddy.tar.gz").unwrap();
            assert_eq!(
                locator,
                PackageLocator::Local(PathBuf::from("/tmp/bb_update/BazaarBuddy.tar.gz"))
            );
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            PackageLocator::parse("   "),
            Err(UpdateError::InvalidLocator(_))
        ));
        assert!(matches!(
            PackageLocator::parse("ftp://example.com/pkg.zip"),
            Err(UpdateError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(PackageKind::detect("BazaarBuddy.exe"), PackageKind::Executable);
        assert_eq!(PackageKind::detect("BazaarBuddy.ZIP"), PackageKind::Zip);
        assert_eq!(PackageKind::detect("bb-linux.tar.gz"), PackageKind::TarGz);
        assert_eq!(PackageKind::detect("bb-linux.tgz"), PackageKind::TarGz);
    }

    #[test]
    fn test_missing_local_package() {
        let dir = tempfile::tempdir().unwrap();
        let package = UpdatePackage::from_locator(&dir.path().join("nope.zip").to_string_lossy())
            .unwrap();
        assert!(matches!(
            package.ensure_available(),
            Err(UpdateError::PackageMissing(_))
        ));

        let dir_package = UpdatePackage::from_locator(&dir.path().to_string_lossy()).unwrap();
        assert!(matches!(
            dir_package.ensure_available(),
            Err(UpdateError::PackageMissing(_))
        ));
    }

    #[test]
    fn test_blank_digest_ignored() {
        let package = UpdatePackage::from_locator("pkg.zip")
            .unwrap()
            .with_sha256(Some("  ".to_string()));
        assert!(package.sha256.is_none());
    }
}
