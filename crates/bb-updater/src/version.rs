//! Release version comparison.
//!
//! Release tags look like `v0.4.1` or `v0.5.0-beta.2`. Tags that do not parse
//! are compared as plain strings: any different tag counts as an update.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, UpdateError};

/// Pre-release identifier. Orders alpha < beta < rc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    /// Alpha release (e.g., "alpha.1").
    Alpha(u32),
    /// Beta release (e.g., "beta.2").
    Beta(u32),
    /// Release candidate (e.g., "rc.1").
    ReleaseCandidate(u32),
}

impl PreRelease {
    fn parse(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        let (kind, number) = match s.split_once('.') {
            Some((kind, number)) => (kind.to_string(), number.parse().ok()?),
            None => (s.clone(), 0),
        };
        match kind.as_str() {
            "alpha" => Some(Self::Alpha(number)),
            "beta" => Some(Self::Beta(number)),
            "rc" => Some(Self::ReleaseCandidate(number)),
            _ => None,
        }
    }
}

impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha(n) => write!(f, "alpha.{n}"),
            Self::Beta(n) => write!(f, "beta.{n}"),
            Self::ReleaseCandidate(n) => write!(f, "rc.{n}"),
        }
    }
}

/// A semantic version with optional pre-release tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    /// Major version number.
    pub major: u32,
    /// Minor version number.
    pub minor: u32,
    /// Patch version number.
    pub patch: u32,
    /// Optional pre-release identifier.
    pub pre_release: Option<PreRelease>,
}

impl Version {
    /// Create a new stable version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// Check if this version is a stable release.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.pre_release.is_none()
    }

    /// Parse a version from a release tag (handles "v" prefix).
    pub fn from_tag(tag: &str) -> Result<Self> {
        Self::from_str(tag)
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let invalid = || UpdateError::InvalidVersion(s.to_string());

        let (core, pre_release) = match trimmed.split_once('-') {
            Some((core, pre)) => (core, Some(PreRelease::parse(pre).ok_or_else(invalid)?)),
            None => (trimmed, None),
        };

        let mut parts = core.split('.');
        let mut next = || -> Result<u32> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let (major, minor, patch) = (next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

/// Decides whether `release_tag` is an update over `current`.
///
/// Parseable tags must be strictly newer. If either side does not parse,
/// any difference in the tag text is treated as an update.
#[must_use]
pub fn is_update(current: &str, release_tag: &str) -> bool {
    match (Version::from_tag(current), Version::from_tag(release_tag)) {
        (Ok(current), Ok(release)) => release > current,
        _ => {
            let strip = |s: &str| s.trim().trim_start_matches('v').to_string();
            !release_tag.trim().is_empty() && strip(current) != strip(release_tag)
        }
    }
}
