//! GitHub API client and types.
//!
//! Releases of the desktop client are published on GitHub; this module
//! reads them through the Releases API.

pub mod client;
pub mod types;

pub use client::GitHubClient;
pub use types::{GitHubAsset, GitHubRelease, Platform};
