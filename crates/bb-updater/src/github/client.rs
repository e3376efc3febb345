//! GitHub API client for fetching release information.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;

use super::types::GitHubRelease;
use crate::error::{Result, UpdateError};
use crate::steps::download::USER_AGENT_VALUE;

/// GitHub API base URL.
const GITHUB_API_URL: &str = "https://api.github.com";

/// Timeout for a single API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// GitHub API client for fetching release information.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// Creates a new GitHub client for the specified repository.
    ///
    /// # Arguments
    /// * `owner` - The repository owner (e.g., "stonehenge-collective")
    /// * `repo` - The repository name (e.g., "bazaar-buddy-client")
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| UpdateError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: GITHUB_API_URL.to_string(),
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    /// Points the client at another API root (a GitHub Enterprise host or a
    /// local test server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `owner/repo` this client reads from.
    #[must_use]
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Fetches the latest published release.
    pub fn get_latest_release(&self) -> Result<GitHubRelease> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.base_url, self.owner, self.repo
        );

        tracing::debug!("Fetching latest release from {}", url);

        let response = self.client.get(&url).send()?;
        handle_response(response)
    }

    /// Fetches a specific release by tag name.
    ///
    /// # Arguments
    /// * `tag` - The release tag (e.g., "v0.4.0")
    pub fn get_release_by_tag(&self, tag: &str) -> Result<GitHubRelease> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.base_url, self.owner, self.repo, tag
        );

        tracing::debug!("Fetching release by tag from {}", url);

        let response = self.client.get(&url).send()?;
        handle_response(response)
    }
}

/// Checks the HTTP response for errors and parses the release JSON.
fn handle_response(response: Response) -> Result<GitHubRelease> {
    let status = response.status();

    if is_rate_limited(status, response.headers()) {
        return Err(UpdateError::RateLimited {
            retry_after: retry_after(response.headers()),
        });
    }

    if status == StatusCode::NOT_FOUND {
        return Err(UpdateError::Network(
            "No releases found for this repository".to_string(),
        ));
    }

    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(UpdateError::Network(format!(
            "GitHub API error ({status}): {body}"
        )));
    }

    let body = response.text()?;
    Ok(serde_json::from_str(&body)?)
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
        && headers
            .get("x-ratelimit-remaining")
            .is_some_and(|remaining| remaining.to_str().unwrap_or("1") == "0")
}

/// Seconds until the rate limit window resets, defaulting to a minute.
fn retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|reset| {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            reset.saturating_sub(now)
        })
        .unwrap_or(60)
}
