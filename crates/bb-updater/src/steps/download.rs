//! Fetch the package into the staging area.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, USER_AGENT};

use crate::config::ExecutorConfig;
use crate::error::{Result, UpdateError};
use crate::package::{PackageLocator, UpdatePackage};

/// User agent string for download requests.
pub(crate) const USER_AGENT_VALUE: &str = concat!(
    "bazaar-buddy-updater/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/stonehenge-collective/bazaar-buddy-client)"
);

/// Sub-directory of the staging area the raw package is fetched into.
const DOWNLOAD_DIR: &str = "download";

/// Log progress every this many percent.
const PROGRESS_STEP_PERCENT: u64 = 10;

/// The package as it sits in the staging area.
#[derive(Debug, Clone)]
pub struct StagedDownload {
    /// Path of the staged file.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
}

/// Fetches packages with bounded connect and transfer times.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// Creates a downloader using the timeouts from `config`.
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.download_timeout())
            .build()
            .map_err(|e| UpdateError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Copies or downloads `package` into `<staging_dir>/download/`.
    ///
    /// Nothing is written outside `staging_dir`. A partial file left by a
    /// failed transfer stays in the staging area and is removed with it.
    pub fn fetch(&self, package: &UpdatePackage, staging_dir: &Path) -> Result<StagedDownload> {
        let download_dir = staging_dir.join(DOWNLOAD_DIR);
        fs::create_dir_all(&download_dir).map_err(|e| {
            UpdateError::Staging(format!("Failed to create {}: {e}", download_dir.display()))
        })?;
        let dest = download_dir.join(package.locator.file_name());

        let bytes = match &package.locator {
            PackageLocator::Remote(url) => self.fetch_remote(url.as_str(), &dest)?,
            PackageLocator::Local(path) => copy_local(path, &dest)?,
        };

        tracing::info!(
            "Staged {} ({}) at {}",
            package.locator,
            format_bytes(bytes),
            dest.display()
        );
        Ok(StagedDownload { path: dest, bytes })
    }

    fn fetch_remote(&self, url: &str, dest: &Path) -> Result<u64> {
        tracing::info!("Starting download from {}", url);

        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network(format!(
                "Download failed with status {status}"
            )));
        }

        let expected = response.content_length();
        let file = File::create(dest)
            .map_err(|e| UpdateError::Staging(format!("Failed to create {}: {e}", dest.display())))?;
        let mut writer = ProgressWriter::new(BufWriter::new(file), expected);

        let written = response
            .copy_to(&mut writer)
            .map_err(|e| UpdateError::Network(format!("Transfer interrupted: {e}")))?;

        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|e| UpdateError::Staging(format!("Failed to flush {}: {e}", dest.display())))?;
        file.sync_all()
            .map_err(|e| UpdateError::Staging(format!("Failed to sync {}: {e}", dest.display())))?;

        if let Some(expected) = expected
            && written != expected
        {
            return Err(UpdateError::Network(format!(
                "Truncated download: got {written} of {expected} bytes"
            )));
        }

        Ok(written)
    }
}

fn copy_local(source: &Path, dest: &Path) -> Result<u64> {
    tracing::info!("Copying local package {}", source.display());
    let bytes = fs::copy(source, dest).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => UpdateError::PackageMissing(source.display().to_string()),
        _ => UpdateError::Staging(format!(
            "Failed to copy {} to {}: {e}",
            source.display(),
            dest.display()
        )),
    })?;
    File::open(dest)
        .and_then(|f| f.sync_all())
        .map_err(|e| UpdateError::Staging(format!("Failed to sync {}: {e}", dest.display())))?;
    Ok(bytes)
}

/// Writer that logs download progress at fixed percentage steps.
struct ProgressWriter<W> {
    inner: W,
    written: u64,
    total: Option<u64>,
    next_report: u64,
}

impl<W: Write> ProgressWriter<W> {
    fn new(inner: W, total: Option<u64>) -> Self {
        Self {
            inner,
            written: 0,
            total,
            next_report: PROGRESS_STEP_PERCENT,
        }
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;

        if let Some(total) = self.total.filter(|t| *t > 0) {
            let percent = self.written * 100 / total;
            if percent >= self.next_report {
                tracing::debug!(
                    "Downloaded {} of {} ({percent}%)",
                    format_bytes(self.written),
                    format_bytes(total)
                );
                self.next_report = (percent / PROGRESS_STEP_PERCENT + 1) * PROGRESS_STEP_PERCENT;
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Format bytes as a human-readable string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
