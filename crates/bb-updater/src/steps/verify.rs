//! Integrity checks run on the staged package before it is trusted.

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, UpdateError};

/// One integrity check on a staged artifact.
///
/// Validators run in order during `Validating`; the first failure aborts the
/// run before the installation is touched.
pub trait Validator: Send {
    /// Short name used in the attempt log.
    fn name(&self) -> &str;

    /// Checks the artifact at `artifact`.
    fn validate(&self, artifact: &Path) -> Result<()>;
}

/// Rejects missing, non-regular, or empty artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyValidator;

impl Validator for NonEmptyValidator {
    fn name(&self) -> &str {
        "non-empty"
    }

    fn validate(&self, artifact: &Path) -> Result<()> {
        let metadata = std::fs::metadata(artifact).map_err(|e| {
            UpdateError::InvalidPackage(format!("{} is unreadable: {e}", artifact.display()))
        })?;
        if !metadata.is_file() {
            return Err(UpdateError::InvalidPackage(format!(
                "{} is not a regular file",
                artifact.display()
            )));
        }
        if metadata.len() == 0 {
            return Err(UpdateError::InvalidPackage(format!(
                "{} is empty",
                artifact.display()
            )));
        }
        Ok(())
    }
}

/// Compares the artifact's SHA256 with an expected digest.
#[derive(Debug, Clone)]
pub struct Sha256Validator {
    expected: String,
}

impl Sha256Validator {
    /// Accepts `sha256:<hex>` or bare hex, case-insensitive.
    pub fn new(digest: &str) -> Result<Self> {
        let expected = digest
            .trim()
            .strip_prefix("sha256:")
            .unwrap_or(digest.trim())
            .to_ascii_lowercase();

        if expected.len() != 64 || !expected.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(UpdateError::InvalidDigest(format!(
                "malformed SHA256 digest '{digest}'"
            )));
        }
        Ok(Self { expected })
    }
}

impl Validator for Sha256Validator {
    fn name(&self) -> &str {
        "sha256"
    }

    fn validate(&self, artifact: &Path) -> Result<()> {
        let actual = sha256_file(artifact)
            .map_err(|e| UpdateError::InvalidPackage(format!("{}: {e}", artifact.display())))?;
        if actual != self.expected {
            return Err(UpdateError::ChecksumMismatch {
                expected: self.expected.clone(),
                actual,
            });
        }
        tracing::info!("SHA256 verification passed: {}", actual);
        Ok(())
    }
}

/// Computes the hex SHA256 of a file without reading it into memory.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Computes the hex SHA256 of in-memory data.
#[must_use]
pub fn compute_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
