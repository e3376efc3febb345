//! Wait for the installed executable to be released, taking the backup.
//!
//! Renaming the executable to its backup slot both proves that no process
//! still holds it and performs the backup. The probe is retried at a fixed
//! interval for a bounded number of attempts.

use std::fs;
use std::io;
use std::thread;

use crate::config::ExecutorConfig;
use crate::error::{Result, UpdateError};
use crate::target::InstallationTarget;

/// Result of a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The executable was moved to the backup slot.
    BackedUp,
    /// There was no executable to back up (fresh install).
    NothingInstalled,
}

/// A single release probe.
pub trait ReleaseProbe: Send {
    /// Tries once to release the executable.
    ///
    /// An `Err` means "still held, try again".
    fn try_release(&self, target: &InstallationTarget) -> io::Result<ProbeOutcome>;
}

/// Renames the executable to the backup slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameProbe;

impl ReleaseProbe for RenameProbe {
    fn try_release(&self, target: &InstallationTarget) -> io::Result<ProbeOutcome> {
        match fs::rename(target.executable(), target.backup()) {
            Ok(()) => Ok(ProbeOutcome::BackedUp),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !target.executable().exists() => {
                Ok(ProbeOutcome::NothingInstalled)
            }
            Err(e) => Err(e),
        }
    }
}

/// Runs `probe` until it succeeds or the attempt budget from `config` is spent.
///
/// Returns the outcome and the number of attempts used.
pub fn wait_for_release(
    probe: &dyn ReleaseProbe,
    target: &InstallationTarget,
    config: &ExecutorConfig,
) -> Result<(ProbeOutcome, u32)> {
    let attempts = config.probe_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match probe.try_release(target) {
            Ok(outcome) => {
                tracing::debug!("Probe succeeded on attempt {attempt}: {outcome:?}");
                return Ok((outcome, attempt));
            }
            Err(e) => {
                tracing::debug!(
                    "Probe {attempt}/{attempts}: {} still in use: {e}",
                    target.executable().display()
                );
                last_error = e.to_string();
            }
        }
        if attempt < attempts {
            thread::sleep(config.probe_interval());
        }
    }

    Err(UpdateError::WaitTimeout {
        attempts,
        last_error,
    })
}
