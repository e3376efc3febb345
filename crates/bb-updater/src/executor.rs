//! The update executor state machine.
//!
//! One run takes a package locator and the installed executable's path and
//! drives them through
//!
//! ```text
//! Preparing -> Downloading -> Validating -> WaitingForExit -> BackingUp
//!           -> Replacing -> Relaunching -> CleaningUp -> Done
//! ```
//!
//! Every state change is written to the attempt log before the step runs.
//! Nothing inside the install directory is touched before `WaitingForExit`,
//! and once the backup is taken the run ends with either the old or the new
//! executable at the target path.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::attempt::{UpdateAttempt, UpdateState};
use crate::config::ExecutorConfig;
use crate::error::{ExitStatus, Result, UpdateError};
use crate::journal::AttemptLog;
use crate::lock::InstallLock;
use crate::package::UpdatePackage;
use crate::steps::cleanup::cleanup;
use crate::steps::download::Downloader;
use crate::steps::extract::stage_executable;
use crate::steps::launch::{DetachedLauncher, Launcher};
use crate::steps::probe::{ProbeOutcome, ReleaseProbe, RenameProbe, wait_for_release};
use crate::steps::replace::{ReplaceStrategy, roll_back_after, select_strategy};
use crate::steps::verify::{NonEmptyValidator, Sha256Validator, Validator, sha256_file};
use crate::target::InstallationTarget;

/// Prefix of the per-run staging directory.
const STAGING_PREFIX: &str = "bb_update_";

/// The two mandatory inputs of a run, plus the optional digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Package locator: URL, `file://` URL, or local path.
    pub package: String,
    /// Path of the installed executable.
    pub executable: PathBuf,
    /// Expected SHA256 of the package.
    pub sha256: Option<String>,
}

impl UpdateRequest {
    /// Creates a request without a digest.
    pub fn new(package: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            executable: executable.into(),
            sha256: None,
        }
    }

    /// Attaches the expected package digest.
    #[must_use]
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The new executable was installed.
    Installed,
    /// The installed executable already matched the package.
    AlreadyCurrent,
}

/// Result of a run together with its attempt record.
#[derive(Debug)]
pub struct UpdateReport {
    /// Transitions recorded during the run.
    pub attempt: UpdateAttempt,
    /// Final outcome.
    pub result: Result<Outcome>,
}

impl UpdateReport {
    /// Exit status for the process.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        match &self.result {
            Ok(_) => ExitStatus::Success,
            Err(e) => e.exit_status(),
        }
    }

    /// Numeric exit code for the process.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.exit_status().code())
    }

    /// Whether the run ended in `Done`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Terminal state of the run.
    #[must_use]
    pub fn final_state(&self) -> Option<UpdateState> {
        self.attempt.current()
    }

    /// Records a run that was refused before an [`Executor`] could be built,
    /// such as one with an unreadable configuration file.
    pub fn rejected(request: &UpdateRequest, journal: &mut AttemptLog, error: UpdateError) -> Self {
        let mut attempt = UpdateAttempt::new();
        journal.begin(&attempt, &request.package, &request.executable);
        let transition = attempt.enter(error.terminal_state(), error.to_string()).clone();
        journal.transition(&attempt, &transition);
        Self {
            attempt,
            result: Err(error),
        }
    }
}

/// Runs one update attempt.
///
/// The probe, replace strategy, and launcher default to the real
/// implementations and can be swapped to inject failures.
pub struct Executor {
    config: ExecutorConfig,
    request: UpdateRequest,
    journal: AttemptLog,
    validators: Vec<Box<dyn Validator>>,
    probe: Box<dyn ReleaseProbe>,
    strategy: Option<Box<dyn ReplaceStrategy>>,
    launcher: Box<dyn Launcher>,
}

impl Executor {
    /// Creates an executor for `request`.
    pub fn new(config: ExecutorConfig, request: UpdateRequest, journal: AttemptLog) -> Self {
        Self {
            config,
            request,
            journal,
            validators: Vec::new(),
            probe: Box::new(RenameProbe),
            strategy: None,
            launcher: Box::new(DetachedLauncher),
        }
    }

    /// Adds a validator run after the built-in ones.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Replaces the unlock probe.
    #[must_use]
    pub fn with_probe(mut self, probe: impl ReleaseProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Forces a replace strategy instead of picking one per platform.
    #[must_use]
    pub fn with_replace_strategy(mut self, strategy: impl ReplaceStrategy + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    /// Replaces the launcher used to start the new executable.
    #[must_use]
    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Runs the attempt to completion.
    pub fn run(mut self) -> UpdateReport {
        let mut attempt = UpdateAttempt::new();
        self.journal
            .begin(&attempt, &self.request.package, &self.request.executable);

        let result = self.drive(&mut attempt);
        if let Err(e) = &result {
            self.record(&mut attempt, e.terminal_state(), e.to_string());
        }

        UpdateReport { attempt, result }
    }

    fn drive(&mut self, attempt: &mut UpdateAttempt) -> Result<Outcome> {
        self.record(
            attempt,
            UpdateState::Preparing,
            format!(
                "package={} executable={}",
                self.request.package,
                self.request.executable.display()
            ),
        );
        self.config.validate()?;
        let package = UpdatePackage::from_locator(&self.request.package)?
            .with_sha256(self.request.sha256.clone());
        let digest_check = package
            .sha256
            .as_deref()
            .map(Sha256Validator::new)
            .transpose()?;
        package.ensure_available()?;
        let target =
            InstallationTarget::from_executable(&self.request.executable, &self.config.backup_suffix)?;
        let _lock = InstallLock::acquire(target.lock_file(), self.config.lock_stale_after())?;

        let recovery = target.recover()?;
        if !recovery.is_empty() {
            self.journal.note(
                attempt,
                &format!("recovered leftovers of an interrupted run: {recovery:?}"),
            );
        }

        self.record(attempt, UpdateState::Downloading, format!("from {}", package.locator));
        let staging = self.create_staging()?;
        let download = Downloader::new(&self.config)?.fetch(&package, staging.path())?;

        self.record(
            attempt,
            UpdateState::Validating,
            format!("{} bytes, {} package", download.bytes, package.kind),
        );
        self.validate(digest_check, &download.path)?;
        let staged = stage_executable(
            &download.path,
            package.kind,
            &target.executable_name(),
            staging.path(),
        )?;

        if is_already_installed(&staged, &target) {
            self.journal
                .note(attempt, "already up to date, skipping backup and replace");
            self.relaunch(attempt, &target)?;
            self.finish(attempt, &target, staging, Duration::ZERO);
            return Ok(Outcome::AlreadyCurrent);
        }

        self.record(
            attempt,
            UpdateState::WaitingForExit,
            format!(
                "probing {} up to {} times every {:?}",
                target.executable().display(),
                self.config.probe_attempts,
                self.config.probe_interval()
            ),
        );
        let (outcome, probes) = wait_for_release(&*self.probe, &target, &self.config)?;
        let had_backup = outcome == ProbeOutcome::BackedUp;

        let detail = if had_backup {
            format!(
                "{} moved to {} after {probes} probe(s)",
                target.executable().display(),
                target.backup().display()
            )
        } else {
            "nothing installed, backup skipped".to_string()
        };
        self.record(attempt, UpdateState::BackingUp, detail);

        let strategy = self
            .strategy
            .take()
            .unwrap_or_else(|| select_strategy(&staged, &target));
        self.record(
            attempt,
            UpdateState::Replacing,
            format!("{} strategy from {}", strategy.name(), staged.display()),
        );
        if let Err(e) = strategy.replace(&staged, &target) {
            self.record(attempt, UpdateState::RollingBack, format!("replace failed: {e}"));
            return Err(roll_back_after(&e, &target, had_backup));
        }

        self.relaunch(attempt, &target)?;
        let delay = self.config.cleanup_delay();
        self.finish(attempt, &target, staging, delay);
        Ok(Outcome::Installed)
    }

    fn create_staging(&self) -> Result<TempDir> {
        let root = self.config.staging_root();
        fs::create_dir_all(&root).map_err(|e| {
            UpdateError::Staging(format!("Failed to create {}: {e}", root.display()))
        })?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&root)
            .map_err(|e| {
                UpdateError::Staging(format!(
                    "Failed to create staging directory in {}: {e}",
                    root.display()
                ))
            })
    }

    fn validate(&self, digest_check: Option<Sha256Validator>, artifact: &Path) -> Result<()> {
        let mut builtin: Vec<Box<dyn Validator>> = vec![Box::new(NonEmptyValidator)];
        if let Some(check) = digest_check {
            builtin.push(Box::new(check));
        }

        for validator in builtin.iter().chain(self.validators.iter()) {
            validator.validate(artifact)?;
            tracing::debug!("Validator {} passed", validator.name());
        }
        Ok(())
    }

    fn relaunch(&mut self, attempt: &mut UpdateAttempt, target: &InstallationTarget) -> Result<()> {
        if !self.config.relaunch {
            self.record(attempt, UpdateState::Relaunching, "relaunch disabled, skipped");
            return Ok(());
        }

        self.record(
            attempt,
            UpdateState::Relaunching,
            target.executable().display().to_string(),
        );
        let pid = self.launcher.launch(target.executable()).map_err(|e| {
            UpdateError::Launch(format!("{}: {e}", target.executable().display()))
        })?;
        self.journal.note(attempt, &format!("started pid {pid}"));
        Ok(())
    }

    fn finish(
        &mut self,
        attempt: &mut UpdateAttempt,
        target: &InstallationTarget,
        staging: TempDir,
        delay: Duration,
    ) {
        self.record(
            attempt,
            UpdateState::CleaningUp,
            format!("removing backup and {} after {delay:?}", staging.path().display()),
        );
        let report = cleanup(target, Some(staging), delay);
        self.record(
            attempt,
            UpdateState::Done,
            format!(
                "removed_backup={} removed_staging={}",
                report.removed_backup, report.removed_staging
            ),
        );
    }

    fn record(&mut self, attempt: &mut UpdateAttempt, state: UpdateState, detail: impl Into<String>) {
        let transition = attempt.enter(state, detail).clone();
        self.journal.transition(attempt, &transition);
    }
}

fn is_already_installed(staged: &Path, target: &InstallationTarget) -> bool {
    if !target.is_installed() {
        return false;
    }
    match (sha256_file(staged), sha256_file(target.executable())) {
        (Ok(new), Ok(installed)) => new == installed,
        _ => false,
    }
}
