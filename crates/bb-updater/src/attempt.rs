//! In-memory record of a single executor run.
//!
//! The attempt is never persisted as structured data; the journal lines
//! written for every transition are the only record that survives the run.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Local};

/// States of the executor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateState {
    /// Validating arguments, taking the lock, recovering leftovers.
    Preparing,
    /// Fetching the package into the staging area.
    Downloading,
    /// Running integrity checks and unpacking archives.
    Validating,
    /// Probing until the installed executable can be renamed.
    WaitingForExit,
    /// Backup taken (or skipped for a fresh install).
    BackingUp,
    /// Moving the staged executable into place.
    Replacing,
    /// Restoring the backup after a failed replace.
    RollingBack,
    /// Starting the new executable.
    Relaunching,
    /// Removing the backup and staging files.
    CleaningUp,
    /// Finished successfully.
    Done,
    /// Arguments or paths were unusable.
    InputRejected,
    /// Another executor holds the installation lock.
    Locked,
    /// The package could not be fetched.
    DownloadFailed,
    /// The package failed validation.
    ValidateFailed,
    /// The executable never became free.
    WaitTimedOut,
    /// The swap failed and the backup was restored.
    ReplaceFailed,
    /// The swap failed and the backup could not be restored.
    RollbackFailed,
    /// Installed, but the new executable did not start.
    LaunchFailed,
}

impl UpdateState {
    /// Get a stable label used in the journal.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Preparing => "Preparing",
            Self::Downloading => "Downloading",
            Self::Validating => "Validating",
            Self::WaitingForExit => "WaitingForExit",
            Self::BackingUp => "BackingUp",
            Self::Replacing => "Replacing",
            Self::RollingBack => "RollingBack",
            Self::Relaunching => "Relaunching",
            Self::CleaningUp => "CleaningUp",
            Self::Done => "Done",
            Self::InputRejected => "InputRejected",
            Self::Locked => "Locked",
            Self::DownloadFailed => "DownloadFailed",
            Self::ValidateFailed => "ValidateFailed",
            Self::WaitTimedOut => "WaitTimedOut",
            Self::ReplaceFailed => "ReplaceFailed",
            Self::RollbackFailed => "RollbackFailed",
            Self::LaunchFailed => "LaunchFailed",
        }
    }

    /// Whether the run stops in this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done
                | Self::InputRejected
                | Self::Locked
                | Self::DownloadFailed
                | Self::ValidateFailed
                | Self::WaitTimedOut
                | Self::ReplaceFailed
                | Self::RollbackFailed
                | Self::LaunchFailed
        )
    }

    /// Whether this is a terminal failure state.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.is_terminal() && !matches!(self, Self::Done)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One recorded state change.
#[derive(Debug, Clone)]
pub struct Transition {
    /// State entered.
    pub state: UpdateState,
    /// Wall-clock time the state was entered.
    pub at: DateTime<Local>,
    /// Milliseconds since the attempt started.
    pub elapsed_ms: u128,
    /// Free-form detail (paths, byte counts, error text).
    pub detail: String,
}

/// Record of the current executor run.
#[derive(Debug, Clone)]
pub struct UpdateAttempt {
    id: String,
    started_at: DateTime<Local>,
    clock: Instant,
    transitions: Vec<Transition>,
}

impl UpdateAttempt {
    /// Starts a new attempt record.
    #[must_use]
    pub fn new() -> Self {
        let started_at = Local::now();
        Self {
            id: format!("{}-{}", std::process::id(), started_at.format("%H%M%S%3f")),
            started_at,
            clock: Instant::now(),
            transitions: Vec::new(),
        }
    }

    /// Identifier written on every journal line of this attempt.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the attempt started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Records entering `state` and returns the new transition.
    pub fn enter(&mut self, state: UpdateState, detail: impl Into<String>) -> &Transition {
        self.transitions.push(Transition {
            state,
            at: Local::now(),
            elapsed_ms: self.clock.elapsed().as_millis(),
            detail: detail.into(),
        });
        &self.transitions[self.transitions.len() - 1]
    }

    /// The most recently entered state.
    #[must_use]
    pub fn current(&self) -> Option<UpdateState> {
        self.transitions.last().map(|t| t.state)
    }

    /// Number of transitions recorded so far.
    #[must_use]
    pub fn step(&self) -> usize {
        self.transitions.len()
    }

    /// All transitions in order.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// States visited, in order (repeats included).
    #[must_use]
    pub fn states(&self) -> Vec<UpdateState> {
        self.transitions.iter().map(|t| t.state).collect()
    }

    /// Whether `state` was entered at any point.
    #[must_use]
    pub fn visited(&self, state: UpdateState) -> bool {
        self.transitions.iter().any(|t| t.state == state)
    }

    /// Whether the states in `sequence` were entered in that relative order.
    #[must_use]
    pub fn visited_in_order(&self, sequence: &[UpdateState]) -> bool {
        let mut wanted = sequence.iter().peekable();
        for t in &self.transitions {
            if wanted.peek().is_some_and(|s| **s == t.state) {
                wanted.next();
            }
        }
        wanted.peek().is_none()
    }
}

impl Default for UpdateAttempt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_records_order() {
        let mut attempt = UpdateAttempt::new();
        attempt.enter(UpdateState::Preparing, "");
        attempt.enter(UpdateState::Downloading, "from somewhere");
        attempt.enter(UpdateState::DownloadFailed, "refused");

        assert_eq!(attempt.step(), 3);
        assert_eq!(attempt.current(), Some(UpdateState::DownloadFailed));
        assert!(attempt.visited(UpdateState::Downloading));
        assert!(!attempt.visited(UpdateState::BackingUp));
        assert!(attempt.visited_in_order(&[UpdateState::Downloading, UpdateState::DownloadFailed]));
        assert!(!attempt.visited_in_order(&[UpdateState::DownloadFailed, UpdateState::Downloading]));
    }

    #[test]
    fn test_terminal_states() {
        assert!(UpdateState::Done.is_terminal());
        assert!(!UpdateState::Done.is_failure());
        assert!(UpdateState::WaitTimedOut.is_failure());
        assert!(!UpdateState::RollingBack.is_terminal());
    }

    #[test]
    fn test_attempt_id_contains_pid() {
        let attempt = UpdateAttempt::new();
        assert!(attempt.id().starts_with(&std::process::id().to_string()));
    }
}
