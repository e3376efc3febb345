//! Self-update system for Bazaar Buddy.
//!
//! An update happens in two processes:
//!
//! - The **coordinator** ([`UpdateCoordinator`]) runs inside the application.
//!   It asks GitHub for the newest release, picks the package for the
//!   current platform, starts the executor detached, and exits so its own
//!   executable can be replaced.
//! - The **executor** ([`Executor`]) runs as `bb-update-executor
//!   <package-locator> <installed-executable>`. It downloads the package
//!   into a private staging directory, validates it, waits until the
//!   installed file is free, swaps it in with a backup, relaunches the
//!   application, and cleans up.
//!
//! Every executor run is recorded in an append-only attempt log
//! ([`AttemptLog`]) and ends with a distinct [`ExitStatus`] per failure
//! cause.
//!
//! # Example
//!
//! ```no_run
//! use bb_updater::{AttemptLog, Executor, ExecutorConfig, UpdateRequest};
//!
//! let request = UpdateRequest::new(
//!     "https://github.com/stonehenge-collective/bazaar-buddy-client/releases/download/v0.5.0/BazaarBuddy.exe",
//!     r"C:\Program Files\BazaarBuddy\BazaarBuddy.exe",
//! );
//! let journal = AttemptLog::open(bb_updater::journal::default_journal_path())?;
//! let report = Executor::new(ExecutorConfig::default(), request, journal).run();
//! std::process::exit(report.exit_code());
//! # Ok::<(), bb_updater::UpdateError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod attempt;
pub mod config;
pub mod error;
pub mod journal;
pub mod lock;
pub mod package;
pub mod target;
pub mod version;

// Individual steps
pub mod steps;

// State machine and in-app side
pub mod coordinator;
pub mod executor;

// GitHub API
pub mod github;

pub use attempt::{Transition, UpdateAttempt, UpdateState};
pub use config::{ExecutorConfig, ReleaseSource, UpdateChannel, UpdateSettings};
pub use coordinator::{EXECUTOR_NAME, PendingUpdate, UpdateCoordinator};
pub use error::{ErrorClass, ExitStatus, Result, UpdateError};
pub use executor::{Executor, Outcome, UpdateReport, UpdateRequest};
pub use journal::AttemptLog;
pub use package::{PackageKind, PackageLocator, UpdatePackage};
pub use target::{InstallationTarget, Recovery};
pub use version::Version;

/// Current application version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GitHub organisation publishing releases.
pub const REPO_OWNER: &str = "stonehenge-collective";

/// Repository holding production releases.
pub const REPO_NAME: &str = "bazaar-buddy-client";

/// Repository holding test releases.
pub const TEST_REPO_NAME: &str = "bazaar-buddy-client-test";

/// Per-user directories of the application.
pub(crate) fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "StonehengeCollective", "BazaarBuddy")
}
