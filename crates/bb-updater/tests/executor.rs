//! End-to-end runs of the executor state machine against scratch installs.

mod common;

use std::fs;
use std::io::Write;
use std::sync::atomic::Ordering;

use bb_updater::steps::replace::CopyVerifyReplace;
use bb_updater::steps::verify::compute_sha256;
use bb_updater::{
    AttemptLog, Executor, ExitStatus, Outcome, UpdateRequest, UpdateState,
};

use common::{
    APP, AlwaysBusy, DeniedReplace, FailingLauncher, Fixture, NEW_BUILD, OLD_BUILD,
    RecordingLauncher, closed_port_url, ok_response, serve_once,
};

const HAPPY_PATH: [UpdateState; 9] = [
    UpdateState::Preparing,
    UpdateState::Downloading,
    UpdateState::Validating,
    UpdateState::WaitingForExit,
    UpdateState::BackingUp,
    UpdateState::Replacing,
    UpdateState::Relaunching,
    UpdateState::CleaningUp,
    UpdateState::Done,
];

fn executor(fixture: &Fixture, package: &str) -> Executor {
    Executor::new(
        fixture.config(),
        UpdateRequest::new(package, fixture.executable()),
        AttemptLog::open(fixture.journal_path()).unwrap(),
    )
}

#[test]
fn fresh_install_visits_every_state() {
    let fixture = Fixture::new();
    let package = fixture.bare_package();
    let launcher = RecordingLauncher::default();

    let report = executor(&fixture, &package.to_string_lossy())
        .with_launcher(launcher.clone())
        .run();

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.attempt.states(), HAPPY_PATH.to_vec());
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
    assert_eq!(fixture.install_entries(), vec![APP.to_string()]);
    assert!(fixture.staging_entries().is_empty());
    assert_eq!(*launcher.launched.lock().unwrap(), vec![fixture.target().executable().to_path_buf()]);

    let journal = fixture.journal();
    for state in HAPPY_PATH {
        assert!(journal.contains(&format!("state={state} ")), "missing {state}");
    }
    assert!(journal.contains("nothing installed, backup skipped"));
}

#[test]
fn update_over_http_with_digest() {
    let fixture = Fixture::installed();
    let (base, server) = serve_once(ok_response(NEW_BUILD));
    let url = format!("{base}/releases/download/v0.5.0/{APP}");

    let report = Executor::new(
        fixture.config(),
        UpdateRequest::new(url, fixture.executable())
            .with_sha256(format!("sha256:{}", compute_sha256(NEW_BUILD))),
        AttemptLog::open(fixture.journal_path()).unwrap(),
    )
    .with_launcher(RecordingLauncher::default())
    .run();
    server.join().unwrap();

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(report.attempt.current(), Some(UpdateState::Done));
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
    assert!(!fixture.backup().exists());
    assert!(!fixture.lock_file().exists());
}

#[test]
fn unreachable_package_leaves_install_untouched() {
    let fixture = Fixture::installed();
    let url = closed_port_url(APP);

    let report = executor(&fixture, &url)
        .with_launcher(RecordingLauncher::default())
        .run();

    assert_eq!(report.exit_status(), ExitStatus::DownloadFailed);
    assert!(report.attempt.visited_in_order(&[UpdateState::Downloading, UpdateState::DownloadFailed]));
    assert!(!report.attempt.visited(UpdateState::WaitingForExit));
    assert_eq!(fs::read(fixture.executable()).unwrap(), OLD_BUILD);
    assert_eq!(fixture.install_entries(), vec![APP.to_string()]);
    assert!(fixture.staging_entries().is_empty());
    assert!(fixture.journal().contains("state=DownloadFailed"));
}

#[test]
fn failed_replace_restores_original_bytes() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();

    let report = executor(&fixture, &package.to_string_lossy())
        .with_replace_strategy(DeniedReplace)
        .with_launcher(RecordingLauncher::default())
        .run();

    assert_eq!(report.exit_status(), ExitStatus::ReplaceFailed);
    assert_eq!(report.exit_code(), 8);
    assert!(report.attempt.visited_in_order(&[
        UpdateState::BackingUp,
        UpdateState::Replacing,
        UpdateState::RollingBack,
        UpdateState::ReplaceFailed,
    ]));
    assert_eq!(fs::read(fixture.executable()).unwrap(), OLD_BUILD);
    assert_eq!(fixture.install_entries(), vec![APP.to_string()]);
    assert!(!report.attempt.visited(UpdateState::Relaunching));
}

#[test]
fn locked_executable_times_out_without_changes() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();
    let probe = AlwaysBusy::default();

    let report = executor(&fixture, &package.to_string_lossy())
        .with_probe(probe.clone())
        .with_launcher(RecordingLauncher::default())
        .run();

    assert_eq!(report.exit_status(), ExitStatus::WaitTimeout);
    assert_eq!(report.attempt.current(), Some(UpdateState::WaitTimedOut));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    assert_eq!(fs::read(fixture.executable()).unwrap(), OLD_BUILD);
    assert_eq!(fixture.install_entries(), vec![APP.to_string()]);
    assert!(fixture.journal().contains("sharing violation"));
}

#[test]
fn checksum_mismatch_is_rejected_before_backup() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();

    let report = Executor::new(
        fixture.config(),
        UpdateRequest::new(package.to_string_lossy(), fixture.executable())
            .with_sha256(compute_sha256(b"some other build")),
        AttemptLog::disabled(),
    )
    .with_launcher(RecordingLauncher::default())
    .run();

    assert_eq!(report.exit_status(), ExitStatus::ValidationFailed);
    assert_eq!(report.attempt.current(), Some(UpdateState::ValidateFailed));
    assert!(!report.attempt.visited(UpdateState::BackingUp));
    assert_eq!(fs::read(fixture.executable()).unwrap(), OLD_BUILD);
    assert!(fixture.staging_entries().is_empty());
}

#[test]
fn malformed_digest_is_rejected_before_download() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();

    let report = Executor::new(
        fixture.config(),
        UpdateRequest::new(package.to_string_lossy(), fixture.executable()).with_sha256("not-hex"),
        AttemptLog::open(fixture.journal_path()).unwrap(),
    )
    .with_launcher(RecordingLauncher::default())
    .run();

    assert_eq!(report.exit_status(), ExitStatus::PackageMissing);
    assert_eq!(report.exit_code(), 3);
    assert_eq!(
        report.attempt.states(),
        vec![UpdateState::Preparing, UpdateState::InputRejected]
    );
    assert!(!report.attempt.visited(UpdateState::Downloading));
    assert_eq!(fs::read(fixture.executable()).unwrap(), OLD_BUILD);
    assert!(fixture.staging_entries().is_empty());
    assert!(fixture.journal().contains("invalid package digest"));
}

#[test]
fn url_ending_in_bin_is_staged_and_installed() {
    let fixture = Fixture::installed();
    let (base, server) = serve_once(ok_response(NEW_BUILD));
    let url = format!("{base}/releases/download/v0.5.0/bin");

    let report = executor(&fixture, &url)
        .with_launcher(RecordingLauncher::default())
        .run();
    server.join().unwrap();

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
    assert_eq!(fixture.install_entries(), vec![APP.to_string()]);
}

#[test]
fn rerun_with_same_package_is_a_no_op() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();
    let locator = package.to_string_lossy().into_owned();

    let first = executor(&fixture, &locator)
        .with_launcher(RecordingLauncher::default())
        .run();
    assert!(matches!(first.result, Ok(Outcome::Installed)));

    let launcher = RecordingLauncher::default();
    let second = executor(&fixture, &locator)
        .with_launcher(launcher.clone())
        .run();

    assert!(matches!(second.result, Ok(Outcome::AlreadyCurrent)));
    assert_eq!(second.exit_code(), 0);
    assert!(!second.attempt.visited(UpdateState::WaitingForExit));
    assert!(!second.attempt.visited(UpdateState::BackingUp));
    assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
    assert_eq!(fixture.install_entries(), vec![APP.to_string()]);
    assert!(fixture.journal().contains("already up to date"));
}

#[test]
fn second_executor_is_refused_while_locked() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();
    fs::write(fixture.lock_file(), "pid=1 since=now\n").unwrap();

    let report = executor(&fixture, &package.to_string_lossy())
        .with_launcher(RecordingLauncher::default())
        .run();

    assert_eq!(report.exit_status(), ExitStatus::Locked);
    assert_eq!(report.attempt.current(), Some(UpdateState::Locked));
    assert_eq!(fs::read(fixture.executable()).unwrap(), OLD_BUILD);
    // The foreign lock is left for its owner.
    assert!(fixture.lock_file().exists());
}

#[test]
fn launch_failure_keeps_new_build_and_backup() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();

    let report = executor(&fixture, &package.to_string_lossy())
        .with_launcher(FailingLauncher)
        .run();

    assert_eq!(report.exit_status(), ExitStatus::LaunchFailed);
    assert_eq!(report.attempt.current(), Some(UpdateState::LaunchFailed));
    assert!(!report.attempt.visited(UpdateState::RollingBack));
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
    assert_eq!(fs::read(fixture.backup()).unwrap(), OLD_BUILD);
    assert!(fixture.staging_entries().is_empty());

    // The next run's recovery drops the leftover backup.
    let recovery = fixture.target().recover().unwrap();
    assert!(recovery.removed_stale_backup);
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
}

#[test]
fn relaunch_can_be_disabled() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();
    let launcher = RecordingLauncher::default();

    let mut config = fixture.config();
    config.relaunch = false;
    let report = Executor::new(
        config,
        UpdateRequest::new(package.to_string_lossy(), fixture.executable()),
        AttemptLog::disabled(),
    )
    .with_launcher(launcher.clone())
    .run();

    assert!(report.is_success());
    assert!(launcher.launched.lock().unwrap().is_empty());
    let relaunch = report
        .attempt
        .transitions()
        .iter()
        .find(|t| t.state == UpdateState::Relaunching)
        .unwrap();
    assert!(relaunch.detail.contains("skipped"));
}

#[test]
fn zip_package_is_unpacked() {
    let fixture = Fixture::installed();
    let package = fixture.source.path().join("BazaarBuddy.zip");
    let file = fs::File::create(&package).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("BazaarBuddy/README.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"readme").unwrap();
    zip.start_file(format!("BazaarBuddy/{APP}"), zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(NEW_BUILD).unwrap();
    zip.finish().unwrap();

    let report = executor(&fixture, &package.to_string_lossy())
        .with_launcher(RecordingLauncher::default())
        .run();

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
}

#[test]
fn copy_strategy_installs_through_partial_file() {
    let fixture = Fixture::installed();
    let package = fixture.bare_package();

    let report = executor(&fixture, &package.to_string_lossy())
        .with_replace_strategy(CopyVerifyReplace)
        .with_launcher(RecordingLauncher::default())
        .run();

    assert!(report.is_success(), "{:?}", report.result);
    assert_eq!(fs::read(fixture.executable()).unwrap(), NEW_BUILD);
    assert_eq!(fixture.install_entries(), vec![APP.to_string()]);
}

#[test]
fn missing_install_directory_is_rejected() {
    let fixture = Fixture::new();
    let package = fixture.bare_package();
    let exe = fixture.install.path().join("missing").join(APP);

    let report = Executor::new(
        fixture.config(),
        UpdateRequest::new(package.to_string_lossy(), exe),
        AttemptLog::disabled(),
    )
    .run();

    assert_eq!(report.exit_status(), ExitStatus::TargetDirMissing);
    assert_eq!(report.attempt.current(), Some(UpdateState::InputRejected));
}

#[test]
fn journal_appends_across_attempts() {
    let fixture = Fixture::installed();
    let missing = fixture.source.path().join("missing.zip");

    for _ in 0..2 {
        executor(&fixture, &missing.to_string_lossy()).run();
    }

    let journal = fixture.journal();
    assert_eq!(journal.matches("=== attempt=").count(), 2);
    assert_eq!(journal.matches("state=InputRejected").count(), 2);
    assert!(journal.lines().all(|line| line.starts_with('[')));
}
