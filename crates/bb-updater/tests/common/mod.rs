//! Shared fixtures for executor integration tests.

#![allow(dead_code)]

use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use bb_updater::ExecutorConfig;
use bb_updater::steps::launch::Launcher;
use bb_updater::steps::probe::{ProbeOutcome, ReleaseProbe};
use bb_updater::steps::replace::ReplaceStrategy;
use bb_updater::target::InstallationTarget;

pub const APP: &str = "BazaarBuddy";
pub const OLD_BUILD: &[u8] = b"BazaarBuddy 0.4.0 old build bytes";
pub const NEW_BUILD: &[u8] = b"BazaarBuddy 0.5.0 new build bytes, a little longer";

/// Scratch install directory, package source directory, and staging root.
pub struct Fixture {
    pub install: tempfile::TempDir,
    pub source: tempfile::TempDir,
    pub staging: tempfile::TempDir,
    pub logs: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            install: tempfile::tempdir().unwrap(),
            source: tempfile::tempdir().unwrap(),
            staging: tempfile::tempdir().unwrap(),
            logs: tempfile::tempdir().unwrap(),
        }
    }

    /// Fixture with the old build already installed.
    pub fn installed() -> Self {
        let fixture = Self::new();
        fs::write(fixture.executable(), OLD_BUILD).unwrap();
        fixture
    }

    pub fn executable(&self) -> PathBuf {
        self.install.path().join(APP)
    }

    pub fn backup(&self) -> PathBuf {
        self.install.path().join(format!("{APP}.old"))
    }

    pub fn lock_file(&self) -> PathBuf {
        self.install.path().join(format!("{APP}.update-lock"))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.logs.path().join("update-executor.log")
    }

    pub fn target(&self) -> InstallationTarget {
        InstallationTarget::from_executable(&self.executable(), "old").unwrap()
    }

    /// Writes the new build as a bare executable package and returns its path.
    pub fn bare_package(&self) -> PathBuf {
        let path = self.source.path().join(APP);
        fs::write(&path, NEW_BUILD).unwrap();
        path
    }

    /// Fast timings, staging inside the fixture.
    pub fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            probe_attempts: 3,
            probe_interval_ms: 1,
            connect_timeout_secs: 5,
            download_timeout_secs: 10,
            cleanup_delay_ms: 0,
            staging_dir: Some(self.staging.path().to_path_buf()),
            ..ExecutorConfig::default()
        }
    }

    /// Files left in the install directory, sorted.
    pub fn install_entries(&self) -> Vec<String> {
        list(self.install.path())
    }

    /// Entries left in the staging root.
    pub fn staging_entries(&self) -> Vec<String> {
        list(self.staging.path())
    }

    pub fn journal(&self) -> String {
        fs::read_to_string(self.journal_path()).unwrap_or_default()
    }
}

fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Records launches instead of starting processes.
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    pub launched: Arc<Mutex<Vec<PathBuf>>>,
}

impl Launcher for RecordingLauncher {
    fn launch(&self, executable: &Path) -> io::Result<u32> {
        self.launched.lock().unwrap().push(executable.to_path_buf());
        Ok(4242)
    }
}

/// Launcher whose spawn always fails.
pub struct FailingLauncher;

impl Launcher for FailingLauncher {
    fn launch(&self, _executable: &Path) -> io::Result<u32> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "exec format error"))
    }
}

/// Probe that never sees the executable released.
#[derive(Clone, Default)]
pub struct AlwaysBusy {
    pub calls: Arc<AtomicU32>,
}

impl ReleaseProbe for AlwaysBusy {
    fn try_release(&self, _target: &InstallationTarget) -> io::Result<ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "sharing violation"))
    }
}

/// Replace strategy that writes half the file and then fails.
pub struct DeniedReplace;

impl ReplaceStrategy for DeniedReplace {
    fn name(&self) -> &str {
        "denied"
    }

    fn replace(&self, staged: &Path, target: &InstallationTarget) -> io::Result<()> {
        let data = fs::read(staged)?;
        fs::write(target.executable(), &data[..data.len() / 2])?;
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "access is denied"))
    }
}

/// Serves exactly one HTTP response on 127.0.0.1 and returns the base URL.
pub fn serve_once(response: Vec<u8>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = stream.write_all(&response);
        let _ = stream.flush();
    });

    (format!("http://{addr}"), handle)
}

/// A complete `200 OK` response carrying `body`.
pub fn ok_response(body: &[u8]) -> Vec<u8> {
    response_with_length(body, body.len())
}

/// A `200 OK` response announcing `content_length` but sending `body`.
pub fn response_with_length(body: &[u8], content_length: usize) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {content_length}\r\nConnection: close\r\n\r\n"
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// URL on a local port nothing listens on.
pub fn closed_port_url(file: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/{file}")
}
