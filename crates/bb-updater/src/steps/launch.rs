//! Start a process that outlives the one starting it.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Tells a PyInstaller one-file bootloader to start from a clean environment
/// instead of reusing the inherited extraction directory of the old build.
pub const RESET_ENVIRONMENT_VAR: &str = "PYINSTALLER_RESET_ENVIRONMENT";

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Starts the updated application.
pub trait Launcher: Send {
    /// Starts `executable` and returns its process id.
    fn launch(&self, executable: &Path) -> io::Result<u32>;
}

/// Spawns the executable detached from the executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&self, executable: &Path) -> io::Result<u32> {
        tracing::info!("Relaunching application: {}", executable.display());
        let no_args: [&OsStr; 0] = [];
        let mut command = detached_command(executable, no_args);
        command.env(RESET_ENVIRONMENT_VAR, "1");
        spawn(command, executable)
    }
}

/// Spawns `program` in its own process group with null stdio.
///
/// The child is not waited on; it keeps running after the caller exits.
/// Its working directory is the program's own directory.
pub fn spawn_detached<I, S>(program: &Path, args: I) -> io::Result<u32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    spawn(detached_command(program, args), program)
}

fn detached_command<I, S>(program: &Path, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    command
}

fn spawn(mut command: Command, program: &Path) -> io::Result<u32> {
    let child = command.spawn()?;
    let pid = child.id();
    tracing::debug!("Spawned {} as pid {pid}", program.display());
    Ok(pid)
}
