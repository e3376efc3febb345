//! Turn the staged package into a staged executable.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{Result, UpdateError};
use crate::package::PackageKind;

/// Sub-directory of the staging area holding the ready-to-install executable.
const STAGED_BIN_DIR: &str = "bin";

/// Produces the executable to install from the staged package.
///
/// A bare executable is moved into place; archives are searched for an entry
/// whose file name equals `executable_name`. The result lives in
/// `<staging_dir>/bin/<executable_name>` and is marked executable on Unix.
pub fn stage_executable(
    package: &Path,
    kind: PackageKind,
    executable_name: &OsStr,
    staging_dir: &Path,
) -> Result<PathBuf> {
    let bin_dir = staging_dir.join(STAGED_BIN_DIR);
    fs::create_dir_all(&bin_dir).map_err(|e| {
        UpdateError::ArchiveExtraction(format!("Failed to create {}: {e}", bin_dir.display()))
    })?;
    let dest = bin_dir.join(executable_name);

    match kind {
        PackageKind::Executable => {
            fs::rename(package, &dest).map_err(|e| {
                UpdateError::InvalidPackage(format!("Failed to stage {}: {e}", package.display()))
            })?;
        }
        PackageKind::Zip => extract_zip(package, executable_name, &dest)?,
        PackageKind::TarGz => extract_tar_gz(package, executable_name, &dest)?,
    }

    mark_executable(&dest)?;
    tracing::debug!("Staged executable at {}", dest.display());
    Ok(dest)
}

fn extract_zip(package: &Path, executable_name: &OsStr, dest: &Path) -> Result<()> {
    tracing::debug!("Extracting {:?} from ZIP archive", executable_name);

    let file = File::open(package)
        .map_err(|e| UpdateError::ArchiveExtraction(format!("{}: {e}", package.display())))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !entry_matches(entry.name(), executable_name) {
            continue;
        }
        write_entry(&mut entry, dest)?;
        return Ok(());
    }

    Err(UpdateError::ArchiveExtraction(format!(
        "{executable_name:?} not found in ZIP archive"
    )))
}

fn extract_tar_gz(package: &Path, executable_name: &OsStr, dest: &Path) -> Result<()> {
    tracing::debug!("Extracting {:?} from tar.gz archive", executable_name);

    let file = File::open(package)
        .map_err(|e| UpdateError::ArchiveExtraction(format!("{}: {e}", package.display())))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let entries = archive
        .entries()
        .map_err(|e| UpdateError::ArchiveExtraction(format!("Failed to read tar entries: {e}")))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| UpdateError::ArchiveExtraction(format!("Failed to read tar entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| UpdateError::ArchiveExtraction(format!("Failed to read entry path: {e}")))?
            .into_owned();
        if !entry_matches(&path.to_string_lossy(), executable_name) {
            continue;
        }
        write_entry(&mut entry, dest)?;
        return Ok(());
    }

    Err(UpdateError::ArchiveExtraction(format!(
        "{executable_name:?} not found in tar.gz archive"
    )))
}

/// Archive entry names always use `/`; match on the last component only.
fn entry_matches(entry_name: &str, executable_name: &OsStr) -> bool {
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .is_some_and(|name| OsStr::new(name) == executable_name)
}

fn write_entry(reader: &mut impl io::Read, dest: &Path) -> Result<()> {
    let mut out = File::create(dest).map_err(|e| {
        UpdateError::ArchiveExtraction(format!("Failed to create {}: {e}", dest.display()))
    })?;
    io::copy(reader, &mut out)
        .and_then(|_| out.sync_all())
        .map_err(|e| UpdateError::ArchiveExtraction(format!("Failed to extract binary: {e}")))
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
        UpdateError::InvalidPackage(format!("Failed to set permissions on {}: {e}", path.display()))
    })
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_entry_matches_last_component() {
        let name = OsStr::new("BazaarBuddy");
        assert!(entry_matches("BazaarBuddy", name));
        assert!(entry_matches("dist/BazaarBuddy", name));
        assert!(!entry_matches("dist/BazaarBuddy.pdb", name));
        assert!(!entry_matches("BazaarBuddy/", name));
    }

    #[test]
    fn test_stage_bare_executable() {
        let staging = tempfile::tempdir().unwrap();
        let package = staging.path().join("download");
        fs::write(&package, b"binary").unwrap();

        let staged = stage_executable(
            &package,
            PackageKind::Executable,
            OsStr::new("BazaarBuddy"),
            staging.path(),
        )
        .unwrap();

        assert_eq!(staged, staging.path().join("bin").join("BazaarBuddy"));
        assert_eq!(fs::read(&staged).unwrap(), b"binary");
        assert!(!package.exists());
    }

    #[test]
    fn test_stage_from_zip() {
        let staging = tempfile::tempdir().unwrap();
        let package = staging.path().join("BazaarBuddy.zip");
        write_zip(
            &package,
            &[("README.txt", b"notes"), ("dist/BazaarBuddy", b"zipped binary")],
        );

        let staged = stage_executable(&package, PackageKind::Zip, OsStr::new("BazaarBuddy"), staging.path())
            .unwrap();
        assert_eq!(fs::read(&staged).unwrap(), b"zipped binary");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&staged).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_stage_from_tar_gz() {
        let staging = tempfile::tempdir().unwrap();
        let package = staging.path().join("bb-linux.tar.gz");
        write_tar_gz(&package, &[("bb/BazaarBuddy", b"tarred binary")]);

        let staged = stage_executable(&package, PackageKind::TarGz, OsStr::new("BazaarBuddy"), staging.path())
            .unwrap();
        assert_eq!(fs::read(&staged).unwrap(), b"tarred binary");
    }

    #[test]
    fn test_archive_without_executable() {
        let staging = tempfile::tempdir().unwrap();
        let package = staging.path().join("BazaarBuddy.zip");
        write_zip(&package, &[("other", b"x")]);

        let result = stage_executable(&package, PackageKind::Zip, OsStr::new("BazaarBuddy"), staging.path());
        assert!(matches!(result, Err(UpdateError::ArchiveExtraction(_))));
    }

    #[test]
    fn test_corrupt_zip() {
        let staging = tempfile::tempdir().unwrap();
        let package = staging.path().join("BazaarBuddy.zip");
        fs::write(&package, b"definitely not a zip").unwrap();

        let result = stage_executable(&package, PackageKind::Zip, OsStr::new("BazaarBuddy"), staging.path());
        assert!(matches!(result, Err(UpdateError::ArchiveExtraction(_))));
    }
}
