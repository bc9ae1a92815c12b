//! Atomic replacement and backups of the auth file.

use chrono::Utc;
use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Mode of every auth file written.
pub const AUTH_FILE_MODE: u32 = 0o600;

/// Replace `path` with `contents` without readers ever seeing a partial file.
///
/// The new file is written to a temporary file in the same directory,
/// restricted to [`AUTH_FILE_MODE`], chowned to `owner` when given (else to
/// the owner of the file being replaced), fsynced and renamed over `path`.
pub fn write_atomically(path: &Path, contents: &str, owner: Option<&str>) -> SyncResult<()> {
    write_atomically_with(path, contents, owner, |_| Ok(()))
}

/// [`write_atomically`] with a hook run on the temporary file just before the
/// rename. An error from the hook abandons the write.
pub(crate) fn write_atomically_with<F>(
    path: &Path,
    contents: &str,
    owner: Option<&str>,
    before_rename: F,
) -> SyncResult<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let write_err = |source: io::Error| SyncError::AuthFileWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".pgbsync-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;

    fs::set_permissions(tmp.path(), Permissions::from_mode(AUTH_FILE_MODE)).map_err(|e| {
        SyncError::Permissions {
            path: path.to_path_buf(),
            message: format!("cannot set mode {:o}: {}", AUTH_FILE_MODE, e),
        }
    })?;
    let chowned = match owner {
        Some(owner) => chown_to_user(tmp.path(), owner),
        None => keep_existing_owner(path, tmp.path()),
    };
    chowned.map_err(|message| SyncError::Permissions {
        path: path.to_path_buf(),
        message,
    })?;

    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    before_rename(tmp.path()).map_err(write_err)?;

    tmp.persist(path).map_err(|e| write_err(e.error))?;

    // Directory fsync makes the rename durable; failure leaves a valid file.
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
    Ok(())
}

/// Give `path` to `owner` and their primary group.
fn chown_to_user(path: &Path, owner: &str) -> Result<(), String> {
    let user = nix::unistd::User::from_name(owner)
        .map_err(|e| format!("cannot look up user '{}': {}", owner, e))?
        .ok_or_else(|| format!("user '{}' does not exist", owner))?;
    nix::unistd::chown(path, Some(user.uid), Some(user.gid))
        .map_err(|e| format!("cannot chown to '{}': {}", owner, e))
}

/// Give `tmp` the uid/gid of `original`, if it exists.
///
/// The proxy usually reads the file as its own user, so a rewrite by the
/// daemon must not change who owns it.
fn keep_existing_owner(original: &Path, tmp: &Path) -> Result<(), String> {
    let wanted = match fs::metadata(original) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(format!("cannot stat {}: {}", original.display(), e)),
    };
    let current = fs::metadata(tmp).map_err(|e| format!("cannot stat temporary file: {}", e))?;
    if current.uid() == wanted.uid() && current.gid() == wanted.gid() {
        return Ok(());
    }
    nix::unistd::chown(
        tmp,
        Some(nix::unistd::Uid::from_raw(wanted.uid())),
        Some(nix::unistd::Gid::from_raw(wanted.gid())),
    )
    .map_err(|e| {
        format!(
            "cannot keep owner {}:{} of {}: {}",
            wanted.uid(),
            wanted.gid(),
            original.display(),
            e
        )
    })
}

/// Copy `path` to `<backup_dir>/<file name>.<YYYYmmddTHHMMSS.ffffff>.bak`.
///
/// An existing backup is never overwritten; a numeric suffix is added on a
/// name collision. Returns `Ok(None)` when there is nothing to back up.
pub fn backup_file(path: &Path, backup_dir: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "auth file has no name"))?
        .to_string_lossy();

    fs::create_dir_all(backup_dir)?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f").to_string();

    let mut source = fs::File::open(path)?;
    for attempt in 0u32.. {
        let name = match attempt {
            0 => format!("{}.{}.bak", file_name, stamp),
            n => format!("{}.{}-{}.bak", file_name, stamp, n),
        };
        let backup_path = backup_dir.join(name);
        let mut dest = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(AUTH_FILE_MODE)
            .open(&backup_path)
        {
            Ok(dest) => dest,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };
        io::copy(&mut source, &mut dest)?;
        dest.sync_all()?;
        return Ok(Some(backup_path));
    }
    Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free backup name"))
}

/// Delete the oldest backups of `file_name` beyond `retention`.
///
/// A retention of 0 keeps every backup. Returns the number removed.
pub fn prune_backups(backup_dir: &Path, file_name: &str, retention: usize) -> io::Result<usize> {
    if retention == 0 || !backup_dir.exists() {
        return Ok(0);
    }
    let prefix = format!("{}.", file_name);
    let mut backups: Vec<PathBuf> = fs::read_dir(backup_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy())
                .map(|n| n.starts_with(&prefix) && n.ends_with(".bak"))
                .unwrap_or(false)
        })
        .collect();

    if backups.len() <= retention {
        return Ok(0);
    }
    // Timestamps sort lexicographically; compare without ".bak" so a
    // collision suffix sorts after its base name.
    backups.sort_by_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().trim_end_matches(".bak").to_string())
            .unwrap_or_default()
    });
    let excess = backups.len() - retention;
    for old in &backups[..excess] {
        fs::remove_file(old)?;
    }
    Ok(excess)
}
