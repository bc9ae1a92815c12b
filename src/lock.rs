//! Single-writer advisory lock shared by the daemon and manual `sync` runs.
//!
//! The lock is an exclusive, non-blocking `flock` on a file in the state
//! directory. It is released when the [`SyncLock`] is dropped (closing the
//! descriptor releases the `flock`).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Held lock on the sync lock file.
#[derive(Debug)]
pub struct SyncLock {
    _file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(None)` when another process or another open descriptor in
    /// this process holds it. The parent directory is created if missing.
    pub fn try_acquire(path: &Path) -> SyncResult<Option<SyncLock>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::state(parent, format!("cannot create lock directory: {}", e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| SyncError::state(path, format!("cannot open lock file: {}", e)))?;

        match try_flock_exclusive(&file) {
            Ok(true) => Ok(Some(SyncLock {
                _file: file,
                path: path.to_path_buf(),
            })),
            Ok(false) => Ok(None),
            Err(e) => Err(SyncError::state(path, format!("flock failed: {}", e))),
        }
    }

    /// Take the lock or fail with [`SyncError::LockHeld`].
    pub fn acquire(path: &Path) -> SyncResult<SyncLock> {
        Self::try_acquire(path)?.ok_or_else(|| SyncError::LockHeld {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    // SAFETY: fd is a valid descriptor owned by `file` for the whole call.
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}
