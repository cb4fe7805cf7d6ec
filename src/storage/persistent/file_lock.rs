//! Advisory lock files guarding one ledger file each.
//!
//! A ledger `foo.ledger` is guarded by `foo.ledger.lock` in the same
//! directory, so a version ledger and a strategy ledger can share a directory
//! while two processes can never migrate the same ledger at once. The lock is
//! released when the [`FileLock`] is dropped; the lock file itself stays.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::storage::traits::StorageError;

/// Exclusive, non-blocking lock held for the lifetime of the value.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Locks `dir/lock_name`, creating the lock file if needed.
    ///
    /// # Errors
    /// - `Locked`: the lock is held elsewhere, including by another open
    ///   ledger in this process
    /// - `Io`: the lock file cannot be opened or the platform has no locking
    pub fn acquire(dir: &Path, lock_name: &str) -> Result<Self, StorageError> {
        let path = dir.join(lock_name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if !try_lock_exclusive(&file)? {
            return Err(StorageError::Locked(path.display().to_string()));
        }
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns `Ok(false)` when someone else holds the lock.
#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and open for the whole call.
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data.
    let locked = unsafe {
        let mut overlapped = std::mem::zeroed::<OVERLAPPED>();
        LockFileEx(
            file.as_raw_handle() as HANDLE,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };
    if locked != 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == i32::try_from(ERROR_LOCK_VIOLATION).ok() {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(any(unix, windows)))]
fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "ledger locking is not available on this platform; set `lock: false`",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_released_on_drop() {
        let dir = tempdir().unwrap();

        let lock = FileLock::acquire(dir.path(), "applied-versions.ledger.lock").unwrap();
        assert!(lock.path().exists());
        drop(lock);

        FileLock::acquire(dir.path(), "applied-versions.ledger.lock").unwrap();
    }

    #[test]
    fn test_second_holder_gets_locked_error() {
        let dir = tempdir().unwrap();
        let _held = FileLock::acquire(dir.path(), "applied-versions.ledger.lock").unwrap();

        let err = FileLock::acquire(dir.path(), "applied-versions.ledger.lock").unwrap_err();
        match err {
            StorageError::Locked(path) => assert!(path.ends_with("applied-versions.ledger.lock")),
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[test]
    fn test_ledgers_sharing_a_directory_do_not_conflict() {
        let dir = tempdir().unwrap();

        let _versions = FileLock::acquire(dir.path(), "applied-versions.ledger.lock").unwrap();
        let _strategies = FileLock::acquire(dir.path(), "migration-strategies.ledger.lock").unwrap();
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let err = FileLock::acquire(&dir.path().join("absent"), "x.lock").unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
