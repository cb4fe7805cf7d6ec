//! Atomic file replacement.
//!
//! Writes go to a uniquely named temp file in the target's directory, are
//! flushed and fsynced, then renamed over the target. A crash at any point
//! leaves either the old or the new file, never a torn one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp.";

fn split_target(target: &Path) -> IoResult<(&Path, &str)> {
    let dir = target
        .parent()
        .ok_or_else(|| IoError::new(ErrorKind::InvalidInput, "target has no parent directory"))?;
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IoError::new(ErrorKind::InvalidInput, "target has no UTF-8 file name"))?;
    Ok((dir, name))
}

/// Removes the temp file unless the write was committed.
struct TempFile {
    path: Option<PathBuf>,
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(ref path) = self.path {
            if path.exists() {
                let _ = fs::remove_file(path);
            }
        }
    }
}

/// Atomically replaces `target` with `bytes`.
///
/// With `sync` the temp file and the parent directory are fsynced, making the
/// new content durable once this returns.
///
/// # Errors
/// Any I/O failure; `target` is left untouched in that case.
pub fn atomic_write(target: &Path, bytes: &[u8], sync: bool) -> IoResult<()> {
    let (dir, name) = split_target(target)?;
    let temp_path = dir.join(format!("{name}{TEMP_MARKER}{}", Uuid::new_v4()));
    let mut guard = TempFile {
        path: Some(temp_path.clone()),
    };

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    if sync {
        writer.get_ref().sync_all()?;
    }
    drop(writer);

    fs::rename(&temp_path, target)?;
    guard.path = None;

    if sync {
        sync_dir(dir)?;
    }
    Ok(())
}

/// Deletes leftover temp files for `target` from an interrupted write.
///
/// Returns how many were removed.
pub fn remove_stale_temp_files(target: &Path) -> IoResult<usize> {
    let (dir, name) = split_target(target)?;
    if !dir.exists() {
        return Ok(0);
    }

    let prefix = format!("{name}{TEMP_MARKER}");
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_stale = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(&prefix));
        if is_stale {
            debug!(path = %entry.path().display(), "removing stale ledger temp file");
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> IoResult<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> IoResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_creates_and_replaces() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("ledger");

        atomic_write(&target, b"one", true).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"one");

        atomic_write(&target, b"two", false).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("missing-dir").join("ledger");
        assert!(atomic_write(&target, b"x", true).is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_remove_stale_temp_files() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("ledger");
        fs::write(dir.path().join("ledger.tmp.abc"), b"torn").unwrap();
        fs::write(dir.path().join("other.tmp.abc"), b"keep").unwrap();
        fs::write(&target, b"good").unwrap();

        assert_eq!(remove_stale_temp_files(&target).unwrap(), 1);
        assert!(dir.path().join("other.tmp.abc").exists());
        assert_eq!(fs::read(&target).unwrap(), b"good");
    }
}
