//! Process lock file
//!
//! sled takes an exclusive file lock on its database, so a second `update`
//! or `detect` against the same store would fail half-way in. The PID lock
//! turns that into a clear error before anything is opened.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// PID lock in the store's parent directory, released on drop.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".raid-detector.lock";

    /// Acquire the lock in `data_dir`, creating the directory if needed.
    ///
    /// Fails if a live raid-detector process holds it. A lock left behind by
    /// a dead process is removed.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Ok(Some(pid)) => {
                    bail!(
                        "Another raid-detector run is in progress (PID: {})\n\
                         If no such process exists, remove the stale lock file: {}",
                        pid,
                        lock_path.display()
                    );
                }
                Ok(None) => {
                    tracing::info!(path = %lock_path.display(), "Removing stale lock file");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable lock file, replacing it");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let mut file = match Self::create_exclusive(&lock_path) {
            Ok(file) => file,
            // Another run created it after the check above
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                bail!(
                    "Another raid-detector run is in progress (lock created concurrently)\n\
                     If no such process exists, remove the stale lock file: {}",
                    lock_path.display()
                );
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to create lock file: {}", lock_path.display()));
            }
        };
        writeln!(file, "{pid}").context("Failed to write PID to lock file")?;

        tracing::debug!(pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// Create `path`, failing with `AlreadyExists` if it is already there.
    fn create_exclusive(path: &Path) -> io::Result<File> {
        File::options().write(true).create_new(true).open(path)
    }

    /// PID of a running raid-detector holding the lock, `None` if stale.
    fn holder(lock_path: &Path) -> Result<Option<u32>> {
        let contents = fs::read_to_string(lock_path).context("Failed to read lock file")?;
        let pid: u32 = contents
            .trim()
            .parse()
            .context("Failed to parse PID from lock file")?;

        Ok(Self::is_detector_running(pid).then_some(pid))
    }

    #[cfg(unix)]
    fn is_detector_running(pid: u32) -> bool {
        // A recycled PID belonging to something else counts as stale
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("raid-detector") || cmdline.contains("raid_detector"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_detector_running(_pid: u32) -> bool {
        true
    }

    /// Remove the lock file. Idempotent.
    pub fn release(&mut self) {
        if self.owned {
            match fs::remove_file(&self.lock_path) {
                Ok(()) => tracing::debug!(path = %self.lock_path.display(), "Released process lock"),
                Err(e) => tracing::warn!(error = %e, "Failed to remove lock file"),
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempdir().unwrap();
        let lock = ProcessLock::acquire(dir.path()).unwrap();
        let pid: u32 = fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let lock_path = {
            let lock = ProcessLock::acquire(dir.path()).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!lock_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_acquire_fails_while_held() {
        // Test binaries are named raid_detector-<hash>, so our own PID counts as live
        let dir = tempdir().unwrap();
        let _held = ProcessLock::acquire(dir.path()).unwrap();
        let err = ProcessLock::acquire(dir.path()).unwrap_err();
        assert!(err.to_string().contains("already") || err.to_string().contains("in progress"));
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ProcessLock::LOCK_FILE_NAME), "999999999\n").unwrap();
        let lock = ProcessLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_garbage_lock_is_replaced() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ProcessLock::LOCK_FILE_NAME), "not a pid").unwrap();
        assert!(ProcessLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_exclusive_create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ProcessLock::LOCK_FILE_NAME);
        fs::write(&path, "4242\n").unwrap();

        let err = ProcessLock::create_exclusive(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        // The winner's PID is left untouched
        assert_eq!(fs::read_to_string(&path).unwrap(), "4242\n");
    }

    #[test]
    fn test_exclusive_create_only_one_winner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ProcessLock::LOCK_FILE_NAME);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || ProcessLock::create_exclusive(&path).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let _lock = ProcessLock::acquire(&nested).unwrap();
        assert!(nested.join(ProcessLock::LOCK_FILE_NAME).exists());
    }
}
