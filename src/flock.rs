use std::{
    fs::File,
    path::Path,
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// An exclusive advisory lock, held until dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Timed out after {timeout:?} waiting for a lock on {path}")]
    Timeout { path: String, timeout: Duration },
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl FileLock {
    /// Blocks until the lock on `path` is acquired or `timeout` elapses.
    pub fn new(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file = File::create(path)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => return Ok(Self { _file: file }),
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() =>
                {
                    if start.elapsed() >= timeout {
                        return Err(LockError::Timeout {
                            path: path.display().to_string(),
                            timeout,
                        });
                    }
                    debug!("Failed to acquire a lock on {}, retrying", path.display());
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        let _held = FileLock::new(&path, Duration::ZERO).unwrap();
        let error = FileLock::new(&path, Duration::ZERO).err().unwrap();
        assert!(matches!(error, LockError::Timeout { .. }));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        drop(FileLock::new(&path, Duration::ZERO).unwrap());
        assert!(FileLock::new(&path, Duration::ZERO).is_ok());
    }
}
