//! core::lock
//!
//! Exclusive ownership lock for a working directory.
//!
//! # Architecture
//!
//! One sync engine owns one working directory. The in-process staging lock
//! in [`crate::sync`] serializes operations inside a process; this lock keeps
//! a second process (or a second engine in the same process) from driving
//! the same repository at the same time.
//!
//! # Storage
//!
//! - `<work_dir>/.git/gitshelf.lock` - Lock file with OS-level exclusive lock
//!
//! # Invariants
//!
//! - Lock is held from successful initialization until `destroy`
//! - Lock is automatically released on drop (RAII pattern)
//! - Acquisition is non-blocking (fails fast if locked)

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::core::paths::StorePaths;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another engine already owns the working directory.
    #[error("working directory is locked by another gitshelf engine: {0}")]
    AlreadyLocked(PathBuf),

    /// The control directory does not exist yet.
    #[error("cannot lock uninitialized working directory: {0}")]
    NotInitialized(PathBuf),

    /// Failed to create the lock file.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock on a working directory.
///
/// Released when dropped.
#[derive(Debug)]
pub struct WorkDirLock {
    path: PathBuf,
    file: Option<File>,
}

impl WorkDirLock {
    /// Attempt to acquire the lock for `paths`.
    ///
    /// # Errors
    ///
    /// - [`LockError::NotInitialized`] if `.git` is missing
    /// - [`LockError::AlreadyLocked`] if another holder exists
    /// - [`LockError::CreateFailed`] / [`LockError::AcquireFailed`] on I/O failure
    pub fn acquire(paths: &StorePaths) -> Result<Self, LockError> {
        let git_dir = paths.git_dir();
        if !git_dir.is_dir() {
            return Err(LockError::NotInitialized(paths.work_dir().to_path_buf()));
        }

        let path = paths.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(LockError::AlreadyLocked(paths.work_dir().to_path_buf()))
            }
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Whether this guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock before the guard is dropped.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            FileExt::unlock(&file)
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WorkDirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}
