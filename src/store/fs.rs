//! store::fs
//!
//! Filesystem access relative to the working directory.
//!
//! All paths are `/`-separated and relative to the root. Paths that are
//! absolute, contain `..` or point into `.git` are rejected before any I/O.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::{validate_relative, PathError};

#[derive(Debug, Error)]
pub enum FsError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    fn io(path: &str, source: io::Error) -> Self {
        FsError::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// File operations scoped to one root directory.
pub trait FilesystemWrapper: Send + Sync + 'static {
    fn root(&self) -> &Path;

    fn read(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Write `bytes`, creating parent directories.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), FsError>;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// Remove a file or a whole directory tree.
    fn remove(&self, path: &str) -> Result<(), FsError>;

    /// Sorted entry names of a directory. Empty if it does not exist.
    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError>;
}

/// The local disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        validate_relative(path)?;
        Ok(self.root.join(path.trim_end_matches('/')))
    }
}

impl FilesystemWrapper for LocalFs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let full = self.resolve(path)?;
        fs::read(full).map_err(|e| FsError::io(path, e))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| FsError::io(path, e))?;
        }
        fs::write(full, bytes).map_err(|e| FsError::io(path, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn remove(&self, path: &str) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        let result = if full.is_dir() {
            fs::remove_dir_all(full)
        } else {
            fs::remove_file(full)
        };
        result.map_err(|e| FsError::io(path, e))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let full = if path.is_empty() {
            self.root.clone()
        } else {
            self.resolve(path)?
        };
        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FsError::io(path, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::io(path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".git" {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}
