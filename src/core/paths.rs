//! core::paths
//!
//! Centralized path routing for the working directory.
//!
//! # Layout
//!
//! - `<work_dir>/.git/` - git control directory
//! - `<work_dir>/.git/gitshelf.lock` - exclusive ownership lock
//! - `<work_dir>/<subdir>/<id>.yaml` - documents
//! - `<parent>/.<name>.clone-<uuid>/` - transient clone target during init
//!
//! Nothing else is written inside the working tree.
//!
//! Relative paths handed to git and to the filesystem wrapper use `/` as
//! separator and must stay inside the working directory; see
//! [`validate_relative`].
//!
//! # Example
//!
//! ```
//! use gitshelf::core::paths::StorePaths;
//! use std::path::PathBuf;
//!
//! let paths = StorePaths::new(PathBuf::from("/data/shelf"));
//! assert_eq!(paths.git_dir(), PathBuf::from("/data/shelf/.git"));
//! assert_eq!(paths.lock_path(), PathBuf::from("/data/shelf/.git/gitshelf.lock"));
//! ```

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors from relative path validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path is absolute: {0}")]
    Absolute(String),

    #[error("path escapes the working directory: {0}")]
    Escapes(String),

    #[error("path points into the git control directory: {0}")]
    ControlDir(String),
}

/// Path routing for one working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    work_dir: PathBuf,
}

impl StorePaths {
    /// Create routing for `work_dir`.
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }

    /// The working directory root.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The git control directory.
    pub fn git_dir(&self) -> PathBuf {
        self.work_dir.join(".git")
    }

    /// Lock file guarding exclusive ownership of the working directory.
    pub fn lock_path(&self) -> PathBuf {
        self.git_dir().join("gitshelf.lock")
    }

    /// Prefix shared by all transient clone directories of this work dir.
    ///
    /// Clones land in a sibling directory so a crash mid-clone never leaves
    /// a half-populated working directory behind.
    pub fn clone_staging_prefix(&self) -> String {
        let name = self
            .work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gitshelf".to_string());
        format!(".{name}.clone-")
    }

    /// A fresh, unique transient clone directory.
    pub fn clone_staging_dir(&self) -> PathBuf {
        let dir_name = format!("{}{}", self.clone_staging_prefix(), uuid::Uuid::new_v4());
        self.parent_dir().join(dir_name)
    }

    /// Directory containing the working directory.
    pub fn parent_dir(&self) -> PathBuf {
        self.work_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Absolute path of a validated relative path.
    pub fn absolute(&self, relative: &str) -> Result<PathBuf, PathError> {
        validate_relative(relative)?;
        Ok(self.work_dir.join(relative))
    }
}

/// Validate a working-directory-relative path.
///
/// Accepts `/`-separated relative paths without `..`, that do not point
/// into `.git`. A trailing `/` is tolerated (directory pathspecs).
///
/// # Example
///
/// ```
/// use gitshelf::core::paths::validate_relative;
///
/// assert!(validate_relative("items/a1.yaml").is_ok());
/// assert!(validate_relative("items/a1/").is_ok());
/// assert!(validate_relative("../outside").is_err());
/// assert!(validate_relative("/etc/passwd").is_err());
/// assert!(validate_relative(".git/config").is_err());
/// ```
pub fn validate_relative(path: &str) -> Result<(), PathError> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    let p = Path::new(trimmed);
    if p.is_absolute() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(PathError::Absolute(path.to_string()));
    }
    for (idx, component) in p.components().enumerate() {
        match component {
            Component::Normal(part) => {
                if idx == 0 && part == ".git" {
                    return Err(PathError::ControlDir(path.to_string()));
                }
            }
            Component::CurDir => {}
            Component::ParentDir => return Err(PathError::Escapes(path.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(path.to_string()))
            }
        }
    }
    Ok(())
}

/// Normalize a relative path: strip `./` prefixes and trailing slashes.
pub fn normalize_relative(path: &str) -> String {
    let mut s = path.trim_end_matches('/');
    while let Some(rest) = s.strip_prefix("./") {
        s = rest;
    }
    s.to_string()
}
