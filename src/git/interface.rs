//! git::interface
//!
//! The primitive operations the sync engine orchestrates.
//!
//! # Architecture
//!
//! [`VcsBackend`] is the seam between orchestration and libgit2. Every
//! method is a black-box primitive with a defined precondition and
//! postcondition; none of them takes locks or reports status. The sync
//! engine serializes calls and classifies failures.
//!
//! Implementations are synchronous. The engine runs them on the blocking
//! thread pool while it holds the staging lock.
//!
//! # Error Handling
//!
//! Backend errors are normalized into [`GitError`] by class:
//! - [`GitError::Auth`]: the remote refused or credentials are missing
//! - [`GitError::Network`]: transport failure, timeout, unreachable remote
//! - [`GitError::NotFastForward`]: the remote rejected a push
//! - [`GitError::Conflict`]: a checkout would overwrite local changes
//! - [`GitError::NotFound`]: missing path, commit or ref
//! - [`GitError::InvalidPath`]: path outside the working directory
//! - [`GitError::InvalidConfigKey`]: malformed configuration key

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::auth::Password;
use crate::core::types::{BranchName, CommitId};

/// Name of the read/write remote.
pub const ORIGIN: &str = "origin";

/// Name of the read-only fallback remote.
pub const UPSTREAM: &str = "upstream";

/// Errors from VCS primitives.
#[derive(Debug, Error)]
pub enum GitError {
    /// The working directory holds no usable repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// The remote refused our credentials, or none were available.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (unreachable, TLS, proxy, deadline).
    #[error("network error: {0}")]
    Network(String),

    /// The remote rejected a push because it has commits we lack.
    #[error("push rejected: {0}")]
    NotFastForward(String),

    /// Updating the working tree would overwrite local changes.
    #[error("checkout conflict: {0}")]
    Conflict(String),

    /// A path, commit or ref does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path is absolute, escapes the working directory, or targets `.git`.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Configuration key is malformed.
    #[error("invalid config key: {0}")]
    InvalidConfigKey(String),

    /// Destination for a clone already exists.
    #[error("destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Local filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other libgit2 failure.
    #[error("git error: {0}")]
    Internal(String),
}

/// Commit author identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Parameters of one network operation.
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Username offered to the remote
    pub username: String,
    /// Password or token; `None` means only agent/default credentials
    pub password: Option<Password>,
    /// HTTP(S) proxy URL
    pub proxy_url: Option<String>,
    /// Abort the transfer once this much time has passed
    pub timeout: Duration,
}

/// Commit counts of local HEAD relative to the remote-tracking branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AheadBehind {
    /// Commits on local HEAD missing from the remote
    pub ahead: usize,
    /// Commits on the remote missing from local HEAD
    pub behind: usize,
}

/// Primitive repository operations.
///
/// Paths are `/`-separated and relative to [`VcsBackend::work_dir`].
pub trait VcsBackend: Send + Sync + 'static {
    /// Root of the working directory this backend operates on.
    fn work_dir(&self) -> &Path;

    /// Whether the working directory holds a valid non-bare repository.
    fn is_initialized(&self) -> bool;

    /// Clone `url` into `dest` and check out `branch`.
    ///
    /// `dest` must not exist. An empty remote yields an unborn `branch`.
    fn clone_into(
        &self,
        url: &str,
        dest: &Path,
        branch: &BranchName,
        remote: &RemoteOptions,
    ) -> Result<(), GitError>;

    /// URL of remote `name`, if configured.
    fn remote_url(&self, name: &str) -> Result<Option<String>, GitError>;

    /// Create remote `name` or change its URL.
    fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError>;

    /// Repository-level configuration value.
    fn config_get(&self, key: &str) -> Result<Option<String>, GitError>;

    /// Set a repository-level configuration value.
    fn config_set(&self, key: &str, value: &str) -> Result<(), GitError>;

    /// Add pathspecs to the index, or remove them when `removing`.
    ///
    /// Fails with [`GitError::NotFound`] when adding a path that does not exist.
    fn stage(&self, paths: &[String], removing: bool) -> Result<(), GitError>;

    /// Reset the index to HEAD, leaving the working tree alone.
    fn unstage_all(&self) -> Result<(), GitError>;

    /// Paths whose index entry differs from HEAD.
    fn staged_paths(&self) -> Result<Vec<String>, GitError>;

    /// Commit the index. `None` if the index equals HEAD.
    fn commit(&self, message: &str, author: &Author) -> Result<Option<CommitId>, GitError>;

    /// Update `refs/remotes/origin/<branch>`.
    fn fetch(&self, branch: &BranchName, remote: &RemoteOptions) -> Result<(), GitError>;

    /// Compare local HEAD with `refs/remotes/origin/<branch>`.
    fn ahead_behind(&self, branch: &BranchName) -> Result<AheadBehind, GitError>;

    /// Move `branch` and the working tree to the remote-tracking commit.
    ///
    /// Precondition: local HEAD is an ancestor of the remote commit.
    /// Fails with [`GitError::Conflict`] without touching anything if local
    /// edits would be overwritten. Returns the paths that changed.
    fn fast_forward(&self, branch: &BranchName) -> Result<Vec<String>, GitError>;

    /// Push `branch` to origin.
    fn push(&self, branch: &BranchName, remote: &RemoteOptions) -> Result<(), GitError>;

    /// Discard working-tree and index changes under `paths` (all if `None`).
    fn reset_files(&self, paths: Option<&[String]>) -> Result<(), GitError>;

    /// Paths that differ from HEAD, untracked files included, sorted.
    fn changed_files(&self, pathspecs: Option<&[String]>) -> Result<Vec<String>, GitError>;

    /// Commits on HEAD not reachable from the remote-tracking branch, newest first.
    fn local_commits(&self, branch: &BranchName) -> Result<Vec<CommitId>, GitError>;

    /// Content of `path` as of `commit`.
    fn blob_at_commit(&self, path: &str, commit: &CommitId) -> Result<Vec<u8>, GitError>;

    /// Names of the files directly inside `dir` as of `commit`, sorted.
    fn list_tree_at_commit(&self, dir: &str, commit: &CommitId) -> Result<Vec<String>, GitError>;
}

/// Check a configuration key has the `section[.subsection].name` shape.
///
/// # Example
///
/// ```
/// use gitshelf::git::validate_config_key;
///
/// assert!(validate_config_key("user.name").is_ok());
/// assert!(validate_config_key("remote.origin.url").is_ok());
/// assert!(validate_config_key("nodot").is_err());
/// assert!(validate_config_key("user.").is_err());
/// ```
pub fn validate_config_key(key: &str) -> Result<(), GitError> {
    let invalid = || GitError::InvalidConfigKey(key.to_string());

    let (section, rest) = key.split_once('.').ok_or_else(invalid)?;
    let name = rest.rsplit('.').next().ok_or_else(invalid)?;

    let is_ident = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !is_ident(section) || !is_ident(name) || key.contains('\n') {
        return Err(invalid());
    }
    Ok(())
}
