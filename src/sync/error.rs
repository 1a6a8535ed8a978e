//! sync::error
//!
//! Error taxonomy of the sync engine.
//!
//! [`GitError`] is classified by the phase it occurred in: the same
//! "not found" is a [`SyncError::Staging`] failure while staging and a
//! [`SyncError::NotFound`] while reading history.

use thiserror::Error;

use crate::core::lock::LockError;
use crate::git::GitError;

/// Errors surfaced by [`SyncEngine`](super::SyncEngine).
#[derive(Debug, Error)]
pub enum SyncError {
    /// No usable working directory could be produced.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The remote rejected the credentials, or a password is required.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport failure; retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Local and remote both have commits the other lacks.
    #[error("local and remote history have diverged ({ahead} local, {behind} remote commits)")]
    DivergedHistory { ahead: usize, behind: usize },

    /// The remote advanced since the last pull and refused the push.
    #[error("push rejected by remote: {0}")]
    Rejected(String),

    /// A fast-forward would overwrite uncommitted local edits.
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    /// Staging a path failed.
    #[error("staging failed: {0}")]
    Staging(#[source] GitError),

    /// A path or commit does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed configuration key or value.
    #[error("config error: {0}")]
    Config(String),

    /// Any other git failure.
    #[error("git error: {0}")]
    UnknownGit(#[source] GitError),
}

/// Phase of an engine operation, for classifying backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Init,
    Stage,
    Commit,
    Fetch,
    Push,
    Read,
    Config,
    Reset,
}

impl SyncError {
    /// Fatal errors leave the working directory unusable until reinitialized.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Initialization(_))
    }

    /// Errors the caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    pub(crate) fn from_git(err: GitError, phase: Phase) -> Self {
        match (err, phase) {
            (GitError::Auth(msg), _) => SyncError::Authentication(msg),
            (GitError::Network(msg), _) => SyncError::Network(msg),
            (err, Phase::Init) => SyncError::Initialization(err.to_string()),
            (err, Phase::Stage) => SyncError::Staging(err),
            (GitError::NotFastForward(msg), _) => SyncError::Rejected(msg),
            (GitError::Conflict(msg), _) => SyncError::MergeConflict(msg),
            (GitError::InvalidConfigKey(key), _) => {
                SyncError::Config(format!("invalid config key '{}'", key))
            }
            (GitError::NotFound(msg), Phase::Read | Phase::Config | Phase::Reset) => {
                SyncError::NotFound(msg)
            }
            (GitError::InvalidPath(msg), Phase::Read | Phase::Reset) => SyncError::NotFound(msg),
            (err, _) => SyncError::UnknownGit(err),
        }
    }
}

impl From<LockError> for SyncError {
    fn from(err: LockError) -> Self {
        SyncError::Initialization(err.to_string())
    }
}
