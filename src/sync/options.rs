//! sync::options
//!
//! Engine construction parameters and operation results.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::core::status::RemoteRelation;
use crate::core::types::{BranchName, CommitId};

pub use crate::git::Author;

/// Where the working directory lives and what it synchronizes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub work_dir: PathBuf,
    pub remote_url: String,
    /// Read-only fallback for the initial clone
    pub upstream_url: Option<String>,
    pub proxy_url: Option<String>,
    pub branch: BranchName,
}

/// Everything a [`SyncEngine`](super::SyncEngine) needs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub location: RepositoryLocation,
    pub author: Author,
    pub username: String,
    /// Deadline for a single fetch or push
    pub network_timeout: Duration,
}

/// Remote URLs a working directory is expected to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrls {
    pub origin: String,
    pub upstream: Option<String>,
}

impl From<&RepositoryLocation> for RemoteUrls {
    fn from(location: &RepositoryLocation) -> Self {
        Self {
            origin: location.remote_url.clone(),
            upstream: location.upstream_url.clone(),
        }
    }
}

/// How [`SyncEngine::initialize`](super::SyncEngine::initialize) got a working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InitOutcome {
    /// A valid repository was already present.
    Existing,
    /// Cloned from the remote.
    Cloned,
    /// The remote was unavailable; cloned from upstream and pointed at the remote.
    ClonedFromUpstream,
}

/// Result of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    /// `None` when there was nothing to commit
    pub commit: Option<CommitId>,
    pub message: String,
    /// Number of paths the commit touched
    pub paths_committed: usize,
}

/// Result of a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    pub relation: RemoteRelation,
    /// Commits applied by fast-forward
    pub fast_forwarded: usize,
    /// Paths changed by the fast-forward
    pub changed_paths: Vec<String>,
}

impl PullOutcome {
    pub(crate) fn unchanged(relation: RemoteRelation) -> Self {
        Self {
            relation,
            fast_forwarded: 0,
            changed_paths: Vec::new(),
        }
    }
}

/// Result of a full synchronization cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pull: PullOutcome,
    /// Whether a push ran and succeeded
    pub pushed: bool,
    /// Whether the push was retried after the remote rejected it
    pub retried_after_rejection: bool,
}
