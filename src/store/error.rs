//! store::error

use thiserror::Error;

use super::codec::CodecError;
use super::fs::FsError;
use super::StoreState;
use crate::core::types::{CommitId, ObjectId, TypeError};
use crate::sync::SyncError;

/// Errors from [`DocumentStore`](super::DocumentStore) operations.
///
/// Git-level failures only ever arrive wrapped in [`SyncError`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Something already exists where `create` was asked to write.
    #[error("already exists: {0}")]
    Conflict(String),

    #[error("object not found: {0}")]
    NotFound(String),

    /// Some ids could not be resolved; the rest were committed.
    #[error("committed {} but could not find: {}", short_commit(.committed), join_ids(.missing))]
    PartialCommit {
        committed: Option<CommitId>,
        missing: Vec<ObjectId>,
    },

    /// The data does not have the shape a document needs.
    #[error("invalid document: {0}")]
    Validation(String),

    #[error("{path}: {source}")]
    Codec {
        path: String,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Filesystem(#[from] FsError),

    /// The store cannot serve the request in its current state.
    #[error("store is {0}")]
    NotReady(StoreState),

    /// The working tree holds changes the store did not make.
    #[error("working directory has changes not made through the store: {}", .0.join(", "))]
    UnownedChanges(Vec<String>),

    #[error("manager '{name}' failed: {message}")]
    Manager { name: String, message: String },

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl StoreError {
    pub(crate) fn codec(path: &str, source: CodecError) -> Self {
        StoreError::Codec {
            path: path.to_string(),
            source,
        }
    }
}

fn short_commit(commit: &Option<CommitId>) -> &str {
    commit.as_ref().map(|c| c.short(8)).unwrap_or("nothing")
}

fn join_ids(ids: &[ObjectId]) -> String {
    ids.iter().map(ObjectId::as_str).collect::<Vec<_>>().join(", ")
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        StoreError::Validation(err.to_string())
    }
}
