//! sync
//!
//! The synchronization engine: one working directory, one remote branch.
//!
//! # Architecture
//!
//! - [`SyncEngine`] serializes every repository operation behind one async
//!   staging lock and runs the blocking git work on tokio's blocking pool
//! - Pulls only ever fast-forward; divergence is reported, never merged
//! - Pushes are coalesced by a background worker
//! - [`SyncError`] classifies failures by kind, so callers can tell a
//!   missing password from an unreachable remote

mod engine;
mod error;
mod options;

pub use engine::SyncEngine;
pub use error::SyncError;
pub use options::{
    Author, CommitSummary, EngineOptions, InitOutcome, PullOutcome, RemoteUrls,
    RepositoryLocation, SyncReport,
};
