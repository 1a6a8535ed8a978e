//! core::status
//!
//! Observable synchronization status.
//!
//! # Design
//!
//! [`StatusReporter`] owns the single [`SyncStatus`] value of one engine.
//! Only the engine mutates it, through [`StatusReporter::update`]; every
//! change is published to subscribers over a bounded broadcast channel.
//! Slow subscribers lose the oldest updates instead of blocking the engine.
//!
//! # Example
//!
//! ```
//! use gitshelf::core::status::{Operation, StatusReporter};
//!
//! let reporter = StatusReporter::new();
//! let mut rx = reporter.subscribe();
//!
//! reporter.update(|s| s.operation = Operation::Pulling);
//! assert_eq!(reporter.snapshot().operation, Operation::Pulling);
//! assert_eq!(rx.try_recv().unwrap().operation, Operation::Pulling);
//! ```

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of the status broadcast channel.
const STATUS_CHANNEL_CAPACITY: usize = 32;

/// VCS operation currently running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Idle,
    Initializing,
    Pulling,
    Pushing,
    Committing,
    Checking,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Idle => "idle",
            Operation::Initializing => "initializing",
            Operation::Pulling => "pulling",
            Operation::Pushing => "pushing",
            Operation::Committing => "committing",
            Operation::Checking => "checking",
        };
        f.write_str(s)
    }
}

/// Relation of local history to the remote branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteRelation {
    /// Local and remote point at the same commit.
    Updated,
    /// Both sides have commits the other lacks.
    Diverged,
    /// Local has commits not yet pushed.
    Ahead,
}

impl std::fmt::Display for RemoteRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemoteRelation::Updated => "updated",
            RemoteRelation::Diverged => "diverged",
            RemoteRelation::Ahead => "ahead",
        };
        f.write_str(s)
    }
}

/// Snapshot of the engine's synchronization status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub operation: Operation,
    pub has_local_changes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_relative_to_local: Option<RemoteRelation>,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synchronized: Option<DateTime<Utc>>,
    pub needs_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Initial status of a freshly constructed engine.
    pub fn initial() -> Self {
        Self {
            is_online: true,
            ..Default::default()
        }
    }
}

/// Receives every status change. Implementations must return quickly.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, status: SyncStatus);
}

/// Owner of one engine's [`SyncStatus`].
#[derive(Debug)]
pub struct StatusReporter {
    current: RwLock<SyncStatus>,
    tx: broadcast::Sender<SyncStatus>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    /// Create a reporter holding [`SyncStatus::initial`].
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            current: RwLock::new(SyncStatus::initial()),
            tx,
        }
    }

    /// Current status.
    pub fn snapshot(&self) -> SyncStatus {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply `f` to the status and publish the result.
    ///
    /// Unchanged values are not republished.
    pub fn update(&self, f: impl FnOnce(&mut SyncStatus)) -> SyncStatus {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = guard.clone();
        f(&mut guard);
        let after = guard.clone();
        drop(guard);

        if after != before {
            // No receivers is fine.
            let _ = self.tx.send(after.clone());
        }
        after
    }

    /// Replace the status with [`SyncStatus::initial`].
    pub fn reset(&self) -> SyncStatus {
        self.update(|s| *s = SyncStatus::initial())
    }

    /// New subscription to status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Forward every status change to `sink` from a background task.
    ///
    /// Updates the sink falls behind on are dropped, oldest first.
    pub fn forward_to(&self, sink: Arc<dyn StatusSink>) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(status) => sink.report(status).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "status sink lagging, dropped updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
