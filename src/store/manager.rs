//! store::manager
//!
//! Components that react to store lifecycle events.
//!
//! Managers run in registration order. A failing `on_initialize` aborts
//! store initialization; a failing `on_synchronized` is logged and the
//! remaining managers still run.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use super::error::StoreError;
use super::layout::ObjectType;
use crate::sync::SyncReport;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ManagerError(pub String);

impl ManagerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// What a manager may know about the store it is attached to.
#[derive(Debug, Clone)]
pub struct ManagerContext {
    pub work_dir: PathBuf,
    pub object_types: Vec<ObjectType>,
}

#[async_trait]
pub trait StoreManager: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// The store became ready, or the manager was registered on a ready store.
    async fn on_initialize(&self, ctx: &ManagerContext) -> Result<(), ManagerError>;

    /// A synchronization cycle finished.
    async fn on_synchronized(
        &self,
        _ctx: &ManagerContext,
        _report: &SyncReport,
    ) -> Result<(), ManagerError> {
        Ok(())
    }
}

/// Ordered list of managers.
#[derive(Default)]
pub struct ManagerRegistry {
    managers: RwLock<Vec<Arc<dyn StoreManager>>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, manager: Arc<dyn StoreManager>) {
        self.managers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(manager);
    }

    pub fn len(&self) -> usize {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn StoreManager>> {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `on_initialize` on every manager, stopping at the first failure.
    pub async fn initialize_all(&self, ctx: &ManagerContext) -> Result<(), StoreError> {
        for manager in self.snapshot() {
            initialize_one(manager.as_ref(), ctx).await?;
        }
        Ok(())
    }

    /// Run `on_synchronized` on every manager.
    pub async fn synchronized_all(&self, ctx: &ManagerContext, report: &SyncReport) {
        for manager in self.snapshot() {
            if let Err(err) = manager.on_synchronized(ctx, report).await {
                tracing::warn!(manager = manager.name(), error = %err, "manager failed after sync");
            }
        }
    }
}

pub(crate) async fn initialize_one(
    manager: &dyn StoreManager,
    ctx: &ManagerContext,
) -> Result<(), StoreError> {
    manager
        .on_initialize(ctx)
        .await
        .map_err(|err| StoreError::Manager {
            name: manager.name().to_string(),
            message: err.to_string(),
        })
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        f.debug_struct("ManagerRegistry")
            .field("managers", &names)
            .finish()
    }
}
