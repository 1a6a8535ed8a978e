//! secrets::traits
//!
//! Secret storage trait definition.
//!
//! Keys are namespaced (`gitshelf.password.<user>@<host>`) and stored as-is.
//! Implementations never log, print, or include values in error messages.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

/// Errors from secret storage operations.
///
/// Messages never carry secret values.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to read secret: {0}")]
    ReadError(String),

    #[error("failed to write secret: {0}")]
    WriteError(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("secret provider not available: {0}")]
    ProviderNotAvailable(String),
}

/// Key-value storage for secrets.
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` if no value is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, SecretError>;

    /// Store `value`, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), SecretError>;

    /// Remove `key`. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<(), SecretError>;

    fn exists(&self, key: &str) -> Result<bool, SecretError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Process-local store, for tests and for sessions that must not persist.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SecretError> {
        self.entries().remove(key);
        Ok(())
    }
}
