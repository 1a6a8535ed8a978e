//! secrets
//!
//! Secret storage for remote passwords and tokens.
//!
//! # Architecture
//!
//! Secrets go through the [`SecretStore`] trait:
//!
//! - [`FileSecretStore`]: `~/.gitshelf/secrets.toml` (default)
//! - [`MemorySecretStore`]: process-local, nothing persisted
//!
//! # Security
//!
//! - Secrets are **never** logged or included in error messages
//! - The file store uses 0600 permissions on Unix
//! - All writes are atomic (temp file + rename)
//!
//! # Example
//!
//! ```no_run
//! use gitshelf::secrets::{create_store, SecretStore};
//!
//! let store = create_store("file").unwrap();
//! store.set("gitshelf.password.alice@example.com", "token").unwrap();
//! ```

mod file_store;
mod traits;

pub use file_store::FileSecretStore;
pub use traits::{MemorySecretStore, SecretError, SecretStore};

/// The default secret store provider name.
pub const DEFAULT_PROVIDER: &str = "file";

/// Create a secret store by provider name (`"file"` or `"memory"`).
///
/// # Errors
///
/// Unknown provider name, or the home directory cannot be determined.
pub fn create_store(provider: &str) -> Result<Box<dyn SecretStore>, SecretError> {
    match provider {
        "file" => Ok(Box::new(FileSecretStore::new()?)),
        "memory" => Ok(Box::new(MemorySecretStore::new())),
        other => Err(SecretError::ProviderNotAvailable(format!(
            "unknown secret provider: '{}' (valid: file, memory)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_memory_store() {
        let store = create_store("memory").unwrap();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn create_unknown_provider() {
        match create_store("keychain") {
            Err(SecretError::ProviderNotAvailable(msg)) => assert!(msg.contains("keychain")),
            Err(e) => panic!("unexpected error type: {:?}", e),
            Ok(_) => panic!("expected error"),
        }
    }
}
