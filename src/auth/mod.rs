//! auth
//!
//! Credentials for the remote repository.
//!
//! # Architecture
//!
//! - [`Credentials`] is the username/password pair the sync engine owns
//!   for one session
//! - [`CredentialProvider`] supplies a password on demand; the engine asks
//!   for one when the remote rejects it and none is set
//! - Providers: [`StaticCredentials`], [`SecretStoreCredentials`],
//!   [`PromptCredentials`]
//!
//! # Security
//!
//! Passwords MUST never appear in logs (including `--debug`), error
//! messages or `Debug` output. Every type here redacts them.

mod credentials;
mod errors;
mod providers;

use std::sync::Arc;

pub use credentials::{Credentials, Password};
pub use errors::AuthError;
pub use providers::{
    password_key, remote_host, PromptCredentials, SecretStoreCredentials, StaticCredentials,
};

use crate::secrets::SecretStore;

/// Supplies passwords for a remote.
///
/// # Example
///
/// ```no_run
/// use gitshelf::auth::{CredentialProvider, StaticCredentials, Password};
///
/// # async fn demo() -> Result<(), gitshelf::auth::AuthError> {
/// let provider = StaticCredentials::new(Some(Password::new("token")));
/// let password = provider.password("alice", "https://git.example.com/r.git").await?;
/// assert!(password.is_some());
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Password for `username` on the remote at `url`, if one is available.
    async fn password(&self, username: &str, url: &str) -> Result<Option<Password>, AuthError>;

    /// Persist a password the remote accepted. Default: no-op.
    async fn remember(
        &self,
        _username: &str,
        _url: &str,
        _password: &Password,
    ) -> Result<(), AuthError> {
        Ok(())
    }

    /// Drop a persisted password the remote rejected. Default: no-op.
    async fn forget(&self, _username: &str, _url: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Build the provider named in configuration (`"file"` or `"prompt"`).
///
/// Both remember accepted passwords in `store`.
pub fn provider_for(
    name: &str,
    store: Arc<dyn SecretStore>,
) -> Result<Arc<dyn CredentialProvider>, AuthError> {
    match name {
        "file" => Ok(Arc::new(SecretStoreCredentials::new(store))),
        "prompt" => Ok(Arc::new(PromptCredentials::remembering(store))),
        other => Err(AuthError::UnknownProvider(other.to_string())),
    }
}
