//! auth::errors
//!
//! Credential error types. Messages never contain passwords.

use thiserror::Error;

use crate::secrets::SecretError;

/// Errors from credential providers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Error from secret storage.
    #[error("secret store error: {0}")]
    SecretStore(#[from] SecretError),

    /// Reading a password from the terminal failed.
    #[error("password prompt failed: {0}")]
    Prompt(String),

    /// The provider name in configuration is unknown.
    #[error("unknown credential provider '{0}'")]
    UnknownProvider(String),
}
