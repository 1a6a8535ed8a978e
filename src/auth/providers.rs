//! auth::providers
//!
//! [`CredentialProvider`] implementations.
//!
//! - [`StaticCredentials`]: a fixed value, for tests and scripted use
//! - [`SecretStoreCredentials`]: a [`SecretStore`] keyed per user and host
//! - [`PromptCredentials`]: asks on the terminal, optionally remembering

use std::sync::Arc;

use async_trait::async_trait;

use super::credentials::Password;
use super::errors::AuthError;
use super::CredentialProvider;
use crate::secrets::SecretStore;

/// Host part of a remote URL, for keying stored passwords.
///
/// # Example
///
/// ```
/// use gitshelf::auth::remote_host;
///
/// assert_eq!(remote_host("https://bob@git.example.com:8443/x.git"), "git.example.com");
/// assert_eq!(remote_host("git@github.com:org/repo.git"), "github.com");
/// assert_eq!(remote_host("file:///srv/repo.git"), "localhost");
/// ```
pub fn remote_host(url: &str) -> String {
    if url.starts_with("file://") || url.starts_with('/') {
        return "localhost".to_string();
    }
    let rest = match url.split_once("://") {
        Some((_, rest)) => rest,
        None => url,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    // scp-like `host:path` and `host:port` both end at the first colon.
    let host = host_port.split(':').next().unwrap_or(host_port);
    host.to_ascii_lowercase()
}

/// Secret store key for a user's password on a host.
pub fn password_key(username: &str, url: &str) -> String {
    format!("gitshelf.password.{}@{}", username, remote_host(url))
}

/// Always yields the same password (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    password: Option<Password>,
}

impl StaticCredentials {
    pub fn new(password: Option<Password>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn password(&self, _username: &str, _url: &str) -> Result<Option<Password>, AuthError> {
        Ok(self.password.clone())
    }
}

/// Passwords kept in a [`SecretStore`].
pub struct SecretStoreCredentials {
    store: Arc<dyn SecretStore>,
}

impl SecretStoreCredentials {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for SecretStoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStoreCredentials").finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for SecretStoreCredentials {
    async fn password(&self, username: &str, url: &str) -> Result<Option<Password>, AuthError> {
        let stored = self.store.get(&password_key(username, url))?;
        Ok(stored.filter(|s| !s.is_empty()).map(Password::new))
    }

    async fn remember(
        &self,
        username: &str,
        url: &str,
        password: &Password,
    ) -> Result<(), AuthError> {
        self.store
            .set(&password_key(username, url), password.expose())?;
        tracing::debug!(username, host = %remote_host(url), "stored password");
        Ok(())
    }

    async fn forget(&self, username: &str, url: &str) -> Result<(), AuthError> {
        self.store.delete(&password_key(username, url))?;
        Ok(())
    }
}

/// Reads the password from the controlling terminal.
///
/// With a store attached, a stored password is used first and a password
/// that worked is remembered.
#[derive(Default)]
pub struct PromptCredentials {
    store: Option<SecretStoreCredentials>,
}

impl PromptCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remembering(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store: Some(SecretStoreCredentials::new(store)),
        }
    }
}

impl std::fmt::Debug for PromptCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptCredentials")
            .field("remembering", &self.store.is_some())
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for PromptCredentials {
    async fn password(&self, username: &str, url: &str) -> Result<Option<Password>, AuthError> {
        if let Some(store) = &self.store {
            if let Some(password) = store.password(username, url).await? {
                return Ok(Some(password));
            }
        }

        let prompt = format!("Password for {}@{}: ", username, remote_host(url));
        let entered = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
            .await
            .map_err(|e| AuthError::Prompt(e.to_string()))?
            .map_err(|e| AuthError::Prompt(e.to_string()))?;

        Ok(Some(entered).filter(|s| !s.is_empty()).map(Password::new))
    }

    async fn remember(
        &self,
        username: &str,
        url: &str,
        password: &Password,
    ) -> Result<(), AuthError> {
        match &self.store {
            Some(store) => store.remember(username, url, password).await,
            None => Ok(()),
        }
    }

    async fn forget(&self, username: &str, url: &str) -> Result<(), AuthError> {
        match &self.store {
            Some(store) => store.forget(username, url).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;

    #[test]
    fn hosts_from_urls() {
        assert_eq!(remote_host("https://git.example.com/a/b.git"), "git.example.com");
        assert_eq!(remote_host("http://u:p@Host.Example:80/x"), "host.example");
        assert_eq!(remote_host("ssh://git@host/path"), "host");
        assert_eq!(remote_host("git@host:path.git"), "host");
        assert_eq!(remote_host("/srv/repo.git"), "localhost");
    }

    #[test]
    fn key_format() {
        assert_eq!(
            password_key("alice", "https://git.example.com/r.git"),
            "gitshelf.password.alice@git.example.com"
        );
    }

    #[tokio::test]
    async fn static_credentials() {
        let creds = StaticCredentials::new(Some(Password::new("pw")));
        let got = creds.password("alice", "https://h/r").await.unwrap();
        assert_eq!(got.as_ref().map(Password::expose), Some("pw"));
        assert!(StaticCredentials::default()
            .password("alice", "https://h/r")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn secret_store_round_trip() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let creds = SecretStoreCredentials::new(store.clone());
        let url = "https://git.example.com/r.git";

        assert!(creds.password("alice", url).await.unwrap().is_none());
        creds
            .remember("alice", url, &Password::new("tok"))
            .await
            .unwrap();
        assert_eq!(
            store
                .get("gitshelf.password.alice@git.example.com")
                .unwrap()
                .as_deref(),
            Some("tok")
        );
        assert!(creds.password("bob", url).await.unwrap().is_none());

        creds.forget("alice", url).await.unwrap();
        assert!(creds.password("alice", url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prompt_prefers_remembered_password() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        store
            .set("gitshelf.password.alice@host", "remembered")
            .unwrap();
        let creds = PromptCredentials::remembering(store);
        let got = creds.password("alice", "https://host/r").await.unwrap();
        assert_eq!(got.as_ref().map(Password::expose), Some("remembered"));
    }
}
