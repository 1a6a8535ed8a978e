//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing (URLs non-empty, branch name
//! valid, object-type subdirectories unique and inside the working
//! directory).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::paths::validate_relative;
use crate::core::types::BranchName;

/// Store configuration.
///
/// # Example
///
/// ```toml
/// work_dir = "/home/alice/.local/share/gitshelf/data"
/// remote_url = "https://git.example.com/alice/data.git"
/// username = "alice"
///
/// [author]
/// name = "Alice"
/// email = "alice@example.com"
///
/// [sync]
/// interval_secs = 300
///
/// [[object_types]]
/// name = "item"
/// subdir = "items"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Local working directory
    pub work_dir: Option<PathBuf>,

    /// Remote repository URL (read/write)
    pub remote_url: Option<String>,

    /// Upstream repository URL (read-only fallback for cloning)
    pub upstream_url: Option<String>,

    /// HTTP(S) proxy for network operations
    pub proxy_url: Option<String>,

    /// Branch to synchronize (default: "main")
    pub branch: Option<String>,

    /// Username for remote authentication
    pub username: Option<String>,

    /// Commit author identity
    pub author: Option<AuthorConfig>,

    /// Synchronization tuning
    pub sync: Option<SyncConfig>,

    /// Secret storage settings
    pub secrets: Option<SecretsConfig>,

    /// Known object types, for resolving bare object ids
    pub object_types: Vec<ObjectTypeConfig>,
}

impl StoreConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("remote_url", &self.remote_url),
            ("upstream_url", &self.upstream_url),
            ("proxy_url", &self.proxy_url),
        ] {
            if let Some(url) = url {
                if url.trim().is_empty() {
                    return Err(ConfigError::InvalidValue(format!("{name} cannot be empty")));
                }
            }
        }

        if let Some(branch) = &self.branch {
            BranchName::new(branch.as_str())
                .map_err(|e| ConfigError::InvalidValue(format!("invalid branch: {}", e)))?;
        }

        if let Some(username) = &self.username {
            if username.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "username cannot be empty".to_string(),
                ));
            }
        }

        if let Some(author) = &self.author {
            author.validate()?;
        }
        if let Some(sync) = &self.sync {
            sync.validate()?;
        }
        if let Some(secrets) = &self.secrets {
            secrets.validate()?;
        }

        let mut seen = std::collections::HashSet::new();
        for ty in &self.object_types {
            ty.validate()?;
            if !seen.insert(ty.subdir.trim_end_matches('/')) {
                return Err(ConfigError::InvalidValue(format!(
                    "object type subdir '{}' is declared more than once",
                    ty.subdir
                )));
            }
        }

        Ok(())
    }
}

/// Commit author identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl AuthorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "author.name cannot be empty".to_string(),
                ));
            }
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(ConfigError::InvalidValue(format!(
                    "author.email '{}' is not an email address",
                    email
                )));
            }
        }
        Ok(())
    }
}

/// Synchronization tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Seconds between background synchronizations
    pub interval_secs: Option<u64>,

    /// Deadline for a single fetch or push
    pub network_timeout_secs: Option<u64>,
}

impl SyncConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("sync.interval_secs", self.interval_secs),
            ("sync.network_timeout_secs", self.network_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// Secrets configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Provider to use ("file" or "prompt")
    pub provider: Option<String>,
}

impl SecretsConfig {
    /// Valid secret providers.
    pub const VALID_PROVIDERS: &'static [&'static str] = &["file", "prompt"];

    /// Validate the secrets configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(provider) = &self.provider {
            if !Self::VALID_PROVIDERS.contains(&provider.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid secrets provider '{}', must be one of: {}",
                    provider,
                    Self::VALID_PROVIDERS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// A known object type and the subdirectory its documents live in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ObjectTypeConfig {
    pub name: String,
    pub subdir: String,
}

impl ObjectTypeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "object type name cannot be empty".to_string(),
            ));
        }
        validate_relative(&self.subdir).map_err(|e| {
            ConfigError::InvalidValue(format!("object type '{}': {}", self.name, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_full_example() {
        let toml = r#"
            work_dir = "/tmp/data"
            remote_url = "https://example.com/data.git"
            upstream_url = "https://example.com/upstream.git"
            branch = "main"
            username = "alice"

            [author]
            name = "Alice"
            email = "alice@example.com"

            [sync]
            interval_secs = 60
            network_timeout_secs = 10

            [secrets]
            provider = "prompt"

            [[object_types]]
            name = "item"
            subdir = "items"
        "#;
        let config: StoreConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.object_types.len(), 1);
        assert_eq!(config.sync.unwrap().interval_secs, Some(60));
    }

    #[test]
    fn invalid_values() {
        let cases = [
            StoreConfig {
                remote_url: Some(" ".into()),
                ..Default::default()
            },
            StoreConfig {
                branch: Some("bad..branch".into()),
                ..Default::default()
            },
            StoreConfig {
                author: Some(AuthorConfig {
                    name: Some("A".into()),
                    email: Some("not-an-email".into()),
                }),
                ..Default::default()
            },
            StoreConfig {
                sync: Some(SyncConfig {
                    interval_secs: Some(0),
                    network_timeout_secs: None,
                }),
                ..Default::default()
            },
            StoreConfig {
                secrets: Some(SecretsConfig {
                    provider: Some("vault".into()),
                }),
                ..Default::default()
            },
        ];
        for case in cases {
            assert!(case.validate().is_err(), "{case:?} should be invalid");
        }
    }

    #[test]
    fn object_type_subdirs_must_be_unique_and_inside() {
        let dup = StoreConfig {
            object_types: vec![
                ObjectTypeConfig {
                    name: "a".into(),
                    subdir: "items".into(),
                },
                ObjectTypeConfig {
                    name: "b".into(),
                    subdir: "items/".into(),
                },
            ],
            ..Default::default()
        };
        assert!(dup.validate().is_err());

        let escaping = StoreConfig {
            object_types: vec![ObjectTypeConfig {
                name: "a".into(),
                subdir: "../elsewhere".into(),
            }],
            ..Default::default()
        };
        assert!(escaping.validate().is_err());
    }
}
