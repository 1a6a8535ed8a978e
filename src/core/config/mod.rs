//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order, first existing file wins:
//! 1. An explicit path (e.g. `--config`)
//! 2. `$GITSHELF_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/gitshelf/config.toml`
//! 4. `~/.gitshelf/config.toml` (canonical write location)
//!
//! A missing file is not an error; defaults apply.
//!
//! # Example
//!
//! ```no_run
//! use gitshelf::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! for missing in config.missing_required() {
//!     eprintln!("setting required: {missing}");
//! }
//! println!("branch: {}", config.branch());
//! ```

pub mod schema;

pub use schema::{AuthorConfig, ObjectTypeConfig, SecretsConfig, StoreConfig, SyncConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::types::BranchName;
use crate::sync::{Author, EngineOptions, RepositoryLocation};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GITSHELF_CONFIG";

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 60;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("missing required settings: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration with defaults applied by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub store: StoreConfig,
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Wrap an in-memory configuration.
    pub fn from_store_config(store: StoreConfig) -> Result<Self, ConfigError> {
        store.validate()?;
        Ok(Self {
            store,
            loaded_from: None,
        })
    }

    /// Load configuration from `explicit` or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = Self::locate(explicit) else {
            return Ok(Self::default());
        };

        let store = Self::read_file(&path)?;
        store.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");

        Ok(Self {
            store,
            loaded_from: Some(path),
        })
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            candidates.push(PathBuf::from(path));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("gitshelf/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".gitshelf/config.toml"));
        }

        candidates.into_iter().find(|p| p.exists())
    }

    fn read_file(path: &Path) -> Result<StoreConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Canonical write location, `~/.gitshelf/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".gitshelf/config.toml"))
    }

    /// Write `store` atomically to `path` (temp file, then rename).
    pub fn write(path: &Path, store: &StoreConfig) -> Result<(), ConfigError> {
        store.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(store).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let write_err = |source| ConfigError::WriteError {
            path: temp_path.clone(),
            source,
        };
        let mut file = fs::File::create(&temp_path).map_err(write_err)?;
        file.write_all(contents.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Path the configuration was loaded from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    // =========================================================================
    // Accessors with defaults
    // =========================================================================

    pub fn work_dir(&self) -> Option<&Path> {
        self.store.work_dir.as_deref()
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.store.remote_url.as_deref()
    }

    pub fn upstream_url(&self) -> Option<&str> {
        self.store.upstream_url.as_deref()
    }

    pub fn proxy_url(&self) -> Option<&str> {
        self.store.proxy_url.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.store.username.as_deref()
    }

    /// Branch to synchronize. Defaults to `main`.
    pub fn branch(&self) -> BranchName {
        self.store
            .branch
            .as_deref()
            .and_then(|b| BranchName::new(b).ok())
            .unwrap_or_default()
    }

    /// Interval between background synchronizations. Defaults to 5 minutes.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(
            self.store
                .sync
                .as_ref()
                .and_then(|s| s.interval_secs)
                .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
        )
    }

    /// Deadline for one fetch or push. Defaults to 60 seconds.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(
            self.store
                .sync
                .as_ref()
                .and_then(|s| s.network_timeout_secs)
                .unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS),
        )
    }

    /// Secrets provider. Defaults to `file`.
    pub fn secrets_provider(&self) -> &str {
        self.store
            .secrets
            .as_ref()
            .and_then(|s| s.provider.as_deref())
            .unwrap_or("file")
    }

    pub fn object_types(&self) -> &[ObjectTypeConfig] {
        &self.store.object_types
    }

    /// Required settings that have no value yet.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let author = self.store.author.as_ref();
        let checks = [
            ("work_dir", self.store.work_dir.is_some()),
            ("remote_url", self.store.remote_url.is_some()),
            ("username", self.store.username.is_some()),
            ("author.name", author.and_then(|a| a.name.as_ref()).is_some()),
            ("author.email", author.and_then(|a| a.email.as_ref()).is_some()),
        ];
        checks
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| name)
            .collect()
    }

    /// Build engine options from this configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingRequired`] lists every unset required setting.
    pub fn engine_options(&self) -> Result<EngineOptions, ConfigError> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing));
        }

        let author = self.store.author.clone().unwrap_or_default();
        Ok(EngineOptions {
            location: RepositoryLocation {
                work_dir: self.store.work_dir.clone().unwrap_or_default(),
                remote_url: self.store.remote_url.clone().unwrap_or_default(),
                upstream_url: self.store.upstream_url.clone(),
                proxy_url: self.store.proxy_url.clone(),
                branch: self.branch(),
            },
            author: Author {
                name: author.name.unwrap_or_default(),
                email: author.email.unwrap_or_default(),
            },
            username: self.store.username.clone().unwrap_or_default(),
            network_timeout: self.network_timeout(),
        })
    }
}
