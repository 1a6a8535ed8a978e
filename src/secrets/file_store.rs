//! secrets::file_store
//!
//! File-based secret storage at `~/.gitshelf/secrets.toml`.
//!
//! # Security
//!
//! - File permissions are 0600 on Unix, set before any content is written
//! - Writes are atomic (temp file, then rename)
//! - Read-modify-write cycles hold an exclusive lock on a sibling
//!   `secrets.toml.lock`, so concurrent processes never lose an update
//!
//! # Format
//!
//! ```toml
//! version = 1
//!
//! [entries]
//! "gitshelf.password.alice@git.example.com" = "..."
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use super::traits::{SecretError, SecretStore};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretsFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

/// Secrets in a TOML file owned by the current user.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Store at `~/.gitshelf/secrets.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, SecretError> {
        let home = dirs::home_dir()
            .ok_or_else(|| SecretError::ReadError("cannot determine home directory".into()))?;
        Ok(Self {
            path: home.join(".gitshelf").join("secrets.toml"),
        })
    }

    /// Store at a custom path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("toml.lock")
    }

    /// Run `f` while holding the cross-process lock.
    fn locked<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, SecretError>,
    ) -> Result<T, SecretError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SecretError::WriteError(format!("cannot create directory: {}", e)))?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| SecretError::WriteError(format!("cannot open lock file: {}", e)))?;
        lock.lock_exclusive()
            .map_err(|e| SecretError::WriteError(format!("cannot lock secrets file: {}", e)))?;

        let result = f(self);
        // Unlocked on close as well.
        let _ = FileExt::unlock(&lock);
        result
    }

    fn read_file(&self) -> Result<SecretsFile, SecretError> {
        if !self.path.exists() {
            return Ok(SecretsFile::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                SecretError::PermissionDenied(self.path.display().to_string())
            }
            _ => SecretError::ReadError(format!("cannot read secrets file: {}", e)),
        })?;

        let file: SecretsFile = toml::from_str(&content)
            .map_err(|_| SecretError::ReadError("cannot parse secrets file".into()))?;
        if file.version != FORMAT_VERSION {
            return Err(SecretError::ReadError(format!(
                "unsupported secrets file version {}",
                file.version
            )));
        }
        Ok(file)
    }

    fn write_file(&self, file: &SecretsFile) -> Result<(), SecretError> {
        let content = toml::to_string_pretty(file)
            .map_err(|e| SecretError::WriteError(format!("cannot serialize secrets: {}", e)))?;

        let temp_path = self.path.with_extension("toml.tmp");
        {
            let mut temp = File::create(&temp_path)
                .map_err(|e| SecretError::WriteError(format!("cannot create temp file: {}", e)))?;

            #[cfg(unix)]
            temp.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| SecretError::WriteError(format!("cannot set permissions: {}", e)))?;

            temp.write_all(content.as_bytes())
                .and_then(|_| temp.sync_all())
                .map_err(|e| SecretError::WriteError(format!("cannot write secrets: {}", e)))?;
        }

        fs::rename(&temp_path, &self.path)
            .map_err(|e| SecretError::WriteError(format!("cannot rename temp file: {}", e)))
    }

    /// Whether the file is absent or has mode 0600.
    #[cfg(unix)]
    pub fn verify_permissions(&self) -> Result<bool, SecretError> {
        if !self.path.exists() {
            return Ok(true);
        }
        let metadata = fs::metadata(&self.path)
            .map_err(|e| SecretError::ReadError(format!("cannot read file metadata: {}", e)))?;
        Ok(metadata.permissions().mode() & 0o777 == 0o600)
    }

    #[cfg(not(unix))]
    pub fn verify_permissions(&self) -> Result<bool, SecretError> {
        Ok(true)
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.read_file()?.entries.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretError> {
        self.locked(|store| {
            let mut file = store.read_file()?;
            file.entries.insert(key.to_string(), value.to_string());
            store.write_file(&file)
        })
    }

    fn delete(&self, key: &str) -> Result<(), SecretError> {
        self.locked(|store| {
            let mut file = store.read_file()?;
            if file.entries.remove(key).is_none() {
                return Ok(());
            }
            store.write_file(&file)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "gitshelf.password.alice@git.example.com";

    fn store() -> (TempDir, FileSecretStore) {
        let temp = TempDir::new().unwrap();
        let store = FileSecretStore::with_path(temp.path().join("nested/secrets.toml"));
        (temp, store)
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (_temp, store) = store();
        assert!(store.get(KEY).unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn set_get_delete() {
        let (_temp, store) = store();
        store.set(KEY, "s3cret").unwrap();
        assert_eq!(store.get(KEY).unwrap().as_deref(), Some("s3cret"));

        store.set(KEY, "rotated").unwrap();
        assert_eq!(store.get(KEY).unwrap().as_deref(), Some("rotated"));

        store.delete(KEY).unwrap();
        assert!(store.get(KEY).unwrap().is_none());
        store.delete(KEY).unwrap();
    }

    #[test]
    fn dotted_keys_and_special_values_survive() {
        let (_temp, store) = store();
        let value = "with \"quotes\" = and\nnewline";
        store.set(KEY, value).unwrap();
        store.set("other.key", "x").unwrap();

        let reopened = FileSecretStore::with_path(store.path().to_path_buf());
        assert_eq!(reopened.get(KEY).unwrap().as_deref(), Some(value));
        assert_eq!(reopened.get("other.key").unwrap().as_deref(), Some("x"));
    }

    #[cfg(unix)]
    #[test]
    fn written_file_is_owner_only() {
        let (_temp, store) = store();
        assert!(store.verify_permissions().unwrap());
        store.set(KEY, "v").unwrap();
        assert!(store.verify_permissions().unwrap());
    }

    #[test]
    fn parse_error_does_not_echo_content() {
        let (_temp, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "entries = \"hunter2").unwrap();

        let err = store.get(KEY).unwrap_err().to_string();
        assert!(err.contains("cannot parse"));
        assert!(!err.contains("hunter2"));
    }

    #[test]
    fn unknown_version_rejected() {
        let (_temp, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "version = 9\n").unwrap();
        assert!(store.get(KEY).is_err());
    }
}
