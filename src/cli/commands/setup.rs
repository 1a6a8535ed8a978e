//! cli::commands::setup
//!
//! Write or update the configuration file.
//!
//! Given options override what is already in the file; everything else is
//! kept. The file is validated before it is written.

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use super::super::Context;
use crate::core::config::{AuthorConfig, Config, StoreConfig};

/// Settings given on the command line.
#[derive(Debug, Default)]
pub struct SetupArgs {
    pub work_dir: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub upstream_url: Option<String>,
    pub proxy_url: Option<String>,
    pub branch: Option<String>,
    pub username: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl SetupArgs {
    fn apply(self, store: &mut StoreConfig) {
        fn set<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set(&mut store.work_dir, self.work_dir);
        set(&mut store.remote_url, self.remote_url);
        set(&mut store.upstream_url, self.upstream_url);
        set(&mut store.proxy_url, self.proxy_url);
        set(&mut store.branch, self.branch);
        set(&mut store.username, self.username);

        if self.author_name.is_some() || self.author_email.is_some() {
            let author = store.author.get_or_insert_with(AuthorConfig::default);
            set(&mut author.name, self.author_name);
            set(&mut author.email, self.author_email);
        }
    }
}

pub fn setup(ctx: &Context, args: SetupArgs) -> Result<()> {
    let path = match &ctx.config {
        Some(path) => path.clone(),
        None => match Config::load(None)?.loaded_from() {
            Some(path) => path.to_path_buf(),
            None => Config::default_path()?,
        },
    };

    let mut store = if path.exists() {
        Config::load(Some(&path))
            .with_context(|| format!("Failed to load {}", path.display()))?
            .store
    } else {
        StoreConfig::default()
    };
    args.apply(&mut store);

    Config::write(&path, &store).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote config");

    if !ctx.quiet {
        println!("Wrote {}", path.display());
        let missing = Config::from_store_config(store)?.missing_required();
        if !missing.is_empty() {
            println!("Still missing: {}", missing.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_keeps_unset_fields() {
        let mut store = StoreConfig {
            remote_url: Some("https://old.example.com/r.git".into()),
            username: Some("alice".into()),
            ..Default::default()
        };
        SetupArgs {
            remote_url: Some("https://new.example.com/r.git".into()),
            author_email: Some("alice@example.com".into()),
            ..Default::default()
        }
        .apply(&mut store);

        assert_eq!(store.remote_url.as_deref(), Some("https://new.example.com/r.git"));
        assert_eq!(store.username.as_deref(), Some("alice"));
        let author = store.author.unwrap();
        assert_eq!(author.email.as_deref(), Some("alice@example.com"));
        assert!(author.name.is_none());
    }
}
