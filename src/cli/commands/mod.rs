//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads configuration and builds the engine (and store, for object
//!    commands)
//! 2. Runs the async operation on a runtime created for this invocation
//! 3. Formats and displays output
//!
//! Object reads attach the store read-only, so an invocation never discards
//! uncommitted edits made by hand between invocations.

mod changes;
mod config_cmd;
mod init;
mod password;
mod read;
mod setup;
mod status;
mod sync;

pub use changes::{commit, discard, uncommitted, unpushed};
pub use config_cmd::{get as config_get, set as config_set};
pub use init::init;
pub use password::password;
pub use read::{list, read};
pub use setup::{setup, SetupArgs};
pub use status::status;
pub use sync::sync;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::args::{Command, ConfigAction};
use super::Context;
use crate::auth::{self, Password};
use crate::core::config::Config;
use crate::git::Git2Backend;
use crate::secrets::{self, SecretStore};
use crate::store::{DocumentStore, ObjectType};
use crate::sync::SyncEngine;

/// Environment variable supplying the remote password non-interactively.
pub const PASSWORD_ENV: &str = "GITSHELF_PASSWORD";

pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Setup {
            work_dir,
            remote_url,
            upstream_url,
            proxy_url,
            branch,
            username,
            author_name,
            author_email,
        } => setup::setup(
            ctx,
            SetupArgs {
                work_dir,
                remote_url,
                upstream_url,
                proxy_url,
                branch,
                username,
                author_name,
                author_email,
            },
        ),
        Command::Init { force } => init::init(ctx, force),
        Command::Sync => sync::sync(ctx),
        Command::Status => status::status(ctx),
        Command::Read {
            id,
            at,
            meta_fields,
        } => read::read(ctx, &id, at.as_deref(), meta_fields.as_deref()),
        Command::List { subdir, index } => read::list(ctx, &subdir, index.as_deref()),
        Command::Uncommitted => changes::uncommitted(ctx),
        Command::Unpushed => changes::unpushed(ctx),
        Command::Commit {
            message,
            push,
            paths,
        } => changes::commit(ctx, &message, push, &paths),
        Command::Discard { paths } => changes::discard(ctx, &paths),
        Command::Config { action } => match action {
            ConfigAction::Get { key } => config_cmd::get(ctx, &key),
            ConfigAction::Set { key, value } => config_cmd::set(ctx, &key, &value),
        },
        Command::Password { forget, stdin } => password::password(ctx, forget, stdin),
    }
}

/// Runtime for one command invocation.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start async runtime")
}

pub(crate) fn load_config(ctx: &Context) -> Result<Config> {
    Config::load(ctx.config.as_deref()).context("Failed to load configuration")
}

pub(crate) fn secret_store() -> Result<Arc<dyn SecretStore>> {
    let store = secrets::create_store(secrets::DEFAULT_PROVIDER)
        .context("Failed to open secret store")?;
    Ok(Arc::from(store))
}

/// Engine for the configured working directory.
///
/// `GITSHELF_PASSWORD`, when set, takes precedence over the configured
/// credential provider.
pub(crate) fn open_engine(config: &Config) -> Result<SyncEngine<Git2Backend>> {
    let options = config
        .engine_options()
        .context("Configuration incomplete; run 'gitshelf setup'")?;
    let provider = auth::provider_for(config.secrets_provider(), secret_store()?)
        .context("Failed to set up credentials")?;
    let engine = SyncEngine::open(options, Some(provider));

    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            engine.set_password(Some(Password::new(password)));
        }
    }
    Ok(engine)
}

/// Take ownership of an existing working directory without cloning.
pub(crate) async fn attach_engine(engine: &SyncEngine<Git2Backend>) -> Result<()> {
    if !engine.is_initialized().await {
        anyhow::bail!(
            "No repository at {}; run 'gitshelf init'",
            engine.paths().work_dir().display()
        );
    }
    engine
        .initialize(false)
        .await
        .context("Failed to open working directory")?;
    Ok(())
}

pub(crate) fn open_store(config: &Config) -> Result<DocumentStore<Git2Backend>> {
    let engine = open_engine(config)?;
    let types = config.object_types().iter().map(ObjectType::from).collect();
    Ok(DocumentStore::new(engine, types))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}
