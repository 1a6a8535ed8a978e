//! cli::commands::config_cmd
//!
//! Repository-level git config of the working directory.

use anyhow::{Context as _, Result};

use super::super::Context;
use super::{attach_engine, load_config, open_engine, runtime};

pub fn get(ctx: &Context, key: &str) -> Result<()> {
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;

    let rt = runtime()?;
    let value = rt.block_on(async {
        attach_engine(&engine).await?;
        engine
            .config_get(key)
            .await
            .with_context(|| format!("Failed to read '{}'", key))
    })?;

    match value {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => anyhow::bail!("'{}' is not set", key),
    }
}

pub fn set(ctx: &Context, key: &str, value: &str) -> Result<()> {
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;

    let rt = runtime()?;
    rt.block_on(async {
        attach_engine(&engine).await?;
        engine
            .config_set(key, value)
            .await
            .with_context(|| format!("Failed to set '{}'", key))
    })?;

    if !ctx.quiet {
        println!("Set {}", key);
    }
    Ok(())
}
