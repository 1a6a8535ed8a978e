//! cli::commands::read
//!
//! Object reads: `read` prints one object, `list` the objects of a
//! subdirectory. Both attach to the working directory without modifying it
//! and refuse to read over changes that were not committed.

use anyhow::{Context as _, Result};

use super::super::Context;
use super::{load_config, open_store, print_json, runtime};
use crate::core::types::{CommitId, ObjectId};
use crate::git::Git2Backend;
use crate::store::{Codec, DocumentStore, StoreError, YamlCodec};

fn attached(ctx: &Context) -> Result<(DocumentStore<Git2Backend>, tokio::runtime::Runtime)> {
    let config = load_config(ctx)?;
    let store = open_store(&config)?;
    let rt = runtime()?;
    match rt.block_on(store.attach()) {
        Ok(()) => {}
        Err(StoreError::NotReady(_)) => {
            anyhow::bail!("Working directory is not initialized; run 'gitshelf init'")
        }
        Err(err @ StoreError::UnownedChanges(_)) => {
            return Err(anyhow::Error::new(err)
                .context("Commit or discard them first ('gitshelf commit' / 'gitshelf discard')"))
        }
        Err(err) => return Err(err).context("Failed to open working directory"),
    }
    Ok((store, rt))
}

pub fn read(
    ctx: &Context,
    id: &str,
    at: Option<&str>,
    meta_fields: Option<&[String]>,
) -> Result<()> {
    let id = ObjectId::new(id).context("Invalid object id")?;
    let (store, rt) = attached(ctx)?;

    let record = match at {
        Some(version) => {
            let version = CommitId::new(version).context("Invalid commit id")?;
            rt.block_on(store.read_version(&id, &version))
                .with_context(|| format!("Failed to read {} at {}", id, version.short(8)))?
        }
        None => rt
            .block_on(store.read(&id, meta_fields))
            .with_context(|| format!("Failed to read {}", id))?,
    };

    if ctx.json {
        return print_json(&record);
    }
    let bytes = YamlCodec
        .encode(record.fields())
        .context("Failed to render object")?;
    print!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

pub fn list(ctx: &Context, subdir: &str, index_field: Option<&str>) -> Result<()> {
    let (store, rt) = attached(ctx)?;

    let Some(field) = index_field else {
        let ids = rt
            .block_on(store.list_ids(subdir))
            .with_context(|| format!("Failed to list '{}'", subdir))?;
        if ctx.json {
            return print_json(&ids);
        }
        for id in ids {
            println!("{}", id);
        }
        return Ok(());
    };

    let index = rt
        .block_on(store.get_index(subdir, field, None, None))
        .with_context(|| format!("Failed to index '{}'", subdir))?;
    if ctx.json {
        return print_json(&index);
    }
    for (key, record) in &index.entries {
        println!("{}\t{}", key, record.id());
    }
    if !ctx.quiet {
        for skipped in &index.skipped {
            eprintln!("skipped {}: {}", skipped.id, skipped.reason);
        }
    }
    Ok(())
}
