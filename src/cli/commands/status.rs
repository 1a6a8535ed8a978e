//! cli::commands::status
//!
//! Report the working directory's state without contacting the remote.

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::super::Context;
use super::{load_config, open_engine, print_json, runtime};
use crate::core::status::SyncStatus;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    work_dir: String,
    remote_url: String,
    branch: String,
    initialized: bool,
    uncommitted: Vec<String>,
    unpushed: usize,
    status: SyncStatus,
}

pub fn status(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;
    let location = &engine.options().location;

    let rt = runtime()?;
    let report = rt.block_on(async {
        let initialized = engine.is_initialized().await;
        let (uncommitted, unpushed) = if initialized {
            engine
                .check_uncommitted()
                .await
                .context("Failed to inspect working directory")?;
            let changed = engine.list_changed_files(None).await?;
            let local = engine.list_local_commits().await?;
            (changed, local.len())
        } else {
            (Vec::new(), 0)
        };
        Ok::<_, anyhow::Error>(StatusReport {
            work_dir: location.work_dir.display().to_string(),
            remote_url: location.remote_url.clone(),
            branch: location.branch.to_string(),
            initialized,
            uncommitted,
            unpushed,
            status: engine.status(),
        })
    })?;

    if ctx.json {
        return print_json(&report);
    }
    if ctx.quiet {
        let state = match (report.initialized, report.uncommitted.is_empty()) {
            (false, _) => "uninitialized",
            (true, true) => "clean",
            (true, false) => "dirty",
        };
        println!("{}", state);
        return Ok(());
    }

    println!("Working directory: {}", report.work_dir);
    println!("Remote:            {} ({})", report.remote_url, report.branch);
    if !report.initialized {
        println!("Not initialized. Run 'gitshelf init'.");
        return Ok(());
    }
    println!("Uncommitted paths: {}", report.uncommitted.len());
    for path in &report.uncommitted {
        println!("  {}", path);
    }
    println!("Unpushed commits:  {}", report.unpushed);
    if let Some(err) = &report.status.last_error {
        println!("Last error:        {}", err);
    }
    Ok(())
}
