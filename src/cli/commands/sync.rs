//! cli::commands::sync
//!
//! One synchronization cycle: pull, then push local commits.

use anyhow::{Context as _, Result};

use super::super::Context;
use super::{load_config, open_engine, print_json, runtime};
use crate::git::Git2Backend;
use crate::sync::{SyncEngine, SyncError, SyncReport};

pub fn sync(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;

    let rt = runtime()?;
    let report = rt.block_on(run(&engine))?;

    if ctx.json {
        return print_json(&report);
    }
    if !ctx.quiet {
        let pull = &report.pull;
        if pull.fast_forwarded > 0 {
            println!(
                "Pulled {} commit(s), {} path(s) changed",
                pull.fast_forwarded,
                pull.changed_paths.len()
            );
        }
        if report.pushed {
            let note = if report.retried_after_rejection {
                " (after one retry)"
            } else {
                ""
            };
            println!("Pushed local commits{}", note);
        }
        if pull.fast_forwarded == 0 && !report.pushed {
            println!("Already up to date");
        }
    }
    Ok(())
}

async fn run(engine: &SyncEngine<Git2Backend>) -> Result<SyncReport> {
    engine
        .initialize(false)
        .await
        .context("Failed to initialize working directory")?;
    match engine.synchronize().await {
        Ok(report) => Ok(report),
        Err(SyncError::DivergedHistory { ahead, behind }) => anyhow::bail!(
            "Local and remote history have diverged ({} local, {} remote commits). \
             Local commits are kept; reconcile them manually.",
            ahead,
            behind
        ),
        Err(SyncError::Authentication(reason)) => anyhow::bail!(
            "Authentication failed: {}. Run 'gitshelf password' or set {}.",
            reason,
            super::PASSWORD_ENV
        ),
        Err(err) => Err(err).context("Synchronization failed"),
    }
}
