//! cli::commands::init
//!
//! Prepare the working directory: clone when missing, or replace it with a
//! fresh clone under `--force`.
//!
//! Uncommitted changes left by a previous session that crashed before
//! committing are discarded here, the same way an application discards them
//! on startup.

use anyhow::{Context as _, Result};

use super::super::Context;
use super::{load_config, open_store, print_json, runtime};
use crate::sync::InitOutcome;

pub fn init(ctx: &Context, force: bool) -> Result<()> {
    let config = load_config(ctx)?;
    let store = open_store(&config)?;

    let rt = runtime()?;
    let outcome = rt
        .block_on(store.initialize(force))
        .context("Failed to initialize working directory")?;

    if ctx.json {
        return print_json(&serde_json::json!({
            "outcome": outcome,
            "store": store.describe(),
        }));
    }
    if !ctx.quiet {
        let work_dir = store.engine().paths().work_dir().display().to_string();
        match outcome {
            InitOutcome::Existing => println!("Using existing repository at {}", work_dir),
            InitOutcome::Cloned => println!("Cloned into {}", work_dir),
            InitOutcome::ClonedFromUpstream => println!(
                "Remote unavailable; cloned upstream into {}",
                work_dir
            ),
        }
    }
    Ok(())
}
