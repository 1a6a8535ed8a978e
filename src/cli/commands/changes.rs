//! cli::commands::changes
//!
//! Local history: inspect uncommitted paths and unpushed commits, commit
//! or discard changes.
//!
//! Paths are relative to the working directory. A path that no longer
//! exists is committed as a removal.

use anyhow::{Context as _, Result};

use super::super::Context;
use super::{attach_engine, load_config, open_engine, print_json, runtime};
use crate::git::Git2Backend;
use crate::sync::{CommitSummary, SyncEngine};

pub fn uncommitted(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;

    let rt = runtime()?;
    let paths = rt.block_on(async {
        attach_engine(&engine).await?;
        engine
            .list_changed_files(None)
            .await
            .context("Failed to list changed paths")
    })?;

    if ctx.json {
        return print_json(&paths);
    }
    for path in paths {
        println!("{}", path);
    }
    Ok(())
}

pub fn unpushed(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;

    let rt = runtime()?;
    let commits = rt.block_on(async {
        attach_engine(&engine).await?;
        engine
            .list_local_commits()
            .await
            .context("Failed to list local commits")
    })?;

    if ctx.json {
        return print_json(&commits);
    }
    for commit in commits {
        println!("{}", commit);
    }
    Ok(())
}

pub fn commit(ctx: &Context, message: &str, push: bool, paths: &[String]) -> Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("Commit message cannot be empty");
    }
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;

    let rt = runtime()?;
    let summary = rt.block_on(async {
        attach_engine(&engine).await?;
        let summary = commit_paths(&engine, message, paths).await?;
        if push && summary.commit.is_some() {
            engine
                .synchronize()
                .await
                .context("Committed, but pushing failed")?;
        }
        Ok::<_, anyhow::Error>(summary)
    })?;

    if ctx.json {
        return print_json(&summary);
    }
    if ctx.quiet {
        if let Some(commit) = &summary.commit {
            println!("{}", commit);
        }
        return Ok(());
    }
    match &summary.commit {
        Some(commit) => println!(
            "Committed {} ({} path(s)){}",
            commit.short(8),
            summary.paths_committed,
            if push { ", pushed" } else { "" }
        ),
        None => println!("Nothing to commit"),
    }
    Ok(())
}

async fn commit_paths(
    engine: &SyncEngine<Git2Backend>,
    message: &str,
    paths: &[String],
) -> Result<CommitSummary> {
    let paths = if paths.is_empty() {
        engine.list_changed_files(None).await?
    } else {
        paths.to_vec()
    };

    let work_dir = engine.paths().work_dir();
    let (additions, removals): (Vec<String>, Vec<String>) = paths
        .into_iter()
        .partition(|path| work_dir.join(path).exists());
    tracing::debug!(
        additions = additions.len(),
        removals = removals.len(),
        "committing paths"
    );

    engine
        .commit_paths(&additions, &removals, message)
        .await
        .context("Failed to commit")
}

pub fn discard(ctx: &Context, paths: &[String]) -> Result<()> {
    let config = load_config(ctx)?;
    let engine = open_engine(&config)?;

    let rt = runtime()?;
    rt.block_on(async {
        attach_engine(&engine).await?;
        let scope = (!paths.is_empty()).then_some(paths);
        engine
            .reset_files(scope)
            .await
            .context("Failed to discard changes")
    })?;

    if !ctx.quiet {
        match paths.len() {
            0 => println!("Discarded all uncommitted changes"),
            n => println!("Discarded changes in {} path(s)", n),
        }
    }
    Ok(())
}
