//! cli
//!
//! Command-line interface layer for gitshelf.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Build the engine and store from configuration
//! - Delegate to command handlers and format their output
//!
//! The CLI layer is thin: every repository change goes through
//! [`crate::sync::SyncEngine`] or [`crate::store::DocumentStore`].

pub mod args;
pub mod commands;

pub use args::Cli;

use std::path::PathBuf;

use anyhow::Result;

/// Global flags every command sees.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub quiet: bool,
    pub json: bool,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        config: cli.config.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
        json: cli.json,
    };
    commands::dispatch(cli.command, &ctx)
}
