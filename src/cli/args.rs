//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! - `--config <path>`: Use this config file instead of the default lookup
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--json`: Machine-readable output where a command supports it

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gitshelf - versioned YAML documents synchronized through git
#[derive(Parser, Debug)]
#[command(name = "gitshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use (default: $GITSHELF_CONFIG, then the XDG and home locations)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the gitshelf configuration file
    #[command(after_help = "\
EXAMPLES:
    gitshelf setup --work-dir ~/shelf --remote-url https://git.example.com/shelf.git \\
        --username alice --author-name Alice --author-email alice@example.com")]
    Setup {
        #[arg(long, value_name = "PATH")]
        work_dir: Option<PathBuf>,

        #[arg(long, value_name = "URL")]
        remote_url: Option<String>,

        /// Read-only fallback used when the remote cannot be cloned
        #[arg(long, value_name = "URL")]
        upstream_url: Option<String>,

        #[arg(long, value_name = "URL")]
        proxy_url: Option<String>,

        #[arg(long)]
        branch: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        author_name: Option<String>,

        #[arg(long)]
        author_email: Option<String>,
    },

    /// Clone the remote into the working directory if needed
    Init {
        /// Replace the working directory with a fresh clone
        #[arg(long)]
        force: bool,
    },

    /// Pull remote changes and push local commits
    Sync,

    /// Show synchronization status
    Status,

    /// Print an object
    Read {
        /// Object id, bare (`a1`) or qualified (`items/a1`)
        id: String,

        /// Read the object as of this commit
        #[arg(long, value_name = "COMMIT")]
        at: Option<String>,

        /// For file sets, read only the meta file (restricted to these fields)
        #[arg(long = "meta", value_name = "FIELD", num_args = 0..)]
        meta_fields: Option<Vec<String>>,
    },

    /// List objects in a subdirectory
    List {
        /// Subdirectory, relative to the working directory
        #[arg(default_value = "")]
        subdir: String,

        /// Read every object and key the output by this field
        #[arg(long, value_name = "FIELD")]
        index: Option<String>,
    },

    /// List uncommitted paths
    Uncommitted,

    /// List commits not yet pushed
    Unpushed,

    /// Commit changed paths (all of them if none are given)
    Commit {
        #[arg(short, long)]
        message: String,

        /// Push right after committing
        #[arg(long)]
        push: bool,

        paths: Vec<String>,
    },

    /// Drop uncommitted changes (all of them if no paths are given)
    Discard { paths: Vec<String> },

    /// Get or set repository git config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Store the remote password in the secret store
    Password {
        /// Remove the stored password instead
        #[arg(long)]
        forget: bool,

        /// Read the password from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
}
