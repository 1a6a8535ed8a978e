//! git
//!
//! Single doorway for all repository operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to git. Every repository read and
//! write flows through [`VcsBackend`]. No other module imports `git2`, and
//! nothing outside this module reads `.git` internals.
//!
//! # Responsibilities
//!
//! - Clone, remotes and repository-level config
//! - Index staging, commits, fast-forward checkout
//! - Fetch and push with credential, proxy and deadline callbacks
//! - Status, local-commit and historical blob queries
//! - Normalizing `git2::Error` into [`GitError`]
//!
//! # Invariants
//!
//! - Remote integration is fast-forward only; nothing here merges or rebases
//! - A commit is never created from an index equal to HEAD
//! - Paths are validated relative to the working directory before use
//!
//! # Example
//!
//! ```no_run
//! use gitshelf::git::{Git2Backend, VcsBackend};
//!
//! let backend = Git2Backend::new("/data/shelf");
//! if backend.is_initialized() {
//!     for path in backend.changed_files(None).unwrap() {
//!         println!("changed: {path}");
//!     }
//! }
//! ```

mod git2_backend;
mod interface;

pub use git2_backend::Git2Backend;
pub use interface::{
    validate_config_key, AheadBehind, Author, GitError, RemoteOptions, VcsBackend, ORIGIN,
    UPSTREAM,
};
