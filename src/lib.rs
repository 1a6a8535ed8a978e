//! gitshelf - versioned YAML documents synchronized through git
//!
//! gitshelf keeps structured objects as YAML files in a local git working
//! directory and synchronizes them with a remote repository. Applications
//! read and write objects through a [`store::DocumentStore`]; commits, pulls
//! and pushes go through a single [`sync::SyncEngine`] per working directory.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to the store and engine)
//! - [`store`] - Object storage, id resolution and change tracking
//! - [`sync`] - Serialized git operations, push coalescing, status
//! - [`core`] - Domain types, configuration, paths, locking, status
//! - [`git`] - Single interface for all git operations
//! - [`auth`] - Remote credentials
//! - [`secrets`] - Secret storage abstraction
//!
//! # Correctness Invariants
//!
//! 1. At most one git operation runs against a working directory at a time
//! 2. The remote branch is only ever fast-forwarded; diverged history is
//!    reported, never merged or overwritten
//! 3. Changes made through the store are either committed or discarded on
//!    the next initialization
//! 4. Passwords never appear in logs or error messages

pub mod auth;
pub mod cli;
pub mod core;
pub mod git;
pub mod secrets;
pub mod store;
pub mod sync;
