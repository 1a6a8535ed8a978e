//! core
//!
//! Core domain types, configuration and shared infrastructure.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, CommitId, ObjectId
//! - [`paths`] - Path routing and relative-path validation
//! - [`config`] - Configuration schema and loading
//! - [`lock`] - Exclusive working-directory lock
//! - [`status`] - Observable synchronization status

pub mod config;
pub mod lock;
pub mod paths;
pub mod status;
pub mod types;
