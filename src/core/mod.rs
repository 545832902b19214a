//! core
//!
//! Core domain types, locations, credentials, and configuration for grgit.
//!
//! # Modules
//!
//! - [`types`] - Strong types: CommitId, Commit, Ref, Branch, Tag, Status
//! - [`location`] - Canonical repository identity used as the registry key
//! - [`credentials`] - Per-call transport credentials and their sources
//! - [`config`] - Host build configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Query results are immutable snapshots, never live views
//! - Nothing here touches the engine

pub mod config;
pub mod credentials;
pub mod location;
pub mod types;
