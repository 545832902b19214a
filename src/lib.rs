//! grgit - A porcelain Git API for build tooling
//!
//! grgit lets build automation (release tagging, changelog generation, CI
//! metadata, multi-repo orchestration) script source-control operations
//! without shelling out to the `git` binary.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture, leaves first:
//!
//! - [`engine`] - The only doorway to libgit2: sessions and error translation
//! - [`ops`] - One typed operation per porcelain command (commit, tag, push, ...)
//! - [`handle`] - A shared repository handle with an explicit lifecycle
//! - [`registry`] - Process-wide cache of open handles keyed by [`Location`]
//! - [`lifecycle`] - Binds registry entries to the host build's phases
//! - [`core`] - Domain types, locations, credentials, and configuration
//! - [`cli`] - Command-line scripting surface over the lifecycle service
//!
//! # Correctness Invariants
//!
//! 1. At most one open handle exists per canonical location
//! 2. Engine opens and closes never run under the registry lock
//! 3. Every handle is closed exactly once, even on build failure
//! 4. Validation errors never mutate the repository
//!
//! # Example
//!
//! ```no_run
//! use grgit::core::location::Location;
//! use grgit::ops::{AddOptions, CommitOptions, TagAdd};
//! use grgit::registry::{HandleRegistry, OpenStrategy};
//!
//! # fn main() -> Result<(), grgit::GrgitError> {
//! let registry = HandleRegistry::new();
//! let location = Location::local("/tmp/project")?;
//! let repo = registry.acquire(&location, OpenStrategy::OpenOrInit(Default::default()))?;
//!
//! repo.add(AddOptions::new(["."]))?;
//! let commit = repo.commit(CommitOptions::new("initial"))?;
//! repo.tag_add(TagAdd::new("v1"))?;
//! println!("tagged {}", commit.id.short(7));
//!
//! repo.release();
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod core;
pub mod engine;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod ops;
pub mod registry;

pub use crate::core::location::Location;
pub use error::{ErrorKind, GrgitError, TransportFailure};
pub use handle::{HandleState, RepositoryHandle};
pub use lifecycle::LifecycleService;
pub use registry::{HandleRef, HandleRegistry, OpenStrategy};
