//! engine
//!
//! The only doorway to libgit2.
//!
//! # Architecture
//!
//! The engine adapter is a thin translation layer over the `git2` crate. It
//! opens and creates repositories, exposes the object-level primitives the
//! operations need (refs, commits, trees, remotes), and classifies libgit2
//! failures into [`EngineError`].
//!
//! ```text
//! registry -> open_existing / init_new / clone_from -> Session
//! handle   -> ops::Operation::execute(&mut Session)
//! registry -> close_session(Session)
//! ```
//!
//! # Invariants
//!
//! - A [`Session`] owns its repository exclusively; closing consumes it
//! - Every call blocks the calling thread for the duration of the engine I/O
//! - No caching happens here; the handle registry is the only cache
//! - Only `engine` and `ops` name `git2` types

pub mod error;
pub mod session;
pub(crate) mod transport;

pub use error::EngineError;
pub use session::{
    clone_from, close_session, discover, init_new, open_existing, CloneOptions, InitOptions,
    Session,
};
