//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Acquires the default repository from the lifecycle service
//! 2. Runs one or more typed operations on the handle
//! 3. Formats and displays output, as text or as JSON with `--json`
//!
//! Handlers never release handles explicitly. The [`HandleRef`] guard
//! releases on drop, and the build's `Finished` event closes the rest.
//!
//! [`HandleRef`]: crate::registry::HandleRef

mod network;
mod query;
mod refs;

pub use network::{fetch, push};
pub use query::{describe, head, log, status};
pub use refs::{branch, tag};

use anyhow::Result;
use serde::Serialize;

use super::args::Command;
use crate::lifecycle::LifecycleService;

/// Everything a handler needs from the surrounding build.
pub struct Context<'a> {
    pub service: &'a LifecycleService,
    pub json: bool,
}

impl Context<'_> {
    /// Print `value` as pretty JSON, or run `text` to print it for humans.
    pub(crate) fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context<'_>) -> Result<()> {
    match command {
        Command::Status => status(ctx),
        Command::Log {
            revisions,
            max_count,
            skip,
        } => log(ctx, &revisions, max_count, skip),
        Command::Head => head(ctx),
        Command::Branch { all, remotes } => branch(ctx, all, remotes),
        Command::Tag { action } => tag(ctx, action),
        Command::Describe {
            revision,
            tags,
            long,
            always,
        } => describe(ctx, revision, tags, long, always),
        Command::Fetch {
            remote,
            prune,
            tags,
        } => fetch(ctx, remote, prune, tags),
        Command::Push {
            refs,
            remote,
            force,
            tags,
            all,
        } => push(ctx, refs, remote, force, tags, all),
    }
}
