//! ops
//!
//! The operation set: one typed options struct per porcelain operation.
//!
//! # Architecture
//!
//! Every operation implements [`Operation`], which splits the work in two:
//!
//! 1. **Validate**: pure input checks, no engine access
//! 2. **Execute**: engine calls against an open [`Session`]
//!
//! The repository handle drives both halves (see
//! [`RepositoryHandle::run`](crate::handle::RepositoryHandle::run)):
//!
//! ```text
//! lifecycle check -> validate -> lock session -> execute -> attach context
//! ```
//!
//! # Invariants
//!
//! - `validate` never touches the repository, so a validation failure
//!   cannot mutate state
//! - `execute` re-checks anything that needs the repository (revisions
//!   resolve, remotes exist) before the first mutation
//! - Results are snapshots; nothing returned is a live view
//! - Merge and rebase conflicts are outcomes, not errors
//!
//! # Example
//!
//! ```no_run
//! use grgit::ops::{CommitOptions, Operation, OperationKind};
//!
//! let op = CommitOptions::new("").allow_empty(true);
//! assert_eq!(CommitOptions::KIND, OperationKind::Commit);
//! assert!(op.validate().is_err());
//! ```

mod branch;
mod checkout;
mod commit;
mod history;
mod merge;
mod remote;
mod reset;
mod stage;
mod stash;
mod tag;

pub use branch::{BranchAdd, BranchList, BranchMode, BranchRemove, BranchStatus, TrackingStatus};
pub use checkout::CheckoutOptions;
pub use commit::CommitOptions;
pub use history::{
    DescribeOptions, DiffOptions, HeadQuery, LogOptions, ResolveRevision, StatusOptions,
};
pub use merge::{
    MergeAbort, MergeMode, MergeOptions, MergeOutcome, RebaseAbort, RebaseOptions, RebaseOutcome,
};
pub use remote::{
    FetchOptions, FetchSummary, LsRemoteOptions, PullOptions, PullOutcome, PushOptions,
    PushSummary, RemoteAdd, RemoteInfo, RemoteList, TagMode,
};
pub use reset::{ResetMode, ResetOptions};
pub use stage::{AddOptions, RemoveOptions};
pub use stash::{StashApply, StashDrop, StashEntry, StashList, StashSave};
pub use tag::{TagAdd, TagList, TagRemove};

use crate::engine::{EngineError, Session};

/// Tag naming each operation, carried by every error for context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Open,
    Init,
    Clone,
    Close,
    Acquire,
    Add,
    Remove,
    Commit,
    BranchList,
    BranchAdd,
    BranchRemove,
    BranchStatus,
    Checkout,
    TagList,
    TagAdd,
    TagRemove,
    Fetch,
    Push,
    Pull,
    LsRemote,
    RemoteList,
    RemoteAdd,
    Merge,
    MergeAbort,
    Rebase,
    RebaseAbort,
    Reset,
    Log,
    Diff,
    Status,
    Describe,
    Resolve,
    Head,
    StashSave,
    StashList,
    StashApply,
    StashDrop,
}

impl OperationKind {
    /// Lowercase name used in messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Open => "open",
            OperationKind::Init => "init",
            OperationKind::Clone => "clone",
            OperationKind::Close => "close",
            OperationKind::Acquire => "acquire",
            OperationKind::Add => "add",
            OperationKind::Remove => "remove",
            OperationKind::Commit => "commit",
            OperationKind::BranchList => "branch list",
            OperationKind::BranchAdd => "branch add",
            OperationKind::BranchRemove => "branch remove",
            OperationKind::BranchStatus => "branch status",
            OperationKind::Checkout => "checkout",
            OperationKind::TagList => "tag list",
            OperationKind::TagAdd => "tag add",
            OperationKind::TagRemove => "tag remove",
            OperationKind::Fetch => "fetch",
            OperationKind::Push => "push",
            OperationKind::Pull => "pull",
            OperationKind::LsRemote => "ls-remote",
            OperationKind::RemoteList => "remote list",
            OperationKind::RemoteAdd => "remote add",
            OperationKind::Merge => "merge",
            OperationKind::MergeAbort => "merge abort",
            OperationKind::Rebase => "rebase",
            OperationKind::RebaseAbort => "rebase abort",
            OperationKind::Reset => "reset",
            OperationKind::Log => "log",
            OperationKind::Diff => "diff",
            OperationKind::Status => "status",
            OperationKind::Describe => "describe",
            OperationKind::Resolve => "resolve",
            OperationKind::Head => "head",
            OperationKind::StashSave => "stash save",
            OperationKind::StashList => "stash list",
            OperationKind::StashApply => "stash apply",
            OperationKind::StashDrop => "stash drop",
        }
    }

    /// Whether the operation can move refs or change the index/working tree.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            OperationKind::BranchList
                | OperationKind::BranchStatus
                | OperationKind::TagList
                | OperationKind::LsRemote
                | OperationKind::RemoteList
                | OperationKind::Log
                | OperationKind::Diff
                | OperationKind::Status
                | OperationKind::Describe
                | OperationKind::Resolve
                | OperationKind::Head
                | OperationKind::StashList
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A porcelain operation against an open session.
///
/// # Requirements
///
/// - `validate` must be pure: no I/O, no engine calls
/// - `execute` must not mutate anything before its own repository-dependent
///   checks pass
pub trait Operation {
    /// Which operation this is.
    const KIND: OperationKind;

    /// Result of a successful run.
    type Output;

    /// Check the options before any engine call.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Run against the session.
    fn execute(self, session: &mut Session) -> Result<Self::Output, EngineError>;
}

/// Reject an empty list or any blank entry.
pub(crate) fn require_entries(what: &str, entries: &[String]) -> Result<(), String> {
    if entries.is_empty() {
        return Err(format!("at least one {} is required", what));
    }
    if entries.iter().any(|e| e.trim().is_empty()) {
        return Err(format!("{} cannot be blank", what));
    }
    Ok(())
}

/// Reject a blank remote name.
pub(crate) fn require_remote(remote: &str) -> Result<(), String> {
    if remote.trim().is_empty() {
        return Err("remote name cannot be empty".into());
    }
    Ok(())
}
