//! ops::stash
//!
//! Save, list, apply, and drop stashed working tree changes.

use serde::{Deserialize, Serialize};

use super::{Operation, OperationKind};
use crate::core::types::CommitId;
use crate::engine::{EngineError, Session};

/// One entry of the stash stack, newest at index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashEntry {
    pub index: usize,
    pub message: String,
    pub id: CommitId,
}

/// Stash working tree and index changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StashSave {
    pub message: Option<String>,
    pub include_untracked: bool,
    /// Leave staged changes in the index
    pub keep_index: bool,
}

impl StashSave {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn include_untracked(mut self, include: bool) -> Self {
        self.include_untracked = include;
        self
    }
}

impl Operation for StashSave {
    const KIND: OperationKind = OperationKind::StashSave;
    /// The stash commit, or `None` when there was nothing to stash
    type Output = Option<CommitId>;

    fn execute(self, session: &mut Session) -> Result<Option<CommitId>, EngineError> {
        session.require_workdir()?;
        let signature = session.signature(None)?;

        let mut flags = git2::StashFlags::DEFAULT;
        if self.include_untracked {
            flags |= git2::StashFlags::INCLUDE_UNTRACKED;
        }
        if self.keep_index {
            flags |= git2::StashFlags::KEEP_INDEX;
        }

        match session
            .repo_mut()
            .stash_save(&signature, self.message.as_deref().unwrap_or(""), Some(flags))
        {
            Ok(id) => Ok(Some(id.into())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// List stash entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StashList;

impl Operation for StashList {
    const KIND: OperationKind = OperationKind::StashList;
    type Output = Vec<StashEntry>;

    fn execute(self, session: &mut Session) -> Result<Vec<StashEntry>, EngineError> {
        let mut entries = Vec::new();
        session.repo_mut().stash_foreach(|index, message, id| {
            entries.push(StashEntry {
                index,
                message: message.to_string(),
                id: (*id).into(),
            });
            true
        })?;
        Ok(entries)
    }
}

/// Apply a stash entry, optionally dropping it afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StashApply {
    pub index: usize,
    pub pop: bool,
}

impl StashApply {
    pub fn new(index: usize) -> Self {
        Self { index, pop: false }
    }

    pub fn pop(mut self, pop: bool) -> Self {
        self.pop = pop;
        self
    }
}

impl Operation for StashApply {
    const KIND: OperationKind = OperationKind::StashApply;
    type Output = ();

    fn execute(self, session: &mut Session) -> Result<(), EngineError> {
        session.require_workdir()?;
        let repo = session.repo_mut();
        let result = if self.pop {
            repo.stash_pop(self.index, None)
        } else {
            repo.stash_apply(self.index, None)
        };
        result.map_err(|e| stash_error(e, self.index))
    }
}

/// Drop a stash entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StashDrop {
    pub index: usize,
}

impl StashDrop {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl Operation for StashDrop {
    const KIND: OperationKind = OperationKind::StashDrop;
    type Output = ();

    fn execute(self, session: &mut Session) -> Result<(), EngineError> {
        session
            .repo_mut()
            .stash_drop(self.index)
            .map_err(|e| stash_error(e, self.index))
    }
}

fn stash_error(err: git2::Error, index: usize) -> EngineError {
    match err.code() {
        git2::ErrorCode::NotFound => {
            EngineError::invalid(format!("no stash entry at index {}", index))
        }
        git2::ErrorCode::Conflict | git2::ErrorCode::MergeConflict => EngineError::invalid(
            "stash conflicts with local changes; commit or discard them first",
        ),
        _ => EngineError::from(err),
    }
}
