//! ops::branch
//!
//! Branch listing, creation, deletion, and upstream tracking status.

use serde::{Deserialize, Serialize};

use super::{require_entries, Operation, OperationKind};
use crate::core::types::{validate_short_name, Branch, CommitId};
use crate::engine::{EngineError, Session};

/// Which branches to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BranchMode {
    #[default]
    Local,
    Remote,
    All,
}

/// List branches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchList {
    pub mode: BranchMode,
}

impl BranchList {
    pub fn new(mode: BranchMode) -> Self {
        Self { mode }
    }
}

impl Operation for BranchList {
    const KIND: OperationKind = OperationKind::BranchList;
    type Output = Vec<Branch>;

    fn execute(self, session: &mut Session) -> Result<Vec<Branch>, EngineError> {
        let filter = match self.mode {
            BranchMode::Local => Some(git2::BranchType::Local),
            BranchMode::Remote => Some(git2::BranchType::Remote),
            BranchMode::All => None,
        };

        let mut branches = Vec::new();
        for entry in session.repo().branches(filter)? {
            let (branch, _) = entry?;
            // Symbolic remote HEADs (refs/remotes/origin/HEAD) are not branches.
            if branch.get().kind() == Some(git2::ReferenceType::Symbolic) {
                continue;
            }
            if let Some(snapshot) = branch_snapshot(&branch)? {
                branches.push(snapshot);
            }
        }
        branches.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(branches)
    }
}

/// Create a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchAdd {
    /// Short branch name
    pub name: String,
    /// Revision to start from (`HEAD` when `None`)
    pub start_point: Option<String>,
    /// Move an existing branch of the same name
    pub force: bool,
}

impl BranchAdd {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn start_point(mut self, rev: impl Into<String>) -> Self {
        self.start_point = Some(rev.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Operation for BranchAdd {
    const KIND: OperationKind = OperationKind::BranchAdd;
    type Output = Branch;

    fn validate(&self) -> Result<(), String> {
        validate_short_name(&self.name).map_err(|e| e.to_string())
    }

    fn execute(self, session: &mut Session) -> Result<Branch, EngineError> {
        let repo = session.repo();
        let start = self.start_point.as_deref().unwrap_or("HEAD");
        let commit = session.resolve_commit(start)?;

        if !self.force && repo.find_branch(&self.name, git2::BranchType::Local).is_ok() {
            return Err(EngineError::invalid(format!(
                "branch '{}' already exists",
                self.name
            )));
        }
        let current = session.current_branch()?;
        if self.force && current.as_deref() == Some(format!("refs/heads/{}", self.name).as_str()) {
            return Err(EngineError::invalid(format!(
                "cannot force-update the checked out branch '{}'",
                self.name
            )));
        }

        let mut branch = repo.branch(&self.name, &commit, self.force)?;

        // Starting from a remote branch tracks it.
        if let Some(start) = &self.start_point {
            if repo.find_branch(start, git2::BranchType::Remote).is_ok() {
                branch.set_upstream(Some(start))?;
            }
        }

        branch_snapshot(&branch)?
            .ok_or_else(|| EngineError::invalid(format!("branch '{}' has no target", self.name)))
    }
}

/// Delete branches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchRemove {
    /// Short branch names
    pub names: Vec<String>,
    /// Delete even if not merged into HEAD
    pub force: bool,
}

impl BranchRemove {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Operation for BranchRemove {
    const KIND: OperationKind = OperationKind::BranchRemove;
    /// Full names of the deleted branches
    type Output = Vec<String>;

    fn validate(&self) -> Result<(), String> {
        require_entries("branch name", &self.names)
    }

    fn execute(self, session: &mut Session) -> Result<Vec<String>, EngineError> {
        let repo = session.repo();
        let current = session.current_branch()?;
        let head = session.head_commit()?;

        // Check every branch before deleting any.
        let mut doomed = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let branch = repo
                .find_branch(name, git2::BranchType::Local)
                .map_err(|_| EngineError::invalid(format!("branch '{}' does not exist", name)))?;
            let full_name = branch_name(&branch);
            if current.as_deref() == Some(full_name.as_str()) {
                return Err(EngineError::invalid(format!(
                    "cannot delete the checked out branch '{}'",
                    name
                )));
            }
            if !self.force {
                let merged = match (branch.get().target(), &head) {
                    (Some(tip), Some(head)) => {
                        tip == head.id() || repo.graph_descendant_of(head.id(), tip)?
                    }
                    _ => false,
                };
                if !merged {
                    return Err(EngineError::invalid(format!(
                        "branch '{}' is not fully merged; use force to delete it",
                        name
                    )));
                }
            }
            doomed.push((full_name, branch));
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for (full_name, mut branch) in doomed {
            branch.delete()?;
            removed.push(full_name);
        }
        Ok(removed)
    }
}

/// Commits ahead of and behind the upstream branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub ahead: usize,
    pub behind: usize,
}

/// Compare a local branch to its upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchStatus {
    pub name: String,
}

impl BranchStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Operation for BranchStatus {
    const KIND: OperationKind = OperationKind::BranchStatus;
    type Output = TrackingStatus;

    fn validate(&self) -> Result<(), String> {
        validate_short_name(&self.name).map_err(|e| e.to_string())
    }

    fn execute(self, session: &mut Session) -> Result<TrackingStatus, EngineError> {
        let repo = session.repo();
        let branch = repo
            .find_branch(&self.name, git2::BranchType::Local)
            .map_err(|_| EngineError::invalid(format!("branch '{}' does not exist", self.name)))?;
        let upstream = branch.upstream().map_err(|_| {
            EngineError::invalid(format!("branch '{}' has no upstream", self.name))
        })?;

        match (branch.get().target(), upstream.get().target()) {
            (Some(local), Some(remote)) => {
                let (ahead, behind) = repo.graph_ahead_behind(local, remote)?;
                Ok(TrackingStatus { ahead, behind })
            }
            _ => Err(EngineError::invalid(format!(
                "branch '{}' or its upstream has no commits",
                self.name
            ))),
        }
    }
}

fn branch_name(branch: &git2::Branch<'_>) -> String {
    String::from_utf8_lossy(branch.get().name_bytes()).into_owned()
}

/// Snapshot a branch; `None` if it does not resolve to a commit.
pub(crate) fn branch_snapshot(branch: &git2::Branch<'_>) -> Result<Option<Branch>, EngineError> {
    let target = match branch.get().resolve()?.target() {
        Some(id) => CommitId::from(id),
        None => return Ok(None),
    };
    let tracking = branch
        .upstream()
        .ok()
        .map(|upstream| branch_name(&upstream));
    Ok(Some(Branch {
        full_name: branch_name(branch),
        target,
        tracking,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_validated() {
        assert!(BranchAdd::new("feature/x").validate().is_ok());
        assert!(BranchAdd::new("bad name").validate().is_err());
        assert!(BranchAdd::new("").validate().is_err());
        assert!(BranchStatus::new("a..b").validate().is_err());
    }

    #[test]
    fn remove_requires_names() {
        assert!(BranchRemove::new(Vec::<String>::new()).validate().is_err());
        assert!(BranchRemove::new(["old"]).force(true).validate().is_ok());
    }

    #[test]
    fn list_defaults_to_local() {
        assert_eq!(BranchList::default().mode, BranchMode::Local);
    }
}
