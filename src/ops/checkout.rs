//! ops::checkout
//!
//! Switch HEAD to a branch, optionally creating it first.

use super::branch::branch_snapshot;
use super::{Operation, OperationKind};
use crate::core::types::{validate_short_name, Branch};
use crate::engine::{EngineError, Session};

/// Options for `checkout`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Branch to switch to (short name)
    pub branch: String,
    /// Create the branch before switching
    pub create_branch: bool,
    /// Where a created branch starts (`HEAD` when `None`)
    pub start_point: Option<String>,
}

impl CheckoutOptions {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Default::default()
        }
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create_branch = create;
        self
    }

    pub fn start_point(mut self, rev: impl Into<String>) -> Self {
        self.start_point = Some(rev.into());
        self
    }
}

impl Operation for CheckoutOptions {
    const KIND: OperationKind = OperationKind::Checkout;
    type Output = Branch;

    fn validate(&self) -> Result<(), String> {
        validate_short_name(&self.branch).map_err(|e| e.to_string())?;
        if self.start_point.is_some() && !self.create_branch {
            return Err("a start point only applies when creating a branch".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<Branch, EngineError> {
        session.require_workdir()?;
        let repo = session.repo();
        let full_name = format!("refs/heads/{}", self.branch);

        let created = if self.create_branch {
            let start = self.start_point.as_deref().unwrap_or("HEAD");
            let commit = session.resolve_commit(start)?;
            if repo.find_branch(&self.branch, git2::BranchType::Local).is_ok() {
                return Err(EngineError::invalid(format!(
                    "branch '{}' already exists",
                    self.branch
                )));
            }
            Some(repo.branch(&self.branch, &commit, false)?)
        } else {
            None
        };

        let switched = switch_to(repo, &full_name);
        if let Err(err) = switched {
            // Leave no half-created branch behind.
            if let Some(mut branch) = created {
                let _ = branch.delete();
            }
            return Err(err);
        }

        let branch = repo
            .find_branch(&self.branch, git2::BranchType::Local)
            .map_err(|_| EngineError::invalid(format!("branch '{}' does not exist", self.branch)))?;
        branch_snapshot(&branch)?
            .ok_or_else(|| EngineError::invalid(format!("branch '{}' has no commits", self.branch)))
    }
}

fn switch_to(repo: &git2::Repository, full_name: &str) -> Result<(), EngineError> {
    let reference = repo.find_reference(full_name).map_err(|_| {
        EngineError::invalid(format!(
            "branch '{}' does not exist",
            full_name.trim_start_matches("refs/heads/")
        ))
    })?;
    let target = reference.peel(git2::ObjectType::Commit)?;

    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(&target, Some(&mut checkout))
        .map_err(|e| match e.code() {
            git2::ErrorCode::Conflict | git2::ErrorCode::MergeConflict => EngineError::invalid(
                "local changes would be overwritten by checkout; commit or stash them first",
            ),
            _ => EngineError::from(e),
        })?;
    repo.set_head(full_name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_point_needs_create() {
        let op = CheckoutOptions::new("feature").start_point("main");
        assert!(op.validate().is_err());
        let op = CheckoutOptions::new("feature").create(true).start_point("main");
        assert!(op.validate().is_ok());
    }

    #[test]
    fn branch_name_validated() {
        assert!(CheckoutOptions::new("").validate().is_err());
        assert!(CheckoutOptions::new("with space").validate().is_err());
    }
}
