//! ops::commit
//!
//! Record the index as a new commit on HEAD.
//!
//! # Invariants
//!
//! - A blank message is rejected before the repository is touched
//! - Without `allow_empty`, the index tree must differ from HEAD's tree
//! - Finishing a merge (MERGE_HEAD present) records every merge head as a
//!   parent and clears the merge state

use log::debug;

use super::{Operation, OperationKind};
use crate::core::types::{Commit, Person};
use crate::engine::session::commit_snapshot;
use crate::engine::{EngineError, Session};

/// Options for `commit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Commit message (required, non-blank)
    pub message: String,
    /// Replace the HEAD commit instead of adding a child
    pub amend: bool,
    /// Allow a commit whose tree equals its parent's
    pub allow_empty: bool,
    /// Stage modifications to tracked files first
    pub all: bool,
    /// Author identity; repository config when `None`
    pub author: Option<Person>,
    /// Committer identity; the author when `None`
    pub committer: Option<Person>,
}

impl CommitOptions {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn amend(mut self, amend: bool) -> Self {
        self.amend = amend;
        self
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    pub fn all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    pub fn author(mut self, author: Person) -> Self {
        self.author = Some(author);
        self
    }

    pub fn committer(mut self, committer: Person) -> Self {
        self.committer = Some(committer);
        self
    }
}

impl Operation for CommitOptions {
    const KIND: OperationKind = OperationKind::Commit;
    type Output = Commit;

    fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("commit message is empty".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<Commit, EngineError> {
        let repo = session.repo();
        let mut index = repo.index()?;

        if self.all {
            index.update_all(["*"].iter(), None)?;
        }
        if index.has_conflicts() {
            let paths = session.conflicted_paths()?;
            return Err(EngineError::invalid(format!(
                "cannot commit with unresolved conflicts in: {}",
                paths.join(", ")
            )));
        }

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let head = session.head_commit()?;
        let merge_heads = session.merge_heads()?;

        if !self.allow_empty && !self.amend && merge_heads.is_empty() {
            let unchanged = match &head {
                Some(head) => head.tree_id() == tree_id,
                None => tree.is_empty(),
            };
            if unchanged {
                return Err(EngineError::invalid(
                    "nothing to commit; stage changes or allow an empty commit",
                ));
            }
        }

        let author = session.signature(self.author.as_ref())?;
        let committer = session.signature(self.committer.as_ref().or(self.author.as_ref()))?;

        // Validation passed; persist staging from here on.
        index.write()?;

        let id = if self.amend {
            let head = head.ok_or_else(|| EngineError::invalid("no commit to amend"))?;
            head.amend(
                Some("HEAD"),
                Some(&author),
                Some(&committer),
                None,
                Some(&self.message),
                Some(&tree),
            )?
        } else {
            let mut parents = Vec::new();
            if let Some(head) = head {
                parents.push(head);
            }
            for id in &merge_heads {
                parents.push(repo.find_commit(*id)?);
            }
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
            repo.commit(
                Some("HEAD"),
                &author,
                &committer,
                &self.message,
                &tree,
                &parent_refs,
            )?
        };

        if !merge_heads.is_empty() {
            repo.cleanup_state()?;
        }

        debug!("commit: created {}", id);
        Ok(commit_snapshot(&repo.find_commit(id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_message_rejected() {
        assert!(CommitOptions::new("").validate().is_err());
        assert!(CommitOptions::new("  \n").validate().is_err());
    }

    #[test]
    fn allow_empty_does_not_waive_message() {
        let op = CommitOptions::new("").allow_empty(true);
        assert!(op.validate().is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let op = CommitOptions::new("msg")
            .amend(true)
            .all(true)
            .author(Person::new("A", "a@example.com"));
        assert!(op.amend);
        assert!(op.all);
        assert_eq!(op.author.as_ref().map(|p| p.name.as_str()), Some("A"));
        assert!(op.validate().is_ok());
    }
}
