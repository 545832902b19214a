//! ops::merge
//!
//! Merge and rebase, plus aborting either when left conflicted.
//!
//! # Invariants
//!
//! - Conflicts are returned as `Conflicted { paths }`; the index and working
//!   tree are left conflicted (with markers) for the caller to resolve
//! - An engine failure mid-rebase aborts the rebase, restoring the original
//!   ref positions
//! - Both operations refuse to start while another operation is in progress

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Operation, OperationKind};
use crate::core::types::{short_ref_name, Commit, CommitId, RepoState};
use crate::engine::session::commit_snapshot;
use crate::engine::{EngineError, Session};

/// How `merge` may combine histories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Fast-forward when possible, merge commit otherwise
    #[default]
    Default,
    /// Fail with a non-fast-forward error unless a fast-forward is possible
    OnlyFastForward,
    /// Always create a merge commit
    NoFastForward,
    /// Stage the combined changes without committing
    Squash,
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Nothing to merge
    UpToDate,
    /// HEAD moved forward without a new commit
    FastForward { commit: CommitId },
    /// A merge commit was created
    Merged { commit: Commit },
    /// Changes are staged, no commit created
    Squashed,
    /// Merge stopped with conflicts in these paths
    Conflicted { paths: Vec<String> },
}

impl MergeOutcome {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, MergeOutcome::Conflicted { .. })
    }
}

/// Options for `merge`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Revision to merge into HEAD
    pub head: String,
    pub mode: MergeMode,
    /// Message for the merge commit
    pub message: Option<String>,
}

impl MergeOptions {
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            ..Default::default()
        }
    }

    pub fn mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Operation for MergeOptions {
    const KIND: OperationKind = OperationKind::Merge;
    type Output = MergeOutcome;

    fn validate(&self) -> Result<(), String> {
        if self.head.trim().is_empty() {
            return Err("merge requires a revision".into());
        }
        if matches!(&self.message, Some(m) if m.trim().is_empty()) {
            return Err("merge message is empty".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<MergeOutcome, EngineError> {
        session.require_workdir()?;
        session.require_clean_state()?;
        let repo = session.repo();

        let theirs = session.resolve_commit(&self.head)?;
        let annotated = repo.find_annotated_commit(theirs.id())?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }

        let fast_forward_allowed =
            matches!(self.mode, MergeMode::Default | MergeMode::OnlyFastForward);
        if analysis.is_unborn() || (analysis.is_fast_forward() && fast_forward_allowed) {
            let reflog = format!("merge {}: Fast-forward", self.head);
            fast_forward(repo, theirs.as_object(), &reflog)?;
            debug!("merge: fast-forwarded to {}", theirs.id());
            return Ok(MergeOutcome::FastForward {
                commit: theirs.id().into(),
            });
        }

        if self.mode == MergeMode::OnlyFastForward {
            return Err(EngineError::NonFastForward {
                refname: session.current_branch()?,
                message: format!("cannot fast-forward to '{}'", self.head),
            });
        }

        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.safe().allow_conflicts(true).conflict_style_merge(true);
        if let Err(err) = repo.merge(&[&annotated], None, Some(&mut checkout)) {
            let _ = repo.cleanup_state();
            return Err(match err.code() {
                git2::ErrorCode::Conflict | git2::ErrorCode::MergeConflict => EngineError::invalid(
                    "local changes would be overwritten by merge; commit or stash them first",
                ),
                _ => EngineError::from(err),
            });
        }

        // A squash never records MERGE_HEAD, even when it stops on conflicts.
        if self.mode == MergeMode::Squash {
            repo.cleanup_state()?;
        }

        let mut index = repo.index()?;
        if index.has_conflicts() {
            let paths = session.conflicted_paths()?;
            info!("merge of {} stopped with {} conflicted path(s)", self.head, paths.len());
            return Ok(MergeOutcome::Conflicted { paths });
        }

        if self.mode == MergeMode::Squash {
            return Ok(MergeOutcome::Squashed);
        }

        let ours = session
            .head_commit()?
            .ok_or_else(|| EngineError::invalid("HEAD has no commits to merge into"))?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let signature = session.signature(None)?;
        let message = match self.message {
            Some(message) => message,
            None => default_merge_message(&self.head, session.current_branch()?.as_deref()),
        };

        let id = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &[&ours, &theirs],
        )?;
        repo.cleanup_state()?;
        debug!("merge: created merge commit {}", id);

        Ok(MergeOutcome::Merged {
            commit: commit_snapshot(&repo.find_commit(id)?),
        })
    }
}

fn default_merge_message(head: &str, branch: Option<&str>) -> String {
    match branch.map(short_ref_name) {
        Some(branch) if branch != "master" && branch != "main" => {
            format!("Merge '{}' into {}", head, branch)
        }
        _ => format!("Merge '{}'", head),
    }
}

/// Move the current branch (or detached HEAD) to `target` and check it out.
pub(crate) fn fast_forward(
    repo: &git2::Repository,
    target: &git2::Object<'_>,
    reflog: &str,
) -> Result<(), EngineError> {
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(target, Some(&mut checkout))
        .map_err(|e| match e.code() {
            git2::ErrorCode::Conflict | git2::ErrorCode::MergeConflict => EngineError::invalid(
                "local changes would be overwritten; commit or stash them first",
            ),
            _ => EngineError::from(e),
        })?;

    let head = repo.find_reference("HEAD")?;
    match head.symbolic_target() {
        Some(branch) => {
            repo.reference(branch, target.id(), true, reflog)?;
        }
        None => repo.set_head_detached(target.id())?,
    }
    Ok(())
}

/// Abandon a conflicted merge, restoring HEAD's tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeAbort;

impl Operation for MergeAbort {
    const KIND: OperationKind = OperationKind::MergeAbort;
    type Output = ();

    fn execute(self, session: &mut Session) -> Result<(), EngineError> {
        // A conflicted squash leaves no merge state, only conflicts.
        let squash_conflicts = session.repo().index()?.has_conflicts();
        if session.state() != RepoState::Merge && !squash_conflicts {
            return Err(EngineError::invalid("no merge in progress"));
        }
        let head = session
            .head_commit()?
            .ok_or_else(|| EngineError::invalid("HEAD has no commits"))?;
        session
            .repo()
            .reset(head.as_object(), git2::ResetType::Hard, None)?;
        session.repo().cleanup_state()?;
        Ok(())
    }
}

/// Result of a rebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RebaseOutcome {
    /// HEAD already contains the upstream
    UpToDate,
    /// HEAD had no commits of its own and moved to the upstream
    FastForward { commit: CommitId },
    /// Commits were replayed; HEAD now points at `head`
    Rebased { head: CommitId, applied: usize },
    /// Rebase stopped with conflicts in these paths
    Conflicted { paths: Vec<String> },
}

impl RebaseOutcome {
    pub fn is_conflicted(&self) -> bool {
        matches!(self, RebaseOutcome::Conflicted { .. })
    }
}

/// Options for `rebase`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebaseOptions {
    /// Revision whose history HEAD's commits are replayed on
    pub upstream: String,
    /// Replay onto this revision instead of the upstream
    pub onto: Option<String>,
}

impl RebaseOptions {
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            onto: None,
        }
    }

    pub fn onto(mut self, onto: impl Into<String>) -> Self {
        self.onto = Some(onto.into());
        self
    }
}

impl Operation for RebaseOptions {
    const KIND: OperationKind = OperationKind::Rebase;
    type Output = RebaseOutcome;

    fn validate(&self) -> Result<(), String> {
        if self.upstream.trim().is_empty() {
            return Err("rebase requires an upstream revision".into());
        }
        if matches!(&self.onto, Some(o) if o.trim().is_empty()) {
            return Err("rebase target cannot be empty".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<RebaseOutcome, EngineError> {
        session.require_workdir()?;
        session.require_clean_state()?;
        let repo = session.repo();

        let upstream = session.resolve_commit(&self.upstream)?;
        let onto = match &self.onto {
            Some(rev) => Some(session.resolve_commit(rev)?),
            None => None,
        };
        let head = session
            .head_commit()?
            .ok_or_else(|| EngineError::invalid("HEAD has no commits to rebase"))?;

        if onto.is_none() {
            if head.id() == upstream.id() || repo.graph_descendant_of(head.id(), upstream.id())? {
                return Ok(RebaseOutcome::UpToDate);
            }
            if repo.graph_descendant_of(upstream.id(), head.id())? {
                let reflog = format!("rebase: fast-forward to {}", self.upstream);
                fast_forward(repo, upstream.as_object(), &reflog)?;
                return Ok(RebaseOutcome::FastForward {
                    commit: upstream.id().into(),
                });
            }
        }

        let signature = session.signature(None)?;
        let upstream_annotated = repo.find_annotated_commit(upstream.id())?;
        let onto_annotated = match &onto {
            Some(commit) => Some(repo.find_annotated_commit(commit.id())?),
            None => None,
        };

        let mut rebase = repo.rebase(
            None,
            Some(&upstream_annotated),
            onto_annotated.as_ref(),
            None,
        )?;

        let mut applied = 0;
        while let Some(step) = rebase.next() {
            if let Err(err) = step {
                let _ = rebase.abort();
                return Err(err.into());
            }
            if repo.index()?.has_conflicts() {
                let paths = session.conflicted_paths()?;
                info!(
                    "rebase onto {} stopped with {} conflicted path(s)",
                    self.upstream,
                    paths.len()
                );
                return Ok(RebaseOutcome::Conflicted { paths });
            }
            match rebase.commit(None, &signature, None) {
                Ok(_) => applied += 1,
                // Patch already upstream; nothing to record.
                Err(err) if err.code() == git2::ErrorCode::Applied => {}
                Err(err) => {
                    let _ = rebase.abort();
                    return Err(err.into());
                }
            }
        }

        if let Err(err) = rebase.finish(Some(&signature)) {
            let _ = rebase.abort();
            return Err(err.into());
        }

        let new_head = session
            .head_commit()?
            .ok_or_else(|| EngineError::invalid("HEAD vanished during rebase"))?;
        debug!("rebase: applied {} commit(s), HEAD at {}", applied, new_head.id());
        Ok(RebaseOutcome::Rebased {
            head: new_head.id().into(),
            applied,
        })
    }
}

/// Abandon a stopped rebase, restoring the original branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebaseAbort;

impl Operation for RebaseAbort {
    const KIND: OperationKind = OperationKind::RebaseAbort;
    type Output = ();

    fn execute(self, session: &mut Session) -> Result<(), EngineError> {
        if !matches!(session.state(), RepoState::Rebase { .. }) {
            return Err(EngineError::invalid("no rebase in progress"));
        }
        let mut rebase = session.repo().open_rebase(None)?;
        rebase.abort()?;
        Ok(())
    }
}
