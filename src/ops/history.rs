//! ops::history
//!
//! Read-only queries: log, diff, status, describe, revision resolution, and
//! HEAD inspection. Every result is a snapshot taken at call time.

use std::collections::BTreeSet;

use super::{Operation, OperationKind};
use crate::core::types::{ChangeType, Changes, Commit, CommitId, DiffEntry, Ref, RefKind, Status};
use crate::engine::session::commit_snapshot;
use crate::engine::{EngineError, Session};

/// Options for `log`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Revisions whose history is walked (`HEAD` when empty)
    pub includes: Vec<String>,
    /// Revisions whose history is hidden
    pub excludes: Vec<String>,
    pub max_commits: Option<usize>,
    pub skip: usize,
}

impl LogOptions {
    pub fn include(mut self, rev: impl Into<String>) -> Self {
        self.includes.push(rev.into());
        self
    }

    pub fn exclude(mut self, rev: impl Into<String>) -> Self {
        self.excludes.push(rev.into());
        self
    }

    /// Walk `from..to`: commits reachable from `to` but not `from`.
    pub fn range(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::default().exclude(from).include(to)
    }

    pub fn max_commits(mut self, max: usize) -> Self {
        self.max_commits = Some(max);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

impl Operation for LogOptions {
    const KIND: OperationKind = OperationKind::Log;
    /// Newest first
    type Output = Vec<Commit>;

    fn validate(&self) -> Result<(), String> {
        if self.includes.iter().chain(&self.excludes).any(|r| r.trim().is_empty()) {
            return Err("revisions cannot be blank".into());
        }
        if self.max_commits == Some(0) {
            return Err("max commits must be positive".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<Vec<Commit>, EngineError> {
        let repo = session.repo();
        let mut walk = repo.revwalk()?;
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;

        if self.includes.is_empty() {
            match session.head_commit()? {
                Some(head) => walk.push(head.id())?,
                None => return Ok(Vec::new()),
            }
        }
        for rev in &self.includes {
            walk.push(session.resolve_commit(rev)?.id())?;
        }
        for rev in &self.excludes {
            walk.hide(session.resolve_commit(rev)?.id())?;
        }

        let limit = self.max_commits.unwrap_or(usize::MAX);
        let mut commits = Vec::new();
        for id in walk.skip(self.skip).take(limit) {
            commits.push(commit_snapshot(&repo.find_commit(id?)?));
        }
        Ok(commits)
    }
}

/// Options for `diff`.
///
/// - neither commit: HEAD vs the working tree (through the index)
/// - `old_commit` only: that commit vs the working tree
/// - `new_commit` only: that commit vs its first parent
/// - both: one commit tree vs the other
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOptions {
    pub old_commit: Option<String>,
    pub new_commit: Option<String>,
    /// Limit to these pathspecs
    pub paths: Vec<String>,
}

impl DiffOptions {
    pub fn between(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old_commit: Some(old.into()),
            new_commit: Some(new.into()),
            paths: Vec::new(),
        }
    }

    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

impl Operation for DiffOptions {
    const KIND: OperationKind = OperationKind::Diff;
    type Output = Vec<DiffEntry>;

    fn execute(self, session: &mut Session) -> Result<Vec<DiffEntry>, EngineError> {
        let repo = session.repo();
        let mut options = git2::DiffOptions::new();
        for path in &self.paths {
            options.pathspec(path);
        }

        let mut diff = match (&self.old_commit, &self.new_commit) {
            (Some(old), Some(new)) => {
                let old_tree = tree_of(session, old)?;
                let new_tree = tree_of(session, new)?;
                repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut options))?
            }
            (None, Some(new)) => {
                let commit = session.resolve_commit(new)?;
                let parent_tree = match commit.parent(0) {
                    Ok(parent) => Some(parent.tree()?),
                    Err(_) => None,
                };
                let new_tree = commit.tree()?;
                repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&new_tree), Some(&mut options))?
            }
            (old, None) => {
                session.require_workdir()?;
                let old_tree = match old {
                    Some(rev) => Some(tree_of(session, rev)?),
                    None => session.head_commit()?.map(|c| c.tree()).transpose()?,
                };
                repo.diff_tree_to_workdir_with_index(old_tree.as_ref(), Some(&mut options))?
            }
        };

        diff.find_similar(None)?;

        let mut entries = Vec::new();
        for delta in diff.deltas() {
            let change_type = match delta.status() {
                git2::Delta::Added => ChangeType::Added,
                git2::Delta::Deleted => ChangeType::Deleted,
                git2::Delta::Modified | git2::Delta::Typechange => ChangeType::Modified,
                git2::Delta::Renamed => ChangeType::Renamed,
                git2::Delta::Copied => ChangeType::Copied,
                _ => continue,
            };
            let path_of = |file: git2::DiffFile<'_>| {
                file.path().map(|p| p.to_string_lossy().into_owned())
            };
            let (old_path, new_path) = match change_type {
                ChangeType::Added => (None, path_of(delta.new_file())),
                ChangeType::Deleted => (path_of(delta.old_file()), None),
                _ => (path_of(delta.old_file()), path_of(delta.new_file())),
            };
            entries.push(DiffEntry {
                change_type,
                old_path,
                new_path,
            });
        }
        Ok(entries)
    }
}

/// Query working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusOptions;

impl Operation for StatusOptions {
    const KIND: OperationKind = OperationKind::Status;
    type Output = Status;

    fn execute(self, session: &mut Session) -> Result<Status, EngineError> {
        session.require_workdir()?;
        let mut options = git2::StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let mut status = Status {
            state: session.state(),
            ..Default::default()
        };
        let statuses = session.repo().statuses(Some(&mut options))?;
        for entry in statuses.iter() {
            let Some(path) = entry.path().map(str::to_string) else {
                continue;
            };
            let flags = entry.status();

            if flags.is_conflicted() {
                status.conflicts.insert(path);
                continue;
            }
            classify(
                &mut status.staged,
                &path,
                flags.is_index_new(),
                flags.is_index_modified()
                    || flags.is_index_typechange()
                    || flags.is_index_renamed(),
                flags.is_index_deleted(),
            );
            classify(
                &mut status.unstaged,
                &path,
                flags.is_wt_new(),
                flags.is_wt_modified() || flags.is_wt_typechange() || flags.is_wt_renamed(),
                flags.is_wt_deleted(),
            );
        }
        Ok(status)
    }
}

fn tree_of<'r>(session: &'r Session, rev: &str) -> Result<git2::Tree<'r>, EngineError> {
    Ok(session.resolve_commit(rev)?.tree()?)
}

fn classify(changes: &mut Changes, path: &str, added: bool, modified: bool, removed: bool) {
    let set: Option<&mut BTreeSet<String>> = if added {
        Some(&mut changes.added)
    } else if modified {
        Some(&mut changes.modified)
    } else if removed {
        Some(&mut changes.removed)
    } else {
        None
    };
    if let Some(set) = set {
        set.insert(path.to_string());
    }
}

/// Options for `describe`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeOptions {
    /// Revision to describe (`HEAD` when `None`)
    pub commit: Option<String>,
    /// Consider lightweight tags, not just annotated ones
    pub tags: bool,
    /// Always print the `-<n>-g<id>` suffix
    pub long: bool,
    /// Fall back to the abbreviated id when no tag is reachable
    pub always: bool,
    /// Only consider tags matching this glob
    pub pattern: Option<String>,
}

impl Operation for DescribeOptions {
    const KIND: OperationKind = OperationKind::Describe;
    /// `None` when no tag is reachable and `always` is off
    type Output = Option<String>;

    fn execute(self, session: &mut Session) -> Result<Option<String>, EngineError> {
        let rev = self.commit.as_deref().unwrap_or("HEAD");
        let commit = session.resolve_commit(rev)?;

        let mut options = git2::DescribeOptions::new();
        options.show_commit_oid_as_fallback(self.always);
        if self.tags {
            options.describe_tags();
        }
        if let Some(pattern) = &self.pattern {
            options.pattern(pattern);
        }

        let describe = match commit.as_object().describe(&options) {
            Ok(describe) => describe,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut format = git2::DescribeFormatOptions::new();
        format.always_use_long_format(self.long);
        Ok(Some(describe.format(Some(&format))?))
    }
}

/// Resolve a revision string to a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRevision {
    pub revision: String,
}

impl ResolveRevision {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
        }
    }
}

impl Operation for ResolveRevision {
    const KIND: OperationKind = OperationKind::Resolve;
    type Output = Commit;

    fn validate(&self) -> Result<(), String> {
        if self.revision.trim().is_empty() {
            return Err("revision cannot be empty".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<Commit, EngineError> {
        Ok(commit_snapshot(&session.resolve_commit(&self.revision)?))
    }
}

/// Read HEAD as a ref snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadQuery;

impl Operation for HeadQuery {
    const KIND: OperationKind = OperationKind::Head;
    type Output = Ref;

    fn execute(self, session: &mut Session) -> Result<Ref, EngineError> {
        let target = session.head_commit()?.map(|c| CommitId::from(c.id()));
        let kind = match session.current_branch()? {
            Some(branch) => RefKind::Symbolic { target: branch },
            None => RefKind::Direct,
        };
        Ok(Ref {
            name: "HEAD".to_string(),
            kind,
            target,
        })
    }
}
