//! engine::session
//!
//! Open engine sessions and the object-level primitives built on them.
//!
//! A [`Session`] exclusively owns one `git2::Repository`. Sessions are created
//! by [`open_existing`], [`init_new`], or [`clone_from`] and consumed by
//! [`close_session`], so a session cannot be closed twice.
//!
//! All calls block the calling thread for the duration of the engine I/O.
//! Nothing here caches; caching lives in the handle registry.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};

use super::error::EngineError;
use super::transport;
use crate::core::credentials::Credentials;
use crate::core::location::Location;
use crate::core::types::{validate_short_name, Commit, CommitId, Person, RepoState};

/// Options for creating a new repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Create a repository without a working directory
    pub bare: bool,
    /// Name of the unborn initial branch (engine default when `None`)
    pub initial_branch: Option<String>,
}

impl InitOptions {
    pub fn bare() -> Self {
        Self {
            bare: true,
            ..Default::default()
        }
    }

    pub fn with_initial_branch(mut self, branch: impl Into<String>) -> Self {
        self.initial_branch = Some(branch.into());
        self
    }
}

/// Options for cloning a remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    /// Create a bare clone
    pub bare: bool,
    /// Populate the working directory after fetching
    pub checkout: bool,
    /// Name given to the remote in the new repository
    pub remote: String,
    /// Branch to check out instead of the remote HEAD
    pub branch: Option<String>,
    /// Credentials for this clone only
    pub credentials: Option<Credentials>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            bare: false,
            checkout: true,
            remote: "origin".to_string(),
            branch: None,
            credentials: None,
        }
    }
}

impl CloneOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.remote.trim().is_empty() {
            return Err("remote name cannot be empty".into());
        }
        if let Some(branch) = &self.branch {
            validate_short_name(branch).map_err(|e| e.to_string())?;
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        Ok(())
    }
}

/// An open engine session bound to one repository.
pub struct Session {
    repo: git2::Repository,
    location: Location,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("location", &self.location)
            .field("git_dir", &self.repo.path())
            .finish()
    }
}

// =============================================================================
// Opening and closing
// =============================================================================

/// Open the repository at exactly `location` (no upward search).
///
/// # Errors
///
/// - [`EngineError::NotARepository`] if `location` is not a repository
pub fn open_existing(location: &Location) -> Result<Session, EngineError> {
    let path = local_path(location)?;
    debug!("engine: open {}", path.display());

    let repo = git2::Repository::open(path).map_err(|e| match e.code() {
        git2::ErrorCode::NotFound => EngineError::NotARepository,
        _ => EngineError::from(e),
    })?;

    Ok(Session {
        repo,
        location: location.clone(),
    })
}

/// Search upward from `start` and return the location of the repository
/// found (the working directory, or the repository directory if bare).
pub fn discover(start: &Path) -> Result<Location, EngineError> {
    let repo = git2::Repository::discover(start).map_err(|e| match e.code() {
        git2::ErrorCode::NotFound => EngineError::NotARepository,
        _ => EngineError::from(e),
    })?;
    let root = repo.workdir().unwrap_or_else(|| repo.path());
    Location::local(root).map_err(|e| EngineError::invalid(e.to_string()))
}

/// Create a new repository at `location`, creating directories as needed.
pub fn init_new(location: &Location, options: &InitOptions) -> Result<Session, EngineError> {
    let path = local_path(location)?;
    if let Some(branch) = &options.initial_branch {
        validate_short_name(branch).map_err(|e| EngineError::invalid(e.to_string()))?;
    }
    debug!("engine: init {} (bare: {})", path.display(), options.bare);

    let mut init = git2::RepositoryInitOptions::new();
    init.bare(options.bare).mkpath(true);
    if let Some(branch) = &options.initial_branch {
        init.initial_head(branch);
    }

    let repo = git2::Repository::init_opts(path, &init)?;
    info!("initialized repository at {}", path.display());
    Ok(Session {
        repo,
        location: location.clone(),
    })
}

/// Clone `source` into `dest`.
///
/// # Errors
///
/// - [`EngineError::Invalid`] if `dest` exists and is not an empty directory
/// - [`EngineError::Transport`] / [`EngineError::Auth`] from the exchange
pub fn clone_from(
    source: &Location,
    dest: &Location,
    options: &CloneOptions,
) -> Result<Session, EngineError> {
    let path = local_path(dest)?;
    options.validate().map_err(EngineError::Invalid)?;
    if path.exists() && !is_empty_dir(path) {
        return Err(EngineError::invalid(format!(
            "destination {} exists and is not an empty directory",
            path.display()
        )));
    }

    let url = source.to_engine_url();
    debug!("engine: clone {} into {}", url, path.display());

    let attempts = Cell::new(0);
    let fetch = transport::fetch_options(options.credentials.as_ref(), &attempts);

    let mut builder = git2::build::RepoBuilder::new();
    builder.bare(options.bare).fetch_options(fetch);
    if let Some(branch) = &options.branch {
        builder.branch(branch);
    }
    if !options.checkout {
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.dry_run();
        builder.with_checkout(checkout);
    }
    let remote_name = options.remote.clone();
    builder.remote_create(move |repo, _name, url| repo.remote(&remote_name, url));

    let repo = builder
        .clone(&url, path)
        .map_err(EngineError::from_transport)?;
    info!("cloned {} into {}", url, path.display());

    Ok(Session {
        repo,
        location: dest.clone(),
    })
}

/// Release a session and the native resources it holds.
pub fn close_session(session: Session) {
    debug!("engine: close {}", session.location);
    drop(session);
}

fn local_path(location: &Location) -> Result<&Path, EngineError> {
    location.as_path().ok_or_else(|| {
        EngineError::invalid(format!(
            "{} is a remote location; only local locations can be opened",
            location
        ))
    })
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

// =============================================================================
// Primitives shared by operations
// =============================================================================

impl Session {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_bare(&self) -> bool {
        self.repo.is_bare()
    }

    /// Working directory, `None` for bare repositories.
    pub fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    pub(crate) fn repo(&self) -> &git2::Repository {
        &self.repo
    }

    pub(crate) fn repo_mut(&mut self) -> &mut git2::Repository {
        &mut self.repo
    }

    /// Working directory, or an error for bare repositories.
    pub(crate) fn require_workdir(&self) -> Result<PathBuf, EngineError> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| EngineError::invalid("operation requires a working directory"))
    }

    /// Current in-progress operation state.
    pub fn state(&self) -> RepoState {
        match self.repo.state() {
            git2::RepositoryState::Clean => RepoState::Clean,
            git2::RepositoryState::Rebase
            | git2::RepositoryState::RebaseInteractive
            | git2::RepositoryState::RebaseMerge => {
                let (current, total) = self.read_rebase_progress();
                RepoState::Rebase { current, total }
            }
            git2::RepositoryState::Merge => RepoState::Merge,
            git2::RepositoryState::CherryPick | git2::RepositoryState::CherryPickSequence => {
                RepoState::CherryPick
            }
            git2::RepositoryState::Revert | git2::RepositoryState::RevertSequence => {
                RepoState::Revert
            }
            git2::RepositoryState::Bisect => RepoState::Bisect,
            git2::RepositoryState::ApplyMailbox | git2::RepositoryState::ApplyMailboxOrRebase => {
                RepoState::ApplyMailbox
            }
        }
    }

    /// Read rebase progress from .git/rebase-merge or .git/rebase-apply.
    fn read_rebase_progress(&self) -> (Option<usize>, Option<usize>) {
        let git_dir = self.repo.path();
        let read = |path: PathBuf| -> Option<usize> {
            std::fs::read_to_string(path)
                .ok()
                .and_then(|s| s.trim().parse().ok())
        };

        let rebase_merge = git_dir.join("rebase-merge");
        if rebase_merge.exists() {
            return (
                read(rebase_merge.join("msgnum")),
                read(rebase_merge.join("end")),
            );
        }

        let rebase_apply = git_dir.join("rebase-apply");
        if rebase_apply.exists() {
            return (
                read(rebase_apply.join("next")),
                read(rebase_apply.join("last")),
            );
        }

        (None, None)
    }

    /// Fail unless no multi-step operation is in progress.
    pub(crate) fn require_clean_state(&self) -> Result<(), EngineError> {
        match self.state() {
            RepoState::Clean => Ok(()),
            state => Err(EngineError::invalid(format!(
                "{} in progress; resolve or abort it first",
                state
            ))),
        }
    }

    /// Resolve a revision (`HEAD`, `main`, `v1.0^`, an id) to an object.
    pub(crate) fn resolve_object(&self, rev: &str) -> Result<git2::Object<'_>, EngineError> {
        self.repo.revparse_single(rev).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound
            | git2::ErrorCode::InvalidSpec
            | git2::ErrorCode::Ambiguous
            | git2::ErrorCode::UnbornBranch => {
                EngineError::invalid(format!("revision '{}' does not resolve", rev))
            }
            _ => EngineError::from(e),
        })
    }

    /// Resolve a revision to a commit.
    pub(crate) fn resolve_commit(&self, rev: &str) -> Result<git2::Commit<'_>, EngineError> {
        self.resolve_object(rev)?.peel_to_commit().map_err(|e| match e.code() {
            git2::ErrorCode::Peel | git2::ErrorCode::InvalidSpec => {
                EngineError::invalid(format!("revision '{}' is not a commit", rev))
            }
            _ => EngineError::from(e),
        })
    }

    /// HEAD commit, or `None` when HEAD is unborn.
    pub(crate) fn head_commit(&self) -> Result<Option<git2::Commit<'_>>, EngineError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Full name of the branch HEAD points at, even when unborn.
    ///
    /// Returns `None` for a detached HEAD.
    pub(crate) fn current_branch(&self) -> Result<Option<String>, EngineError> {
        let head = self.repo.find_reference("HEAD")?;
        Ok(head
            .symbolic_target()
            .filter(|target| target.starts_with("refs/heads/"))
            .map(str::to_string))
    }

    /// Build a signature from an explicit identity or repository config.
    pub(crate) fn signature(
        &self,
        person: Option<&Person>,
    ) -> Result<git2::Signature<'static>, EngineError> {
        match person {
            Some(p) => Ok(git2::Signature::now(&p.name, &p.email)?),
            None => self.repo.signature().map_err(|e| match e.code() {
                git2::ErrorCode::NotFound => EngineError::invalid(
                    "no identity configured; set user.name and user.email or pass one explicitly",
                ),
                _ => EngineError::from(e),
            }),
        }
    }

    /// Commits recorded in MERGE_HEAD by an unfinished merge.
    pub(crate) fn merge_heads(&self) -> Result<Vec<git2::Oid>, EngineError> {
        let path = self.repo.path().join("MERGE_HEAD");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(path.display(), e)),
        };
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| git2::Oid::from_str(line).map_err(EngineError::from))
            .collect()
    }

    /// Paths with unresolved conflicts in the index, sorted.
    pub(crate) fn conflicted_paths(&self) -> Result<Vec<String>, EngineError> {
        let index = self.repo.index()?;
        if !index.has_conflicts() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}

// =============================================================================
// Snapshot conversion
// =============================================================================

/// Copy a commit out of the engine.
pub(crate) fn commit_snapshot(commit: &git2::Commit<'_>) -> Commit {
    let author = commit.author();
    let committer = commit.committer();
    Commit {
        id: commit.id().into(),
        parent_ids: commit.parent_ids().map(CommitId::from).collect(),
        tree_id: commit.tree_id().to_string(),
        author: person(&author),
        author_time: time(author.when()),
        committer: person(&committer),
        commit_time: time(committer.when()),
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
    }
}

pub(crate) fn person(signature: &git2::Signature<'_>) -> Person {
    Person {
        name: String::from_utf8_lossy(signature.name_bytes()).into_owned(),
        email: String::from_utf8_lossy(signature.email_bytes()).into_owned(),
    }
}

fn time(when: git2::Time) -> DateTime<Utc> {
    DateTime::from_timestamp(when.seconds(), 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn location(dir: &Path) -> Location {
        Location::local(dir).unwrap()
    }

    #[test]
    fn open_missing_path_is_not_a_repository() {
        let dir = TempDir::new().unwrap();
        let result = open_existing(&location(&dir.path().join("nope")));
        assert!(matches!(result, Err(EngineError::NotARepository)));
    }

    #[test]
    fn open_plain_directory_is_not_a_repository() {
        let dir = TempDir::new().unwrap();
        let result = open_existing(&location(dir.path()));
        assert!(matches!(result, Err(EngineError::NotARepository)));
    }

    #[test]
    fn init_then_open() {
        let dir = TempDir::new().unwrap();
        let loc = location(&dir.path().join("repo"));
        let session = init_new(&loc, &InitOptions::default().with_initial_branch("main")).unwrap();
        assert!(!session.is_bare());
        assert_eq!(
            session.current_branch().unwrap().as_deref(),
            Some("refs/heads/main")
        );
        assert!(session.head_commit().unwrap().is_none());
        close_session(session);

        let reopened = open_existing(&loc).unwrap();
        assert_eq!(reopened.location(), &loc);
        assert_eq!(reopened.state(), RepoState::Clean);
    }

    #[test]
    fn init_bare_has_no_workdir() {
        let dir = TempDir::new().unwrap();
        let session = init_new(&location(dir.path()), &InitOptions::bare()).unwrap();
        assert!(session.is_bare());
        assert!(session.require_workdir().is_err());
    }

    #[test]
    fn init_rejects_bad_branch_name() {
        let dir = TempDir::new().unwrap();
        let result = init_new(
            &location(dir.path()),
            &InitOptions::default().with_initial_branch("bad..name"),
        );
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[test]
    fn remote_locations_cannot_be_opened() {
        let loc = Location::remote("https://example.com/r.git").unwrap();
        assert!(matches!(open_existing(&loc), Err(EngineError::Invalid(_))));
    }

    #[test]
    fn discover_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        let loc = location(dir.path());
        init_new(&loc, &InitOptions::default()).unwrap();
        let sub = dir.path().join("a/b");
        std::fs::create_dir_all(&sub).unwrap();
        assert_eq!(discover(&sub).unwrap(), loc);
    }

    #[test]
    fn unresolvable_revision_is_invalid() {
        let dir = TempDir::new().unwrap();
        let session = init_new(&location(dir.path()), &InitOptions::default()).unwrap();
        assert!(matches!(
            session.resolve_commit("HEAD"),
            Err(EngineError::Invalid(_))
        ));
    }

    #[test]
    fn clone_into_non_empty_dir_is_invalid() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file"), "x").unwrap();
        let source = location(&dir.path().join("src"));
        let result = clone_from(&source, &location(dir.path()), &CloneOptions::default());
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[test]
    fn clone_options_validation() {
        let options = CloneOptions {
            remote: " ".into(),
            ..Default::default()
        };
        assert!(options.validate().is_err());
        assert!(CloneOptions::default().validate().is_ok());
    }
}
