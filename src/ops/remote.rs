//! ops::remote
//!
//! Network operations (fetch, push, pull, ls-remote) and remote configuration.
//!
//! # Invariants
//!
//! - The named remote is resolved and credentials are checked before any
//!   network call
//! - Failures are classified as auth, transport (unreachable, remote not
//!   found, protocol), or non-fast-forward
//! - Credentials live only for the duration of the call

use std::cell::{Cell, RefCell};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::merge::{MergeOptions, MergeOutcome, RebaseOptions, RebaseOutcome};
use super::{require_remote, Operation, OperationKind};
use crate::core::credentials::Credentials;
use crate::core::types::{CommitId, Ref, RefKind};
use crate::engine::transport::{self, find_remote};
use crate::engine::{EngineError, Session};
use crate::error::TransportFailure;

const DEFAULT_REMOTE: &str = "origin";

fn validate_network(remote: &str, credentials: Option<&Credentials>) -> Result<(), String> {
    require_remote(remote)?;
    if let Some(credentials) = credentials {
        credentials.validate()?;
    }
    Ok(())
}

// =============================================================================
// Fetch
// =============================================================================

/// Which tags `fetch` downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagMode {
    /// Tags pointing at fetched commits
    #[default]
    Auto,
    All,
    None,
}

impl From<TagMode> for git2::AutotagOption {
    fn from(mode: TagMode) -> Self {
        match mode {
            TagMode::Auto => git2::AutotagOption::Auto,
            TagMode::All => git2::AutotagOption::All,
            TagMode::None => git2::AutotagOption::None,
        }
    }
}

/// Options for `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub remote: String,
    /// Refspecs to fetch; the remote's configured refspecs when empty
    pub refspecs: Vec<String>,
    /// Delete remote-tracking refs that no longer exist on the remote
    pub prune: bool,
    pub tag_mode: TagMode,
    pub credentials: Option<Credentials>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            refspecs: Vec::new(),
            prune: false,
            tag_mode: TagMode::Auto,
            credentials: None,
        }
    }
}

impl FetchOptions {
    pub fn remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn refspec(mut self, refspec: impl Into<String>) -> Self {
        self.refspecs.push(refspec.into());
        self
    }

    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn tag_mode(mut self, mode: TagMode) -> Self {
        self.tag_mode = mode;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// What a fetch changed locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    /// Local refs created or moved
    pub updated_refs: Vec<String>,
    pub received_objects: usize,
}

impl Operation for FetchOptions {
    const KIND: OperationKind = OperationKind::Fetch;
    type Output = FetchSummary;

    fn validate(&self) -> Result<(), String> {
        validate_network(&self.remote, self.credentials.as_ref())?;
        if self.refspecs.iter().any(|s| s.trim().is_empty()) {
            return Err("refspecs cannot be blank".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<FetchSummary, EngineError> {
        let mut remote = find_remote(session, &self.remote)?;
        debug!("fetch: {} ({})", self.remote, remote.url().unwrap_or("?"));

        let attempts = Cell::new(0);
        let updated = RefCell::new(Vec::new());
        let mut callbacks = transport::remote_callbacks(self.credentials.as_ref(), &attempts);
        callbacks.update_tips(|name, _old, _new| {
            updated.borrow_mut().push(name.to_string());
            true
        });

        let mut options = git2::FetchOptions::new();
        options
            .remote_callbacks(callbacks)
            .download_tags(self.tag_mode.into())
            .prune(if self.prune {
                git2::FetchPrune::On
            } else {
                git2::FetchPrune::Unspecified
            });

        let specs: Vec<&str> = self.refspecs.iter().map(String::as_str).collect();
        remote
            .fetch(&specs, Some(&mut options), None)
            .map_err(transport::translate)?;
        drop(options);

        let received_objects = remote.stats().received_objects();
        let mut updated_refs = updated.into_inner();
        updated_refs.sort();
        info!("fetched {} ref update(s) from {}", updated_refs.len(), self.remote);
        Ok(FetchSummary {
            updated_refs,
            received_objects,
        })
    }
}

// =============================================================================
// Push
// =============================================================================

/// Options for `push`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    pub remote: String,
    /// Branch names, tag names, full refs, or `src:dst` refspecs, in order;
    /// the current branch when empty (and neither `all` nor `tags` is set)
    pub refs_or_specs: Vec<String>,
    /// Allow non-fast-forward updates
    pub force: bool,
    /// Also push every tag
    pub tags: bool,
    /// Also push every local branch
    pub all: bool,
    pub credentials: Option<Credentials>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            refs_or_specs: Vec::new(),
            force: false,
            tags: false,
            all: false,
            credentials: None,
        }
    }
}

impl PushOptions {
    pub fn remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refs_or_specs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn tags(mut self, tags: bool) -> Self {
        self.tags = tags;
        self
    }

    pub fn all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// What a push updated on the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummary {
    /// Remote ref names that were updated
    pub updated_refs: Vec<String>,
}

impl Operation for PushOptions {
    const KIND: OperationKind = OperationKind::Push;
    type Output = PushSummary;

    fn validate(&self) -> Result<(), String> {
        validate_network(&self.remote, self.credentials.as_ref())?;
        if self.refs_or_specs.iter().any(|s| s.trim().is_empty()) {
            return Err("refs to push cannot be blank".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<PushSummary, EngineError> {
        let mut remote = find_remote(session, &self.remote)?;
        let specs = push_refspecs(session, &self)?;
        debug!("push: {} {:?}", self.remote, specs);

        let attempts = Cell::new(0);
        let rejected: RefCell<Vec<(String, String)>> = RefCell::new(Vec::new());
        let accepted: RefCell<Vec<String>> = RefCell::new(Vec::new());
        let mut callbacks = transport::remote_callbacks(self.credentials.as_ref(), &attempts);
        callbacks.push_update_reference(|refname, status| {
            match status {
                Some(message) => rejected
                    .borrow_mut()
                    .push((refname.to_string(), message.to_string())),
                None => accepted.borrow_mut().push(refname.to_string()),
            }
            Ok(())
        });

        let mut options = git2::PushOptions::new();
        options.remote_callbacks(callbacks);
        remote
            .push(&specs, Some(&mut options))
            .map_err(transport::translate)?;
        drop(options);

        if let Some((refname, message)) = rejected.into_inner().into_iter().next() {
            return Err(if is_non_fast_forward(&message) {
                EngineError::NonFastForward {
                    refname: Some(refname),
                    message,
                }
            } else {
                EngineError::Transport {
                    failure: TransportFailure::Protocol,
                    message: format!("remote rejected {}: {}", refname, message),
                }
            });
        }

        let updated_refs = accepted.into_inner();
        info!("pushed {} ref(s) to {}", updated_refs.len(), self.remote);
        Ok(PushSummary { updated_refs })
    }
}

fn is_non_fast_forward(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("non-fast-forward")
        || message.contains("fetch first")
        || message.contains("not a fast forward")
}

/// Expand push options into explicit `src:dst` refspecs.
fn push_refspecs(session: &Session, options: &PushOptions) -> Result<Vec<String>, EngineError> {
    let repo = session.repo();
    let mut specs = Vec::new();

    for entry in &options.refs_or_specs {
        specs.push(expand_ref(repo, entry)?);
    }
    if options.all {
        for branch in repo.branches(Some(git2::BranchType::Local))? {
            let (branch, _) = branch?;
            let name = String::from_utf8_lossy(branch.get().name_bytes()).into_owned();
            specs.push(format!("{0}:{0}", name));
        }
    }
    if options.tags {
        for tag in repo.tag_names(None)?.iter().flatten() {
            specs.push(format!("refs/tags/{0}:refs/tags/{0}", tag));
        }
    }
    if options.refs_or_specs.is_empty() && !options.all && !options.tags {
        let branch = session
            .current_branch()?
            .ok_or_else(|| EngineError::invalid("HEAD is detached; name the refs to push"))?;
        if repo.find_reference(&branch).is_err() {
            return Err(EngineError::invalid("current branch has no commits to push"));
        }
        specs.push(format!("{0}:{0}", branch));
    }

    if options.force {
        for spec in &mut specs {
            if !spec.starts_with('+') {
                spec.insert(0, '+');
            }
        }
    }
    specs.dedup();
    Ok(specs)
}

/// `main` -> `refs/heads/main:refs/heads/main`; refspecs pass through.
fn expand_ref(repo: &git2::Repository, entry: &str) -> Result<String, EngineError> {
    if entry.contains(':') {
        return Ok(entry.to_string());
    }
    let (force, name) = match entry.strip_prefix('+') {
        Some(name) => ("+", name),
        None => ("", entry),
    };
    let full = if name.starts_with("refs/") {
        name.to_string()
    } else if repo.find_reference(&format!("refs/heads/{}", name)).is_ok() {
        format!("refs/heads/{}", name)
    } else if repo.find_reference(&format!("refs/tags/{}", name)).is_ok() {
        format!("refs/tags/{}", name)
    } else {
        return Err(EngineError::invalid(format!(
            "'{}' does not name a local branch or tag",
            name
        )));
    };
    Ok(format!("{}{1}:{1}", force, full))
}

// =============================================================================
// Pull
// =============================================================================

/// Options for `pull`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOptions {
    pub remote: String,
    /// Remote branch to integrate; the upstream of the current branch, or
    /// the branch of the same name, when `None`
    pub branch: Option<String>,
    /// Rebase instead of merging
    pub rebase: bool,
    pub credentials: Option<Credentials>,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            branch: None,
            rebase: false,
            credentials: None,
        }
    }
}

impl PullOptions {
    pub fn remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn rebase(mut self, rebase: bool) -> Self {
        self.rebase = rebase;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Result of a pull: how the fetched branch was integrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PullOutcome {
    Merge { outcome: MergeOutcome },
    Rebase { outcome: RebaseOutcome },
}

impl PullOutcome {
    pub fn is_conflicted(&self) -> bool {
        match self {
            PullOutcome::Merge { outcome } => outcome.is_conflicted(),
            PullOutcome::Rebase { outcome } => outcome.is_conflicted(),
        }
    }
}

impl Operation for PullOptions {
    const KIND: OperationKind = OperationKind::Pull;
    type Output = PullOutcome;

    fn validate(&self) -> Result<(), String> {
        validate_network(&self.remote, self.credentials.as_ref())?;
        if matches!(&self.branch, Some(b) if b.trim().is_empty()) {
            return Err("branch cannot be blank".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<PullOutcome, EngineError> {
        session.require_workdir()?;
        session.require_clean_state()?;
        let local = session
            .current_branch()?
            .ok_or_else(|| EngineError::invalid("HEAD is detached; check out a branch to pull"))?;
        let remote_branch = match &self.branch {
            Some(branch) => branch.clone(),
            None => upstream_branch_name(session, &local)?,
        };

        FetchOptions {
            remote: self.remote.clone(),
            credentials: self.credentials.clone(),
            ..Default::default()
        }
        .execute(session)?;

        let tracking = format!("refs/remotes/{}/{}", self.remote, remote_branch);
        if session.repo().find_reference(&tracking).is_err() {
            return Err(EngineError::Transport {
                failure: TransportFailure::RemoteNotFound,
                message: format!(
                    "remote '{}' has no branch '{}'",
                    self.remote, remote_branch
                ),
            });
        }

        if self.rebase {
            let outcome = RebaseOptions::new(tracking).execute(session)?;
            Ok(PullOutcome::Rebase { outcome })
        } else {
            let outcome = MergeOptions::new(tracking).execute(session)?;
            Ok(PullOutcome::Merge { outcome })
        }
    }
}

/// Short remote branch name from `branch.<name>.merge`, else the local name.
fn upstream_branch_name(session: &Session, local: &str) -> Result<String, EngineError> {
    let short = local.trim_start_matches("refs/heads/");
    let config = session.repo().config()?;
    match config.get_string(&format!("branch.{}.merge", short)) {
        Ok(merge) => Ok(merge.trim_start_matches("refs/heads/").to_string()),
        Err(_) => Ok(short.to_string()),
    }
}

// =============================================================================
// ls-remote
// =============================================================================

/// List refs advertised by a remote without fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsRemoteOptions {
    pub remote: String,
    /// Only `refs/heads/*`
    pub heads: bool,
    /// Only `refs/tags/*` (combined with `heads`, both)
    pub tags: bool,
    pub credentials: Option<Credentials>,
}

impl Default for LsRemoteOptions {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            heads: false,
            tags: false,
            credentials: None,
        }
    }
}

impl LsRemoteOptions {
    pub fn remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn heads(mut self, heads: bool) -> Self {
        self.heads = heads;
        self
    }

    pub fn tags(mut self, tags: bool) -> Self {
        self.tags = tags;
        self
    }
}

impl Operation for LsRemoteOptions {
    const KIND: OperationKind = OperationKind::LsRemote;
    type Output = Vec<Ref>;

    fn validate(&self) -> Result<(), String> {
        validate_network(&self.remote, self.credentials.as_ref())
    }

    fn execute(self, session: &mut Session) -> Result<Vec<Ref>, EngineError> {
        let mut remote = find_remote(session, &self.remote)?;
        let attempts = Cell::new(0);
        let callbacks = transport::remote_callbacks(self.credentials.as_ref(), &attempts);
        let connection = remote
            .connect_auth(git2::Direction::Fetch, Some(callbacks), None)
            .map_err(transport::translate)?;

        let mut refs = Vec::new();
        for head in connection.list().map_err(transport::translate)? {
            let name = head.name();
            let wanted = match (self.heads, self.tags) {
                (false, false) => true,
                (heads, tags) => {
                    (heads && name.starts_with("refs/heads/"))
                        || (tags && name.starts_with("refs/tags/"))
                }
            };
            if !wanted || name.ends_with("^{}") {
                continue;
            }
            let kind = match head.symref_target() {
                Some(target) => RefKind::Symbolic {
                    target: target.to_string(),
                },
                None => RefKind::Direct,
            };
            let id = head.oid();
            refs.push(Ref {
                name: name.to_string(),
                kind,
                target: (!id.is_zero()).then(|| CommitId::from(id)),
            });
        }
        Ok(refs)
    }
}

// =============================================================================
// Remote configuration
// =============================================================================

/// A configured remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub name: String,
    pub url: Option<String>,
    pub push_url: Option<String>,
}

/// List configured remotes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteList;

impl Operation for RemoteList {
    const KIND: OperationKind = OperationKind::RemoteList;
    type Output = Vec<RemoteInfo>;

    fn execute(self, session: &mut Session) -> Result<Vec<RemoteInfo>, EngineError> {
        let mut remotes = Vec::new();
        for name in session.repo().remotes()?.iter().flatten() {
            remotes.push(remote_info(&find_remote(session, name)?));
        }
        Ok(remotes)
    }
}

/// Add a remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAdd {
    pub name: String,
    pub url: String,
    pub push_url: Option<String>,
}

impl RemoteAdd {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            push_url: None,
        }
    }

    pub fn push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = Some(url.into());
        self
    }
}

impl Operation for RemoteAdd {
    const KIND: OperationKind = OperationKind::RemoteAdd;
    type Output = RemoteInfo;

    fn validate(&self) -> Result<(), String> {
        if !git2::Remote::is_valid_name(&self.name) {
            return Err(format!("'{}' is not a valid remote name", self.name));
        }
        if self.url.trim().is_empty() {
            return Err("remote url cannot be empty".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<RemoteInfo, EngineError> {
        let repo = session.repo();
        if repo.find_remote(&self.name).is_ok() {
            return Err(EngineError::invalid(format!(
                "remote '{}' already exists",
                self.name
            )));
        }
        repo.remote(&self.name, &self.url)?;
        if let Some(push_url) = &self.push_url {
            repo.remote_set_pushurl(&self.name, Some(push_url))?;
        }
        Ok(remote_info(&find_remote(session, &self.name)?))
    }
}

fn remote_info(remote: &git2::Remote<'_>) -> RemoteInfo {
    RemoteInfo {
        name: remote.name().unwrap_or_default().to_string(),
        url: remote.url().map(str::to_string),
        push_url: remote.pushurl().map(str::to_string),
    }
}
