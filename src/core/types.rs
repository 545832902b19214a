//! core::types
//!
//! Strong types for repository snapshots.
//!
//! # Types
//!
//! - [`CommitId`] - Content-addressed commit identifier
//! - [`Person`] - Author/committer identity
//! - [`Commit`] - Immutable commit snapshot
//! - [`Ref`] - Named pointer (branch, tag, HEAD), direct or symbolic
//! - [`Branch`] / [`Tag`] - Resolved branch and tag snapshots
//! - [`Status`] - Working tree vs index vs HEAD at the moment of the call
//!
//! # Snapshots
//!
//! Every type here is a copy taken at query time. Mutating operations return
//! freshly resolved values; nothing is a live view over the repository.
//!
//! # Examples
//!
//! ```
//! use grgit::core::types::{validate_short_name, CommitId};
//!
//! let id = CommitId::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
//! assert_eq!(id.short(7), "abc123d");
//!
//! assert!(validate_short_name("release/1.0").is_ok());
//! assert!(validate_short_name("invalid..name").is_err());
//! ```

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidId(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),
}

/// A Git object identifier (SHA-1 or SHA-256), normalized to lowercase.
///
/// # Example
///
/// ```
/// use grgit::core::types::CommitId;
///
/// let id = CommitId::new("abc123def4567890abc123def4567890abc12345").unwrap();
/// assert_eq!(id.short(4), "abc1");
/// assert!(CommitId::new("not-a-sha").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidId` if the string is not a 40 or 64 digit hex id.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into().to_ascii_lowercase();
        if id.len() != 40 && id.len() != 64 {
            return Err(TypeError::InvalidId(format!(
                "expected 40 or 64 hex characters, got {}",
                id.len()
            )));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidId("object id must be hexadecimal".into()));
        }
        Ok(Self(id))
    }

    /// Get an abbreviated form of the id.
    ///
    /// Returns the full id if `len` exceeds its length.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CommitId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

impl From<git2::Oid> for CommitId {
    fn from(oid: git2::Oid) -> Self {
        // git2 always renders full-length lowercase hex
        Self(oid.to_string())
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a short branch or tag name against Git's refname rules.
///
/// The rules mirror `git check-ref-format --branch`:
/// - Cannot be empty or exactly `@`
/// - Cannot start with `.` or `-`, or end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, control characters, or any of ` ~^:\?*[`
/// - No path component may start with `.` or end with `.lock`
pub fn validate_short_name(name: &str) -> Result<(), TypeError> {
    let fail = |msg: &str| Err(TypeError::InvalidRefName(format!("'{name}': {msg}")));

    if name.is_empty() {
        return fail("name cannot be empty");
    }
    if name == "@" {
        return fail("name cannot be '@' (reserved)");
    }
    if name.starts_with('.') || name.starts_with('-') {
        return fail("name cannot start with '.' or '-'");
    }
    if name.ends_with(".lock") || name.ends_with('/') {
        return fail("name cannot end with '.lock' or '/'");
    }
    for pattern in ["..", "@{", "//"] {
        if name.contains(pattern) {
            return fail(&format!("name cannot contain '{pattern}'"));
        }
    }

    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    if let Some(c) = name
        .chars()
        .find(|c| INVALID_CHARS.contains(c) || c.is_ascii_control())
    {
        return fail(&format!("name cannot contain {c:?}"));
    }

    if name
        .split('/')
        .any(|component| component.starts_with('.') || component.ends_with(".lock"))
    {
        return fail("path component cannot start with '.' or end with '.lock'");
    }

    Ok(())
}

/// An author or committer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// An immutable commit snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Content-addressed id
    pub id: CommitId,
    /// Parent ids in order; two or more for merge commits, empty for roots
    pub parent_ids: Vec<CommitId>,
    /// Id of the root tree
    pub tree_id: String,
    pub author: Person,
    pub author_time: DateTime<Utc>,
    pub committer: Person,
    pub commit_time: DateTime<Utc>,
    /// Full commit message
    pub message: String,
}

impl Commit {
    /// First line of the commit message.
    pub fn short_message(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Check if this is a merge commit.
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

/// How a ref names its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefKind {
    /// Points straight at an object
    Direct,
    /// Points at another ref (HEAD -> refs/heads/main)
    Symbolic { target: String },
}

/// A named pointer to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Full ref name (`refs/heads/main`, `HEAD`)
    pub name: String,
    pub kind: RefKind,
    /// Commit the ref resolves to; `None` for an unborn branch
    pub target: Option<CommitId>,
}

impl Ref {
    /// Short name with the well-known prefix stripped.
    ///
    /// # Example
    ///
    /// ```
    /// use grgit::core::types::{Ref, RefKind};
    ///
    /// let r = Ref { name: "refs/heads/feature/x".into(), kind: RefKind::Direct, target: None };
    /// assert_eq!(r.short_name(), "feature/x");
    /// ```
    pub fn short_name(&self) -> &str {
        short_ref_name(&self.name)
    }
}

/// Strip `refs/heads/`, `refs/tags/`, or `refs/remotes/` from a ref name.
pub fn short_ref_name(name: &str) -> &str {
    ["refs/heads/", "refs/tags/", "refs/remotes/"]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

/// A branch snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Full ref name (`refs/heads/main` or `refs/remotes/origin/main`)
    pub full_name: String,
    pub target: CommitId,
    /// Full name of the upstream branch, if one is configured
    pub tracking: Option<String>,
}

impl Branch {
    pub fn name(&self) -> &str {
        short_ref_name(&self.full_name)
    }

    pub fn is_remote(&self) -> bool {
        self.full_name.starts_with("refs/remotes/")
    }
}

/// A tag snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Full ref name (`refs/tags/v1`)
    pub full_name: String,
    /// The commit the tag ultimately points at
    pub commit: CommitId,
    /// Whether this is an annotated tag object
    pub annotated: bool,
    pub message: Option<String>,
    pub tagger: Option<Person>,
}

impl Tag {
    pub fn name(&self) -> &str {
        short_ref_name(&self.full_name)
    }
}

/// A set of changed paths in one area of the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// State of in-progress multi-step operations.
///
/// A repository left in a non-clean state (usually by conflicts) needs the
/// caller to resolve or abort before ref-mutating operations continue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RepoState {
    /// No operation in progress.
    #[default]
    Clean,

    /// Rebase in progress.
    Rebase {
        /// Current step in the rebase (1-indexed), if available.
        current: Option<usize>,
        /// Total steps in the rebase, if available.
        total: Option<usize>,
    },

    /// Merge in progress.
    Merge,

    /// Cherry-pick in progress.
    CherryPick,

    /// Revert in progress.
    Revert,

    /// Bisect in progress.
    Bisect,

    /// Apply mailbox in progress.
    ApplyMailbox,
}

impl RepoState {
    /// Check if any operation is in progress.
    ///
    /// # Example
    ///
    /// ```
    /// use grgit::core::types::RepoState;
    ///
    /// assert!(!RepoState::Clean.is_in_progress());
    /// assert!(RepoState::Merge.is_in_progress());
    /// ```
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, RepoState::Clean)
    }

    pub fn description(&self) -> &'static str {
        match self {
            RepoState::Clean => "clean",
            RepoState::Rebase { .. } => "rebase",
            RepoState::Merge => "merge",
            RepoState::CherryPick => "cherry-pick",
            RepoState::Revert => "revert",
            RepoState::Bisect => "bisect",
            RepoState::ApplyMailbox => "apply-mailbox",
        }
    }
}

impl std::fmt::Display for RepoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoState::Rebase {
                current: Some(c),
                total: Some(t),
            } => write!(f, "rebase ({}/{})", c, t),
            _ => write!(f, "{}", self.description()),
        }
    }
}

/// Working tree status snapshot.
///
/// Untracked files are reported as `unstaged.added`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// In-progress operation, if any
    pub state: RepoState,
    /// Index vs HEAD
    pub staged: Changes,
    /// Working tree vs index
    pub unstaged: Changes,
    /// Paths with unresolved conflicts
    pub conflicts: BTreeSet<String>,
}

impl Status {
    /// Check if there is nothing to commit and nothing in conflict.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty() && self.conflicts.is_empty()
    }
}

/// Kind of change in a diff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

/// One file-level difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub change_type: ChangeType,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
}

impl DiffEntry {
    /// The most relevant path: the new path unless the file was deleted.
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod commit_id {
        use super::*;

        #[test]
        fn normalizes_to_lowercase() {
            let id = CommitId::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
            assert_eq!(id.as_str(), "abc123def4567890abc123def4567890abc12345");
        }

        #[test]
        fn accepts_sha256_length() {
            assert!(CommitId::new("a".repeat(64)).is_ok());
        }

        #[test]
        fn rejects_wrong_length_and_non_hex() {
            assert!(CommitId::new("abc").is_err());
            assert!(CommitId::new("g".repeat(40)).is_err());
        }

        #[test]
        fn short_clamps_to_length() {
            let id = CommitId::new("a".repeat(40)).unwrap();
            assert_eq!(id.short(100).len(), 40);
        }

        #[test]
        fn serde_rejects_invalid() {
            let parsed: Result<CommitId, _> = serde_json::from_str("\"zzz\"");
            assert!(parsed.is_err());
        }
    }

    mod short_names {
        use super::*;

        #[test]
        fn valid_names() {
            for name in ["main", "feature/foo", "v1.0.0", "user@feature", "a-b_c"] {
                assert!(validate_short_name(name).is_ok(), "{name} should be valid");
            }
        }

        #[test]
        fn invalid_names() {
            for name in [
                "", "@", ".hidden", "-x", "x.lock", "x/", "a..b", "a@{b", "a//b", "has space",
                "a~1", "a^", "a:b", "a?", "a*", "a[b", "a/.b", "a/b.lock/c",
            ] {
                assert!(validate_short_name(name).is_err(), "{name:?} should be invalid");
            }
        }

        #[test]
        fn strips_known_prefixes() {
            assert_eq!(short_ref_name("refs/heads/main"), "main");
            assert_eq!(short_ref_name("refs/tags/v1"), "v1");
            assert_eq!(short_ref_name("refs/remotes/origin/main"), "origin/main");
            assert_eq!(short_ref_name("HEAD"), "HEAD");
        }
    }

    mod status {
        use super::*;

        #[test]
        fn default_is_clean() {
            assert!(Status::default().is_clean());
        }

        #[test]
        fn untracked_file_is_not_clean() {
            let mut status = Status::default();
            status.unstaged.added.insert("new.txt".into());
            assert!(!status.is_clean());
            assert_eq!(status.unstaged.len(), 1);
        }

        #[test]
        fn conflicts_make_dirty() {
            let mut status = Status::default();
            status.conflicts.insert("a.txt".into());
            assert!(!status.is_clean());
        }
    }

    mod repo_state {
        use super::*;

        #[test]
        fn operations_are_in_progress() {
            assert!(RepoState::Merge.is_in_progress());
            assert!(RepoState::CherryPick.is_in_progress());
            assert!(RepoState::Rebase {
                current: None,
                total: None
            }
            .is_in_progress());
        }

        #[test]
        fn display_formatting() {
            assert_eq!(format!("{}", RepoState::Clean), "clean");
            assert_eq!(
                format!(
                    "{}",
                    RepoState::Rebase {
                        current: Some(2),
                        total: Some(5)
                    }
                ),
                "rebase (2/5)"
            );
        }
    }

    #[test]
    fn short_message_is_first_line() {
        let id = CommitId::new("a".repeat(40)).unwrap();
        let commit = Commit {
            id,
            parent_ids: vec![],
            tree_id: "b".repeat(40),
            author: Person::new("A", "a@example.com"),
            author_time: DateTime::UNIX_EPOCH,
            committer: Person::new("A", "a@example.com"),
            commit_time: DateTime::UNIX_EPOCH,
            message: "subject\n\nbody".into(),
        };
        assert_eq!(commit.short_message(), "subject");
        assert!(!commit.is_merge());
    }
}
