//! ops::tag
//!
//! Tag listing, creation, and deletion.

use super::{require_entries, Operation, OperationKind};
use crate::core::types::{validate_short_name, Person, Tag};
use crate::engine::session::person;
use crate::engine::{EngineError, Session};

/// List tags that point (possibly through tag objects) at commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList;

impl Operation for TagList {
    const KIND: OperationKind = OperationKind::TagList;
    type Output = Vec<Tag>;

    fn execute(self, session: &mut Session) -> Result<Vec<Tag>, EngineError> {
        let repo = session.repo();
        let mut tags = Vec::new();
        for name in repo.tag_names(None)?.iter().flatten() {
            if let Some(tag) = tag_snapshot(repo, name)? {
                tags.push(tag);
            }
        }
        tags.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(tags)
    }
}

/// Create a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAdd {
    pub name: String,
    /// Tag message; annotated tags without one get an empty message
    pub message: Option<String>,
    /// Revision to tag
    pub pointing_to: String,
    /// Create a tag object rather than a lightweight ref
    pub annotate: bool,
    /// Replace an existing tag of the same name
    pub force: bool,
    /// Tagger identity; repository config when `None`
    pub tagger: Option<Person>,
}

impl Default for TagAdd {
    fn default() -> Self {
        Self {
            name: String::new(),
            message: None,
            pointing_to: "HEAD".to_string(),
            annotate: true,
            force: false,
            tagger: None,
        }
    }
}

impl TagAdd {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn pointing_to(mut self, rev: impl Into<String>) -> Self {
        self.pointing_to = rev.into();
        self
    }

    pub fn annotate(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn tagger(mut self, tagger: Person) -> Self {
        self.tagger = Some(tagger);
        self
    }
}

impl Operation for TagAdd {
    const KIND: OperationKind = OperationKind::TagAdd;
    type Output = Tag;

    fn validate(&self) -> Result<(), String> {
        validate_short_name(&self.name).map_err(|e| e.to_string())?;
        if self.pointing_to.trim().is_empty() {
            return Err("tag target cannot be empty".into());
        }
        if !self.annotate && self.message.is_some() {
            return Err("lightweight tags cannot carry a message".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<Tag, EngineError> {
        let repo = session.repo();
        let target = session.resolve_object(&self.pointing_to)?;

        if !self.force && repo.find_reference(&format!("refs/tags/{}", self.name)).is_ok() {
            return Err(EngineError::invalid(format!(
                "tag '{}' already exists",
                self.name
            )));
        }

        if self.annotate {
            let tagger = session.signature(self.tagger.as_ref())?;
            let message = self.message.as_deref().unwrap_or("");
            repo.tag(&self.name, &target, &tagger, message, self.force)?;
        } else {
            repo.tag_lightweight(&self.name, &target, self.force)?;
        }

        tag_snapshot(repo, &self.name)?.ok_or_else(|| {
            EngineError::invalid(format!("tag '{}' does not point at a commit", self.name))
        })
    }
}

/// Delete tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRemove {
    pub names: Vec<String>,
}

impl TagRemove {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Operation for TagRemove {
    const KIND: OperationKind = OperationKind::TagRemove;
    /// Full names of the deleted tags
    type Output = Vec<String>;

    fn validate(&self) -> Result<(), String> {
        require_entries("tag name", &self.names)
    }

    fn execute(self, session: &mut Session) -> Result<Vec<String>, EngineError> {
        let repo = session.repo();
        for name in &self.names {
            if repo.find_reference(&format!("refs/tags/{}", name)).is_err() {
                return Err(EngineError::invalid(format!("tag '{}' does not exist", name)));
            }
        }

        let mut removed = Vec::with_capacity(self.names.len());
        for name in &self.names {
            repo.tag_delete(name)?;
            removed.push(format!("refs/tags/{}", name));
        }
        Ok(removed)
    }
}

/// Snapshot `refs/tags/<name>`; `None` if it does not lead to a commit.
fn tag_snapshot(repo: &git2::Repository, name: &str) -> Result<Option<Tag>, EngineError> {
    let full_name = format!("refs/tags/{}", name);
    let reference = repo.find_reference(&full_name)?;
    let commit = match reference.peel_to_commit() {
        Ok(commit) => commit,
        Err(_) => return Ok(None),
    };

    let tag_object = reference.target().and_then(|id| repo.find_tag(id).ok());

    Ok(Some(match tag_object {
        Some(tag) => Tag {
            full_name,
            commit: commit.id().into(),
            annotated: true,
            message: tag.message().map(str::to_string),
            tagger: tag.tagger().map(|sig| person(&sig)),
        },
        None => Tag {
            full_name,
            commit: commit.id().into(),
            annotated: false,
            message: None,
            tagger: None,
        },
    }))
}
