//! ops::stage
//!
//! Index staging: add and remove.

use std::path::Path;

use super::{require_entries, Operation, OperationKind};
use crate::engine::{EngineError, Session};

/// Libgit2 pathspecs do not treat `.` as "everything".
fn pathspecs(patterns: &[String]) -> Vec<&str> {
    patterns
        .iter()
        .map(|p| match p.as_str() {
            "." | "./" => "*",
            other => other,
        })
        .collect()
}

/// Stage working tree content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Pathspecs relative to the working directory; `.` means everything
    pub patterns: Vec<String>,
    /// Only stage tracked files (including deletions), like `git add -u`
    pub update: bool,
}

impl AddOptions {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            update: false,
        }
    }

    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }
}

impl Operation for AddOptions {
    const KIND: OperationKind = OperationKind::Add;
    type Output = ();

    fn validate(&self) -> Result<(), String> {
        require_entries("pattern", &self.patterns)
    }

    fn execute(self, session: &mut Session) -> Result<(), EngineError> {
        session.require_workdir()?;
        let specs = pathspecs(&self.patterns);
        let mut index = session.repo().index()?;

        if self.update {
            index.update_all(specs.iter(), None)?;
        } else {
            index.add_all(specs.iter(), git2::IndexAddOption::DEFAULT, None)?;
        }
        index.write()?;
        Ok(())
    }
}

/// Unstage paths and, unless `cached`, delete them from the working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub patterns: Vec<String>,
    /// Keep the files on disk
    pub cached: bool,
}

impl RemoveOptions {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            cached: false,
        }
    }

    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}

impl Operation for RemoveOptions {
    const KIND: OperationKind = OperationKind::Remove;
    /// Paths removed from the index
    type Output = Vec<String>;

    fn validate(&self) -> Result<(), String> {
        require_entries("pattern", &self.patterns)
    }

    fn execute(self, session: &mut Session) -> Result<Vec<String>, EngineError> {
        let workdir = session.require_workdir()?;
        let specs = pathspecs(&self.patterns);
        let mut index = session.repo().index()?;

        let mut removed: Vec<String> = Vec::new();
        {
            let record = &mut |path: &Path, _spec: &[u8]| -> i32 {
                removed.push(path.to_string_lossy().into_owned());
                0
            };
            index.remove_all(specs.iter(), Some(record as &mut git2::IndexMatchedPath))?;
        }
        index.write()?;

        if !self.cached {
            for path in &removed {
                let full = workdir.join(path);
                if full.is_file() {
                    std::fs::remove_file(&full).map_err(|e| EngineError::io(full.display(), e))?;
                }
            }
        }

        removed.sort();
        Ok(removed)
    }
}
