//! ops::reset
//!
//! Move HEAD (and optionally the index and working tree) to a commit, or
//! reset individual index paths.

use super::{Operation, OperationKind};
use crate::core::types::Commit;
use crate::engine::session::commit_snapshot;
use crate::engine::{EngineError, Session};

/// How much `reset` touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetMode {
    /// Move HEAD only
    Soft,
    /// Move HEAD and reset the index
    #[default]
    Mixed,
    /// Move HEAD, reset the index, and discard working tree changes
    Hard,
}

impl From<ResetMode> for git2::ResetType {
    fn from(mode: ResetMode) -> Self {
        match mode {
            ResetMode::Soft => git2::ResetType::Soft,
            ResetMode::Mixed => git2::ResetType::Mixed,
            ResetMode::Hard => git2::ResetType::Hard,
        }
    }
}

/// Options for `reset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOptions {
    /// Target revision
    pub commit: String,
    pub mode: ResetMode,
    /// Reset only these index entries (mixed mode only)
    pub paths: Vec<String>,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            commit: "HEAD".to_string(),
            mode: ResetMode::Mixed,
            paths: Vec::new(),
        }
    }
}

impl ResetOptions {
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            ..Default::default()
        }
    }

    pub fn mode(mut self, mode: ResetMode) -> Self {
        self.mode = mode;
        self
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

impl Operation for ResetOptions {
    const KIND: OperationKind = OperationKind::Reset;
    /// The commit HEAD points at afterwards
    type Output = Commit;

    fn validate(&self) -> Result<(), String> {
        if self.commit.trim().is_empty() {
            return Err("reset target cannot be empty".into());
        }
        if !self.paths.is_empty() && self.mode != ResetMode::Mixed {
            return Err("path resets are only supported in mixed mode".into());
        }
        Ok(())
    }

    fn execute(self, session: &mut Session) -> Result<Commit, EngineError> {
        if self.mode != ResetMode::Soft {
            session.require_workdir()?;
        }
        let target = session.resolve_commit(&self.commit)?;
        let repo = session.repo();

        if self.paths.is_empty() {
            repo.reset(target.as_object(), self.mode.into(), None)?;
        } else {
            repo.reset_default(Some(target.as_object()), self.paths.iter())?;
        }

        let head = session
            .head_commit()?
            .ok_or_else(|| EngineError::invalid("HEAD has no commits after reset"))?;
        Ok(commit_snapshot(&head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_mixed_head() {
        let op = ResetOptions::default();
        assert_eq!(op.commit, "HEAD");
        assert_eq!(op.mode, ResetMode::Mixed);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn paths_require_mixed() {
        let op = ResetOptions::new("HEAD").mode(ResetMode::Hard).paths(["a.txt"]);
        assert!(op.validate().is_err());
        let op = ResetOptions::new("HEAD").paths(["a.txt"]);
        assert!(op.validate().is_ok());
    }
}
