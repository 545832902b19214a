//! error
//!
//! Facade-level error taxonomy.
//!
//! Every error names the failing operation and the [`Location`] involved, so
//! a caller can decide between retry, abort, and manual resolution.
//!
//! # Kinds
//!
//! - [`ErrorKind::NotARepository`]: location is not a valid repository
//! - [`ErrorKind::Lifecycle`]: operation on a handle that is not open,
//!   double close, or acquire after shutdown
//! - [`ErrorKind::Validation`]: input rejected before touching the engine
//! - [`ErrorKind::Transport`]: unreachable, remote not found, protocol failure
//! - [`ErrorKind::Auth`]: credentials rejected or missing
//! - [`ErrorKind::NonFastForward`]: ref update rejected because history diverged
//! - [`ErrorKind::EngineFailure`]: anything else from libgit2, cause preserved
//!
//! Merge and rebase conflicts are not errors; they come back as the
//! `Conflicted` variant of the operation's outcome.

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::location::{Location, LocationError};
use crate::handle::HandleState;
use crate::ops::OperationKind;

/// Why a transport exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Network or host unreachable
    Unreachable,
    /// The named remote or the repository behind it does not exist
    RemoteNotFound,
    /// Negotiation failed or the remote refused the update
    Protocol,
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TransportFailure::Unreachable => "unreachable",
            TransportFailure::RemoteNotFound => "remote not found",
            TransportFailure::Protocol => "protocol error",
        };
        f.write_str(text)
    }
}

/// Coarse classification of a [`GrgitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotARepository,
    Lifecycle,
    Validation,
    Transport,
    Auth,
    NonFastForward,
    EngineFailure,
    Config,
}

/// Errors surfaced by handles, the registry, and the lifecycle service.
#[derive(Debug, Error)]
pub enum GrgitError {
    /// Location does not resolve to a valid repository.
    #[error("{operation}: not a git repository: {location}")]
    NotARepository {
        operation: OperationKind,
        location: Location,
    },

    /// Handle is not open, was already closed, or the service shut down.
    #[error("{operation}: repository handle for {location} is {state}")]
    Lifecycle {
        operation: OperationKind,
        location: Location,
        state: HandleState,
    },

    /// Input rejected before any engine call.
    #[error("{operation} on {location}: {message}")]
    Validation {
        operation: OperationKind,
        location: Location,
        message: String,
    },

    /// Transport exchange failed.
    #[error("{operation} on {location}: transport {failure}: {message}")]
    Transport {
        operation: OperationKind,
        location: Location,
        failure: TransportFailure,
        message: String,
    },

    /// Credentials rejected or missing.
    #[error("{operation} on {location}: authentication failed: {message}")]
    Auth {
        operation: OperationKind,
        location: Location,
        message: String,
    },

    /// Update rejected because the target has diverged.
    #[error("{operation} on {location}: non-fast-forward update rejected{}: {message}", .refname.as_ref().map(|r| format!(" for {r}")).unwrap_or_default())]
    NonFastForward {
        operation: OperationKind,
        location: Location,
        refname: Option<String>,
        message: String,
    },

    /// Unclassified libgit2 failure.
    #[error("{operation} on {location}: {source}")]
    Engine {
        operation: OperationKind,
        location: Location,
        #[source]
        source: git2::Error,
    },

    /// A location string could not be resolved.
    #[error(transparent)]
    InvalidLocation(#[from] LocationError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GrgitError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GrgitError::NotARepository { .. } => ErrorKind::NotARepository,
            GrgitError::Lifecycle { .. } => ErrorKind::Lifecycle,
            GrgitError::Validation { .. } | GrgitError::InvalidLocation(_) => {
                ErrorKind::Validation
            }
            GrgitError::Transport { .. } => ErrorKind::Transport,
            GrgitError::Auth { .. } => ErrorKind::Auth,
            GrgitError::NonFastForward { .. } => ErrorKind::NonFastForward,
            GrgitError::Engine { .. } => ErrorKind::EngineFailure,
            GrgitError::Config(_) => ErrorKind::Config,
        }
    }

    /// The operation that failed, if the error is tied to one.
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            GrgitError::NotARepository { operation, .. }
            | GrgitError::Lifecycle { operation, .. }
            | GrgitError::Validation { operation, .. }
            | GrgitError::Transport { operation, .. }
            | GrgitError::Auth { operation, .. }
            | GrgitError::NonFastForward { operation, .. }
            | GrgitError::Engine { operation, .. } => Some(*operation),
            GrgitError::InvalidLocation(_) | GrgitError::Config(_) => None,
        }
    }

    /// The location involved, if the error is tied to one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            GrgitError::NotARepository { location, .. }
            | GrgitError::Lifecycle { location, .. }
            | GrgitError::Validation { location, .. }
            | GrgitError::Transport { location, .. }
            | GrgitError::Auth { location, .. }
            | GrgitError::NonFastForward { location, .. }
            | GrgitError::Engine { location, .. } => Some(location),
            GrgitError::InvalidLocation(_) | GrgitError::Config(_) => None,
        }
    }

    pub(crate) fn validation(
        operation: OperationKind,
        location: &Location,
        message: impl Into<String>,
    ) -> Self {
        GrgitError::Validation {
            operation,
            location: location.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn lifecycle(
        operation: OperationKind,
        location: &Location,
        state: HandleState,
    ) -> Self {
        GrgitError::Lifecycle {
            operation,
            location: location.clone(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loc() -> Location {
        Location::Local(PathBuf::from("/work/repo"))
    }

    #[test]
    fn messages_name_operation_and_location() {
        let err = GrgitError::validation(OperationKind::Commit, &loc(), "commit message is empty");
        let text = err.to_string();
        assert!(text.contains("commit"));
        assert!(text.contains("/work/repo"));
        assert!(text.contains("commit message is empty"));
    }

    #[test]
    fn lifecycle_message_names_state() {
        let err = GrgitError::lifecycle(OperationKind::Log, &loc(), HandleState::Closed);
        assert!(err.to_string().contains("closed"));
        assert_eq!(err.kind(), ErrorKind::Lifecycle);
    }

    #[test]
    fn non_fast_forward_mentions_ref() {
        let err = GrgitError::NonFastForward {
            operation: OperationKind::Push,
            location: loc(),
            refname: Some("refs/heads/main".into()),
            message: "remote has diverged".into(),
        };
        assert!(err.to_string().contains("refs/heads/main"));
        assert_eq!(err.kind(), ErrorKind::NonFastForward);
    }

    #[test]
    fn engine_failure_keeps_source() {
        use std::error::Error as _;
        let err = GrgitError::Engine {
            operation: OperationKind::Status,
            location: loc(),
            source: git2::Error::from_str("boom"),
        };
        assert_eq!(err.kind(), ErrorKind::EngineFailure);
        assert!(err.source().is_some());
    }

    #[test]
    fn accessors() {
        let err = GrgitError::Transport {
            operation: OperationKind::Fetch,
            location: loc(),
            failure: TransportFailure::RemoteNotFound,
            message: "no remote 'upstream'".into(),
        };
        assert_eq!(err.operation(), Some(OperationKind::Fetch));
        assert_eq!(err.location(), Some(&loc()));
        assert!(err.to_string().contains("remote not found"));
    }
}
