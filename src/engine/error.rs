//! engine::error
//!
//! Translation from libgit2 failures into the facade taxonomy.
//!
//! Engine-level code returns [`EngineError`], which knows *what* went wrong
//! but not *which* operation or location was involved. The handle attaches
//! that context with [`EngineError::into_grgit`] when the operation returns.

use thiserror::Error;

use crate::core::location::Location;
use crate::error::{GrgitError, TransportFailure};
use crate::ops::OperationKind;

/// Classified engine failure, without operation context.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Location does not resolve to a repository.
    #[error("not a git repository")]
    NotARepository,

    /// Input or repository state makes the request impossible.
    #[error("{0}")]
    Invalid(String),

    /// Transport exchange failed.
    #[error("transport {failure}: {message}")]
    Transport {
        failure: TransportFailure,
        message: String,
    },

    /// Credentials rejected or missing.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Ref update would lose history.
    #[error("non-fast-forward: {message}")]
    NonFastForward {
        refname: Option<String>,
        message: String,
    },

    /// Anything libgit2 reports that has no better category.
    #[error(transparent)]
    Git(git2::Error),
}

impl EngineError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::Invalid(message.into())
    }

    /// Wrap a filesystem failure around repository content.
    pub(crate) fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        EngineError::Git(git2::Error::new(
            git2::ErrorCode::GenericError,
            git2::ErrorClass::Os,
            format!("{}: {}", context, err),
        ))
    }

    /// Classify a failure from a network exchange.
    ///
    /// Besides the generic classification, a missing object or repository on
    /// the other side means the remote was not found, and OS-level failures
    /// mean it could not be reached.
    pub(crate) fn from_transport(err: git2::Error) -> Self {
        match (err.code(), err.class()) {
            (git2::ErrorCode::NotFound, _) => EngineError::Transport {
                failure: TransportFailure::RemoteNotFound,
                message: err.message().to_string(),
            },
            (_, git2::ErrorClass::Os) => EngineError::Transport {
                failure: TransportFailure::Unreachable,
                message: err.message().to_string(),
            },
            _ => EngineError::from(err),
        }
    }

    /// Attach operation and location context.
    pub(crate) fn into_grgit(self, operation: OperationKind, location: &Location) -> GrgitError {
        let location = location.clone();
        match self {
            EngineError::NotARepository => GrgitError::NotARepository {
                operation,
                location,
            },
            EngineError::Invalid(message) => GrgitError::Validation {
                operation,
                location,
                message,
            },
            EngineError::Transport { failure, message } => GrgitError::Transport {
                operation,
                location,
                failure,
                message,
            },
            EngineError::Auth(message) => GrgitError::Auth {
                operation,
                location,
                message,
            },
            EngineError::NonFastForward { refname, message } => GrgitError::NonFastForward {
                operation,
                location,
                refname,
                message,
            },
            EngineError::Git(source) => GrgitError::Engine {
                operation,
                location,
                source,
            },
        }
    }
}

impl From<git2::Error> for EngineError {
    fn from(err: git2::Error) -> Self {
        let message = err.message().to_string();
        match err.code() {
            git2::ErrorCode::Auth => return EngineError::Auth(message),
            git2::ErrorCode::NotFastForward => {
                return EngineError::NonFastForward {
                    refname: None,
                    message,
                }
            }
            git2::ErrorCode::Certificate => {
                return EngineError::Transport {
                    failure: TransportFailure::Protocol,
                    message,
                }
            }
            _ => {}
        }

        match err.class() {
            git2::ErrorClass::Net => EngineError::Transport {
                failure: TransportFailure::Unreachable,
                message,
            },
            git2::ErrorClass::Http | git2::ErrorClass::Ssh | git2::ErrorClass::Ssl => {
                classify_http(message)
            }
            _ => EngineError::Git(err),
        }
    }
}

/// HTTP-ish failures carry the status only in the message text.
fn classify_http(message: String) -> EngineError {
    if message.contains("401") || message.contains("403") || message.contains("authentication") {
        EngineError::Auth(message)
    } else if message.contains("404") {
        EngineError::Transport {
            failure: TransportFailure::RemoteNotFound,
            message,
        }
    } else {
        EngineError::Transport {
            failure: TransportFailure::Protocol,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use git2::{ErrorClass, ErrorCode};
    use std::path::PathBuf;

    fn err(code: ErrorCode, class: ErrorClass, msg: &str) -> git2::Error {
        git2::Error::new(code, class, msg)
    }

    fn kind_of(e: EngineError) -> ErrorKind {
        e.into_grgit(OperationKind::Push, &Location::Local(PathBuf::from("/r")))
            .kind()
    }

    #[test]
    fn auth_code_is_auth() {
        let e = EngineError::from(err(ErrorCode::Auth, ErrorClass::Callback, "rejected"));
        assert_eq!(kind_of(e), ErrorKind::Auth);
    }

    #[test]
    fn not_fast_forward_code() {
        let e = EngineError::from(err(
            ErrorCode::NotFastForward,
            ErrorClass::Reference,
            "cannot push non-fastforwardable reference",
        ));
        assert_eq!(kind_of(e), ErrorKind::NonFastForward);
    }

    #[test]
    fn net_class_is_unreachable() {
        let e = EngineError::from(err(ErrorCode::GenericError, ErrorClass::Net, "no route"));
        assert!(matches!(
            e,
            EngineError::Transport {
                failure: TransportFailure::Unreachable,
                ..
            }
        ));
    }

    #[test]
    fn http_statuses() {
        let e = EngineError::from(err(
            ErrorCode::GenericError,
            ErrorClass::Http,
            "unexpected http status code: 404",
        ));
        assert!(matches!(
            e,
            EngineError::Transport {
                failure: TransportFailure::RemoteNotFound,
                ..
            }
        ));

        let e = EngineError::from(err(
            ErrorCode::GenericError,
            ErrorClass::Http,
            "unexpected http status code: 403",
        ));
        assert!(matches!(e, EngineError::Auth(_)));
    }

    #[test]
    fn not_found_in_transport_is_remote_not_found() {
        let e = EngineError::from_transport(err(
            ErrorCode::NotFound,
            ErrorClass::Repository,
            "could not find repository",
        ));
        assert!(matches!(
            e,
            EngineError::Transport {
                failure: TransportFailure::RemoteNotFound,
                ..
            }
        ));
    }

    #[test]
    fn other_failures_stay_engine() {
        let e = EngineError::from(err(ErrorCode::Locked, ErrorClass::Index, "index.lock exists"));
        assert_eq!(kind_of(e), ErrorKind::EngineFailure);
    }

    #[test]
    fn invalid_is_validation() {
        assert_eq!(
            kind_of(EngineError::invalid("tag target does not resolve")),
            ErrorKind::Validation
        );
    }
}
