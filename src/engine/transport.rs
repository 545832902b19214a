//! engine::transport
//!
//! Remote lookup and the libgit2 callbacks used by every network exchange.
//!
//! Credentials are handed to the callbacks per call and dropped when the
//! exchange returns; nothing here stores them.

use std::cell::Cell;

use log::debug;

use super::error::EngineError;
use super::session::Session;
use crate::core::credentials::Credentials;
use crate::error::TransportFailure;

/// Number of credential callbacks answered before giving up.
///
/// libgit2 calls the credentials callback again after every rejection, so an
/// unbounded answer loops forever on bad credentials.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Look up a configured remote by name.
///
/// # Errors
///
/// - [`EngineError::Transport`] with [`TransportFailure::RemoteNotFound`] when
///   no remote of that name is configured
pub(crate) fn find_remote<'r>(
    session: &'r Session,
    name: &str,
) -> Result<git2::Remote<'r>, EngineError> {
    session
        .repo()
        .find_remote(name)
        .map_err(|e| match e.code() {
            git2::ErrorCode::NotFound | git2::ErrorCode::InvalidSpec => EngineError::Transport {
                failure: TransportFailure::RemoteNotFound,
                message: format!("no remote named '{}'", name),
            },
            _ => EngineError::from(e),
        })
}

/// Build callbacks that answer credential requests.
///
/// With explicit credentials, user/password is offered for plaintext
/// requests and the username for SSH agent lookups. Without them, the
/// engine's default mechanisms are tried (SSH agent, credential helpers).
pub(crate) fn remote_callbacks<'a>(
    credentials: Option<&'a Credentials>,
    attempts: &'a Cell<usize>,
) -> git2::RemoteCallbacks<'a> {
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        let attempt = attempts.get() + 1;
        attempts.set(attempt);
        if attempt > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                git2::ErrorCode::Auth,
                git2::ErrorClass::Callback,
                format!("credentials rejected by {}", url),
            ));
        }
        debug!("transport: credential request #{} for {}", attempt, url);

        let username = credentials
            .map(|c| c.username.as_str())
            .or(username_from_url)
            .unwrap_or("git");

        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            if let Some(Credentials {
                username,
                password: Some(password),
            }) = credentials
            {
                return git2::Cred::userpass_plaintext(username, password);
            }
        }
        if allowed.contains(git2::CredentialType::USERNAME) {
            return git2::Cred::username(username);
        }
        if allowed.contains(git2::CredentialType::SSH_KEY) {
            return git2::Cred::ssh_key_from_agent(username);
        }
        if allowed.contains(git2::CredentialType::DEFAULT) {
            return git2::Cred::default();
        }
        Err(git2::Error::new(
            git2::ErrorCode::Auth,
            git2::ErrorClass::Callback,
            format!("no usable credentials for {}", url),
        ))
    });
    callbacks
}

/// Fetch options carrying the credential callbacks.
pub(crate) fn fetch_options<'a>(
    credentials: Option<&'a Credentials>,
    attempts: &'a Cell<usize>,
) -> git2::FetchOptions<'a> {
    let mut options = git2::FetchOptions::new();
    options.remote_callbacks(remote_callbacks(credentials, attempts));
    options
}

/// Translate a failure reported while the transport was talking.
///
/// An authentication failure after our callback gave up is reported by
/// libgit2 with the callback's code, so the general classification applies.
pub(crate) fn translate(err: git2::Error) -> EngineError {
    EngineError::from_transport(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::location::Location;
    use crate::engine::session::{init_new, InitOptions};
    use tempfile::TempDir;

    #[test]
    fn missing_remote_is_remote_not_found() {
        let dir = TempDir::new().unwrap();
        let session = init_new(
            &Location::local(dir.path()).unwrap(),
            &InitOptions::default(),
        )
        .unwrap();
        let err = find_remote(&session, "upstream").err().unwrap();
        assert!(matches!(
            err,
            EngineError::Transport {
                failure: TransportFailure::RemoteNotFound,
                ..
            }
        ));
    }

    #[test]
    fn configured_remote_is_found() {
        let dir = TempDir::new().unwrap();
        let session = init_new(
            &Location::local(dir.path()).unwrap(),
            &InitOptions::default(),
        )
        .unwrap();
        session
            .repo()
            .remote("origin", "https://example.com/r.git")
            .unwrap();
        let remote = find_remote(&session, "origin").unwrap();
        assert_eq!(remote.url(), Some("https://example.com/r.git"));
    }
}
