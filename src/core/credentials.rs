//! core::credentials
//!
//! Transport credentials supplied per network call.
//!
//! # Design
//!
//! Credentials are passed into `push`/`pull`/`fetch`/`clone`/`ls_remote`
//! options for a single call and are never persisted by a repository handle.
//! Where they come from is abstracted by [`CredentialSource`]; the default
//! source, [`EnvCredentials`], reads `GRGIT_USER` and `GRGIT_PASS`.
//!
//! # Security
//!
//! Implementations MUST never log, print, or include secret values in error
//! messages. [`Credentials`] redacts its password in `Debug` output.
//!
//! # Example
//!
//! ```
//! use grgit::core::credentials::{CredentialSource, Credentials, EnvCredentials};
//!
//! let creds = Credentials::new("ci-bot", Some("token".into()));
//! assert_eq!(format!("{:?}", creds), "Credentials { username: \"ci-bot\", password: Some(\"<redacted>\") }");
//!
//! let source = EnvCredentials::with_vars("MY_USER_VAR_UNSET", "MY_PASS_VAR_UNSET");
//! assert!(source.credentials().is_none());
//! ```

use std::collections::HashMap;

/// Environment variable holding the transport username.
pub const ENV_USER: &str = "GRGIT_USER";

/// Environment variable holding the transport password or token.
pub const ENV_PASS: &str = "GRGIT_PASS";

/// A username with an optional password or token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Check the credentials are usable before any network call.
    ///
    /// Returns a description of the problem if not.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("credentials have an empty username".into());
        }
        if matches!(&self.password, Some(p) if p.is_empty()) {
            return Err("credentials have an empty password".into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of credentials for authenticated transports.
///
/// Implementations must be thread-safe (Send + Sync) and must never log,
/// print, or include secret values in error messages.
pub trait CredentialSource: Send + Sync {
    /// Look up credentials. `None` means no credentials are configured.
    fn credentials(&self) -> Option<Credentials>;
}

/// Reads credentials from environment variables.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    user_var: String,
    pass_var: String,
}

impl EnvCredentials {
    /// Read from `GRGIT_USER` / `GRGIT_PASS`.
    pub fn new() -> Self {
        Self::with_vars(ENV_USER, ENV_PASS)
    }

    /// Read from custom variable names.
    pub fn with_vars(user_var: impl Into<String>, pass_var: impl Into<String>) -> Self {
        Self {
            user_var: user_var.into(),
            pass_var: pass_var.into(),
        }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Option<Credentials> {
        let username = std::env::var(&self.user_var).ok()?;
        if username.is_empty() {
            return None;
        }
        let password = std::env::var(&self.pass_var).ok().filter(|p| !p.is_empty());
        Some(Credentials::new(username, password))
    }
}

/// Fixed in-memory credentials, for hosts that resolve credentials themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<Credentials>);

impl StaticCredentials {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self(credentials)
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Option<Credentials> {
        self.0.clone()
    }
}

/// Credentials from an explicit variable map, for hosts that pass an
/// environment snapshot instead of the process environment.
#[derive(Debug, Clone, Default)]
pub struct MapCredentials {
    vars: HashMap<String, String>,
}

impl MapCredentials {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl CredentialSource for MapCredentials {
    fn credentials(&self) -> Option<Credentials> {
        let username = self.vars.get(ENV_USER).filter(|u| !u.is_empty())?;
        let password = self.vars.get(ENV_PASS).filter(|p| !p.is_empty()).cloned();
        Some(Credentials::new(username.clone(), password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_password() {
        let creds = Credentials::new("bot", Some("hunter2".into()));
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("bot"));
    }

    #[test]
    fn validate_rejects_blank_fields() {
        assert!(Credentials::new("", None).validate().is_err());
        assert!(Credentials::new("  ", None).validate().is_err());
        assert!(Credentials::new("bot", Some(String::new())).validate().is_err());
        assert!(Credentials::new("bot", None).validate().is_ok());
        assert!(Credentials::new("bot", Some("t".into())).validate().is_ok());
    }

    #[test]
    fn map_source_reads_standard_names() {
        let mut vars = HashMap::new();
        vars.insert(ENV_USER.to_string(), "bot".to_string());
        vars.insert(ENV_PASS.to_string(), "token".to_string());
        let creds = MapCredentials::new(vars).credentials().unwrap();
        assert_eq!(creds.username, "bot");
        assert_eq!(creds.password.as_deref(), Some("token"));
    }

    #[test]
    fn map_source_without_user_is_none() {
        let mut vars = HashMap::new();
        vars.insert(ENV_PASS.to_string(), "token".to_string());
        assert!(MapCredentials::new(vars).credentials().is_none());
    }

    #[test]
    fn env_source_with_unset_vars_is_none() {
        let source = EnvCredentials::with_vars(
            "GRGIT_TEST_SURELY_UNSET_USER",
            "GRGIT_TEST_SURELY_UNSET_PASS",
        );
        assert!(source.credentials().is_none());
    }

    #[test]
    fn static_source_returns_clone() {
        let source = StaticCredentials::new(Some(Credentials::new("bot", None)));
        assert_eq!(source.credentials().unwrap().username, "bot");
    }
}
