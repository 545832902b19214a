//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$GRGIT_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/grgit/config.toml`
//! 3. `~/.grgit/config.toml`
//!
//! # Build Config
//!
//! Located at `<build root>/.grgit.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing so that a bad file fails at
//! load time rather than on the first network call.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// remote = "upstream"
///
/// [credentials]
/// user_var = "CI_GIT_USER"
/// pass_var = "CI_GIT_TOKEN"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default remote name
    pub remote: Option<String>,

    /// Where transport credentials come from
    pub credentials: Option<CredentialsConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_remote(self.remote.as_deref())?;
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        Ok(())
    }
}

/// Build configuration (scoped to one build root).
///
/// Mirrors the parameters a host build passes to the repository service.
///
/// # Example
///
/// ```toml
/// directory = "."
/// init_if_not_exists = true
/// remote = "origin"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Search upward from this directory for a repository
    pub current_dir: Option<PathBuf>,

    /// Open exactly this directory as the repository root
    pub directory: Option<PathBuf>,

    /// Initialize a repository at `directory` when none exists
    pub init_if_not_exists: Option<bool>,

    /// Remote name (overrides global)
    pub remote: Option<String>,
}

impl BuildConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_remote(self.remote.as_deref())?;
        if self.current_dir.is_some() && self.init_if_not_exists == Some(true) {
            return Err(ConfigError::InvalidValue(
                "init_if_not_exists requires `directory`, not `current_dir`".into(),
            ));
        }
        Ok(())
    }
}

/// Names of the environment variables holding credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsConfig {
    pub user_var: Option<String>,
    pub pass_var: Option<String>,
}

impl CredentialsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for var in [&self.user_var, &self.pass_var].into_iter().flatten() {
            if var.is_empty() || var.contains('=') {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid environment variable name '{var}'"
                )));
            }
        }
        Ok(())
    }
}

fn validate_remote(remote: Option<&str>) -> Result<(), ConfigError> {
    match remote {
        Some(r) if r.trim().is_empty() || r.contains(char::is_whitespace) => Err(
            ConfigError::InvalidValue(format!("invalid remote name '{r}'")),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_build_config() {
        let config: BuildConfig = toml::from_str(
            r#"
            directory = "repo"
            init_if_not_exists = true
            "#,
        )
        .unwrap();
        assert_eq!(config.directory, Some(PathBuf::from("repo")));
        assert_eq!(config.init_if_not_exists, Some(true));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<BuildConfig, _> = toml::from_str("trunk = \"main\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn init_with_current_dir_is_invalid() {
        let config = BuildConfig {
            current_dir: Some(PathBuf::from(".")),
            init_if_not_exists: Some(true),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_remote_is_invalid() {
        let config = GlobalConfig {
            remote: Some("  ".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn credentials_var_names_validated() {
        let config = CredentialsConfig {
            user_var: Some("A=B".into()),
            pass_var: None,
        };
        assert!(config.validate().is_err());
    }
}
