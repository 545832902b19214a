//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! grgit has two configuration scopes:
//! - **Global**: User-level settings
//! - **Build**: Settings for one build root (the host build's working directory)
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Build config file (`<root>/.grgit.toml`)
//! 4. Environment (`GRGIT_DIR`, `GRGIT_INIT_IF_NOT_EXISTS`, `GRGIT_REMOTE`)
//!
//! # Default Repository
//!
//! The build's default repository is selected the way the host service
//! parameters describe it:
//! - `current_dir` set: search upward from it for a repository
//! - otherwise `directory` (default: the build root) is opened exactly, and
//!   initialized first when `init_if_not_exists` is true
//!
//! # Example
//!
//! ```no_run
//! use grgit::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("/path/to/build")).unwrap();
//! println!("Remote: {}", config.remote());
//! println!("Default repository: {:?}", config.default_repository());
//! ```

pub mod schema;

pub use schema::{BuildConfig, CredentialsConfig, GlobalConfig};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::credentials::{EnvCredentials, ENV_PASS, ENV_USER};

/// Name of the build-scoped config file inside the build root.
pub const BUILD_CONFIG_FILE: &str = ".grgit.toml";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// How the build's default repository is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositorySelection {
    /// Search upward from this directory
    Discover(PathBuf),
    /// Open this directory exactly, optionally initializing it
    Exact { dir: PathBuf, init_if_missing: bool },
}

/// Values taken from the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
struct EnvOverrides {
    directory: Option<PathBuf>,
    init_if_not_exists: Option<bool>,
    remote: Option<String>,
}

impl EnvOverrides {
    fn read(env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let init_if_not_exists = match env("GRGIT_INIT_IF_NOT_EXISTS") {
            Some(value) => Some(parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "GRGIT_INIT_IF_NOT_EXISTS must be a boolean, got '{value}'"
                ))
            })?),
            None => None,
        };

        Ok(Self {
            directory: env("GRGIT_DIR").filter(|d| !d.is_empty()).map(PathBuf::from),
            init_if_not_exists,
            remote: env("GRGIT_REMOTE").filter(|r| !r.is_empty()),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Merged configuration from all sources.
///
/// Accessor methods apply precedence rules automatically.
#[derive(Debug, Clone)]
pub struct Config {
    /// Build working-directory root
    root_dir: PathBuf,
    pub global: GlobalConfig,
    pub build: BuildConfig,
    env: EnvOverrides,
    global_path: Option<PathBuf>,
    build_path: Option<PathBuf>,
}

impl Config {
    /// Configuration with defaults only, rooted at `root_dir`.
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            global: GlobalConfig::default(),
            build: BuildConfig::default(),
            env: EnvOverrides::default(),
            global_path: None,
            build_path: None,
        }
    }

    /// Load configuration for a build root from the standard locations and
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(root_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(root_dir, &|key| std::env::var(key).ok())
    }

    /// Load configuration using an explicit environment lookup.
    pub fn load_with_env(
        root_dir: &Path,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let (global, global_path) = Self::load_global(env)?;

        let candidate = root_dir.join(BUILD_CONFIG_FILE);
        let (build, build_path) = if candidate.exists() {
            (read_toml::<BuildConfig>(&candidate)?, Some(candidate))
        } else {
            (BuildConfig::default(), None)
        };

        global.validate()?;
        build.validate()?;

        let config = Self {
            root_dir: root_dir.to_path_buf(),
            global,
            build,
            env: EnvOverrides::read(env)?,
            global_path,
            build_path,
        };
        log::debug!(
            "loaded config (global: {:?}, build: {:?})",
            config.global_path,
            config.build_path
        );
        Ok(config)
    }

    /// Load global configuration from standard locations.
    fn load_global(
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<(GlobalConfig, Option<PathBuf>), ConfigError> {
        // 1. Check $GRGIT_CONFIG
        if let Some(path) = env("GRGIT_CONFIG").map(PathBuf::from) {
            if path.exists() {
                return Ok((read_toml(&path)?, Some(path)));
            }
        }

        // 2. Check $XDG_CONFIG_HOME/grgit/config.toml
        if let Some(xdg_home) = env("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("grgit/config.toml");
            if path.exists() {
                return Ok((read_toml(&path)?, Some(path)));
            }
        }

        // 3. Check ~/.grgit/config.toml
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".grgit/config.toml");
            if path.exists() {
                return Ok((read_toml(&path)?, Some(path)));
            }
        }

        Ok((GlobalConfig::default(), None))
    }

    // =========================================================================
    // Builders
    // =========================================================================

    /// Open this directory exactly (relative to the build root).
    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build.directory = Some(dir.into());
        self
    }

    /// Search upward from this directory (relative to the build root).
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build.current_dir = Some(dir.into());
        self
    }

    pub fn with_init_if_not_exists(mut self, init: bool) -> Self {
        self.build.init_if_not_exists = Some(init);
        self
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Build working-directory root.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the remote name.
    ///
    /// Defaults to "origin" if not configured.
    pub fn remote(&self) -> &str {
        self.env
            .remote
            .as_deref()
            .or(self.build.remote.as_deref())
            .or(self.global.remote.as_deref())
            .unwrap_or("origin")
    }

    /// Check if a missing repository should be initialized.
    ///
    /// Defaults to `false`.
    pub fn init_if_not_exists(&self) -> bool {
        self.env
            .init_if_not_exists
            .or(self.build.init_if_not_exists)
            .unwrap_or(false)
    }

    /// How the build's default repository is found.
    pub fn default_repository(&self) -> RepositorySelection {
        if let Some(dir) = &self.env.directory {
            return RepositorySelection::Exact {
                dir: self.resolve(dir),
                init_if_missing: self.init_if_not_exists(),
            };
        }
        if let Some(dir) = &self.build.current_dir {
            return RepositorySelection::Discover(self.resolve(dir));
        }
        let dir = self
            .build
            .directory
            .as_deref()
            .map(|d| self.resolve(d))
            .unwrap_or_else(|| self.root_dir.clone());
        RepositorySelection::Exact {
            dir,
            init_if_missing: self.init_if_not_exists(),
        }
    }

    /// Credential source named by the configuration.
    pub fn credential_source(&self) -> EnvCredentials {
        let names = self.global.credentials.clone().unwrap_or_default();
        EnvCredentials::with_vars(
            names.user_var.unwrap_or_else(|| ENV_USER.to_string()),
            names.pass_var.unwrap_or_else(|| ENV_PASS.to_string()),
        )
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded build config file.
    pub fn build_config_loaded_from(&self) -> Option<&Path> {
        self.build_path.as_deref()
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root_dir.join(dir)
        }
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    /// An environment that points global config lookups at an empty dir.
    fn isolated(temp: &TempDir, extra: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let missing = temp.path().join("no-such-config.toml");
        let mut pairs: Vec<(String, String)> = vec![
            ("GRGIT_CONFIG".into(), missing.to_string_lossy().into_owned()),
            ("XDG_CONFIG_HOME".into(), temp.path().to_string_lossy().into_owned()),
        ];
        pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        move |key| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn defaults_open_the_build_root() {
        let config = Config::with_root("/build");
        assert_eq!(config.remote(), "origin");
        assert!(!config.init_if_not_exists());
        assert_eq!(
            config.default_repository(),
            RepositorySelection::Exact {
                dir: PathBuf::from("/build"),
                init_if_missing: false
            }
        );
    }

    #[test]
    fn build_file_is_loaded() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(BUILD_CONFIG_FILE),
            "directory = \"repo\"\ninit_if_not_exists = true\nremote = \"upstream\"\n",
        )
        .unwrap();

        let config = Config::load_with_env(temp.path(), &isolated(&temp, &[])).unwrap();
        assert_eq!(config.remote(), "upstream");
        assert_eq!(
            config.default_repository(),
            RepositorySelection::Exact {
                dir: temp.path().join("repo"),
                init_if_missing: true
            }
        );
        assert_eq!(
            config.build_config_loaded_from(),
            Some(temp.path().join(BUILD_CONFIG_FILE).as_path())
        );
    }

    #[test]
    fn global_file_from_env_var() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        fs::write(&global, "remote = \"mirror\"\n").unwrap();

        let env = env_of(&[("GRGIT_CONFIG", global.to_str().unwrap())]);
        let config = Config::load_with_env(temp.path(), &env).unwrap();
        assert_eq!(config.remote(), "mirror");
        assert_eq!(config.global_config_loaded_from(), Some(global.as_path()));
    }

    #[test]
    fn env_overrides_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(BUILD_CONFIG_FILE), "remote = \"upstream\"\n").unwrap();

        let env = isolated(
            &temp,
            &[
                ("GRGIT_REMOTE", "fork"),
                ("GRGIT_DIR", "/elsewhere"),
                ("GRGIT_INIT_IF_NOT_EXISTS", "yes"),
            ],
        );
        let config = Config::load_with_env(temp.path(), &env).unwrap();
        assert_eq!(config.remote(), "fork");
        assert_eq!(
            config.default_repository(),
            RepositorySelection::Exact {
                dir: PathBuf::from("/elsewhere"),
                init_if_missing: true
            }
        );
    }

    #[test]
    fn bad_boolean_in_env_fails() {
        let temp = TempDir::new().unwrap();
        let env = isolated(&temp, &[("GRGIT_INIT_IF_NOT_EXISTS", "maybe")]);
        assert!(matches!(
            Config::load_with_env(temp.path(), &env),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn malformed_build_file_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(BUILD_CONFIG_FILE), "directory = [").unwrap();
        assert!(matches!(
            Config::load_with_env(temp.path(), &isolated(&temp, &[])),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn current_dir_selects_discovery() {
        let config = Config::with_root("/build").with_current_dir("sub");
        assert_eq!(
            config.default_repository(),
            RepositorySelection::Discover(PathBuf::from("/build/sub"))
        );
    }

    #[test]
    fn credential_var_names_configurable() {
        let mut config = Config::with_root("/build");
        config.global.credentials = Some(CredentialsConfig {
            user_var: Some("GRGIT_TEST_NEVER_SET_USER".into()),
            pass_var: None,
        });
        use crate::core::credentials::CredentialSource;
        assert!(config.credential_source().credentials().is_none());
    }
}
