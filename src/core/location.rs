//! core::location
//!
//! Canonical repository identity.
//!
//! A [`Location`] is either an absolute local path (working directory, or the
//! repository directory for bare repositories) or a normalized remote URL.
//! Two locations are equal iff they resolve to the same canonical path or URL,
//! which makes `Location` the key of the handle registry.
//!
//! # Canonicalization
//!
//! - Local paths are made absolute and lexically cleaned (`.`/`..` removed).
//!   The longest existing ancestor is then resolved through the filesystem
//!   (symlinks), and the not-yet-existing remainder is appended. A path
//!   therefore keeps its identity across `init`/`clone` creating it.
//! - `file://` URLs become local paths.
//! - Other URLs are parsed and normalized: scheme and host lowercased, default
//!   ports and passwords dropped, trailing `/` removed.
//! - scp-like addresses (`git@host:owner/repo.git`) become `ssh://` URLs.
//!
//! # Example
//!
//! ```
//! use grgit::core::location::Location;
//!
//! let a = Location::parse("HTTPS://Example.com/org/repo.git/").unwrap();
//! let b = Location::parse("https://example.com/org/repo.git").unwrap();
//! assert_eq!(a, b);
//!
//! let scp = Location::parse("git@example.com:org/repo.git").unwrap();
//! assert_eq!(scp.to_string(), "ssh://git@example.com/org/repo.git");
//! ```

use std::path::{Component, Path, PathBuf};

use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors from location resolution.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("invalid repository url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("cannot resolve path '{path}': {source}")]
    Unresolvable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("empty location")]
    Empty,
}

/// Canonical identifier for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Location {
    /// Absolute, canonical local path
    Local(PathBuf),
    /// Normalized remote URL
    Remote(String),
}

impl Location {
    /// Resolve a local path into a canonical location.
    ///
    /// Relative paths are resolved against the process working directory.
    pub fn local(path: impl AsRef<Path>) -> Result<Self, LocationError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(LocationError::Empty);
        }
        let absolute = path
            .absolutize()
            .map_err(|source| LocationError::Unresolvable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Location::Local(canonicalize_existing_prefix(&absolute)?))
    }

    /// Resolve a local path relative to an explicit base directory.
    pub fn local_in(base: &Path, path: impl AsRef<Path>) -> Result<Self, LocationError> {
        let path = path.as_ref();
        if path.is_absolute() {
            Self::local(path)
        } else {
            Self::local(base.join(path))
        }
    }

    /// Normalize a remote URL.
    ///
    /// `file://` URLs resolve to a [`Location::Local`].
    pub fn remote(url: &str) -> Result<Self, LocationError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(LocationError::Empty);
        }

        let candidate = match scp_to_ssh(trimmed) {
            Some(ssh) => ssh,
            None => trimmed.to_string(),
        };

        let mut parsed = Url::parse(&candidate).map_err(|e| LocationError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|()| LocationError::InvalidUrl {
                    url: url.to_string(),
                    message: "not a valid file path".into(),
                })?;
            return Self::local(path);
        }

        // Ignoring the result: setting a password only fails for URLs
        // that cannot carry one, which already have none.
        let _ = parsed.set_password(None);

        let mut normalized = parsed.to_string();
        while normalized.ends_with('/') && !normalized.ends_with("://") {
            normalized.pop();
        }
        Ok(Location::Remote(normalized))
    }

    /// Parse either a URL or a local path.
    ///
    /// Anything with a scheme (`https://`, `ssh://`, `file://`) or in scp-like
    /// form is treated as a URL; everything else as a path.
    pub fn parse(value: &str) -> Result<Self, LocationError> {
        if looks_like_url(value) {
            Self::remote(value)
        } else {
            Self::local(value)
        }
    }

    /// The local path, if this is a local location.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Location::Local(path) => Some(path),
            Location::Remote(_) => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote(_))
    }

    /// The string handed to the engine when this location is a clone source.
    pub fn to_engine_url(&self) -> String {
        match self {
            Location::Local(path) => path.to_string_lossy().into_owned(),
            Location::Remote(url) => url.clone(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Check whether a string should be read as a URL rather than a path.
fn looks_like_url(value: &str) -> bool {
    value.contains("://") || scp_to_ssh(value).is_some()
}

/// Convert `user@host:path` into `ssh://user@host/path`.
///
/// Returns `None` for anything that is not scp-like, including Windows drive
/// paths such as `C:\repo` and paths with a `/` before the colon.
fn scp_to_ssh(value: &str) -> Option<String> {
    if value.contains("://") {
        return None;
    }
    let (host, path) = value.split_once(':')?;
    if host.is_empty() || path.is_empty() || host.contains('/') || host.contains('\\') {
        return None;
    }
    // Single letter hosts are drive letters
    if host.len() == 1 {
        return None;
    }
    let path = path.trim_start_matches('/');
    Some(format!("ssh://{host}/{path}"))
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn canonicalize_existing_prefix(absolute: &Path) -> Result<PathBuf, LocationError> {
    let mut existing = absolute;
    let mut remainder = Vec::new();

    loop {
        if existing.exists() {
            break;
        }
        match (existing.parent(), existing.components().next_back()) {
            (Some(parent), Some(Component::Normal(name))) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute.to_path_buf()),
        }
    }

    let mut resolved =
        std::fs::canonicalize(existing).map_err(|source| LocationError::Unresolvable {
            path: existing.to_path_buf(),
            source,
        })?;
    for name in remainder.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
