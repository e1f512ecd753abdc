//! Store configuration (`config.toml`).
//!
//! The store root may carry an optional `config.toml` tuning clone and exec
//! behaviour. Missing file means all defaults; unknown fields are rejected so
//! typos fail loudly instead of silently doing nothing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::deadline::Deadline;

/// Environment variable consulted for the store root when `--root` is absent.
pub const ROOT_ENV: &str = "WORKSHED_ROOT";

/// Name of the optional config file directly under the store root.
pub const CONFIG_FILE: &str = "config.toml";

/// Fallback store root: `~/workshed`.
pub fn default_root() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().map(|home| home.join("workshed")).ok_or_else(|| ConfigError {
        path: None,
        message: format!("cannot determine home directory; set --root or {ROOT_ENV}"),
    })
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Settings read from `<root>/config.toml`. Missing file → all defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct WorkshedConfig {
    #[serde(default)]
    pub clone: CloneConfig,

    #[serde(default)]
    pub exec: ExecConfig,
}

// ---------------------------------------------------------------------------
// CloneConfig
// ---------------------------------------------------------------------------

/// Clone behaviour for `create` and `repo add`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloneConfig {
    /// Per-repository clone budget in seconds. A batch of N repositories
    /// shares an N× budget. Zero disables the deadline.
    #[serde(default = "default_clone_timeout")]
    pub timeout_seconds: u64,

    /// Default shallow-clone depth when the CLI does not pass one.
    /// Zero means full history.
    #[serde(default)]
    pub depth: u32,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self { timeout_seconds: default_clone_timeout(), depth: 0 }
    }
}

const fn default_clone_timeout() -> u64 {
    300
}

impl CloneConfig {
    /// Shared deadline for cloning `repo_count` repositories.
    pub fn deadline(&self, repo_count: usize) -> Deadline {
        Deadline::per_item(Duration::from_secs(self.timeout_seconds), repo_count)
    }
}

// ---------------------------------------------------------------------------
// ExecConfig
// ---------------------------------------------------------------------------

/// Exec behaviour defaults; CLI flags override per invocation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ExecConfig {
    /// Per-command timeout in seconds. Zero means no timeout.
    #[serde(default)]
    pub timeout_seconds: u64,

    /// Run across repositories in parallel by default.
    #[serde(default)]
    pub parallel: bool,
}

impl ExecConfig {
    pub fn deadline(&self) -> Deadline {
        if self.timeout_seconds == 0 {
            Deadline::none()
        } else {
            Deadline::after(Duration::from_secs(self.timeout_seconds))
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a workshed configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl WorkshedConfig {
    /// Load the config that applies to a store root.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse
    /// errors; a missing file is all defaults.
    pub fn load_for_root(root: &Path) -> Result<Self, ConfigError> {
        Self::load(&root.join(CONFIG_FILE))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                // Calculate line number from byte offset.
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
