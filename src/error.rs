//! Error types shared across the workshed library.
//!
//! Library code returns the typed [`WorkshedError`] so callers can match on
//! failure cases. CLI code converts these into `anyhow` reports at the edge
//! and relies on each variant's Display text, which states what went wrong
//! and, where there is an obvious next step, how to fix it.

use std::path::PathBuf;

use thiserror::Error;

use crate::capture::PreflightReport;
use crate::git::GitError;

pub type Result<T, E = WorkshedError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum WorkshedError {
    /// Caller-supplied input failed validation before any side effect.
    #[error("{message}")]
    Validation { message: String },

    #[error("workspace '{handle}' not found\n\nTo fix: run `workshed list` to see existing workspaces")]
    WorkspaceNotFound { handle: String },

    #[error("no workspace found enclosing {path}\n\nTo fix: run this command inside a workspace directory, or pass a handle explicitly")]
    NoEnclosingWorkspace { path: PathBuf },

    #[error("capture '{id}' not found in workspace '{handle}'\n\nTo fix: run `workshed capture list {handle}` to see recorded captures")]
    CaptureNotFound { handle: String, id: String },

    #[error("repository '{name}' is not part of workspace '{handle}'")]
    RepositoryNotFound { handle: String, name: String },

    #[error("repository URL already present in workspace: {url}")]
    DuplicateUrl { url: String },

    #[error("repository name already taken in workspace: {name}\n\nTo fix: pass an explicit name with `--name` to disambiguate")]
    DuplicateName { name: String },

    // Field is named `source_text` (not `source`) because thiserror treats a
    // field named `source` as the `Error::source()` cause, which `String`
    // cannot be.
    #[error("cannot add repository from '{source_text}': {reason}")]
    InvalidSource { source_text: String, reason: String },

    #[error("failed to clone {url}: {source}")]
    CloneFailed { url: String, source: GitError },

    #[error(transparent)]
    Git(#[from] GitError),

    /// Sidecar metadata was written by a newer workshed than this one.
    #[error(
        "metadata schema version {found} is newer than supported version {supported}\n\nTo fix: upgrade workshed, then retry"
    )]
    SchemaVersion { found: u32, supported: u32 },

    #[error("malformed metadata at {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("apply blocked by preflight: {} issue(s) found", .report.issues.len())]
    PreflightFailed { report: PreflightReport },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkshedError {
    /// Attach a path to a raw I/O error. Filesystem failures without a path
    /// are nearly undebuggable, so every `fs` call in the library goes
    /// through this.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
