//! Workspace store: lifecycle operations over a store root.
//!
//! A store root is a flat directory whose immediate children are workspaces.
//! A directory is a workspace iff it contains the `.workshed.json` sidecar;
//! anything else under the root is ignored by `list` and flagged by `doctor`.
//!
//! [`WorkspaceStore`] is the seam between the CLI and persistence. The real
//! implementation is [`fs::FsWorkspaceStore`]; [`memory::MemoryWorkspaceStore`]
//! backs tests that exercise lifecycle invariants without touching disk or
//! git.

use std::path::{Path, PathBuf};

use crate::error::{Result, WorkshedError};
use crate::model::{DATA_DIR, SIDECAR_FILE, Workspace};

pub mod fs;
pub mod memory;
pub mod repos;

pub use fs::FsWorkspaceStore;
pub use memory::MemoryWorkspaceStore;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One repository to attach, as the user described it.
#[derive(Clone, Debug, Default)]
pub struct RepoSpec {
    /// Remote URL or local path, verbatim from the command line.
    pub source: String,
    /// Explicit name. `None` derives one from the source.
    pub name: Option<String>,
    /// Branch or tag to clone. `None` means default branch.
    pub git_ref: Option<String>,
    /// Shallow-clone depth. Zero means full history.
    pub depth: u32,
}

#[derive(Clone, Debug, Default)]
pub struct CreateRequest {
    pub purpose: String,
    /// Explicit handle. `None` generates one.
    pub handle: Option<String>,
    pub repos: Vec<RepoSpec>,
    /// Directory whose contents seed the new workspace.
    pub template: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

pub trait WorkspaceStore {
    /// Create a workspace. All inputs validate before any side effect;
    /// on failure the store is exactly as it was.
    fn create(&self, request: CreateRequest) -> Result<Workspace>;

    fn get(&self, handle: &str) -> Result<Workspace>;

    /// Workspaces sorted oldest-first. `filter` is a case-insensitive
    /// substring match over purpose and repository names.
    fn list(&self, filter: Option<&str>) -> Result<Vec<Workspace>>;

    /// Delete a workspace and everything under it.
    fn remove(&self, handle: &str) -> Result<()>;

    fn update_purpose(&self, handle: &str, purpose: &str) -> Result<Workspace>;

    /// Where this workspace lives (or would live) on disk.
    fn path(&self, handle: &str) -> PathBuf;
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

pub fn workspace_dir(root: &Path, handle: &str) -> PathBuf {
    root.join(handle)
}

pub fn sidecar_path(workspace: &Path) -> PathBuf {
    workspace.join(SIDECAR_FILE)
}

pub fn data_dir(workspace: &Path) -> PathBuf {
    workspace.join(DATA_DIR)
}

pub fn captures_dir(workspace: &Path) -> PathBuf {
    data_dir(workspace).join("captures")
}

pub fn executions_dir(workspace: &Path) -> PathBuf {
    data_dir(workspace).join("executions")
}

// ---------------------------------------------------------------------------
// Shared validation and queries
// ---------------------------------------------------------------------------

/// Purpose is required and human-authored; surrounding whitespace is noise.
pub fn validate_purpose(purpose: &str) -> Result<&str> {
    let trimmed = purpose.trim();
    if trimmed.is_empty() {
        return Err(WorkshedError::validation("purpose must not be empty"));
    }
    Ok(trimmed)
}

pub(crate) fn matches_filter(ws: &Workspace, filter: &str) -> bool {
    let needle = filter.to_lowercase();
    if ws.purpose.to_lowercase().contains(&needle) {
        return true;
    }
    ws.repositories.iter().any(|r| r.name.to_lowercase().contains(&needle))
}

pub(crate) fn sort_workspaces(workspaces: &mut [Workspace]) {
    workspaces.sort_by(|a, b| {
        a.created_at.cmp(&b.created_at).then_with(|| a.handle.cmp(&b.handle))
    });
}

/// Walk from `start` toward the filesystem root until a directory carrying
/// the sidecar is found. Returns the workspace directory and its metadata.
pub fn find_enclosing(start: &Path) -> Result<(PathBuf, Workspace)> {
    for dir in start.ancestors() {
        let sidecar = sidecar_path(dir);
        if sidecar.is_file() {
            let ws: Workspace = crate::model::read_file(&sidecar)?;
            return Ok((dir.to_path_buf(), ws));
        }
    }
    Err(WorkshedError::NoEnclosingWorkspace { path: start.to_path_buf() })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
