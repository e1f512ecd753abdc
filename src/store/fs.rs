//! Filesystem-backed workspace store.
//!
//! The store root is the single source of truth: a workspace exists iff its
//! directory and sidecar both exist. Creation assembles the entire workspace
//! (sidecar, template contents, clones) in a dot-prefixed staging directory
//! next to its final location and publishes it with one `rename`, so a crash
//! or failed clone can never leave a half-built workspace in the root.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::config::WorkshedConfig;
use crate::error::{Result, WorkshedError};
use crate::git::GitCli;
use crate::handle;
use crate::model::{self, Workspace};
use crate::store::repos::{PlannedRepo, clone_into, plan_additions};
use crate::store::{
    CreateRequest, WorkspaceStore, matches_filter, sidecar_path, sort_workspaces, workspace_dir,
};

pub struct FsWorkspaceStore {
    root: PathBuf,
    config: WorkshedConfig,
    git: GitCli,
}

impl FsWorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, WorkshedConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: WorkshedConfig) -> Self {
        Self { root: root.into(), config, git: GitCli::new() }
    }

    /// Open a store root, honoring its `config.toml` if present.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = WorkshedConfig::load_for_root(&root)?;
        Ok(Self::with_config(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkshedConfig {
        &self.config
    }

    pub fn git(&self) -> &GitCli {
        &self.git
    }

    /// Specs that did not ask for a depth inherit the configured default.
    pub(crate) fn apply_depth_default(&self, planned: &mut [PlannedRepo]) {
        for repo in planned {
            if repo.depth == 0 {
                repo.depth = self.config.clone.depth;
            }
        }
    }

    fn read_workspace(&self, handle: &str) -> Result<Workspace> {
        let dir = workspace_dir(&self.root, handle);
        let sidecar = sidecar_path(&dir);
        if !dir.is_dir() || !sidecar.is_file() {
            return Err(WorkshedError::WorkspaceNotFound { handle: handle.to_string() });
        }
        model::read_file(&sidecar)
    }
}

impl WorkspaceStore for FsWorkspaceStore {
    #[instrument(skip_all, fields(purpose = %request.purpose))]
    fn create(&self, request: CreateRequest) -> Result<Workspace> {
        let purpose = crate::store::validate_purpose(&request.purpose)?.to_string();

        let cwd = std::env::current_dir().map_err(|e| WorkshedError::io(".", e))?;
        let mut planned = plan_additions(&[], &request.repos, &cwd)?;
        self.apply_depth_default(&mut planned);

        let template = match &request.template {
            Some(dir) => {
                let dir = if dir.is_relative() { cwd.join(dir) } else { dir.clone() };
                if !dir.is_dir() {
                    return Err(WorkshedError::validation(format!(
                        "template directory {} does not exist",
                        dir.display()
                    )));
                }
                Some(dir)
            }
            None => None,
        };

        if let Some(explicit) = &request.handle {
            handle::validate(explicit)?;
            if workspace_dir(&self.root, explicit).exists() {
                return Err(WorkshedError::validation(format!(
                    "workspace '{explicit}' already exists"
                )));
            }
        }

        std::fs::create_dir_all(&self.root).map_err(|e| WorkshedError::io(&self.root, e))?;
        let handle = request
            .handle
            .clone()
            .unwrap_or_else(|| handle::generate(|h| workspace_dir(&self.root, h).exists()));

        // Everything below happens in staging; the workspace only becomes
        // visible at the rename. On any error the TempDir drop removes it.
        let staging = tempfile::Builder::new()
            .prefix(".ws-")
            .tempdir_in(&self.root)
            .map_err(|e| WorkshedError::io(&self.root, e))?;

        if let Some(template) = &template {
            copy_tree(template, staging.path())?;
        }
        for repo in &planned {
            if staging.path().join(&repo.name).exists() {
                return Err(WorkshedError::validation(format!(
                    "template already provides an entry named '{}'",
                    repo.name
                )));
            }
        }

        let deadline = self.config.clone.deadline(planned.len());
        for repo in &planned {
            clone_into(&self.git, repo, staging.path(), deadline)?;
        }

        let mut ws = Workspace::new(handle.clone(), purpose);
        ws.repositories = planned.into_iter().map(PlannedRepo::into_repository).collect();
        model::write_file(&sidecar_path(staging.path()), &ws)?;

        let final_dir = workspace_dir(&self.root, &handle);
        if final_dir.exists() {
            return Err(WorkshedError::validation(format!(
                "workspace '{handle}' already exists"
            )));
        }
        let staged = staging.keep();
        if let Err(e) = std::fs::rename(&staged, &final_dir) {
            let _ = std::fs::remove_dir_all(&staged);
            return Err(WorkshedError::io(&final_dir, e));
        }

        info!(handle = %ws.handle, repos = ws.repositories.len(), "workspace created");
        Ok(ws)
    }

    fn get(&self, handle: &str) -> Result<Workspace> {
        self.read_workspace(handle)
    }

    fn list(&self, filter: Option<&str>) -> Result<Vec<Workspace>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkshedError::io(&self.root, e)),
        };

        let mut workspaces = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WorkshedError::io(&self.root, e))?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let dir = entry.path();
            if !dir.is_dir() || !sidecar_path(&dir).is_file() {
                continue;
            }
            match model::read_file::<Workspace>(&sidecar_path(&dir)) {
                Ok(ws) => workspaces.push(ws),
                // One broken sidecar must not hide the rest of the store.
                Err(e) => warn!(dir = %dir.display(), error = %e, "skipping unreadable sidecar"),
            }
        }

        if let Some(filter) = filter {
            workspaces.retain(|ws| matches_filter(ws, filter));
        }
        sort_workspaces(&mut workspaces);
        Ok(workspaces)
    }

    #[instrument(skip_all, fields(handle))]
    fn remove(&self, handle: &str) -> Result<()> {
        self.read_workspace(handle)?;
        let dir = workspace_dir(&self.root, handle);
        std::fs::remove_dir_all(&dir).map_err(|e| WorkshedError::io(&dir, e))?;
        info!(handle, "workspace removed");
        Ok(())
    }

    fn update_purpose(&self, handle: &str, purpose: &str) -> Result<Workspace> {
        let purpose = crate::store::validate_purpose(purpose)?;
        let mut ws = self.read_workspace(handle)?;
        ws.purpose = purpose.to_string();
        model::write_file(&sidecar_path(&workspace_dir(&self.root, handle)), &ws)?;
        Ok(ws)
    }

    fn path(&self, handle: &str) -> PathBuf {
        workspace_dir(&self.root, handle)
    }
}

/// Recursive copy for template directories. Symlinked files are followed and
/// copied as regular files.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| WorkshedError::io(dst, e))?;
    for entry in std::fs::read_dir(src).map_err(|e| WorkshedError::io(src, e))? {
        let entry = entry.map_err(|e| WorkshedError::io(src, e))?;
        let source = entry.path();
        let target = dst.join(entry.file_name());
        if source.is_dir() {
            copy_tree(&source, &target)?;
        } else {
            std::fs::copy(&source, &target).map_err(|e| WorkshedError::io(&source, e))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
