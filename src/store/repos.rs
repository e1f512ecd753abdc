//! Repository attachment and detachment.
//!
//! Sources are resolved and the whole batch validated before the first clone,
//! so a typo in the last argument cannot leave half a batch behind. Clones
//! that do succeed are committed to the sidecar one by one; a later failure
//! keeps the earlier additions.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::deadline::Deadline;
use crate::error::{Result, WorkshedError};
use crate::git::GitCli;
use crate::model::Repository;
use crate::store::fs::FsWorkspaceStore;
use crate::store::{RepoSpec, sidecar_path, workspace_dir};

/// URL schemes git may be asked to fetch from. Anything else is refused
/// before a subprocess is spawned.
pub const ALLOWED_SCHEMES: &[&str] = &["https", "ssh", "git", "file"];

/// A repository spec after resolution and validation, ready to clone.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedRepo {
    pub name: String,
    pub url: String,
    pub git_ref: Option<String>,
    pub depth: u32,
}

impl PlannedRepo {
    pub fn into_repository(self) -> Repository {
        Repository {
            name: self.name,
            url: self.url,
            git_ref: self.git_ref,
            depth: self.depth,
        }
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Resolve and validate a batch of specs against the repositories already in
/// a workspace. No side effects: this is the all-or-nothing gate in front of
/// cloning.
pub fn plan_additions(
    existing: &[Repository],
    specs: &[RepoSpec],
    cwd: &Path,
) -> Result<Vec<PlannedRepo>> {
    let mut planned: Vec<PlannedRepo> = Vec::with_capacity(specs.len());
    for spec in specs {
        let url = resolve_source(&spec.source, cwd)?;
        let name = match &spec.name {
            Some(alias) => alias.clone(),
            None => derive_name(&url)?,
        };
        validate_repo_name(&name)?;

        if existing.iter().any(|r| r.url == url) || planned.iter().any(|p| p.url == url) {
            return Err(WorkshedError::DuplicateUrl { url });
        }
        if existing.iter().any(|r| r.name == name) || planned.iter().any(|p| p.name == name) {
            return Err(WorkshedError::DuplicateName { name });
        }

        planned.push(PlannedRepo {
            name,
            url,
            git_ref: spec.git_ref.clone(),
            depth: spec.depth,
        });
    }
    Ok(planned)
}

/// Turn a user-supplied source into a cloneable URL.
///
/// Three shapes are accepted: a URL with an allow-listed scheme, an scp-like
/// `user@host:path`, or a local directory (relative paths resolve against
/// `cwd` and are stored absolute).
pub fn resolve_source(source: &str, cwd: &Path) -> Result<String> {
    let invalid = |reason: String| WorkshedError::InvalidSource {
        source_text: source.to_string(),
        reason,
    };

    if let Some((scheme, rest)) = source.split_once("://") {
        if !ALLOWED_SCHEMES.contains(&scheme.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "scheme '{scheme}' is not allowed (allowed: {})",
                ALLOWED_SCHEMES.join(", ")
            )));
        }
        if rest.is_empty() {
            return Err(invalid("URL has no host or path".to_string()));
        }
        return Ok(source.to_string());
    }

    if is_scp_like(source) {
        return Ok(source.to_string());
    }

    let path = if Path::new(source).is_relative() {
        cwd.join(source)
    } else {
        PathBuf::from(source)
    };
    if !path.is_dir() {
        return Err(invalid("local path does not exist or is not a directory".to_string()));
    }
    let absolute = std::fs::canonicalize(&path)
        .map_err(|e| invalid(format!("cannot resolve local path: {e}")))?;
    Ok(absolute.to_string_lossy().into_owned())
}

/// `user@host:path` without a scheme, as accepted by git over ssh.
fn is_scp_like(source: &str) -> bool {
    let Some((head, path)) = source.split_once(':') else {
        return false;
    };
    if head.is_empty() || path.is_empty() || head.contains('/') {
        return false;
    }
    match head.split_once('@') {
        Some((user, host)) => !user.is_empty() && !host.is_empty(),
        None => false,
    }
}

/// Default repository name: the last path segment with any `.git` suffix
/// stripped.
pub fn derive_name(url: &str) -> Result<String> {
    let trimmed = url.trim_end_matches('/');
    let tail = match trimmed.rsplit_once('/') {
        Some((_, tail)) => tail,
        // scp-like sources may have no slash at all: git@host:repo.git
        None => trimmed.rsplit_once(':').map_or(trimmed, |(_, tail)| tail),
    };
    let name = tail.strip_suffix(".git").unwrap_or(tail);
    if name.is_empty() {
        return Err(WorkshedError::InvalidSource {
            source_text: url.to_string(),
            reason: "cannot derive a repository name; pass one with --name".to_string(),
        });
    }
    Ok(name.to_string())
}

/// Repository names become directory names inside the workspace, so they must
/// not escape it or shadow the dot-prefixed bookkeeping entries.
pub fn validate_repo_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WorkshedError::validation("repository name must not be empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(WorkshedError::validation(format!(
            "repository name must not contain path separators: '{name}'"
        )));
    }
    if name.starts_with('.') {
        return Err(WorkshedError::validation(format!(
            "repository name must not start with '.': '{name}'"
        )));
    }
    // Execution records address repositories by name next to the literal
    // targets "all" and "root"; a repository with either name would make
    // those records ambiguous.
    if name == "all" || name == "root" {
        return Err(WorkshedError::validation(format!(
            "repository name '{name}' is reserved\n\nTo fix: pass a different name with `--name`"
        )));
    }
    Ok(())
}

/// Clone one planned repository under `dest_root`. A failed or killed clone
/// removes whatever partial directory git left behind.
pub(crate) fn clone_into(
    git: &GitCli,
    planned: &PlannedRepo,
    dest_root: &Path,
    deadline: Deadline,
) -> Result<()> {
    let dest = dest_root.join(&planned.name);
    let depth = (planned.depth > 0).then_some(planned.depth);
    match git.clone_repo(&planned.url, planned.git_ref.as_deref(), depth, &dest, deadline) {
        Ok(()) => Ok(()),
        Err(source) => {
            if dest.exists() {
                let _ = std::fs::remove_dir_all(&dest);
            }
            Err(WorkshedError::CloneFailed { url: planned.url.clone(), source })
        }
    }
}

// ---------------------------------------------------------------------------
// Store operations
// ---------------------------------------------------------------------------

impl FsWorkspaceStore {
    /// Attach repositories to an existing workspace. Returns the entries that
    /// were added, in order.
    #[instrument(skip_all, fields(handle, count = specs.len()))]
    pub fn add_repositories(
        &self,
        handle: &str,
        specs: &[RepoSpec],
        cwd: &Path,
        deadline: Deadline,
    ) -> Result<Vec<Repository>> {
        use crate::store::WorkspaceStore as _;

        let mut ws = self.get(handle)?;
        let mut planned = plan_additions(&ws.repositories, specs, cwd)?;
        self.apply_depth_default(&mut planned);
        let ws_dir = workspace_dir(self.root(), handle);

        // Disk is part of the uniqueness domain: an untracked directory with
        // the same name would make the clone target ambiguous.
        for repo in &planned {
            if ws_dir.join(&repo.name).exists() {
                return Err(WorkshedError::DuplicateName { name: repo.name.clone() });
            }
        }

        let mut added = Vec::with_capacity(planned.len());
        for repo in planned {
            clone_into(self.git(), &repo, &ws_dir, deadline)?;
            let entry = repo.into_repository();
            ws.repositories.push(entry.clone());
            crate::model::write_file(&sidecar_path(&ws_dir), &ws)?;
            info!(handle, name = %entry.name, "repository added");
            added.push(entry);
        }
        Ok(added)
    }

    /// Detach a repository: delete its directory, then its sidecar entry.
    /// Both steps tolerate the piece already being gone, so a crashed or
    /// interrupted removal can simply be re-run.
    #[instrument(skip_all, fields(handle, name))]
    pub fn remove_repository(&self, handle: &str, name: &str) -> Result<()> {
        use crate::store::WorkspaceStore as _;

        let mut ws = self.get(handle)?;
        validate_repo_name(name)?;
        let ws_dir = workspace_dir(self.root(), handle);

        let dir = ws_dir.join(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| WorkshedError::io(&dir, e))?;
        }

        let before = ws.repositories.len();
        ws.repositories.retain(|r| r.name != name);
        if ws.repositories.len() != before {
            crate::model::write_file(&sidecar_path(&ws_dir), &ws)?;
            info!(handle, name, "repository removed");
        } else {
            warn!(handle, name, "repository not in metadata; nothing to drop");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
