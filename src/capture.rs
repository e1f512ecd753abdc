//! Point-in-time capture and restore of workspace git state.
//!
//! A capture records, for every repository in the workspace, the HEAD commit,
//! the checked-out branch, and whether the tree was dirty. Captures are
//! all-or-nothing: if any repository cannot be read, nothing is written.
//!
//! Restore is two-phase. `preflight_apply` is read-only and reports every
//! reason an apply would fail; `apply_capture` re-runs that same preflight
//! internally and refuses on any issue, so there is no code path that checks
//! out with a dirty tree or a missing commit. Applying checks out recorded
//! commits detached; it does not recreate branches or uncommitted edits.

use serde::Serialize;
use tracing::{info, instrument, warn};
use ulid::Ulid;

use crate::error::{Result, WorkshedError};
use crate::model::{Capture, CaptureKind, GitRef};
use crate::store::fs::FsWorkspaceStore;
use crate::store::{WorkspaceStore as _, captures_dir};

/// Caller-supplied capture metadata; everything is optional.
#[derive(Clone, Debug, Default)]
pub struct CaptureOptions {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub kind: Option<CaptureKind>,
    pub source_execution_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Record the current git state of every repository in the workspace.
///
/// Dirty repositories capture fine (the flag is recorded); a repository whose
/// directory is gone or not a git work tree aborts the whole capture.
#[instrument(skip_all, fields(handle))]
pub fn capture_state(
    store: &FsWorkspaceStore,
    handle: &str,
    opts: CaptureOptions,
) -> Result<Capture> {
    let ws = store.get(handle)?;
    let ws_dir = store.path(handle);
    let git = store.git();

    let mut git_state = Vec::with_capacity(ws.repositories.len());
    for repo in &ws.repositories {
        let dir = ws_dir.join(&repo.name);
        if !git.is_work_tree(&dir) {
            return Err(WorkshedError::validation(format!(
                "repository '{}' is missing or not a git repository; nothing was captured",
                repo.name
            )));
        }
        git_state.push(GitRef {
            repository: repo.name.clone(),
            commit_hash: git.head_commit(&dir)?,
            branch: git.current_branch(&dir)?,
            dirty: git.is_dirty(&dir)?,
        });
    }

    let capture = Capture {
        id: Ulid::new().to_string(),
        name: opts.name,
        description: opts.description,
        tags: opts.tags,
        kind: opts.kind.unwrap_or(CaptureKind::Manual),
        created_at: chrono::Utc::now(),
        git_state,
        source_execution_id: opts.source_execution_id,
    };

    let dir = captures_dir(&ws_dir).join(&capture.id);
    std::fs::create_dir_all(&dir).map_err(|e| WorkshedError::io(&dir, e))?;
    crate::model::write_file(&dir.join("capture.json"), &capture)?;
    info!(handle, id = %capture.id, repos = capture.git_state.len(), "capture written");
    Ok(capture)
}

/// All captures of a workspace, most recent first.
pub fn list_captures(store: &FsWorkspaceStore, handle: &str) -> Result<Vec<Capture>> {
    store.get(handle)?;
    let dir = captures_dir(&store.path(handle));
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WorkshedError::io(&dir, e)),
    };

    let mut captures = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| WorkshedError::io(&dir, e))?;
        let file = entry.path().join("capture.json");
        if !file.is_file() {
            continue;
        }
        match crate::model::read_file::<Capture>(&file) {
            Ok(capture) => captures.push(capture),
            Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable capture"),
        }
    }
    // ULIDs sort by creation time, so reverse id order is newest-first.
    captures.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(captures)
}

/// Look up a capture by full id or unique prefix.
pub fn get_capture(store: &FsWorkspaceStore, handle: &str, id: &str) -> Result<Capture> {
    store.get(handle)?;
    let dir = captures_dir(&store.path(handle));

    let exact = dir.join(id).join("capture.json");
    if exact.is_file() {
        return crate::model::read_file(&exact);
    }

    let mut matches: Vec<Capture> = list_captures(store, handle)?
        .into_iter()
        .filter(|c| c.id.starts_with(id))
        .collect();
    match matches.len() {
        0 => Err(WorkshedError::CaptureNotFound { handle: handle.to_string(), id: id.to_string() }),
        1 => Ok(matches.remove(0)),
        n => Err(WorkshedError::validation(format!(
            "capture id prefix '{id}' is ambiguous ({n} matches); use more characters"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Preflight
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightReason {
    MissingRepository,
    NotAGitRepository,
    DirtyWorkingTree,
    CheckoutFailed,
}

impl PreflightReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingRepository => "missing_repository",
            Self::NotAGitRepository => "not_a_git_repository",
            Self::DirtyWorkingTree => "dirty_working_tree",
            Self::CheckoutFailed => "checkout_failed",
        }
    }
}

impl std::fmt::Display for PreflightReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightIssue {
    pub repository: String,
    pub reason: PreflightReason,
    pub details: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub capture_id: String,
    pub valid: bool,
    pub issues: Vec<PreflightIssue>,
}

impl PreflightReport {
    fn new(capture_id: String, issues: Vec<PreflightIssue>) -> Self {
        Self { capture_id, valid: issues.is_empty(), issues }
    }
}

/// Check whether a capture could be applied right now. Read-only: nothing in
/// the workspace changes, no matter what it finds.
#[instrument(skip_all, fields(handle, id))]
pub fn preflight_apply(
    store: &FsWorkspaceStore,
    handle: &str,
    id: &str,
) -> Result<PreflightReport> {
    let capture = get_capture(store, handle, id)?;
    let ws_dir = store.path(handle);
    let git = store.git();

    let mut issues = Vec::new();
    for git_ref in &capture.git_state {
        let dir = ws_dir.join(&git_ref.repository);
        let issue = |reason, details: String| PreflightIssue {
            repository: git_ref.repository.clone(),
            reason,
            details,
        };

        if !dir.is_dir() {
            issues.push(issue(
                PreflightReason::MissingRepository,
                "repository directory does not exist".to_string(),
            ));
            continue;
        }
        if !git.is_work_tree(&dir) {
            issues.push(issue(
                PreflightReason::NotAGitRepository,
                "directory exists but is not a git work tree".to_string(),
            ));
            continue;
        }

        let dirty_count = git.status_porcelain(&dir)?.lines().count();
        if dirty_count > 0 {
            issues.push(issue(
                PreflightReason::DirtyWorkingTree,
                format!("{dirty_count} uncommitted change(s); commit or stash first"),
            ));
        }
        if !git.commit_exists(&dir, &git_ref.commit_hash)? {
            issues.push(issue(
                PreflightReason::CheckoutFailed,
                format!(
                    "commit {} is not present locally (rewritten history or shallow clone)",
                    git_ref.commit_hash
                ),
            ));
        }
    }

    Ok(PreflightReport::new(capture.id, issues))
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// What `apply_capture` did: the capture that was restored and the
/// automatic checkpoint taken just before.
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
    pub applied: Capture,
    pub checkpoint: Capture,
}

/// Restore the workspace to a captured state.
///
/// Runs the preflight itself and refuses on any issue, so callers cannot
/// bypass it. After the gate passes, a checkpoint capture of the current
/// state is written (the way back), then every recorded commit is checked
/// out detached, in capture order.
#[instrument(skip_all, fields(handle, id))]
pub fn apply_capture(store: &FsWorkspaceStore, handle: &str, id: &str) -> Result<ApplyOutcome> {
    let report = preflight_apply(store, handle, id)?;
    if !report.valid {
        return Err(WorkshedError::PreflightFailed { report });
    }

    let capture = get_capture(store, handle, &report.capture_id)?;
    let checkpoint = capture_state(
        store,
        handle,
        CaptureOptions {
            name: "before-apply".to_string(),
            description: format!("state before applying {}", capture.id),
            kind: Some(CaptureKind::Checkpoint),
            ..CaptureOptions::default()
        },
    )?;

    let ws_dir = store.path(handle);
    let git = store.git();
    for git_ref in &capture.git_state {
        let dir = ws_dir.join(&git_ref.repository);
        git.checkout_detached(&dir, &git_ref.commit_hash)?;
    }

    info!(handle, id = %capture.id, checkpoint = %checkpoint.id, "capture applied");
    Ok(ApplyOutcome { applied: capture, checkpoint })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
