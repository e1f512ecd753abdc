use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde::Serialize;

use crate::capture::list_captures;
use crate::executions;
use crate::format::OutputFormat;
use crate::model::{self, Workspace};
use crate::store::{sidecar_path, FsWorkspaceStore, WorkspaceStore as _};

/// A workspace with no executions for this long is flagged as stale.
const STALE_AFTER_DAYS: i64 = 30;

/// Check the store and workspaces for problems
///
/// Read-only. Verifies that git is available, that the store root is
/// usable, and that every workspace's bookkeeping matches what is on
/// disk: unreadable metadata, repositories missing from disk, dirty
/// trees, untracked directories, and stale workspaces.
///
/// Pass a handle to check a single workspace.
#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Workspace handle (default: every workspace in the store)
    pub handle: Option<String>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct DoctorEnvelope {
    checks: Vec<DoctorCheck>,
    all_ok: bool,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<String>,
}

impl DoctorCheck {
    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self { name: name.to_string(), status: "ok".into(), message: message.into(), fix: None }
    }

    fn info(name: &str, message: impl Into<String>) -> Self {
        Self { name: name.to_string(), status: "info".into(), message: message.into(), fix: None }
    }

    fn warn(name: &str, message: impl Into<String>, fix: Option<String>) -> Self {
        Self { name: name.to_string(), status: "warn".into(), message: message.into(), fix }
    }

    fn fail(name: &str, message: impl Into<String>, fix: Option<String>) -> Self {
        Self { name: name.to_string(), status: "fail".into(), message: message.into(), fix }
    }
}

fn print_check(check: &DoctorCheck) {
    let prefix = match check.status.as_str() {
        "ok" => "[OK]",
        "info" => "[INFO]",
        "warn" => "[WARN]",
        "fail" => "[FAIL]",
        _ => "[???]",
    };
    println!("{} {}", prefix, check.message);
    if let Some(fix) = &check.fix {
        println!("       {fix}");
    }
}

pub fn run(store: &FsWorkspaceStore, args: &DoctorArgs) -> Result<()> {
    let mut checks = Vec::new();

    checks.push(check_git(store));
    checks.push(check_root(store.root()));

    match &args.handle {
        Some(handle) => {
            let ws = store.get(handle)?;
            check_workspace(store, &ws, &mut checks);
        }
        None => {
            for entry in readable_workspace_dirs(store.root()) {
                match model::read_file::<Workspace>(&sidecar_path(&entry)) {
                    Ok(ws) => check_workspace(store, &ws, &mut checks),
                    Err(e) => {
                        let name = entry.file_name().unwrap_or_default().to_string_lossy();
                        checks.push(DoctorCheck::fail(
                            "metadata",
                            format!("{name}: sidecar unreadable: {e}"),
                            Some(format!("Fix: restore {} or remove the directory", model::SIDECAR_FILE)),
                        ));
                    }
                }
            }
        }
    }

    let all_ok = checks.iter().all(|c| c.status != "fail");

    match args.format {
        OutputFormat::Json => {
            let envelope = DoctorEnvelope { checks, all_ok };
            println!("{}", args.format.serialize(&envelope)?);
        }
        OutputFormat::Text => {
            println!("workshed doctor");
            println!("===============");
            println!();
            for check in &checks {
                print_check(check);
            }
            println!();
            if all_ok {
                println!("All checks passed!");
            } else {
                println!("Some checks failed. See above for details.");
            }
        }
    }
    Ok(())
}

fn check_git(store: &FsWorkspaceStore) -> DoctorCheck {
    match store.git().version() {
        Ok(version) => DoctorCheck::ok("git", format!("git: {version}")),
        Err(_) => DoctorCheck::fail(
            "git",
            "git: not found",
            Some("Install: https://git-scm.com/downloads".to_string()),
        ),
    }
}

fn check_root(root: &Path) -> DoctorCheck {
    if !root.exists() {
        return DoctorCheck::info(
            "store root",
            format!("store root: {} does not exist yet (created on first use)", root.display()),
        );
    }
    if !root.is_dir() {
        return DoctorCheck::fail(
            "store root",
            format!("store root: {} is not a directory", root.display()),
            Some("Fix: point --root (or WORKSHED_ROOT) somewhere else".to_string()),
        );
    }
    match tempfile::NamedTempFile::new_in(root) {
        Ok(_) => DoctorCheck::ok("store root", format!("store root: {} (writable)", root.display())),
        Err(e) => DoctorCheck::fail(
            "store root",
            format!("store root: {} is not writable: {e}", root.display()),
            None,
        ),
    }
}

/// Workspace dirs under the root, dotted staging dirs excluded. The sidecar
/// check happens at the caller so broken workspaces are reported, not
/// silently skipped like `list` does.
fn readable_workspace_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && !p
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('.'))
                    .unwrap_or(true)
        })
        .collect();
    dirs.sort();
    dirs
}

fn check_workspace(store: &FsWorkspaceStore, ws: &Workspace, checks: &mut Vec<DoctorCheck>) {
    let handle = &ws.handle;
    let ws_dir = store.path(handle);
    let git = store.git();

    // Every metadata repository needs a directory that is a git work tree.
    for repo in &ws.repositories {
        let dir = ws_dir.join(&repo.name);
        if !dir.is_dir() {
            checks.push(DoctorCheck::fail(
                handle,
                format!("{handle}: repository '{}' has no directory (dangling entry)", repo.name),
                Some(format!("Fix: workshed repo remove {} -w {handle}", repo.name)),
            ));
            continue;
        }
        if !git.is_work_tree(&dir) {
            checks.push(DoctorCheck::fail(
                handle,
                format!("{handle}: repository '{}' is not a git work tree", repo.name),
                None,
            ));
            continue;
        }
        match git.is_dirty(&dir) {
            Ok(true) => checks.push(DoctorCheck::warn(
                handle,
                format!("{handle}: repository '{}' has uncommitted changes", repo.name),
                None,
            )),
            Ok(false) => {}
            Err(e) => checks.push(DoctorCheck::warn(
                handle,
                format!("{handle}: repository '{}' status failed: {e}", repo.name),
                None,
            )),
        }
    }

    // Directories on disk that the metadata doesn't know about.
    if let Ok(entries) = std::fs::read_dir(&ws_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            // Dot entries cover the sidecar and the .workshed data dir.
            if !entry.path().is_dir() || name.starts_with('.') {
                continue;
            }
            if ws.repository(&name).is_none() {
                checks.push(DoctorCheck::warn(
                    handle,
                    format!("{handle}: directory '{name}' is not a tracked repository"),
                    None,
                ));
            }
        }
    }

    match list_captures(store, handle) {
        Ok(captures) => checks.push(DoctorCheck::ok(
            handle,
            format!("{handle}: {} capture(s) readable", captures.len()),
        )),
        Err(e) => checks.push(DoctorCheck::warn(handle, format!("{handle}: captures: {e}"), None)),
    }

    match executions::list(store, handle, Some(1)) {
        Ok(records) => match records.first() {
            Some(last) => {
                let age_days = (Utc::now() - last.completed_at).num_days();
                if age_days > STALE_AFTER_DAYS {
                    checks.push(DoctorCheck::warn(
                        handle,
                        format!("{handle}: stale (last execution {age_days} days ago)"),
                        None,
                    ));
                } else {
                    checks.push(DoctorCheck::ok(
                        handle,
                        format!("{handle}: last execution {age_days} day(s) ago"),
                    ));
                }
            }
            None => checks.push(DoctorCheck::info(
                handle,
                format!("{handle}: no executions recorded"),
            )),
        },
        Err(e) => checks.push(DoctorCheck::warn(handle, format!("{handle}: history: {e}"), None)),
    }
}
