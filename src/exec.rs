//! Command execution across workspace repositories.
//!
//! One command, three target shapes: a single repository, every repository,
//! or the workspace root itself. Sequential mode walks repositories in
//! workspace order and stops at the first non-zero exit; parallel mode runs
//! all of them and merges results, reporting the worst exit code. Either way
//! the run is appended to the workspace's execution history.
//!
//! Child stdio is inherited, so interactive output streams straight through;
//! in parallel mode output from different repositories interleaves.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use ulid::Ulid;

use crate::capture::{CaptureOptions, capture_state};
use crate::deadline::Deadline;
use crate::error::{Result, WorkshedError};
use crate::executions;
use crate::model::{Capture, CaptureKind, ExecutionRecord, RepoResult};
use crate::store::fs::FsWorkspaceStore;
use crate::store::WorkspaceStore as _;

/// Exit code recorded for a command killed by its timeout, matching
/// `timeout(1)`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How often a running child is polled against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error indicating the run finished with a non-zero exit status. The CLI
/// downcasts this to propagate the code as its own exit status.
#[derive(Debug)]
pub struct ExitCodeError(pub i32);

impl std::fmt::Display for ExitCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command exited with code {}", self.0)
    }
}

impl std::error::Error for ExitCodeError {}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum ExecTarget {
    /// Every repository, in workspace order.
    All,
    /// The workspace directory itself.
    Root,
    /// One repository by name.
    Repo(String),
}

impl ExecTarget {
    pub fn label(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Root => "root",
            Self::Repo(name) => name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExecRequest {
    pub target: ExecTarget,
    /// Argv to run; must be non-empty.
    pub command: Vec<String>,
    pub parallel: bool,
    /// Per-invocation budget. `None` means no timeout.
    pub timeout: Option<Duration>,
    /// Take a capture of the resulting state, linked to this execution.
    pub capture_after: bool,
}

/// The appended record and, when requested, the post-run capture.
#[derive(Clone, Debug)]
pub struct ExecOutcome {
    pub record: ExecutionRecord,
    pub capture: Option<Capture>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(handle, target = request.target.label(), parallel = request.parallel))]
pub fn run(store: &FsWorkspaceStore, handle: &str, request: ExecRequest) -> Result<ExecOutcome> {
    if request.command.is_empty() {
        return Err(WorkshedError::validation("no command given; pass one after `--`"));
    }

    let ws = store.get(handle)?;
    let ws_dir = store.path(handle);

    let units: Vec<(String, PathBuf)> = match &request.target {
        ExecTarget::Root => vec![("root".to_string(), ws_dir.clone())],
        ExecTarget::Repo(name) => {
            let repo = ws.repository(name).ok_or_else(|| WorkshedError::RepositoryNotFound {
                handle: handle.to_string(),
                name: name.clone(),
            })?;
            vec![(repo.name.clone(), ws_dir.join(&repo.name))]
        }
        ExecTarget::All => ws
            .repositories
            .iter()
            .map(|r| (r.name.clone(), ws_dir.join(&r.name)))
            .collect(),
    };
    if units.is_empty() {
        return Err(WorkshedError::validation(
            "workspace has no repositories to run in\n\nTo fix: add one with `workshed repo add`, or target the workspace root with `--in root`",
        ));
    }
    for (name, dir) in &units {
        if !dir.is_dir() {
            return Err(WorkshedError::validation(format!(
                "repository '{name}' has no directory on disk; run `workshed doctor`"
            )));
        }
    }

    let id = Ulid::new().to_string();
    let started_at = chrono::Utc::now();

    let results = if request.parallel && units.len() > 1 {
        run_parallel(&units, &request.command, request.timeout)?
    } else {
        run_sequential(&units, &request.command, request.timeout)?
    };

    let exit_code = results.iter().map(|r| r.exit_code).max().unwrap_or(0);
    let record = ExecutionRecord {
        id,
        handle: handle.to_string(),
        target: request.target.label().to_string(),
        command: request.command.clone(),
        started_at,
        completed_at: chrono::Utc::now(),
        exit_code,
        results,
    };
    executions::record(store, handle, &record)?;
    info!(id = %record.id, exit = record.exit_code, "execution finished");

    let capture = if request.capture_after {
        Some(capture_state(
            store,
            handle,
            CaptureOptions {
                name: "after-exec".to_string(),
                description: format!("state after `{}`", record.command.join(" ")),
                kind: Some(CaptureKind::Execution),
                source_execution_id: Some(record.id.clone()),
                ..CaptureOptions::default()
            },
        )?)
    } else {
        None
    };

    Ok(ExecOutcome { record, capture })
}

/// Workspace order, stop at the first failure. Repositories after the stop
/// point never run and have no result entry.
fn run_sequential(
    units: &[(String, PathBuf)],
    command: &[String],
    timeout: Option<Duration>,
) -> Result<Vec<RepoResult>> {
    let mut results = Vec::with_capacity(units.len());
    for (name, dir) in units {
        let result = run_unit(name, dir, command, timeout)?;
        let failed = result.exit_code != 0;
        results.push(result);
        if failed {
            break;
        }
    }
    Ok(results)
}

/// One thread per repository; all run to completion regardless of failures.
/// Results come back in workspace order.
fn run_parallel(
    units: &[(String, PathBuf)],
    command: &[String],
    timeout: Option<Duration>,
) -> Result<Vec<RepoResult>> {
    thread::scope(|scope| {
        let handles: Vec<_> = units
            .iter()
            .map(|(name, dir)| scope.spawn(move || run_unit(name, dir, command, timeout)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("exec thread panicked"))
            .collect()
    })
}

/// Run the command once in `dir`. A missing binary maps to the shell's 127
/// (126 for a permission failure) rather than aborting the whole run, so a
/// tool absent from one repository still yields a per-repository result.
fn run_unit(
    name: &str,
    dir: &Path,
    command: &[String],
    timeout: Option<Duration>,
) -> Result<RepoResult> {
    let start = Instant::now();
    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..]).current_dir(dir);

    let exit_code = match spawn_and_wait(&mut cmd, timeout) {
        Ok(code) => code,
        Err(e) => {
            let code = match e.kind() {
                std::io::ErrorKind::NotFound => 127,
                std::io::ErrorKind::PermissionDenied => 126,
                _ => return Err(WorkshedError::io(dir, e)),
            };
            warn!(repository = name, error = %e, "command could not start");
            code
        }
    };

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(RepoResult { repository: name.to_string(), exit_code, duration_ms })
}

fn spawn_and_wait(cmd: &mut Command, timeout: Option<Duration>) -> std::io::Result<i32> {
    let Some(timeout) = timeout else {
        let status = cmd.status()?;
        return Ok(status.code().unwrap_or(1));
    };

    let deadline = Deadline::after(timeout);
    let mut child = cmd.spawn()?;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status.code().unwrap_or(1));
        }
        if deadline.expired() {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(TIMEOUT_EXIT_CODE);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
