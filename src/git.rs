//! Thin wrapper around the `git` binary.
//!
//! Every interaction with git goes through [`GitCli`] as a subprocess call.
//! No libgit2 bindings: the system git honors the user's config, credential
//! helpers, and transport setup, which matter for clones. Failures carry the
//! command line, captured stderr, and a [`GitFailureKind`] classified from
//! stderr so callers can react without string-matching themselves.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::deadline::Deadline;

/// How often a deadline-bounded subprocess is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exceeded its time budget and was killed")]
    Timeout { command: String },

    #[error("`{command}` failed ({kind}): {stderr}")]
    Command {
        command: String,
        kind: GitFailureKind,
        stderr: String,
        exit_code: Option<i32>,
    },
}

impl GitError {
    pub fn kind(&self) -> GitFailureKind {
        match self {
            Self::Command { kind, .. } => *kind,
            Self::Io { .. } | Self::Timeout { .. } => GitFailureKind::Other,
        }
    }
}

/// Coarse cause of a failed git command, derived from stderr.
///
/// The mapping is a first-match-wins substring table over lowercased stderr.
/// `Other` is the explicit fallback, never a parse error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GitFailureKind {
    RepositoryNotFound,
    AuthenticationFailed,
    NetworkError,
    RefNotFound,
    Other,
}

/// Ordering matters: hosting providers print "repository not found" together
/// with the generic "could not read from remote repository", so repository
/// needles sit above the auth block.
const STDERR_CLASSES: &[(&str, GitFailureKind)] = &[
    ("repository not found", GitFailureKind::RepositoryNotFound),
    ("does not appear to be a git repository", GitFailureKind::RepositoryNotFound),
    ("not a git repository", GitFailureKind::RepositoryNotFound),
    ("does not exist", GitFailureKind::RepositoryNotFound),
    ("couldn't find remote ref", GitFailureKind::RefNotFound),
    ("not found in upstream", GitFailureKind::RefNotFound),
    ("unknown revision or path not in the working tree", GitFailureKind::RefNotFound),
    ("did not match any file(s) known to git", GitFailureKind::RefNotFound),
    ("invalid reference", GitFailureKind::RefNotFound),
    ("authentication failed", GitFailureKind::AuthenticationFailed),
    ("permission denied", GitFailureKind::AuthenticationFailed),
    ("access denied", GitFailureKind::AuthenticationFailed),
    ("could not read username", GitFailureKind::AuthenticationFailed),
    ("could not read password", GitFailureKind::AuthenticationFailed),
    ("invalid credentials", GitFailureKind::AuthenticationFailed),
    (
        "support for password authentication was removed",
        GitFailureKind::AuthenticationFailed,
    ),
    ("could not read from remote repository", GitFailureKind::AuthenticationFailed),
    ("could not resolve host", GitFailureKind::NetworkError),
    ("connection refused", GitFailureKind::NetworkError),
    ("connection timed out", GitFailureKind::NetworkError),
    ("connection reset", GitFailureKind::NetworkError),
    ("network is unreachable", GitFailureKind::NetworkError),
    ("failed to connect", GitFailureKind::NetworkError),
    ("operation timed out", GitFailureKind::NetworkError),
    ("early eof", GitFailureKind::NetworkError),
    ("remote end hung up unexpectedly", GitFailureKind::NetworkError),
];

impl GitFailureKind {
    pub fn classify(stderr: &str) -> Self {
        let haystack = stderr.to_lowercase();
        STDERR_CLASSES
            .iter()
            .find(|(needle, _)| haystack.contains(needle))
            .map_or(Self::Other, |(_, kind)| *kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepositoryNotFound => "repository_not_found",
            Self::AuthenticationFailed => "authentication_failed",
            Self::NetworkError => "network_error",
            Self::RefNotFound => "ref_not_found",
            Self::Other => "other",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Self::RepositoryNotFound => "check the URL and that the repository exists",
            Self::AuthenticationFailed => {
                "check your credentials (ssh-agent, token, or credential helper)"
            }
            Self::NetworkError => "check your network connection and proxy settings",
            Self::RefNotFound => "check that the branch or tag exists on the remote",
            Self::Other => "inspect the git output above",
        }
    }
}

impl std::fmt::Display for GitFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GitCli
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    pub fn version(&self) -> Result<String, GitError> {
        let output = self.run_checked(None, &["--version"], Deadline::none())?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Clone `url` into `dest`. `reference` selects a branch or tag at clone
    /// time, `depth` produces a shallow clone. Interactive prompts are
    /// disabled so a credential-less clone fails fast instead of hanging on
    /// a password read.
    #[instrument(skip_all, fields(url, dest = %dest.display()))]
    pub fn clone_repo(
        &self,
        url: &str,
        reference: Option<&str>,
        depth: Option<u32>,
        dest: &Path,
        deadline: Deadline,
    ) -> Result<(), GitError> {
        let depth_arg = depth.map(|d| d.to_string());
        let mut args = vec!["clone"];
        if let Some(depth) = depth_arg.as_deref() {
            args.push("--depth");
            args.push(depth);
        }
        if let Some(reference) = reference {
            args.push("--branch");
            args.push(reference);
        }
        args.push("--");
        args.push(url);
        let dest = dest.to_string_lossy();
        args.push(&dest);
        self.run_checked(None, &args, deadline)?;
        Ok(())
    }

    /// Whether `dir` is inside a git work tree. Missing directories and
    /// non-repos both answer no.
    pub fn is_work_tree(&self, dir: &Path) -> bool {
        if !dir.is_dir() {
            return false;
        }
        self.run(Some(dir), &["rev-parse", "--is-inside-work-tree"], Deadline::none())
            .map(|output| {
                output.status.success()
                    && String::from_utf8_lossy(&output.stdout).trim() == "true"
            })
            .unwrap_or(false)
    }

    pub fn status_porcelain(&self, dir: &Path) -> Result<String, GitError> {
        let output =
            self.run_checked(Some(dir), &["status", "--porcelain"], Deadline::none())?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Dirty means any uncommitted change: staged, unstaged, or untracked.
    pub fn is_dirty(&self, dir: &Path) -> Result<bool, GitError> {
        Ok(!self.status_porcelain(dir)?.trim().is_empty())
    }

    pub fn head_commit(&self, dir: &Path) -> Result<String, GitError> {
        let output = self.run_checked(Some(dir), &["rev-parse", "HEAD"], Deadline::none())?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Current branch name, or `None` when HEAD is detached.
    pub fn current_branch(&self, dir: &Path) -> Result<Option<String>, GitError> {
        let output =
            self.run_checked(Some(dir), &["rev-parse", "--abbrev-ref", "HEAD"], Deadline::none())?;
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name == "HEAD" { Ok(None) } else { Ok(Some(name)) }
    }

    /// Whether `commit` resolves to a commit object in `dir`. A non-zero
    /// exit from `cat-file -e` is the normal "no" answer, not an error.
    pub fn commit_exists(&self, dir: &Path, commit: &str) -> Result<bool, GitError> {
        let spec = format!("{commit}^{{commit}}");
        let output =
            self.run(Some(dir), &["cat-file", "-e", &spec], Deadline::none())?;
        Ok(output.status.success())
    }

    pub fn checkout_detached(&self, dir: &Path, commit: &str) -> Result<(), GitError> {
        self.run_checked(Some(dir), &["checkout", "--detach", commit], Deadline::none())?;
        Ok(())
    }

    // -- process plumbing ---------------------------------------------------

    fn command(&self, cwd: Option<&Path>, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args);
        // Never let a subprocess stop to ask for a password.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Run git and fail on a non-zero exit, classifying stderr.
    fn run_checked(
        &self,
        cwd: Option<&Path>,
        args: &[&str],
        deadline: Deadline,
    ) -> Result<Output, GitError> {
        let output = self.run(cwd, args, deadline)?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let kind = GitFailureKind::classify(&stderr);
        debug!(kind = %kind, exit = ?output.status.code(), "git command failed");
        Err(GitError::Command {
            command: render_command(args),
            kind,
            stderr,
            exit_code: output.status.code(),
        })
    }

    /// Run git and report the raw output regardless of exit status.
    ///
    /// Without a deadline this blocks on [`Command::output`]. With one, the
    /// child is spawned with piped stdio, drained on reader threads (a full
    /// pipe would deadlock the poll loop), and polled until it exits or the
    /// budget runs out, at which point it is killed.
    fn run(
        &self,
        cwd: Option<&Path>,
        args: &[&str],
        deadline: Deadline,
    ) -> Result<Output, GitError> {
        let command = render_command(args);
        let mut cmd = self.command(cwd, args);

        if deadline.remaining().is_none() {
            return cmd
                .stdin(Stdio::null())
                .output()
                .map_err(|source| GitError::Io { command, source });
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GitError::Io { command: command.clone(), source })?;

        let mut stdout_pipe = child.stdout.take().expect("stdout is piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr is piped");
        let stdout_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    let _ = child.kill();
                    return Err(GitError::Io { command, source });
                }
            }
            if deadline.expired() {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_reader.join();
                let _ = stderr_reader.join();
                return Err(GitError::Timeout { command });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        Ok(Output { status, stdout, stderr })
    }
}

fn render_command(args: &[&str]) -> String {
    let mut rendered = String::from("git");
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
