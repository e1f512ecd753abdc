//! Shared test helpers for workshed integration tests.
//!
//! All tests use temp directories — no side effects on any real store.
//! Each test gets its own store root via `setup_root()` and clone sources
//! via `source_repo()`.

// Each test binary compiles this module separately and uses a subset.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

/// Fresh, empty store root.
pub fn setup_root() -> TempDir {
    TempDir::new().expect("failed to create temp dir")
}

/// Run a git command in `dir`. Panics on failure.
pub fn git_in(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    assert!(
        out.status.success(),
        "git {} failed in {}:\n{}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&out.stderr)
    );
}

/// Create a git repository with one commit under `parent/name`.
pub fn source_repo(parent: &Path, name: &str) -> PathBuf {
    let dir = parent.join(name);
    std::fs::create_dir_all(&dir).expect("failed to create source dir");
    git_in(&dir, &["init", "--quiet", "-b", "main"]);
    git_in(&dir, &["config", "user.email", "test@example.com"]);
    git_in(&dir, &["config", "user.name", "Test"]);
    commit_file(&dir, "README.md", &format!("# {name}\n"), "initial commit");
    dir
}

/// Write a file and commit it.
pub fn commit_file(repo: &Path, rel_path: &str, content: &str, message: &str) {
    let path = repo.join(rel_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent dirs");
    }
    std::fs::write(&path, content).expect("failed to write file");
    git_in(repo, &["add", "."]);
    git_in(repo, &["commit", "--quiet", "-m", message]);
}

/// HEAD commit hash of a repository.
pub fn head_of(repo: &Path) -> String {
    let out = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo)
        .output()
        .expect("failed to run git rev-parse");
    assert!(out.status.success(), "git rev-parse failed in {}", repo.display());
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Run workshed against the given store root, from the given directory.
pub fn ws_in(root: &Path, cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_workshed"))
        .args(args)
        .env("WORKSHED_ROOT", root)
        .current_dir(cwd)
        .output()
        .expect("failed to execute workshed")
}

/// Run workshed and assert it succeeds. Returns stdout as string.
pub fn ws_ok(root: &Path, cwd: &Path, args: &[&str]) -> String {
    let out = ws_in(root, cwd, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "workshed {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Run workshed and assert it fails. Returns stderr as string.
pub fn ws_fails(root: &Path, cwd: &Path, args: &[&str]) -> String {
    let out = ws_in(root, cwd, args);
    assert!(
        !out.status.success(),
        "Expected workshed {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}

/// Create a workspace and return its handle, parsed from the output.
pub fn create_workspace(root: &Path, purpose: &str, extra_args: &[&str]) -> String {
    let mut args = vec!["create", purpose];
    args.extend_from_slice(extra_args);
    let stdout = ws_ok(root, root, &args);
    parse_handle(&stdout)
}

/// Extract the handle from `create` output ("Workspace '<handle>' ready!").
pub fn parse_handle(create_output: &str) -> String {
    create_output
        .lines()
        .find_map(|line| {
            let rest = line.strip_prefix("Workspace '")?;
            let (handle, _) = rest.split_once('\'')?;
            Some(handle.to_string())
        })
        .unwrap_or_else(|| panic!("no handle in create output:\n{create_output}"))
}

/// Extract the capture id from "Captured state as <id>" output.
pub fn parse_capture_id(output: &str) -> String {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Captured state as ").map(str::to_string))
        .unwrap_or_else(|| panic!("no capture id in output:\n{output}"))
}

/// Read and parse a stored capture record.
pub fn read_capture(root: &Path, handle: &str, id: &str) -> serde_json::Value {
    let path = root.join(handle).join(".workshed/captures").join(id).join("capture.json");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
    serde_json::from_str(&text).expect("capture is not valid JSON")
}

/// Read and parse a workspace's sidecar metadata.
pub fn read_sidecar(root: &Path, handle: &str) -> serde_json::Value {
    let path = root.join(handle).join(".workshed.json");
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
    serde_json::from_str(&text).expect("sidecar is not valid JSON")
}

/// Names of non-hidden entries directly under a directory, sorted.
pub fn visible_entries(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}
