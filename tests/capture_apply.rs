//! Capture, preflight, and apply through the CLI: recorded state, the
//! read-only preflight gate, and detached-HEAD restoration with an
//! automatic checkpoint.

mod common;

use std::path::{Path, PathBuf};
use std::process::Command;

use common::{
    commit_file, create_workspace, git_in, head_of, parse_capture_id, read_capture, setup_root,
    source_repo, ws_fails, ws_ok,
};
use tempfile::TempDir;

/// Store root + one workspace with a single cloned repository, ready to
/// commit in.
fn workspace_with_repo() -> (TempDir, TempDir, String, PathBuf) {
    let root = setup_root();
    let sources = setup_root();
    let app = source_repo(sources.path(), "app");
    let handle =
        create_workspace(root.path(), "capture tests", &["--repo", &app.display().to_string()]);
    let clone = root.path().join(&handle).join("app");
    git_in(&clone, &["config", "user.email", "test@example.com"]);
    git_in(&clone, &["config", "user.name", "Test"]);
    (root, sources, handle, clone)
}

fn is_detached(repo: &Path) -> bool {
    !Command::new("git")
        .args(["symbolic-ref", "-q", "HEAD"])
        .current_dir(repo)
        .output()
        .expect("failed to run git symbolic-ref")
        .status
        .success()
}

#[test]
fn capture_records_commit_branch_and_clean_flag() {
    let (root, _sources, handle, clone) = workspace_with_repo();

    let stdout =
        ws_ok(root.path(), root.path(), &["capture", "create", &handle, "--name", "baseline"]);
    let id = parse_capture_id(&stdout);

    let capture = read_capture(root.path(), &handle, &id);
    assert_eq!(capture["name"], "baseline");
    assert_eq!(capture["kind"], "manual");
    assert_eq!(capture["gitState"][0]["repository"], "app");
    assert_eq!(capture["gitState"][0]["commitHash"], head_of(&clone).as_str());
    assert_eq!(capture["gitState"][0]["branch"], "main");
    assert_eq!(capture["gitState"][0]["dirty"], false);
}

#[test]
fn capture_flags_dirty_trees_without_refusing() {
    let (root, _sources, handle, clone) = workspace_with_repo();
    std::fs::write(clone.join("scratch.txt"), "uncommitted\n").unwrap();

    let stdout = ws_ok(root.path(), root.path(), &["capture", "create", &handle]);
    let id = parse_capture_id(&stdout);

    let capture = read_capture(root.path(), &handle, &id);
    assert_eq!(capture["gitState"][0]["dirty"], true);
}

#[test]
fn capture_aborts_whole_when_a_repository_is_missing() {
    let (root, _sources, handle, clone) = workspace_with_repo();
    std::fs::remove_dir_all(&clone).unwrap();

    let stderr = ws_fails(root.path(), root.path(), &["capture", "create", &handle]);
    assert!(stderr.contains("nothing was captured"), "unexpected error: {stderr}");

    let stdout = ws_ok(root.path(), root.path(), &["capture", "list", &handle]);
    assert_eq!(stdout.trim(), "No captures found.");
}

#[test]
fn capture_list_is_newest_first() {
    let (root, _sources, handle, clone) = workspace_with_repo();

    let first = parse_capture_id(&ws_ok(
        root.path(),
        root.path(),
        &["capture", "create", &handle, "--name", "one"],
    ));
    commit_file(&clone, "next.txt", "more\n", "second commit");
    let second = parse_capture_id(&ws_ok(
        root.path(),
        root.path(),
        &["capture", "create", &handle, "--name", "two"],
    ));

    let stdout = ws_ok(root.path(), root.path(), &["capture", "list", &handle]);
    let rows: Vec<&str> = stdout.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with(&second), "newest capture should lead:\n{stdout}");
    assert!(rows[1].starts_with(&first));
}

#[test]
fn preflight_passes_on_an_unmodified_workspace() {
    let (root, _sources, handle, _clone) = workspace_with_repo();
    let id = parse_capture_id(&ws_ok(root.path(), root.path(), &["capture", "create", &handle]));

    let stdout =
        ws_ok(root.path(), root.path(), &["capture", "preflight", "-w", &handle, &id]);
    assert!(stdout.contains("ready to apply"), "unexpected output:\n{stdout}");
}

#[test]
fn preflight_reports_dirty_trees_and_stays_read_only() {
    let (root, _sources, handle, clone) = workspace_with_repo();
    let id = parse_capture_id(&ws_ok(root.path(), root.path(), &["capture", "create", &handle]));

    std::fs::write(clone.join("scratch.txt"), "uncommitted\n").unwrap();
    let out = common::ws_in(
        root.path(),
        root.path(),
        &["capture", "preflight", "-w", &handle, &id],
    );
    assert!(!out.status.success(), "preflight should exit non-zero on issues");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[FAIL] app"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("dirty"), "unexpected output:\n{stdout}");

    // Nothing changed: the uncommitted file is untouched.
    assert_eq!(std::fs::read_to_string(clone.join("scratch.txt")).unwrap(), "uncommitted\n");
}

#[test]
fn preflight_json_names_the_reason() {
    let (root, _sources, handle, clone) = workspace_with_repo();
    let id = parse_capture_id(&ws_ok(root.path(), root.path(), &["capture", "create", &handle]));

    std::fs::remove_dir_all(&clone).unwrap();
    let out = common::ws_in(
        root.path(),
        root.path(),
        &["capture", "preflight", "-w", &handle, &id, "--format", "json"],
    );
    assert!(!out.status.success());
    let parsed: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&out.stdout)).expect("preflight json");
    assert_eq!(parsed["valid"], false);
    assert_eq!(parsed["issues"][0]["repository"], "app");
    assert_eq!(parsed["issues"][0]["reason"], "missing_repository");
}

#[test]
fn apply_restores_the_recorded_commit_detached_with_a_checkpoint() {
    let (root, _sources, handle, clone) = workspace_with_repo();
    let baseline_head = head_of(&clone);
    let id = parse_capture_id(&ws_ok(
        root.path(),
        root.path(),
        &["capture", "create", &handle, "--name", "baseline"],
    ));

    commit_file(&clone, "later.txt", "newer work\n", "moved on");
    assert_ne!(head_of(&clone), baseline_head);

    let stdout = ws_ok(root.path(), root.path(), &["capture", "apply", "-w", &handle, &id]);
    assert!(stdout.contains("Applied capture"), "unexpected output:\n{stdout}");

    assert_eq!(head_of(&clone), baseline_head);
    assert!(is_detached(&clone), "apply should leave a detached HEAD");
    assert!(!clone.join("later.txt").exists(), "checkout did not restore the old tree");

    // The automatic checkpoint is listed alongside the manual capture.
    let stdout = ws_ok(root.path(), root.path(), &["capture", "list", &handle]);
    let rows: Vec<&str> = stdout.lines().skip(1).collect();
    assert_eq!(rows.len(), 2, "expected baseline + checkpoint:\n{stdout}");
    assert!(rows[0].contains("checkpoint"), "newest should be the checkpoint:\n{stdout}");
}

#[test]
fn apply_refuses_a_dirty_tree_and_changes_nothing() {
    let (root, _sources, handle, clone) = workspace_with_repo();
    let id = parse_capture_id(&ws_ok(root.path(), root.path(), &["capture", "create", &handle]));

    commit_file(&clone, "later.txt", "newer work\n", "moved on");
    let head_before = head_of(&clone);
    std::fs::write(clone.join("scratch.txt"), "uncommitted\n").unwrap();

    let stderr = ws_fails(root.path(), root.path(), &["capture", "apply", "-w", &handle, &id]);
    assert!(stderr.contains("preflight"), "unexpected error: {stderr}");

    assert_eq!(head_of(&clone), head_before, "refused apply must not move HEAD");
    assert!(clone.join("scratch.txt").exists());
    // No checkpoint was written either.
    let stdout = ws_ok(root.path(), root.path(), &["capture", "list", &handle]);
    assert_eq!(stdout.lines().skip(1).count(), 1, "refused apply wrote a capture:\n{stdout}");
}

#[test]
fn capture_ids_accept_a_unique_prefix() {
    let (root, _sources, handle, _clone) = workspace_with_repo();
    let id = parse_capture_id(&ws_ok(root.path(), root.path(), &["capture", "create", &handle]));

    let prefix = &id[..10];
    let stdout =
        ws_ok(root.path(), root.path(), &["capture", "preflight", "-w", &handle, prefix]);
    assert!(stdout.contains(&id), "full id should appear in the report:\n{stdout}");

    let stderr =
        ws_fails(root.path(), root.path(), &["capture", "preflight", "-w", &handle, "zz"]);
    assert!(stderr.contains("not found"), "unexpected error: {stderr}");
}
