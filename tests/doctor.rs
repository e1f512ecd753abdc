//! Doctor checks: store health, workspace bookkeeping vs. disk, and the
//! JSON envelope.

mod common;

use common::{create_workspace, setup_root, source_repo, ws_ok};

fn doctor_json(root: &std::path::Path, extra: &[&str]) -> serde_json::Value {
    let mut args = vec!["doctor", "--format", "json"];
    args.extend_from_slice(extra);
    let stdout = ws_ok(root, root, &args);
    serde_json::from_str(&stdout).expect("doctor json")
}

#[test]
fn healthy_workspace_passes_every_check() {
    let root = setup_root();
    let sources = setup_root();
    let app = source_repo(sources.path(), "app");
    let handle =
        create_workspace(root.path(), "doctor tests", &["--repo", &app.display().to_string()]);

    ws_ok(root.path(), root.path(), &["exec", "-w", &handle, "--in", "root", "--", "true"]);

    let stdout = ws_ok(root.path(), root.path(), &["doctor", &handle]);
    assert!(stdout.contains("workshed doctor"), "missing header:\n{stdout}");
    assert!(stdout.contains("All checks passed!"), "unexpected output:\n{stdout}");
    assert!(!stdout.contains("[FAIL]"), "unexpected failure:\n{stdout}");
    assert!(stdout.contains("last execution 0 day(s) ago"), "unexpected output:\n{stdout}");
}

#[test]
fn json_envelope_names_the_global_checks() {
    let root = setup_root();
    create_workspace(root.path(), "envelope test", &[]);

    let parsed = doctor_json(root.path(), &[]);
    assert_eq!(parsed["all_ok"], true);

    let checks = parsed["checks"].as_array().expect("checks array");
    let git = checks.iter().find(|c| c["name"] == "git").expect("git check");
    assert_eq!(git["status"], "ok");

    let store_root = checks.iter().find(|c| c["name"] == "store root").expect("store root check");
    assert_eq!(store_root["status"], "ok");
    assert!(
        store_root["message"].as_str().unwrap().contains("(writable)"),
        "unexpected message: {}",
        store_root["message"]
    );
}

#[test]
fn missing_store_root_is_informational() {
    let root = setup_root();
    let missing = root.path().join("missing");

    let stdout = ws_ok(&missing, root.path(), &["doctor"]);
    assert!(stdout.contains("[INFO]"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("does not exist yet"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("All checks passed!"), "info must not fail the run:\n{stdout}");
}

#[test]
fn dangling_repository_entry_is_a_failure_with_a_fix() {
    let root = setup_root();
    let sources = setup_root();
    let app = source_repo(sources.path(), "app");
    let handle =
        create_workspace(root.path(), "dangling test", &["--repo", &app.display().to_string()]);
    std::fs::remove_dir_all(root.path().join(&handle).join("app")).unwrap();

    let stdout = ws_ok(root.path(), root.path(), &["doctor", &handle]);
    assert!(stdout.contains("[FAIL]"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("dangling entry"), "unexpected output:\n{stdout}");
    assert!(
        stdout.contains(&format!("workshed repo remove app -w {handle}")),
        "missing fix hint:\n{stdout}"
    );
    assert!(stdout.contains("Some checks failed."), "unexpected output:\n{stdout}");

    let parsed = doctor_json(root.path(), &[&handle]);
    assert_eq!(parsed["all_ok"], false);
}

#[test]
fn untracked_directory_and_dirty_tree_warn_but_do_not_fail() {
    let root = setup_root();
    let sources = setup_root();
    let app = source_repo(sources.path(), "app");
    let handle =
        create_workspace(root.path(), "warning test", &["--repo", &app.display().to_string()]);

    std::fs::create_dir(root.path().join(&handle).join("stray")).unwrap();
    std::fs::write(root.path().join(&handle).join("app").join("scratch.txt"), "wip\n").unwrap();

    let stdout = ws_ok(root.path(), root.path(), &["doctor", &handle]);
    assert!(stdout.contains("not a tracked repository"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("uncommitted changes"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("All checks passed!"), "warnings must not fail the run:\n{stdout}");

    let parsed = doctor_json(root.path(), &[&handle]);
    assert_eq!(parsed["all_ok"], true);
    let warn_count = parsed["checks"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["status"] == "warn")
        .count();
    assert_eq!(warn_count, 2, "expected the stray dir and the dirty tree: {parsed}");
}

#[test]
fn broken_sidecar_is_reported_not_skipped() {
    let root = setup_root();
    let healthy = create_workspace(root.path(), "still fine", &[]);
    let broken = create_workspace(root.path(), "about to break", &[]);
    std::fs::write(root.path().join(&broken).join(".workshed.json"), "not json").unwrap();

    let stdout = ws_ok(root.path(), root.path(), &["doctor"]);
    assert!(stdout.contains("sidecar unreadable"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("Some checks failed."), "unexpected output:\n{stdout}");
    // The healthy workspace still gets its checks.
    assert!(stdout.contains(&format!("{healthy}: 0 capture(s) readable")));
}
