//! Durable data model and the versioned JSON codec behind it.
//!
//! Everything workshed persists is a single JSON object per file with
//! camelCase field names: the workspace sidecar (`.workshed.json`), captures,
//! and execution records. The sidecar carries a `schemaVersion`; readers
//! reject files written by a newer workshed instead of silently dropping
//! fields they do not understand.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkshedError};

/// Bump when the sidecar layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

/// Marker file that makes a directory a workspace.
pub const SIDECAR_FILE: &str = ".workshed.json";

/// Workspace-internal data directory holding captures and execution records.
pub const DATA_DIR: &str = ".workshed";

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub schema_version: u32,
    pub handle: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

impl Workspace {
    pub fn new(handle: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            handle: handle.into(),
            purpose: purpose.into(),
            created_at: Utc::now(),
            repositories: Vec::new(),
        }
    }

    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    pub fn has_url(&self, url: &str) -> bool {
        self.repositories.iter().any(|r| r.url == url)
    }
}

/// A repository attached to a workspace. Order in the sidecar is insertion
/// order and drives sequential execution order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    pub url: String,
    /// Branch or tag requested at clone time. `None` means default branch.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Shallow-clone depth. Zero means full history.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub depth: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Taken explicitly via `capture create`.
    Manual,
    /// Taken after a command run with `exec --capture`.
    Execution,
    /// Taken automatically before a capture is applied.
    Checkpoint,
}

impl CaptureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Execution => "execution",
            Self::Checkpoint => "checkpoint",
        }
    }
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time record of every repository's git position. Write-once:
/// captures are never edited after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    /// ULID; lexicographic order is creation order.
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub kind: CaptureKind,
    pub created_at: DateTime<Utc>,
    /// One entry per repository, in workspace order at capture time.
    pub git_state: Vec<GitRef>,
    /// Backlink to the execution that produced this capture, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_execution_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRef {
    pub repository: String,
    pub commit_hash: String,
    /// `None` when HEAD was detached at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub dirty: bool,
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

/// One `exec` invocation, written after the run completes. Append-only:
/// workshed never edits or deletes these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// ULID; lexicographic order is start order.
    pub id: String,
    pub handle: String,
    /// `"all"`, `"root"`, or a repository name.
    pub target: String,
    pub command: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Max exit code across results; the CLI exits with this.
    pub exit_code: i32,
    pub results: Vec<RepoResult>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoResult {
    pub repository: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Parse a persisted record, gating on `schemaVersion` before the typed
/// decode so a newer file fails with the upgrade message rather than a
/// field-level parse error.
pub fn decode<T: DeserializeOwned>(path: &Path, text: &str) -> Result<T> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|source| WorkshedError::Metadata { path: path.to_path_buf(), source })?;
    if let Some(found) = value.get("schemaVersion").and_then(serde_json::Value::as_u64) {
        let found = u32::try_from(found).unwrap_or(u32::MAX);
        if found > SCHEMA_VERSION {
            return Err(WorkshedError::SchemaVersion { found, supported: SCHEMA_VERSION });
        }
    }
    serde_json::from_value(value)
        .map_err(|source| WorkshedError::Metadata { path: path.to_path_buf(), source })
}

pub fn read_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).map_err(|source| WorkshedError::io(path, source))?;
    decode(path, &text)
}

/// Serialize `value` and swap it into place via a temp file in the same
/// directory, so readers always see either the old or the new sidecar and
/// never a truncated one.
pub fn write_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        WorkshedError::validation(format!("cannot write {}: no parent directory", path.display()))
    })?;
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|source| WorkshedError::Metadata { path: path.to_path_buf(), source })?;
    text.push('\n');

    let tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|source| WorkshedError::io(parent, source))?;
    std::fs::write(tmp.path(), text)
        .map_err(|source| WorkshedError::io(tmp.path(), source))?;
    tmp.persist(path)
        .map_err(|source| WorkshedError::io(path, source.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn sample_workspace() -> Workspace {
        let mut ws = Workspace::new("quiet-lake", "fix login flow");
        ws.repositories.push(Repository {
            name: "api".into(),
            url: "https://example.com/team/api.git".into(),
            git_ref: Some("main".into()),
            depth: 1,
        });
        ws.repositories.push(Repository {
            name: "web".into(),
            url: "https://example.com/team/web.git".into(),
            git_ref: None,
            depth: 0,
        });
        ws
    }

    #[test]
    fn workspace_round_trips() {
        let ws = sample_workspace();
        let json = serde_json::to_string_pretty(&ws).expect("encode");
        let back: Workspace = decode(Path::new("x"), &json).expect("decode");
        assert_eq!(back, ws);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let ws = sample_workspace();
        let json = serde_json::to_string(&ws).expect("encode");
        assert!(json.contains("\"schemaVersion\":1"));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"repositories\""));
        assert!(json.contains("\"ref\":\"main\""));
        assert!(!json.contains("snake_case"));
        assert!(!json.contains("\"git_ref\""));
    }

    #[test]
    fn default_branch_and_full_depth_are_omitted() {
        let ws = sample_workspace();
        let json = serde_json::to_string(&ws).expect("encode");
        // Second repository has no ref and depth 0.
        assert_eq!(json.matches("\"ref\"").count(), 1);
        assert_eq!(json.matches("\"depth\"").count(), 1);
    }

    #[test]
    fn newer_schema_is_rejected_with_upgrade_error() {
        let json = r#"{"schemaVersion": 99, "handle": "x", "purpose": "y",
                       "createdAt": "2026-01-01T00:00:00Z", "repositories": []}"#;
        let err = decode::<Workspace>(Path::new("x"), json).expect_err("must reject");
        match err {
            WorkshedError::SchemaVersion { found, supported } => {
                assert_eq!(found, 99);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_fields_from_same_schema_are_ignored() {
        let json = r#"{"schemaVersion": 1, "handle": "x", "purpose": "y",
                       "createdAt": "2026-01-01T00:00:00Z", "repositories": [],
                       "futureField": true}"#;
        let ws: Workspace = decode(Path::new("x"), json).expect("decode");
        assert_eq!(ws.handle, "x");
    }

    #[test]
    fn malformed_json_reports_the_path() {
        let err = decode::<Workspace>(Path::new("/store/ws/.workshed.json"), "{nope")
            .expect_err("must fail");
        assert!(err.to_string().contains(".workshed.json"));
    }

    #[test]
    fn write_then_read_file_round_trips() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(SIDECAR_FILE);
        let ws = sample_workspace();
        write_file(&path, &ws).expect("write");
        let back: Workspace = read_file(&path).expect("read");
        assert_eq!(back, ws);

        let text = std::fs::read_to_string(&path).expect("raw");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn write_file_replaces_existing_content() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(SIDECAR_FILE);
        let mut ws = sample_workspace();
        write_file(&path, &ws).expect("write");
        ws.purpose = "new purpose".into();
        write_file(&path, &ws).expect("rewrite");
        let back: Workspace = read_file(&path).expect("read");
        assert_eq!(back.purpose, "new purpose");
    }

    #[test]
    fn capture_round_trips_with_detached_head() {
        let capture = Capture {
            id: "01J8ZD3E9GV0S5TW9GJVKH2QRX".into(),
            name: "before-upgrade".into(),
            description: String::new(),
            tags: vec!["release".into()],
            kind: CaptureKind::Manual,
            created_at: Utc::now(),
            git_state: vec![
                GitRef {
                    repository: "api".into(),
                    commit_hash: "a".repeat(40),
                    branch: Some("main".into()),
                    dirty: false,
                },
                GitRef {
                    repository: "web".into(),
                    commit_hash: "b".repeat(40),
                    branch: None,
                    dirty: true,
                },
            ],
            source_execution_id: None,
        };
        let json = serde_json::to_string(&capture).expect("encode");
        assert!(json.contains("\"kind\":\"manual\""));
        assert!(json.contains("\"commitHash\""));
        // Detached entry omits the branch key entirely.
        assert_eq!(json.matches("\"branch\"").count(), 1);
        let back: Capture = decode(Path::new("x"), &json).expect("decode");
        assert_eq!(back, capture);
    }

    #[test]
    fn execution_record_round_trips() {
        let record = ExecutionRecord {
            id: "01J8ZD3E9GV0S5TW9GJVKH2QRY".into(),
            handle: "quiet-lake".into(),
            target: "all".into(),
            command: vec!["cargo".into(), "test".into()],
            started_at: Utc::now(),
            completed_at: Utc::now(),
            exit_code: 101,
            results: vec![RepoResult {
                repository: "api".into(),
                exit_code: 101,
                duration_ms: 1500,
            }],
        };
        let json = serde_json::to_string(&record).expect("encode");
        assert!(json.contains("\"exitCode\":101"));
        assert!(json.contains("\"durationMs\":1500"));
        let back: ExecutionRecord = decode(Path::new("x"), &json).expect("decode");
        assert_eq!(back, record);
    }
}
