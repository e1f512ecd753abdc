//! Append-only log of command executions.
//!
//! Every `exec` writes one record under
//! `.workshed/executions/<id>/record.json`. Records are never edited or
//! deleted; history is the point.

use tracing::{info, warn};

use crate::error::{Result, WorkshedError};
use crate::model::ExecutionRecord;
use crate::store::fs::FsWorkspaceStore;
use crate::store::{WorkspaceStore as _, executions_dir};

pub fn record(store: &FsWorkspaceStore, handle: &str, record: &ExecutionRecord) -> Result<()> {
    store.get(handle)?;
    let dir = executions_dir(&store.path(handle)).join(&record.id);
    let file = dir.join("record.json");
    if file.exists() {
        return Err(WorkshedError::validation(format!(
            "execution record '{}' already exists; records are append-only",
            record.id
        )));
    }
    std::fs::create_dir_all(&dir).map_err(|e| WorkshedError::io(&dir, e))?;
    crate::model::write_file(&file, record)?;
    info!(handle, id = %record.id, exit = record.exit_code, "execution recorded");
    Ok(())
}

/// Execution history, most recent first. `limit` of `None` returns all.
pub fn list(
    store: &FsWorkspaceStore,
    handle: &str,
    limit: Option<usize>,
) -> Result<Vec<ExecutionRecord>> {
    store.get(handle)?;
    let dir = executions_dir(&store.path(handle));
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WorkshedError::io(&dir, e)),
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| WorkshedError::io(&dir, e))?;
        let file = entry.path().join("record.json");
        if !file.is_file() {
            continue;
        }
        match crate::model::read_file::<ExecutionRecord>(&file) {
            Ok(record) => records.push(record),
            Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable record"),
        }
    }
    // ULIDs sort by start time, so reverse id order is newest-first.
    records.sort_by(|a, b| b.id.cmp(&a.id));
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
