//! In-memory [`WorkspaceStore`] for tests.
//!
//! Shares the validation and planning code with the filesystem store but
//! keeps workspaces in a map and never clones, so lifecycle invariants can
//! be exercised without disk or git.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Result, WorkshedError};
use crate::handle;
use crate::model::Workspace;
use crate::store::repos::{PlannedRepo, plan_additions};
use crate::store::{CreateRequest, WorkspaceStore, matches_filter, sort_workspaces};

pub struct MemoryWorkspaceStore {
    root: PathBuf,
    workspaces: Mutex<BTreeMap<String, Workspace>>,
}

impl Default for MemoryWorkspaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkspaceStore {
    pub fn new() -> Self {
        Self { root: PathBuf::from("/memory"), workspaces: Mutex::new(BTreeMap::new()) }
    }
}

impl WorkspaceStore for MemoryWorkspaceStore {
    fn create(&self, request: CreateRequest) -> Result<Workspace> {
        let purpose = crate::store::validate_purpose(&request.purpose)?.to_string();
        let planned = plan_additions(&[], &request.repos, &self.root)?;

        if let Some(template) = &request.template {
            if !template.is_dir() {
                return Err(WorkshedError::validation(format!(
                    "template directory {} does not exist",
                    template.display()
                )));
            }
        }

        let mut workspaces = self.workspaces.lock().expect("lock poisoned");
        if let Some(explicit) = &request.handle {
            handle::validate(explicit)?;
            if workspaces.contains_key(explicit) {
                return Err(WorkshedError::validation(format!(
                    "workspace '{explicit}' already exists"
                )));
            }
        }
        let handle = request
            .handle
            .unwrap_or_else(|| handle::generate(|h| workspaces.contains_key(h)));

        let mut ws = Workspace::new(handle.clone(), purpose);
        ws.repositories = planned.into_iter().map(PlannedRepo::into_repository).collect();
        workspaces.insert(handle, ws.clone());
        Ok(ws)
    }

    fn get(&self, handle: &str) -> Result<Workspace> {
        self.workspaces
            .lock()
            .expect("lock poisoned")
            .get(handle)
            .cloned()
            .ok_or_else(|| WorkshedError::WorkspaceNotFound { handle: handle.to_string() })
    }

    fn list(&self, filter: Option<&str>) -> Result<Vec<Workspace>> {
        let workspaces = self.workspaces.lock().expect("lock poisoned");
        let mut listed: Vec<Workspace> = workspaces
            .values()
            .filter(|ws| filter.is_none_or(|f| matches_filter(ws, f)))
            .cloned()
            .collect();
        sort_workspaces(&mut listed);
        Ok(listed)
    }

    fn remove(&self, handle: &str) -> Result<()> {
        self.workspaces
            .lock()
            .expect("lock poisoned")
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| WorkshedError::WorkspaceNotFound { handle: handle.to_string() })
    }

    fn update_purpose(&self, handle: &str, purpose: &str) -> Result<Workspace> {
        let purpose = crate::store::validate_purpose(purpose)?;
        let mut workspaces = self.workspaces.lock().expect("lock poisoned");
        let ws = workspaces
            .get_mut(handle)
            .ok_or_else(|| WorkshedError::WorkspaceNotFound { handle: handle.to_string() })?;
        ws.purpose = purpose.to_string();
        Ok(ws.clone())
    }

    fn path(&self, handle: &str) -> PathBuf {
        self.root.join(handle)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::store::RepoSpec;

    use super::*;

    #[test]
    fn lifecycle_round_trip() {
        let store = MemoryWorkspaceStore::new();
        let ws = store
            .create(CreateRequest { purpose: "memory only".into(), ..CreateRequest::default() })
            .expect("create");

        assert_eq!(store.get(&ws.handle).expect("get").purpose, "memory only");
        assert_eq!(store.list(None).expect("list").len(), 1);

        let updated = store.update_purpose(&ws.handle, "renamed").expect("update");
        assert_eq!(updated.purpose, "renamed");

        store.remove(&ws.handle).expect("remove");
        assert!(matches!(
            store.get(&ws.handle).expect_err("gone"),
            WorkshedError::WorkspaceNotFound { .. }
        ));
    }

    #[test]
    fn records_repositories_without_cloning() {
        let store = MemoryWorkspaceStore::new();
        let ws = store
            .create(CreateRequest {
                purpose: "url repos".into(),
                repos: vec![
                    RepoSpec {
                        source: "https://example.com/team/api.git".into(),
                        ..RepoSpec::default()
                    },
                    RepoSpec {
                        source: "git@example.com:team/web.git".into(),
                        ..RepoSpec::default()
                    },
                ],
                ..CreateRequest::default()
            })
            .expect("create");
        let names: Vec<&str> = ws.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
    }

    #[test]
    fn shares_validation_with_the_real_store() {
        let store = MemoryWorkspaceStore::new();
        assert!(store
            .create(CreateRequest { purpose: "  ".into(), ..CreateRequest::default() })
            .is_err());

        let err = store
            .create(CreateRequest {
                purpose: "bad scheme".into(),
                repos: vec![RepoSpec {
                    source: "ftp://example.com/x.git".into(),
                    ..RepoSpec::default()
                }],
                ..CreateRequest::default()
            })
            .expect_err("ftp refused");
        assert!(matches!(err, WorkshedError::InvalidSource { .. }));
        assert!(store.list(None).expect("list").is_empty());
    }

    #[test]
    fn explicit_handle_collisions_are_refused() {
        let store = MemoryWorkspaceStore::new();
        store
            .create(CreateRequest {
                purpose: "one".into(),
                handle: Some("fixed-name".into()),
                ..CreateRequest::default()
            })
            .expect("create");
        assert!(store
            .create(CreateRequest {
                purpose: "two".into(),
                handle: Some("fixed-name".into()),
                ..CreateRequest::default()
            })
            .is_err());
    }

    #[test]
    fn generated_handles_never_collide() {
        let store = MemoryWorkspaceStore::new();
        for i in 0..20 {
            store
                .create(CreateRequest { purpose: format!("ws {i}"), ..CreateRequest::default() })
                .expect("create");
        }
        assert_eq!(store.list(None).expect("list").len(), 20);
    }
}
