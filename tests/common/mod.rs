//! Shared fixtures for the integration suites: a throwaway database per test and
//! a workspace provisioner that records calls instead of shelling out to git.

#![allow(dead_code)]

use async_trait::async_trait;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::TempDir;

use stratus_swarm::{
    database::{create_pool, missions::Mission, DbPool},
    swarm::workspace::{CommandFailure, WorkspaceError, WorkspaceProvisioner},
    Complexity, Config, Coordinator, EventBroadcaster, SwarmStore, WorkflowType,
};

#[derive(Default)]
struct Calls {
    created: Vec<String>,
    removed: Vec<String>,
    fail_remove: HashSet<String>,
    fail_create: bool,
}

/// In-memory stand-in for `GitWorktreeManager`.
pub struct RecordingProvisioner {
    root: PathBuf,
    calls: Mutex<Calls>,
}

impl RecordingProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.calls.lock().unwrap().created.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.calls.lock().unwrap().removed.clone()
    }

    pub fn fail_create(&self) {
        self.calls.lock().unwrap().fail_create = true;
    }

    pub fn fail_remove_of(&self, branch: &str) {
        self.calls
            .lock()
            .unwrap()
            .fail_remove
            .insert(branch.to_string());
    }
}

#[async_trait]
impl WorkspaceProvisioner for RecordingProvisioner {
    async fn create(&self, branch: &str) -> Result<PathBuf, WorkspaceError> {
        let mut calls = self.calls.lock().unwrap();
        if calls.fail_create {
            return Err(WorkspaceError::Create {
                branch: branch.to_string(),
                failure: CommandFailure {
                    command: format!("git worktree add -b {branch}"),
                    output: "fatal: simulated failure".to_string(),
                },
            });
        }
        calls.created.push(branch.to_string());
        Ok(self.root.join(branch.replace('/', "-")))
    }

    async fn remove(&self, _path: &Path, branch: &str) -> Result<(), WorkspaceError> {
        let mut calls = self.calls.lock().unwrap();
        if calls.fail_remove.contains(branch) {
            return Err(WorkspaceError::Cleanup(vec![CommandFailure {
                command: format!("git branch -D {branch}"),
                output: "error: simulated failure".to_string(),
            }]));
        }
        calls.removed.push(branch.to_string());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let calls = self.calls.lock().unwrap();
        Ok(calls
            .created
            .iter()
            .filter(|b| !calls.removed.contains(b))
            .map(|b| self.root.join(b.replace('/', "-")))
            .collect())
    }
}

pub struct TestContext {
    pub pool: DbPool,
    pub events: EventBroadcaster,
    pub provisioner: Arc<RecordingProvisioner>,
    pub coordinator: Coordinator,
    pub store: SwarmStore,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&format!("sqlite:{}?mode=rwc", db_path.display()))
            .await
            .unwrap();

        let events = EventBroadcaster::new();
        let provisioner = Arc::new(RecordingProvisioner::new(
            temp_dir.path().join("worktrees"),
        ));
        let config = Config {
            database_path: db_path.display().to_string(),
            project_root: temp_dir.path().to_path_buf(),
            ..Config::default()
        };

        let coordinator = Coordinator::new(pool.clone(), events.clone());
        let store = SwarmStore::new(pool.clone(), provisioner.clone(), events.clone(), &config);

        Self {
            pool,
            events,
            provisioner,
            coordinator,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Starts a spec workflow and opens a mission under it.
    pub async fn mission(&self, title: &str) -> Mission {
        let workflow_id = format!("wf-{}", uuid::Uuid::new_v4().simple());
        self.coordinator
            .start(&workflow_id, WorkflowType::Spec, Complexity::Simple, title)
            .await
            .unwrap();
        self.store
            .create_mission(&workflow_id, title, None, None)
            .await
            .unwrap()
    }
}
