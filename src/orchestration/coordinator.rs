use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::phases::{validate_transition, Complexity, Phase, WorkflowType};
use crate::{
    database::{begin_immediate, now_timestamp, workflows::WorkflowRecord, DbPool},
    error::{Result, SwarmError},
    events::{EventBroadcaster, EventPayload, EventType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub index: usize,
    pub title: String,
    pub status: TaskStatus,
}

/// Complete state of one workflow, persisted as JSON alongside its indexed columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub phase: Phase,
    pub complexity: Complexity,
    /// phase name → agents delegated during that phase
    #[serde(default)]
    pub delegated_agents: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<usize>,
    #[serde(default)]
    pub total_tasks: usize,
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub design_content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl WorkflowState {
    fn to_record(&self) -> Result<WorkflowRecord> {
        Ok(WorkflowRecord {
            id: self.id.clone(),
            workflow_type: self.workflow_type.to_string(),
            phase: self.phase.to_string(),
            complexity: self.complexity.to_string(),
            state_json: serde_json::to_string(self)?,
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        })
    }

    /// The indexed columns win over whatever the JSON blob says.
    fn from_record(record: WorkflowRecord) -> Result<Self> {
        let mut state: WorkflowState = serde_json::from_str(&record.state_json)?;
        state.id = record.id;
        state.workflow_type = record.workflow_type.parse()?;
        state.phase = record.phase.parse()?;
        state.complexity = record.complexity.parse()?;
        state.created_at = record.created_at;
        state.updated_at = record.updated_at;
        Ok(state)
    }

    fn task_mut(&mut self, index: usize) -> Result<&mut Task> {
        let total = self.tasks.len();
        self.tasks
            .get_mut(index)
            .ok_or(SwarmError::InvalidTaskIndex { index, total })
    }
}

/// Drives workflows through their phase graphs. Each operation loads the state,
/// validates, persists and broadcasts `workflow_updated`.
#[derive(Clone)]
pub struct Coordinator {
    pool: DbPool,
    events: EventBroadcaster,
}

impl Coordinator {
    pub fn new(pool: DbPool, events: EventBroadcaster) -> Self {
        Self { pool, events }
    }

    /// Creates the workflow in its initial phase. Starting an id that already exists
    /// returns the stored state untouched. Bug workflows are always simple.
    pub async fn start(
        &self,
        id: &str,
        workflow_type: WorkflowType,
        complexity: Complexity,
        title: &str,
    ) -> Result<WorkflowState> {
        if id.trim().is_empty() {
            return Err(SwarmError::InvalidInput(
                "workflow id must not be empty".to_string(),
            ));
        }

        let complexity = match workflow_type {
            WorkflowType::Bug => Complexity::Simple,
            WorkflowType::Spec => complexity,
        };
        let now = now_timestamp();
        let state = WorkflowState {
            id: id.to_string(),
            workflow_type,
            phase: workflow_type.initial_phase(),
            complexity,
            delegated_agents: BTreeMap::new(),
            tasks: Vec::new(),
            current_task: None,
            total_tasks: 0,
            aborted: false,
            title: title.to_string(),
            session_id: None,
            plan_content: String::new(),
            design_content: String::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        if WorkflowRecord::insert_if_absent(&self.pool, &state.to_record()?).await? {
            info!(
                "Started {} workflow {} in phase {}",
                workflow_type, id, state.phase
            );
            self.events
                .broadcast(EventPayload::entity(EventType::WorkflowUpdated, &state));
            return Ok(state);
        }

        self.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<WorkflowState> {
        let record = WorkflowRecord::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| SwarmError::not_found("workflow", id))?;
        WorkflowState::from_record(record)
    }

    /// Load, apply and save inside one transaction so concurrent writers cannot
    /// silently overwrite each other.
    async fn update<F>(&self, id: &str, apply: F) -> Result<WorkflowState>
    where
        F: FnOnce(&mut WorkflowState) -> Result<()>,
    {
        let mut tx = begin_immediate(&self.pool).await.inspect_err(|e| {
            error!("Failed to begin transaction for workflow {}: {}", id, e)
        })?;

        let record = WorkflowRecord::get_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| SwarmError::not_found("workflow", id))?;
        let mut state = WorkflowState::from_record(record)?;

        apply(&mut state)?;
        state.updated_at = now_timestamp();

        WorkflowRecord::upsert(&mut *tx, &state.to_record()?).await?;
        tx.commit()
            .await
            .inspect_err(|e| error!("Failed to commit workflow {}: {}", id, e))?;

        self.events
            .broadcast(EventPayload::entity(EventType::WorkflowUpdated, &state));
        Ok(state)
    }

    pub async fn transition(&self, id: &str, to: Phase) -> Result<WorkflowState> {
        let state = self
            .update(id, |state| {
                if state.aborted {
                    return Err(SwarmError::WorkflowAborted(state.id.clone()));
                }
                validate_transition(state.workflow_type, state.phase, to)?;
                state.phase = to;
                Ok(())
            })
            .await?;

        info!("Workflow {} -> {}", id, state.phase);
        Ok(state)
    }

    /// Records that `agent` was delegated work in the current phase. Repeats are ignored.
    pub async fn record_delegation(&self, id: &str, agent: &str) -> Result<WorkflowState> {
        self.update(id, |state| {
            let agents = state
                .delegated_agents
                .entry(state.phase.to_string())
                .or_default();
            if !agents.iter().any(|a| a == agent) {
                agents.push(agent.to_string());
            }
            Ok(())
        })
        .await
    }

    /// Replaces the task list; every task starts pending.
    pub async fn set_tasks(&self, id: &str, titles: &[String]) -> Result<WorkflowState> {
        self.update(id, |state| {
            state.tasks = titles
                .iter()
                .enumerate()
                .map(|(index, title)| Task {
                    index,
                    title: title.clone(),
                    status: TaskStatus::Pending,
                })
                .collect();
            state.total_tasks = state.tasks.len();
            state.current_task = None;
            Ok(())
        })
        .await
    }

    pub async fn start_task(&self, id: &str, index: usize) -> Result<WorkflowState> {
        self.update(id, |state| {
            state.task_mut(index)?.status = TaskStatus::InProgress;
            state.current_task = Some(index);
            Ok(())
        })
        .await
    }

    pub async fn complete_task(&self, id: &str, index: usize) -> Result<WorkflowState> {
        self.update(id, |state| {
            state.task_mut(index)?.status = TaskStatus::Done;
            state.current_task = None;
            Ok(())
        })
        .await
    }

    pub async fn abort(&self, id: &str) -> Result<WorkflowState> {
        let state = self
            .update(id, |state| {
                state.aborted = true;
                Ok(())
            })
            .await?;

        warn!("Workflow {} aborted in phase {}", id, state.phase);
        Ok(state)
    }

    pub async fn set_plan_content(&self, id: &str, content: &str) -> Result<WorkflowState> {
        self.update(id, |state| {
            state.plan_content = content.to_string();
            Ok(())
        })
        .await
    }

    pub async fn set_design_content(&self, id: &str, content: &str) -> Result<WorkflowState> {
        self.update(id, |state| {
            state.design_content = content.to_string();
            Ok(())
        })
        .await
    }

    /// Records the owning session only if none is set yet.
    pub async fn set_session_id(&self, id: &str, session_id: &str) -> Result<WorkflowState> {
        let state = self.get(id).await?;
        if state.session_id.as_deref().is_some_and(|s| !s.is_empty()) {
            return Ok(state);
        }

        self.update(id, |state| {
            if state.session_id.as_deref().map_or(true, str::is_empty) {
                state.session_id = Some(session_id.to_string());
            }
            Ok(())
        })
        .await
    }

    /// Replaces the owning session unconditionally.
    pub async fn update_session_id(&self, id: &str, session_id: &str) -> Result<WorkflowState> {
        self.update(id, |state| {
            state.session_id = Some(session_id.to_string());
            Ok(())
        })
        .await
    }

    pub async fn list_active(&self) -> Result<Vec<WorkflowState>> {
        let records = WorkflowRecord::list_active(&self.pool).await?;
        Ok(decode_records(records))
    }

    pub async fn list_all(&self) -> Result<Vec<WorkflowState>> {
        let records = WorkflowRecord::list_all(&self.pool).await?;
        Ok(decode_records(records))
    }

    /// Removes the workflow and, through the foreign keys, its missions.
    pub async fn delete(&self, id: &str) -> Result<()> {
        WorkflowRecord::delete(&self.pool, id).await?;
        info!("Deleted workflow {}", id);

        self.events
            .broadcast(EventPayload::deleted(EventType::WorkflowDeleted, id));
        Ok(())
    }
}

fn decode_records(records: Vec<WorkflowRecord>) -> Vec<WorkflowState> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            WorkflowState::from_record(record)
                .inspect_err(|e| warn!("Skipping undecodable workflow {}: {}", id, e))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_pool;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    async fn coordinator() -> (Coordinator, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("test.db").display());
        let pool = create_pool(&url).await.unwrap();
        (Coordinator::new(pool, EventBroadcaster::new()), dir)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (coordinator, _dir) = coordinator().await;

        let first = coordinator
            .start("wf-1", WorkflowType::Spec, Complexity::Complex, "Auth")
            .await
            .unwrap();
        assert_eq!(first.phase, Phase::Plan);

        coordinator.transition("wf-1", Phase::Discovery).await.unwrap();

        let again = coordinator
            .start("wf-1", WorkflowType::Bug, Complexity::Simple, "Other title")
            .await
            .unwrap();
        assert_eq!(again.phase, Phase::Discovery);
        assert_eq!(again.workflow_type, WorkflowType::Spec);
        assert_eq!(again.title, "Auth");
    }

    #[tokio::test]
    async fn test_bug_workflow_is_always_simple() {
        let (coordinator, _dir) = coordinator().await;
        let state = coordinator
            .start("bug-1", WorkflowType::Bug, Complexity::Complex, "Crash")
            .await
            .unwrap();
        assert_eq!(state.phase, Phase::Analyze);
        assert_eq!(state.complexity, Complexity::Simple);
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_state_unchanged() {
        let (coordinator, _dir) = coordinator().await;
        coordinator
            .start("wf", WorkflowType::Spec, Complexity::Simple, "t")
            .await
            .unwrap();

        assert_matches!(
            coordinator.transition("wf", Phase::Learn).await,
            Err(SwarmError::InvalidTransition { .. })
        );
        assert_eq!(coordinator.get("wf").await.unwrap().phase, Phase::Plan);
    }

    #[tokio::test]
    async fn test_aborted_workflow_rejects_transitions() {
        let (coordinator, _dir) = coordinator().await;
        coordinator
            .start("wf", WorkflowType::Spec, Complexity::Simple, "t")
            .await
            .unwrap();
        coordinator.abort("wf").await.unwrap();

        assert_matches!(
            coordinator.transition("wf", Phase::Implement).await,
            Err(SwarmError::WorkflowAborted(_))
        );
    }

    #[tokio::test]
    async fn test_delegations_are_recorded_once_per_phase() {
        let (coordinator, _dir) = coordinator().await;
        coordinator
            .start("wf", WorkflowType::Spec, Complexity::Simple, "t")
            .await
            .unwrap();

        coordinator.record_delegation("wf", "planner").await.unwrap();
        coordinator.record_delegation("wf", "planner").await.unwrap();
        coordinator.transition("wf", Phase::Implement).await.unwrap();
        let state = coordinator
            .record_delegation("wf", "planner")
            .await
            .unwrap();

        assert_eq!(state.delegated_agents["plan"], vec!["planner"]);
        assert_eq!(state.delegated_agents["implement"], vec!["planner"]);
    }

    #[tokio::test]
    async fn test_task_tracking() {
        let (coordinator, _dir) = coordinator().await;
        coordinator
            .start("wf", WorkflowType::Spec, Complexity::Simple, "t")
            .await
            .unwrap();

        let titles = vec!["schema".to_string(), "api".to_string()];
        let state = coordinator.set_tasks("wf", &titles).await.unwrap();
        assert_eq!(state.total_tasks, 2);
        assert!(state.tasks.iter().all(|t| t.status == TaskStatus::Pending));

        let state = coordinator.start_task("wf", 1).await.unwrap();
        assert_eq!(state.current_task, Some(1));
        assert_eq!(state.tasks[1].status, TaskStatus::InProgress);

        let state = coordinator.complete_task("wf", 1).await.unwrap();
        assert_eq!(state.current_task, None);
        assert_eq!(state.tasks[1].status, TaskStatus::Done);

        assert_matches!(
            coordinator.start_task("wf", 2).await,
            Err(SwarmError::InvalidTaskIndex { index: 2, total: 2 })
        );
    }

    #[tokio::test]
    async fn test_session_id_first_writer_wins() {
        let (coordinator, _dir) = coordinator().await;
        coordinator
            .start("wf", WorkflowType::Spec, Complexity::Simple, "t")
            .await
            .unwrap();

        coordinator.set_session_id("wf", "s1").await.unwrap();
        let state = coordinator.set_session_id("wf", "s2").await.unwrap();
        assert_eq!(state.session_id.as_deref(), Some("s1"));

        let state = coordinator.update_session_id("wf", "s3").await.unwrap();
        assert_eq!(state.session_id.as_deref(), Some("s3"));
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let (coordinator, _dir) = coordinator().await;
        assert!(coordinator.get("missing").await.unwrap_err().is_not_found());
        assert!(coordinator
            .transition("missing", Phase::Implement)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(coordinator.delete("missing").await.unwrap_err().is_not_found());
    }
}
