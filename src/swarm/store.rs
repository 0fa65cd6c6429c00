use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info, warn};

use super::{
    dependencies,
    dispatch,
    domain::{
        collision_suffix, generate_id, merge_branch_name, mission_id_from_title,
        worker_branch_name,
    },
    reservations::{find_conflicts, FileConflict},
    types::{Assignment, ForgeStatus, MissionStatus, TicketStatus, WorkerStatus},
    workspace::WorkspaceProvisioner,
};
use crate::{
    config::Config,
    database::{
        checkpoints::Checkpoint,
        forge::ForgeEntry,
        missions::{Mission, NewMission},
        reservations::{FileReservation, ReserveOutcome},
        signals::{NewSignal, Signal},
        tickets::{NewTicket, Ticket},
        workers::{NewWorker, Worker},
        workflows::WorkflowRecord,
        DbPool,
    },
    error::{Result, SwarmError},
    events::{EventBroadcaster, EventPayload, EventType},
};

const MISSION_ID_ATTEMPTS: usize = 5;

/// Outcome of tearing down a mission. Workspace failures are collected, not fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub mission_id: String,
    pub workers_cleaned: usize,
    pub errors: Vec<String>,
}

/// Business operations over missions, workers, tickets, signals, reservations,
/// the forge queue and checkpoints. Every mutation is broadcast to subscribers.
#[derive(Clone)]
pub struct SwarmStore {
    pool: DbPool,
    provisioner: Arc<dyn WorkspaceProvisioner>,
    events: EventBroadcaster,
    default_base_branch: String,
}

impl SwarmStore {
    pub fn new(
        pool: DbPool,
        provisioner: Arc<dyn WorkspaceProvisioner>,
        events: EventBroadcaster,
        config: &Config,
    ) -> Self {
        Self {
            pool,
            provisioner,
            events,
            default_base_branch: config.default_base_branch.clone(),
        }
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    async fn require_mission(&self, mission_id: &str) -> Result<()> {
        if Mission::exists(&self.pool, mission_id).await? {
            Ok(())
        } else {
            Err(SwarmError::not_found("mission", mission_id))
        }
    }

    // Missions

    /// Creates a mission whose id is derived from the title. A colliding id gets a
    /// short random suffix, retried a few times if the suffixed id is taken too.
    /// The merge branch always follows the final id.
    pub async fn create_mission(
        &self,
        workflow_id: &str,
        title: &str,
        base_branch: Option<&str>,
        strategy: Option<&str>,
    ) -> Result<Mission> {
        if WorkflowRecord::get_by_id(&self.pool, workflow_id)
            .await?
            .is_none()
        {
            return Err(SwarmError::not_found("workflow", workflow_id));
        }

        let base_branch = match base_branch {
            Some(branch) if !branch.is_empty() => branch,
            _ => self.default_base_branch.as_str(),
        };
        let slug = mission_id_from_title(title);

        let mut id = slug.clone();
        let mut attempt = 0;
        let mission = loop {
            let merge_branch = merge_branch_name(&id);
            let created = Mission::create_if_absent(
                &self.pool,
                NewMission {
                    id: &id,
                    workflow_id,
                    title,
                    base_branch,
                    merge_branch: &merge_branch,
                    strategy: strategy.unwrap_or_default(),
                },
            )
            .await?;
            if let Some(mission) = created {
                break mission;
            }

            attempt += 1;
            if attempt > MISSION_ID_ATTEMPTS {
                return Err(SwarmError::InvalidInput(format!(
                    "could not find a free mission id for '{}' after {} attempts",
                    slug, MISSION_ID_ATTEMPTS
                )));
            }
            let suffixed = format!("{}-{}", slug, collision_suffix());
            warn!("Mission id {} already taken, trying {}", id, suffixed);
            id = suffixed;
        };

        self.events
            .broadcast(EventPayload::entity(EventType::MissionStatus, &mission));
        Ok(mission)
    }

    pub async fn get_mission(&self, id: &str) -> Result<Mission> {
        Mission::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| SwarmError::not_found("mission", id))
    }

    pub async fn list_missions(&self) -> Result<Vec<Mission>> {
        Mission::list(&self.pool).await
    }

    pub async fn update_mission_status(&self, id: &str, status: MissionStatus) -> Result<Mission> {
        Mission::update_status(&self.pool, id, status).await?;
        let mission = self.get_mission(id).await?;
        info!("Mission {} -> {}", id, status);

        self.events
            .broadcast(EventPayload::entity(EventType::MissionStatus, &mission));
        Ok(mission)
    }

    pub async fn update_strategy_outcome(&self, id: &str, outcome: &str) -> Result<Mission> {
        // Must be a JSON document
        let _: serde_json::Value = serde_json::from_str(outcome)?;
        Mission::update_strategy_outcome(&self.pool, id, outcome).await?;
        let mission = self.get_mission(id).await?;

        self.events
            .broadcast(EventPayload::entity(EventType::MissionStatus, &mission));
        Ok(mission)
    }

    // Workers

    /// Provisions an isolated workspace and registers the worker. If the worker
    /// cannot be recorded, the workspace is torn down again.
    pub async fn spawn_worker(&self, mission_id: &str, agent_type: &str) -> Result<Worker> {
        self.require_mission(mission_id).await?;

        let worker_id = generate_id();
        let branch = worker_branch_name(mission_id, &worker_id);
        let path = self.provisioner.create(&branch).await?;
        let path_str = path.to_string_lossy().into_owned();

        let created = Worker::create(
            &self.pool,
            NewWorker {
                id: &worker_id,
                mission_id,
                agent_type,
                worktree_path: &path_str,
                branch_name: &branch,
            },
        )
        .await;

        let worker = match created {
            Ok(worker) => worker,
            Err(e) => {
                if let Err(cleanup) = self.provisioner.remove(&path, &branch).await {
                    error!(
                        "Failed to roll back workspace {} for worker {}: {}",
                        path_str, worker_id, cleanup
                    );
                }
                return Err(e);
            }
        };

        self.events
            .broadcast(EventPayload::entity(EventType::WorkerStatus, &worker));
        Ok(worker)
    }

    pub async fn get_worker(&self, id: &str) -> Result<Worker> {
        Worker::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| SwarmError::not_found("worker", id))
    }

    pub async fn list_workers(&self, mission_id: &str) -> Result<Vec<Worker>> {
        Worker::list_by_mission(&self.pool, mission_id).await
    }

    pub async fn heartbeat(&self, worker_id: &str) -> Result<()> {
        Worker::heartbeat(&self.pool, worker_id).await
    }

    pub async fn update_worker_status(&self, id: &str, status: WorkerStatus) -> Result<Worker> {
        Worker::update_status(&self.pool, id, status).await?;
        let worker = self.get_worker(id).await?;

        self.events
            .broadcast(EventPayload::entity(EventType::WorkerStatus, &worker));
        Ok(worker)
    }

    /// Flags workers that have not sent a heartbeat within `max_age` as stale.
    /// Returns the ids that changed.
    pub async fn sweep_stale_workers(
        &self,
        mission_id: &str,
        max_age: Duration,
    ) -> Result<Vec<String>> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| SwarmError::InvalidInput(format!("stale threshold: {e}")))?;
        let cutoff = (chrono::Utc::now() - max_age)
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();

        let stale = Worker::mark_stale(&self.pool, mission_id, &cutoff).await?;
        if !stale.is_empty() {
            warn!(
                "Marked {} worker(s) stale in mission {}",
                stale.len(),
                mission_id
            );
            for id in &stale {
                if let Some(worker) = Worker::get_by_id(&self.pool, id).await? {
                    self.events
                        .broadcast(EventPayload::entity(EventType::WorkerStatus, &worker));
                }
            }
        }
        Ok(stale)
    }

    // Tickets

    /// Creates one ticket. Every dependency must be an existing ticket of the mission.
    pub async fn create_ticket(&self, mission_id: &str, new: NewTicket) -> Result<Ticket> {
        self.require_mission(mission_id).await?;

        let existing: HashSet<String> = Ticket::ids_for_mission(&self.pool, mission_id)
            .await?
            .into_iter()
            .collect();
        dependencies::validate_dependencies(&new.title, &new.depends_on, &existing)?;

        let mut conn = self.pool.acquire().await?;
        let ticket =
            Ticket::insert(&mut *conn, &generate_id(), mission_id, &new, &new.depends_on).await?;

        self.events
            .broadcast(EventPayload::entity(EventType::TicketStatus, &ticket));
        Ok(ticket)
    }

    /// Creates several tickets at once. Entries may depend on each other by `key`.
    /// Nothing is written when a reference is unknown or the batch contains a cycle.
    pub async fn create_tickets_batch(
        &self,
        mission_id: &str,
        entries: Vec<NewTicket>,
    ) -> Result<Vec<Ticket>> {
        self.require_mission(mission_id).await?;

        let existing: HashSet<String> = Ticket::ids_for_mission(&self.pool, mission_id)
            .await?
            .into_iter()
            .collect();
        let planned = dependencies::plan_batch(entries, &existing)?;
        let tickets = Ticket::insert_batch(&self.pool, mission_id, &planned).await?;

        for ticket in &tickets {
            self.events
                .broadcast(EventPayload::entity(EventType::TicketStatus, ticket));
        }
        Ok(tickets)
    }

    pub async fn get_ticket(&self, id: &str) -> Result<Ticket> {
        Ticket::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| SwarmError::not_found("ticket", id))
    }

    pub async fn list_tickets(&self, mission_id: &str) -> Result<Vec<Ticket>> {
        Ticket::list_by_mission(&self.pool, mission_id).await
    }

    pub async fn get_dispatchable_tickets(&self, mission_id: &str) -> Result<Vec<Ticket>> {
        Ticket::get_dispatchable(&self.pool, mission_id).await
    }

    pub async fn update_ticket_status(
        &self,
        id: &str,
        status: TicketStatus,
        result: &str,
    ) -> Result<Ticket> {
        let ticket = Ticket::update_status(&self.pool, id, status, result).await?;

        self.events
            .broadcast(EventPayload::entity(EventType::TicketStatus, &ticket));
        Ok(ticket)
    }

    /// Runs one dispatch pass over the mission.
    pub async fn dispatch(&self, mission_id: &str) -> Result<Vec<Assignment>> {
        let made = dispatch::dispatch(&self.pool, mission_id).await?;

        let mut assignments = Vec::with_capacity(made.len());
        for (assignment, signal) in made {
            self.events
                .broadcast(EventPayload::entity(EventType::SignalSent, &signal));
            assignments.push(assignment);
        }

        if !assignments.is_empty() {
            self.events.broadcast(EventPayload::entity(
                EventType::DispatchCompleted,
                &serde_json::json!({
                    "mission_id": mission_id,
                    "assignments": &assignments,
                }),
            ));
        }
        Ok(assignments)
    }

    // Signals

    pub async fn send_signal(
        &self,
        mission_id: &str,
        from: &str,
        to: &str,
        signal_type: &str,
        payload: &str,
    ) -> Result<Signal> {
        if signal_type.is_empty() {
            return Err(SwarmError::InvalidInput(
                "signal type must not be empty".to_string(),
            ));
        }
        self.require_mission(mission_id).await?;

        let mut conn = self.pool.acquire().await?;
        let signal = Signal::insert(
            &mut *conn,
            &generate_id(),
            &NewSignal {
                mission_id,
                from_worker: from,
                to_worker: to,
                signal_type,
                payload,
            },
        )
        .await?;

        self.events
            .broadcast(EventPayload::entity(EventType::SignalSent, &signal));
        Ok(signal)
    }

    /// Unread signals for the worker, including broadcasts, each delivered once.
    pub async fn poll_signals(&self, worker_id: &str) -> Result<Vec<Signal>> {
        Signal::poll_and_ack(&self.pool, worker_id).await
    }

    pub async fn list_signals(&self, mission_id: &str) -> Result<Vec<Signal>> {
        Signal::list_by_mission(&self.pool, mission_id).await
    }

    // File reservations

    pub async fn reserve_files(
        &self,
        mission_id: &str,
        worker_id: &str,
        patterns: &[String],
        reason: &str,
    ) -> Result<ReserveOutcome> {
        if patterns.is_empty() {
            return Err(SwarmError::InvalidInput(
                "at least one pattern is required".to_string(),
            ));
        }
        self.require_mission(mission_id).await?;
        let worker = self.get_worker(worker_id).await?;
        if worker.mission_id != mission_id {
            return Err(SwarmError::InvalidInput(format!(
                "worker {} belongs to mission {}, not {}",
                worker_id, worker.mission_id, mission_id
            )));
        }

        let outcome = FileReservation::reserve_atomic(
            &self.pool,
            &generate_id(),
            mission_id,
            worker_id,
            patterns,
            reason,
        )
        .await?;

        match &outcome {
            ReserveOutcome::Reserved(reservation) => self
                .events
                .broadcast(EventPayload::entity(EventType::FilesReserved, reservation)),
            ReserveOutcome::Conflicts(conflicts) => info!(
                "Reservation by worker {} blocked by {} conflict(s)",
                worker_id,
                conflicts.len()
            ),
        }
        Ok(outcome)
    }

    /// Drops every reservation the worker holds. Releasing nothing is not an error.
    pub async fn release_files(&self, worker_id: &str) -> Result<u64> {
        let released = FileReservation::release(&self.pool, worker_id).await?;
        if released > 0 {
            self.events.broadcast(EventPayload::entity(
                EventType::FilesReleased,
                &serde_json::json!({ "worker_id": worker_id, "released": released }),
            ));
        }
        Ok(released)
    }

    /// Same overlap check as `reserve_files`, without reserving anything.
    pub async fn check_file_conflicts(
        &self,
        mission_id: &str,
        exclude_worker_id: &str,
        patterns: &[String],
    ) -> Result<Vec<FileConflict>> {
        self.require_mission(mission_id).await?;
        let existing = FileReservation::list_by_mission(&self.pool, mission_id).await?;
        Ok(find_conflicts(&existing, exclude_worker_id, patterns))
    }

    pub async fn list_file_reservations(&self, mission_id: &str) -> Result<Vec<FileReservation>> {
        FileReservation::list_by_mission(&self.pool, mission_id).await
    }

    // Forge

    /// Queues the worker's branch for merging into the mission.
    pub async fn submit_to_forge(&self, worker_id: &str) -> Result<ForgeEntry> {
        let worker = self.get_worker(worker_id).await?;
        let entry = ForgeEntry::create(
            &self.pool,
            &generate_id(),
            &worker.mission_id,
            &worker.id,
            &worker.branch_name,
        )
        .await?;

        self.events
            .broadcast(EventPayload::entity(EventType::ForgeUpdate, &entry));
        Ok(entry)
    }

    pub async fn update_forge_entry(
        &self,
        id: &str,
        status: ForgeStatus,
        conflict_files: &[String],
    ) -> Result<ForgeEntry> {
        let entry = ForgeEntry::update_status(&self.pool, id, status, conflict_files).await?;
        info!("Forge entry {} -> {}", id, status);

        self.events
            .broadcast(EventPayload::entity(EventType::ForgeUpdate, &entry));
        Ok(entry)
    }

    pub async fn get_forge_entry(&self, id: &str) -> Result<ForgeEntry> {
        ForgeEntry::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| SwarmError::not_found("forge entry", id))
    }

    pub async fn list_forge_entries(&self, mission_id: &str) -> Result<Vec<ForgeEntry>> {
        ForgeEntry::list_by_mission(&self.pool, mission_id).await
    }

    // Workspaces and cleanup

    pub async fn list_workspaces(&self) -> Result<Vec<PathBuf>> {
        Ok(self.provisioner.list().await?)
    }

    /// Tears down every worker workspace of the mission, then deletes the mission
    /// and everything that belongs to it. Workspace failures do not stop the sweep.
    pub async fn cleanup_mission(&self, mission_id: &str) -> Result<CleanupReport> {
        let workers = Worker::list_by_mission(&self.pool, mission_id).await?;
        let mut report = CleanupReport {
            mission_id: mission_id.to_string(),
            ..Default::default()
        };

        for worker in workers.iter().filter(|w| !w.worktree_path.is_empty()) {
            let path = PathBuf::from(&worker.worktree_path);
            match self.provisioner.remove(&path, &worker.branch_name).await {
                Ok(()) => report.workers_cleaned += 1,
                Err(e) => {
                    warn!("Cleanup of worker {} incomplete: {}", worker.id, e);
                    report.errors.push(format!("{}: {}", worker.id, e));
                }
            }
        }

        Mission::delete(&self.pool, mission_id).await?;
        self.events
            .broadcast(EventPayload::deleted(EventType::MissionStatus, mission_id));

        info!(
            "Cleaned up mission {} ({} workspace(s) removed, {} error(s))",
            mission_id,
            report.workers_cleaned,
            report.errors.len()
        );
        Ok(report)
    }

    // Checkpoints

    /// Records a progress snapshot. Progress is clamped to 0..=100.
    pub async fn save_checkpoint(
        &self,
        mission_id: &str,
        progress: i64,
        state_json: &str,
    ) -> Result<Checkpoint> {
        self.require_mission(mission_id).await?;
        let state_json = if state_json.is_empty() {
            "{}"
        } else {
            state_json
        };

        let checkpoint = Checkpoint::create(
            &self.pool,
            &generate_id(),
            mission_id,
            progress.clamp(0, 100),
            state_json,
        )
        .await?;

        self.events
            .broadcast(EventPayload::entity(EventType::CheckpointSaved, &checkpoint));
        Ok(checkpoint)
    }

    pub async fn latest_checkpoint(&self, mission_id: &str) -> Result<Option<Checkpoint>> {
        Checkpoint::latest(&self.pool, mission_id).await
    }

    pub async fn list_checkpoints(&self, mission_id: &str) -> Result<Vec<Checkpoint>> {
        Checkpoint::list_by_mission(&self.pool, mission_id).await
    }
}
