use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, error, info};

use super::{now_timestamp, DbPool};
use crate::{
    error::{Result, SwarmError},
    swarm::types::WorkerStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Worker {
    pub id: String,
    pub mission_id: String,
    pub agent_type: String,
    pub worktree_path: String,
    pub branch_name: String,
    pub status: WorkerStatus,
    pub session_id: Option<String>,
    pub last_heartbeat: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWorker<'a> {
    pub id: &'a str,
    pub mission_id: &'a str,
    pub agent_type: &'a str,
    pub worktree_path: &'a str,
    pub branch_name: &'a str,
}

impl Worker {
    pub async fn create(pool: &DbPool, new: NewWorker<'_>) -> Result<Worker> {
        let worker = sqlx::query_as::<_, Worker>(
            r#"
            INSERT INTO workers (id, mission_id, agent_type, worktree_path, branch_name, status)
            VALUES (?1, ?2, ?3, ?4, ?5, 'pending')
            RETURNING id, mission_id, agent_type, worktree_path, branch_name, status,
                      session_id, last_heartbeat, created_at, updated_at
        "#,
        )
        .bind(new.id)
        .bind(new.mission_id)
        .bind(new.agent_type)
        .bind(new.worktree_path)
        .bind(new.branch_name)
        .fetch_one(pool)
        .await
        .inspect_err(|e| error!("Failed to insert worker {}: {}", new.id, e))?;

        info!(
            "Registered worker {} ({}) for mission {}",
            worker.id, worker.agent_type, worker.mission_id
        );
        Ok(worker)
    }

    pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<Option<Worker>> {
        let worker = sqlx::query_as::<_, Worker>(
            r#"
            SELECT id, mission_id, agent_type, worktree_path, branch_name, status,
                   session_id, last_heartbeat, created_at, updated_at
            FROM workers
            WHERE id = ?1
        "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(worker)
    }

    pub async fn list_by_mission(pool: &DbPool, mission_id: &str) -> Result<Vec<Worker>> {
        let workers = sqlx::query_as::<_, Worker>(
            r#"
            SELECT id, mission_id, agent_type, worktree_path, branch_name, status,
                   session_id, last_heartbeat, created_at, updated_at
            FROM workers
            WHERE mission_id = ?1
            ORDER BY created_at ASC, rowid ASC
        "#,
        )
        .bind(mission_id)
        .fetch_all(pool)
        .await?;

        Ok(workers)
    }

    /// Stamps the heartbeat and flips the worker to active. Terminal workers are
    /// left untouched and reported as such.
    pub async fn heartbeat(pool: &DbPool, id: &str) -> Result<()> {
        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET last_heartbeat = ?1, status = 'active', updated_at = ?1
            WHERE id = ?2 AND status IN ('pending', 'active', 'stale')
        "#,
        )
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!("Heartbeat from worker {}", id);
            return Ok(());
        }

        match Self::get_by_id(pool, id).await? {
            None => Err(SwarmError::not_found("worker", id)),
            Some(worker) => Err(SwarmError::TerminalWorker {
                id: id.to_string(),
                status: worker.status.to_string(),
            }),
        }
    }

    /// Sets a new status unless the worker already reached a terminal one.
    pub async fn update_status(pool: &DbPool, id: &str, status: WorkerStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status NOT IN ('done', 'failed', 'killed')
        "#,
        )
        .bind(status)
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Worker {} -> {}", id, status);
            return Ok(());
        }

        match Self::get_by_id(pool, id).await? {
            None => Err(SwarmError::not_found("worker", id)),
            Some(worker) => Err(SwarmError::TerminalWorker {
                id: id.to_string(),
                status: worker.status.to_string(),
            }),
        }
    }

    /// Marks pending/active workers whose last heartbeat is older than `cutoff` as stale.
    pub async fn mark_stale(pool: &DbPool, mission_id: &str, cutoff: &str) -> Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE workers
            SET status = 'stale', updated_at = ?1
            WHERE mission_id = ?2
              AND status IN ('pending', 'active')
              AND last_heartbeat < ?3
            RETURNING id
        "#,
        )
        .bind(now_timestamp())
        .bind(mission_id)
        .bind(cutoff)
        .fetch_all(pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
