use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::{error, info};

use super::{begin_immediate, decode_string_list, DbPool};
use crate::{
    error::Result,
    swarm::reservations::{find_conflicts, FileConflict},
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileReservation {
    pub id: String,
    pub mission_id: String,
    pub worker_id: String,
    /// JSON array of path patterns
    pub patterns: String,
    pub reason: String,
    pub created_at: String,
}

/// Result of an atomic reservation attempt. Conflicts are an expected outcome, not an error.
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    Reserved(FileReservation),
    Conflicts(Vec<FileConflict>),
}

impl FileReservation {
    pub fn pattern_list(&self) -> Vec<String> {
        decode_string_list(&self.patterns)
    }

    /// Checks every other worker's reservations in the mission and records the
    /// new one only when nothing overlaps, all inside one transaction.
    pub async fn reserve_atomic(
        pool: &DbPool,
        id: &str,
        mission_id: &str,
        worker_id: &str,
        patterns: &[String],
        reason: &str,
    ) -> Result<ReserveOutcome> {
        let mut tx = begin_immediate(pool).await.inspect_err(|e| {
            error!(
                "Failed to begin transaction for reserving files for worker {}: {}",
                worker_id, e
            )
        })?;

        let existing = Self::list_on(&mut *tx, mission_id).await?;
        let conflicts = find_conflicts(&existing, worker_id, patterns);
        if !conflicts.is_empty() {
            // Dropping the transaction rolls it back
            return Ok(ReserveOutcome::Conflicts(conflicts));
        }

        let reservation = sqlx::query_as::<_, FileReservation>(
            r#"
            INSERT INTO file_reservations (id, mission_id, worker_id, patterns, reason)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, mission_id, worker_id, patterns, reason, created_at
        "#,
        )
        .bind(id)
        .bind(mission_id)
        .bind(worker_id)
        .bind(serde_json::to_string(patterns)?)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await
        .inspect_err(|e| error!("Failed to record reservation for worker {}: {}", worker_id, e))?;

        tx.commit().await.inspect_err(|e| {
            error!(
                "Failed to commit reservation for worker {}: {}",
                worker_id, e
            )
        })?;

        info!(
            "Worker {} reserved {} pattern(s) in mission {}",
            worker_id,
            patterns.len(),
            mission_id
        );
        Ok(ReserveOutcome::Reserved(reservation))
    }

    /// Removes every reservation the worker holds. Returns how many were removed.
    pub async fn release(pool: &DbPool, worker_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_reservations WHERE worker_id = ?1")
            .bind(worker_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_by_mission(pool: &DbPool, mission_id: &str) -> Result<Vec<FileReservation>> {
        let mut conn = pool.acquire().await?;
        Self::list_on(&mut *conn, mission_id).await
    }

    async fn list_on(conn: &mut SqliteConnection, mission_id: &str) -> Result<Vec<FileReservation>> {
        let reservations = sqlx::query_as::<_, FileReservation>(
            r#"
            SELECT id, mission_id, worker_id, patterns, reason, created_at
            FROM file_reservations
            WHERE mission_id = ?1
            ORDER BY created_at ASC, rowid ASC
        "#,
        )
        .bind(mission_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(reservations)
    }
}
