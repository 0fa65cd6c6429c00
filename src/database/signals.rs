use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, error};

use super::{begin_immediate, DbPool};
use crate::{
    error::{Result, SwarmError},
    swarm::types::BROADCAST,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Signal {
    pub id: String,
    pub mission_id: String,
    pub from_worker: String,
    pub to_worker: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub signal_type: String,
    pub payload: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewSignal<'a> {
    pub mission_id: &'a str,
    pub from_worker: &'a str,
    pub to_worker: &'a str,
    pub signal_type: &'a str,
    pub payload: &'a str,
}

impl Signal {
    /// Empty recipients become a broadcast and empty payloads an empty JSON object.
    pub async fn insert(
        conn: &mut SqliteConnection,
        id: &str,
        new: &NewSignal<'_>,
    ) -> Result<Signal> {
        let to_worker = if new.to_worker.is_empty() {
            BROADCAST
        } else {
            new.to_worker
        };
        let payload = if new.payload.is_empty() {
            "{}"
        } else {
            new.payload
        };

        let signal = sqlx::query_as::<_, Signal>(
            r#"
            INSERT INTO signals (id, mission_id, from_worker, to_worker, type, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, mission_id, from_worker, to_worker, type, payload, read, created_at
        "#,
        )
        .bind(id)
        .bind(new.mission_id)
        .bind(new.from_worker)
        .bind(to_worker)
        .bind(new.signal_type)
        .bind(payload)
        .fetch_one(&mut *conn)
        .await
        .inspect_err(|e| {
            error!(
                "Failed to insert {} signal for {}: {}",
                new.signal_type, to_worker, e
            )
        })?;

        debug!(
            "Signal {} {} -> {} ({})",
            signal.signal_type, signal.from_worker, signal.to_worker, signal.mission_id
        );
        Ok(signal)
    }

    /// Returns every unread signal addressed to `worker_id` or broadcast within the
    /// worker's mission, oldest first, and marks exactly that set as read in the
    /// same transaction.
    pub async fn poll_and_ack(pool: &DbPool, worker_id: &str) -> Result<Vec<Signal>> {
        let mut tx = begin_immediate(pool).await.inspect_err(|e| {
            error!(
                "Failed to begin transaction for polling signals of {}: {}",
                worker_id, e
            )
        })?;

        let mission_id: String =
            sqlx::query_scalar("SELECT mission_id FROM workers WHERE id = ?1")
                .bind(worker_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| SwarmError::not_found("worker", worker_id))?;

        let signals = sqlx::query_as::<_, Signal>(
            r#"
            SELECT id, mission_id, from_worker, to_worker, type, payload, read, created_at
            FROM signals
            WHERE mission_id = ?1 AND (to_worker = ?2 OR to_worker = ?3) AND read = 0
            ORDER BY created_at ASC, rowid ASC
        "#,
        )
        .bind(&mission_id)
        .bind(worker_id)
        .bind(BROADCAST)
        .fetch_all(&mut *tx)
        .await?;

        if !signals.is_empty() {
            let mut update: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE signals SET read = 1 WHERE id IN (");
            let mut ids = update.separated(", ");
            for signal in &signals {
                ids.push_bind(signal.id.as_str());
            }
            ids.push_unseparated(")");
            update.build().execute(&mut *tx).await?;
        }

        tx.commit().await.inspect_err(|e| {
            error!(
                "Failed to commit signal poll for worker {}: {}",
                worker_id, e
            )
        })?;

        Ok(signals)
    }

    pub async fn list_by_mission(pool: &DbPool, mission_id: &str) -> Result<Vec<Signal>> {
        let signals = sqlx::query_as::<_, Signal>(
            r#"
            SELECT id, mission_id, from_worker, to_worker, type, payload, read, created_at
            FROM signals
            WHERE mission_id = ?1
            ORDER BY created_at ASC, rowid ASC
        "#,
        )
        .bind(mission_id)
        .fetch_all(pool)
        .await?;

        Ok(signals)
    }
}
