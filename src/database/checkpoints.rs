use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;
use crate::error::Result;

/// Snapshot of mission progress, written by whoever drives the swarm.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Checkpoint {
    pub id: String,
    pub mission_id: String,
    pub progress: i64,
    pub state_json: String,
    pub created_at: String,
}

impl Checkpoint {
    pub async fn create(
        pool: &DbPool,
        id: &str,
        mission_id: &str,
        progress: i64,
        state_json: &str,
    ) -> Result<Checkpoint> {
        let checkpoint = sqlx::query_as::<_, Checkpoint>(
            r#"
            INSERT INTO swarm_checkpoints (id, mission_id, progress, state_json)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, mission_id, progress, state_json, created_at
        "#,
        )
        .bind(id)
        .bind(mission_id)
        .bind(progress)
        .bind(state_json)
        .fetch_one(pool)
        .await?;

        Ok(checkpoint)
    }

    /// `None` when the mission has no checkpoint yet.
    pub async fn latest(pool: &DbPool, mission_id: &str) -> Result<Option<Checkpoint>> {
        let checkpoint = sqlx::query_as::<_, Checkpoint>(
            r#"
            SELECT id, mission_id, progress, state_json, created_at
            FROM swarm_checkpoints
            WHERE mission_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
        "#,
        )
        .bind(mission_id)
        .fetch_optional(pool)
        .await?;

        Ok(checkpoint)
    }

    pub async fn list_by_mission(pool: &DbPool, mission_id: &str) -> Result<Vec<Checkpoint>> {
        let checkpoints = sqlx::query_as::<_, Checkpoint>(
            r#"
            SELECT id, mission_id, progress, state_json, created_at
            FROM swarm_checkpoints
            WHERE mission_id = ?1
            ORDER BY created_at ASC, rowid ASC
        "#,
        )
        .bind(mission_id)
        .fetch_all(pool)
        .await?;

        Ok(checkpoints)
    }
}
