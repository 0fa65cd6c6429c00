use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{error, info};

use super::{now_timestamp, DbPool};
use crate::{
    error::{Result, SwarmError},
    swarm::types::MissionStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Mission {
    pub id: String,
    pub workflow_id: String,
    pub title: String,
    pub status: MissionStatus,
    pub base_branch: String,
    pub merge_branch: String,
    pub strategy: String,
    pub strategy_outcome: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMission<'a> {
    pub id: &'a str,
    pub workflow_id: &'a str,
    pub title: &'a str,
    pub base_branch: &'a str,
    pub merge_branch: &'a str,
    pub strategy: &'a str,
}

impl Mission {
    /// Inserts the mission unless its id is already taken. `None` means the id
    /// collided and nothing was written.
    pub async fn create_if_absent(pool: &DbPool, new: NewMission<'_>) -> Result<Option<Mission>> {
        let mission = sqlx::query_as::<_, Mission>(
            r#"
            INSERT INTO missions (id, workflow_id, title, status, base_branch, merge_branch, strategy)
            VALUES (?1, ?2, ?3, 'planning', ?4, ?5, ?6)
            ON CONFLICT(id) DO NOTHING
            RETURNING id, workflow_id, title, status, base_branch, merge_branch,
                      strategy, strategy_outcome, created_at, updated_at
        "#,
        )
        .bind(new.id)
        .bind(new.workflow_id)
        .bind(new.title)
        .bind(new.base_branch)
        .bind(new.merge_branch)
        .bind(new.strategy)
        .fetch_optional(pool)
        .await
        .inspect_err(|e| error!("Failed to create mission {}: {}", new.id, e))?;

        if let Some(mission) = &mission {
            info!("Created mission {} for workflow {}", mission.id, mission.workflow_id);
        }
        Ok(mission)
    }

    pub async fn exists(pool: &DbPool, id: &str) -> Result<bool> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM missions WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<Option<Mission>> {
        let mission = sqlx::query_as::<_, Mission>(
            r#"
            SELECT id, workflow_id, title, status, base_branch, merge_branch,
                   strategy, strategy_outcome, created_at, updated_at
            FROM missions
            WHERE id = ?1
        "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(mission)
    }

    pub async fn list(pool: &DbPool) -> Result<Vec<Mission>> {
        let missions = sqlx::query_as::<_, Mission>(
            r#"
            SELECT id, workflow_id, title, status, base_branch, merge_branch,
                   strategy, strategy_outcome, created_at, updated_at
            FROM missions
            ORDER BY created_at DESC, rowid DESC
        "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(missions)
    }

    pub async fn update_status(pool: &DbPool, id: &str, status: MissionStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE missions SET status = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(status)
                .bind(now_timestamp())
                .bind(id)
                .execute(pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::not_found("mission", id));
        }
        Ok(())
    }

    pub async fn update_strategy_outcome(pool: &DbPool, id: &str, outcome: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE missions SET strategy_outcome = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(outcome)
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::not_found("mission", id));
        }
        Ok(())
    }

    /// Deletes the mission; workers, tickets, signals, forge entries, reservations
    /// and checkpoints go with it through the foreign keys.
    pub async fn delete(pool: &DbPool, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM missions WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::not_found("mission", id));
        }
        info!("Deleted mission {}", id);
        Ok(())
    }
}
