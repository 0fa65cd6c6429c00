use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;

use super::{decode_string_list, now_timestamp, DbPool};
use crate::{
    error::{Result, SwarmError},
    swarm::types::ForgeStatus,
};

/// A worker branch queued for merging into the mission's integration branch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ForgeEntry {
    pub id: String,
    pub mission_id: String,
    pub worker_id: String,
    pub branch_name: String,
    pub status: ForgeStatus,
    /// JSON array of paths
    pub conflict_files: String,
    pub merged_at: Option<String>,
    pub created_at: String,
}

impl ForgeEntry {
    pub fn conflicts(&self) -> Vec<String> {
        decode_string_list(&self.conflict_files)
    }

    pub async fn create(
        pool: &DbPool,
        id: &str,
        mission_id: &str,
        worker_id: &str,
        branch_name: &str,
    ) -> Result<ForgeEntry> {
        let entry = sqlx::query_as::<_, ForgeEntry>(
            r#"
            INSERT INTO forge_entries (id, mission_id, worker_id, branch_name, status)
            VALUES (?1, ?2, ?3, ?4, 'pending')
            RETURNING id, mission_id, worker_id, branch_name, status, conflict_files, merged_at, created_at
        "#,
        )
        .bind(id)
        .bind(mission_id)
        .bind(worker_id)
        .bind(branch_name)
        .fetch_one(pool)
        .await?;

        info!("Queued branch {} for merge ({})", branch_name, entry.id);
        Ok(entry)
    }

    /// `merged_at` is stamped for `merged` and cleared for every other status.
    pub async fn update_status(
        pool: &DbPool,
        id: &str,
        status: ForgeStatus,
        conflict_files: &[String],
    ) -> Result<ForgeEntry> {
        let merged_at = (status == ForgeStatus::Merged).then(now_timestamp);
        let entry = sqlx::query_as::<_, ForgeEntry>(
            r#"
            UPDATE forge_entries
            SET status = ?1, conflict_files = ?2, merged_at = ?3
            WHERE id = ?4
            RETURNING id, mission_id, worker_id, branch_name, status, conflict_files, merged_at, created_at
        "#,
        )
        .bind(status)
        .bind(serde_json::to_string(conflict_files)?)
        .bind(merged_at)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| SwarmError::not_found("forge entry", id))?;

        Ok(entry)
    }

    pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<Option<ForgeEntry>> {
        let entry = sqlx::query_as::<_, ForgeEntry>(
            r#"
            SELECT id, mission_id, worker_id, branch_name, status, conflict_files, merged_at, created_at
            FROM forge_entries
            WHERE id = ?1
        "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(entry)
    }

    pub async fn list_by_mission(pool: &DbPool, mission_id: &str) -> Result<Vec<ForgeEntry>> {
        let entries = sqlx::query_as::<_, ForgeEntry>(
            r#"
            SELECT id, mission_id, worker_id, branch_name, status, conflict_files, merged_at, created_at
            FROM forge_entries
            WHERE mission_id = ?1
            ORDER BY created_at ASC, rowid ASC
        "#,
        )
        .bind(mission_id)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }
}
