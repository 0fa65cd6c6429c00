use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite};
use tracing::{debug, error};

use super::DbPool;
use crate::error::{Result, SwarmError};

/// Persisted workflow row. The full coordinator state lives in `state_json`;
/// `type`, `phase` and `complexity` are mirrored into columns for filtering.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRecord {
    pub id: String,
    #[sqlx(rename = "type")]
    pub workflow_type: String,
    pub phase: String,
    pub complexity: String,
    pub state_json: String,
    pub created_at: String,
    pub updated_at: String,
}

const ACTIVE_LIMIT: i64 = 10;
const ALL_LIMIT: i64 = 50;

impl WorkflowRecord {
    /// Inserts the row unless one with the same id already exists.
    /// Returns true when this call created it.
    pub async fn insert_if_absent(pool: &DbPool, record: &WorkflowRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO workflows (id, type, phase, complexity, state_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING
        "#,
        )
        .bind(&record.id)
        .bind(&record.workflow_type)
        .bind(&record.phase)
        .bind(&record.complexity)
        .bind(&record.state_json)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(pool)
        .await
        .inspect_err(|e| error!("Failed to insert workflow {}: {}", record.id, e))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert<'e, E>(executor: E, record: &WorkflowRecord) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO workflows (id, type, phase, complexity, state_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                phase = excluded.phase,
                complexity = excluded.complexity,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(&record.id)
        .bind(&record.workflow_type)
        .bind(&record.phase)
        .bind(&record.complexity)
        .bind(&record.state_json)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .execute(executor)
        .await
        .inspect_err(|e| error!("Failed to save workflow {}: {}", record.id, e))?;

        debug!("Saved workflow {} in phase {}", record.id, record.phase);
        Ok(())
    }

    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> Result<Option<WorkflowRecord>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let record = sqlx::query_as::<_, WorkflowRecord>(
            r#"
            SELECT id, type, phase, complexity, state_json, created_at, updated_at
            FROM workflows
            WHERE id = ?1
        "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(record)
    }

    /// Up to ten workflows that are neither complete nor aborted, most recently updated first.
    /// The aborted flag only lives in the state JSON, so it is filtered through `json_extract`.
    pub async fn list_active(pool: &DbPool) -> Result<Vec<WorkflowRecord>> {
        let records = sqlx::query_as::<_, WorkflowRecord>(
            r#"
            SELECT id, type, phase, complexity, state_json, created_at, updated_at
            FROM workflows
            WHERE phase != 'complete'
              AND COALESCE(json_extract(state_json, '$.aborted'), 0) = 0
            ORDER BY updated_at DESC, rowid DESC
            LIMIT ?1
        "#,
        )
        .bind(ACTIVE_LIMIT)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    pub async fn list_all(pool: &DbPool) -> Result<Vec<WorkflowRecord>> {
        let records = sqlx::query_as::<_, WorkflowRecord>(
            r#"
            SELECT id, type, phase, complexity, state_json, created_at, updated_at
            FROM workflows
            ORDER BY updated_at DESC, rowid DESC
            LIMIT ?1
        "#,
        )
        .bind(ALL_LIMIT)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    pub async fn delete(pool: &DbPool, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::not_found("workflow", id));
        }
        Ok(())
    }
}
