use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, error, info};

use super::{decode_string_list, now_timestamp, DbPool};
use crate::{
    error::{Result, SwarmError},
    swarm::{dependencies, types::TicketStatus},
};

pub const DEFAULT_PRIORITY: i64 = 100;
pub const DEFAULT_DOMAIN: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: String,
    pub mission_id: String,
    pub title: String,
    pub description: String,
    pub domain: String,
    pub priority: i64,
    pub status: TicketStatus,
    pub worker_id: Option<String>,
    /// JSON array of ticket ids
    pub depends_on: String,
    pub result: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for ticket creation. `key` lets entries of one batch refer to each other
/// in `depends_on` before their ids exist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTicket {
    #[serde(default)]
    pub key: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl NewTicket {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn depending_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    fn domain_or_default(&self) -> &str {
        match self.domain.as_deref() {
            Some(domain) if !domain.is_empty() => domain,
            _ => DEFAULT_DOMAIN,
        }
    }
}

const TICKET_COLUMNS: &str = "id, mission_id, title, description, domain, priority, status, \
                              worker_id, depends_on, result, created_at, updated_at";

impl Ticket {
    pub fn dependencies(&self) -> Vec<String> {
        decode_string_list(&self.depends_on)
    }

    /// Inserts one ticket on an open connection or transaction. `depends_on`
    /// must already hold resolved ticket ids.
    pub async fn insert(
        conn: &mut SqliteConnection,
        id: &str,
        mission_id: &str,
        new: &NewTicket,
        depends_on: &[String],
    ) -> Result<Ticket> {
        let depends_json = serde_json::to_string(depends_on)?;
        let sql = format!(
            r#"
            INSERT INTO tickets (id, mission_id, title, description, domain, priority, depends_on)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING {TICKET_COLUMNS}
        "#
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .bind(mission_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(new.domain_or_default())
            .bind(new.priority.unwrap_or(DEFAULT_PRIORITY))
            .bind(depends_json)
            .fetch_one(&mut *conn)
            .await
            .inspect_err(|e| error!("Failed to insert ticket {}: {}", id, e))?;

        debug!("Created ticket {} in mission {}", ticket.id, mission_id);
        Ok(ticket)
    }

    /// Writes an already validated and ordered batch in one transaction.
    pub async fn insert_batch(
        pool: &DbPool,
        mission_id: &str,
        planned: &[dependencies::PlannedTicket],
    ) -> Result<Vec<Ticket>> {
        let mut tx = pool.begin().await.inspect_err(|e| {
            error!(
                "Failed to begin transaction for ticket batch in mission {}: {}",
                mission_id, e
            )
        })?;

        let mut created = Vec::with_capacity(planned.len());
        for plan in planned {
            let ticket = Self::insert(&mut *tx, &plan.id, mission_id, &plan.input, &plan.depends_on)
                .await?;
            created.push(ticket);
        }

        tx.commit().await.inspect_err(|e| {
            error!(
                "Failed to commit ticket batch for mission {}: {}",
                mission_id, e
            )
        })?;

        info!("Created {} tickets in mission {}", created.len(), mission_id);
        Ok(created)
    }

    pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1");
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(ticket)
    }

    /// All tickets of a mission by priority, then creation order.
    pub async fn list_by_mission(pool: &DbPool, mission_id: &str) -> Result<Vec<Ticket>> {
        let sql = format!(
            r#"
            SELECT {TICKET_COLUMNS}
            FROM tickets
            WHERE mission_id = ?1
            ORDER BY priority ASC, created_at ASC, rowid ASC
        "#
        );
        let tickets = sqlx::query_as::<_, Ticket>(&sql)
            .bind(mission_id)
            .fetch_all(pool)
            .await?;

        Ok(tickets)
    }

    pub async fn ids_for_mission(pool: &DbPool, mission_id: &str) -> Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM tickets WHERE mission_id = ?1")
            .bind(mission_id)
            .fetch_all(pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Pending tickets whose dependencies are all done, in list order.
    pub async fn get_dispatchable(pool: &DbPool, mission_id: &str) -> Result<Vec<Ticket>> {
        let tickets = Self::list_by_mission(pool, mission_id).await?;
        Ok(dependencies::filter_dispatchable(tickets))
    }

    /// Assigns a still-pending ticket. Returns false when another caller got there first.
    pub async fn assign_if_pending(
        conn: &mut SqliteConnection,
        ticket_id: &str,
        worker_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET worker_id = ?1, status = 'assigned', updated_at = ?2
            WHERE id = ?3 AND status = 'pending'
        "#,
        )
        .bind(worker_id)
        .bind(now_timestamp())
        .bind(ticket_id)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| {
            error!(
                "Failed to assign ticket {} to worker {}: {}",
                ticket_id, worker_id, e
            )
        })?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_status(
        pool: &DbPool,
        id: &str,
        status: TicketStatus,
        result: &str,
    ) -> Result<Ticket> {
        let sql = format!(
            r#"
            UPDATE tickets
            SET status = ?1, result = ?2, updated_at = ?3
            WHERE id = ?4
            RETURNING {TICKET_COLUMNS}
        "#
        );
        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(status)
            .bind(result)
            .bind(now_timestamp())
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| SwarmError::not_found("ticket", id))?;

        info!("Ticket {} -> {}", id, status);
        Ok(ticket)
    }
}
