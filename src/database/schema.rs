use sqlx::{sqlite::SqlitePool, Row};
use tracing::{debug, info};

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");

    create_workflows_table(pool).await?;
    create_missions_table(pool).await?;
    create_workers_table(pool).await?;
    create_tickets_table(pool).await?;
    create_signals_table(pool).await?;
    create_forge_entries_table(pool).await?;
    create_file_reservations_table(pool).await?;
    create_checkpoints_table(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}

async fn create_workflows_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating workflows table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id         TEXT PRIMARY KEY,
            type       TEXT NOT NULL DEFAULT 'spec' CHECK (type IN ('spec', 'bug')),
            phase      TEXT NOT NULL DEFAULT 'plan',
            complexity TEXT NOT NULL DEFAULT 'simple' CHECK (complexity IN ('simple', 'complex')),
            state_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflows_phase ON workflows(type, phase)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_missions_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating missions table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS missions (
            id               TEXT PRIMARY KEY,
            workflow_id      TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
            title            TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'planning',
            base_branch      TEXT NOT NULL DEFAULT 'main',
            merge_branch     TEXT NOT NULL DEFAULT '',
            strategy         TEXT NOT NULL DEFAULT '',
            strategy_outcome TEXT NOT NULL DEFAULT '{}',
            created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_workers_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating workers table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id             TEXT PRIMARY KEY,
            mission_id     TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
            agent_type     TEXT NOT NULL,
            worktree_path  TEXT NOT NULL DEFAULT '',
            branch_name    TEXT NOT NULL DEFAULT '',
            status         TEXT NOT NULL DEFAULT 'pending'
                           CHECK (status IN ('pending', 'active', 'stale', 'done', 'failed', 'killed')),
            session_id     TEXT,
            last_heartbeat TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_workers_mission ON workers(mission_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_tickets_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating tickets table");
    // worker_id is nulled rather than cascaded so a deleted worker never drops tickets
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id          TEXT PRIMARY KEY,
            mission_id  TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            domain      TEXT NOT NULL DEFAULT 'general',
            priority    INTEGER NOT NULL DEFAULT 100,
            status      TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'assigned', 'in_progress', 'done', 'failed', 'blocked')),
            worker_id   TEXT REFERENCES workers(id) ON DELETE SET NULL,
            depends_on  TEXT NOT NULL DEFAULT '[]',
            result      TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_mission ON tickets(mission_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_signals_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating signals table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id          TEXT PRIMARY KEY,
            mission_id  TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
            from_worker TEXT NOT NULL,
            to_worker   TEXT NOT NULL DEFAULT '*',
            type        TEXT NOT NULL,
            payload     TEXT NOT NULL DEFAULT '{}',
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_to ON signals(to_worker, read)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_mission ON signals(mission_id)")
        .execute(pool)
        .await?;
    Ok(())
}

async fn create_forge_entries_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating forge_entries table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS forge_entries (
            id             TEXT PRIMARY KEY,
            mission_id     TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
            worker_id      TEXT NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
            branch_name    TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'pending'
                           CHECK (status IN ('pending', 'merging', 'merged', 'conflict', 'failed')),
            conflict_files TEXT NOT NULL DEFAULT '[]',
            merged_at      TEXT,
            created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_file_reservations_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating file_reservations table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_reservations (
            id         TEXT PRIMARY KEY,
            mission_id TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
            worker_id  TEXT NOT NULL,
            patterns   TEXT NOT NULL DEFAULT '[]',
            reason     TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reservations_mission ON file_reservations(mission_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_checkpoints_table(pool: &SqlitePool) -> Result<()> {
    debug!("Creating swarm_checkpoints table");
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS swarm_checkpoints (
            id         TEXT PRIMARY KEY,
            mission_id TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
            progress   INTEGER NOT NULL DEFAULT 0,
            state_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
    "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_database_info(pool: &SqlitePool) -> Result<String> {
    let row = sqlx::query("SELECT sqlite_version() as version")
        .fetch_one(pool)
        .await?;

    let version: String = row.get("version");
    Ok(version)
}
