pub mod checkpoints;
pub mod forge;
pub mod missions;
pub mod reservations;
pub mod schema;
pub mod signals;
pub mod tickets;
pub mod workers;
pub mod workflows;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite, Transaction,
};
use std::{fs, path::Path, str::FromStr, time::Duration};
use tracing::info;

use crate::error::Result;

pub type DbPool = Pool<Sqlite>;

/// Ensures the directory holding the database file exists
pub fn ensure_directory_structure(database_path: &str) -> Result<()> {
    // Handle SQLite URL format (remove "sqlite:" prefix and query string if present)
    let clean_path = database_path
        .strip_prefix("sqlite:")
        .unwrap_or(database_path);
    let clean_path = clean_path.split('?').next().unwrap_or(clean_path);
    let db_path = Path::new(clean_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
            info!("Ensured database directory: {}", parent.display());
        }
    }

    Ok(())
}

pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    info!("Connecting to SQLite database");

    ensure_directory_structure(database_url)?;

    let connect_opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(connect_opts)
        .await?;

    info!("Running database migrations");
    schema::run_migrations(&pool).await?;

    Ok(pool)
}

pub async fn close_pool(pool: DbPool) {
    info!("Closing database connection pool");
    pool.close().await;
}

/// Opens a transaction that takes the write lock up front. Read-then-write
/// sequences must use this: a deferred transaction that read first cannot
/// upgrade under WAL and fails with SQLITE_BUSY instead of waiting.
pub async fn begin_immediate(pool: &DbPool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// UTC timestamp in the format the schema defaults use, so string comparison orders correctly
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

pub(crate) fn decode_string_list(raw: &str) -> Vec<String> {
    if raw.is_empty() || raw == "[]" {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_default()
}
