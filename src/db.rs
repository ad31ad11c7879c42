use std::fs;
use std::path::Path;

use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;

use crate::models::snapshot::Snapshot;

pub type DbPool = SqlitePool;

/// Row key holding the local training snapshot
pub const SNAPSHOT_KEY: &str = "cycling-progression-data-v2";

/// Row key marking a running import, shared by every process using the file
pub const IMPORT_LOCK_KEY: &str = "import-lock";

/// An import lock older than this is left over from a crashed process
pub const IMPORT_LOCK_STALE_MINUTES: i64 = 60;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
  #[error("Database error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration failed: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("Failed to prepare data directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("Stored data is not valid JSON: {0}")]
  Decode(#[from] serde_json::Error),
}

impl Serialize for DbError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Connection
/// ---------------------------------------------------------------------------

/// Open (creating if needed) the database file and run migrations
pub async fn initialize_db(db_path: &Path) -> Result<DbPool, DbError> {
  if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }
  let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

  tracing::info!(path = %db_path.display(), "Initializing database");

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(&db_url)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  tracing::info!("Database initialized successfully");

  Ok(pool)
}

/// ---------------------------------------------------------------------------
/// Snapshot Persistence
/// ---------------------------------------------------------------------------

/// Load the stored snapshot, None on first run.
///
/// Takes the pool or a connection inside an open transaction.
pub async fn load_snapshot<'e, E>(executor: E) -> Result<Option<Snapshot>, DbError>
where
  E: Executor<'e, Database = Sqlite>,
{
  let row: Option<(String,)> = sqlx::query_as("SELECT value FROM app_state WHERE key = ?1")
    .bind(SNAPSHOT_KEY)
    .fetch_optional(executor)
    .await?;

  match row {
    Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
    None => Ok(None),
  }
}

/// Write the snapshot, replacing any previous copy
pub async fn save_snapshot<'e, E>(executor: E, snapshot: &Snapshot) -> Result<(), DbError>
where
  E: Executor<'e, Database = Sqlite>,
{
  let json = serde_json::to_string(snapshot)?;

  sqlx::query(
    r#"
    INSERT INTO app_state (key, value, updated_at)
    VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    ON CONFLICT(key) DO UPDATE SET
      value = excluded.value,
      updated_at = excluded.updated_at
    "#,
  )
  .bind(SNAPSHOT_KEY)
  .bind(json)
  .execute(executor)
  .await?;

  tracing::debug!(rides = snapshot.ride_count(), "Snapshot saved");
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Import Lock
/// ---------------------------------------------------------------------------

/// Value identifying this holder of the import lock
pub fn import_lock_owner() -> String {
  format!(
    "{}-{}",
    std::process::id(),
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
  )
}

/// Claim the import lock row for `owner`. False when another import holds a
/// lock that is not yet stale.
pub async fn try_acquire_import_lock(pool: &DbPool, owner: &str) -> Result<bool, DbError> {
  let cleared = sqlx::query(
    r#"
    DELETE FROM app_state
    WHERE key = ?1 AND updated_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2)
    "#,
  )
  .bind(IMPORT_LOCK_KEY)
  .bind(format!("-{} minutes", IMPORT_LOCK_STALE_MINUTES))
  .execute(pool)
  .await?;
  if cleared.rows_affected() > 0 {
    tracing::warn!("Cleared a stale import lock");
  }

  let claimed = sqlx::query(
    r#"
    INSERT INTO app_state (key, value, updated_at)
    VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    ON CONFLICT(key) DO NOTHING
    "#,
  )
  .bind(IMPORT_LOCK_KEY)
  .bind(owner)
  .execute(pool)
  .await?;

  Ok(claimed.rows_affected() == 1)
}

/// Drop the import lock if `owner` still holds it
pub async fn release_import_lock(pool: &DbPool, owner: &str) -> Result<(), DbError> {
  sqlx::query("DELETE FROM app_state WHERE key = ?1 AND value = ?2")
    .bind(IMPORT_LOCK_KEY)
    .bind(owner)
    .execute(pool)
    .await?;
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
