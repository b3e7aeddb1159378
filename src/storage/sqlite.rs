use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{SnapshotStore, SnapshotSummary};
use crate::config::DatabaseConfig;
use crate::engine::SessionSnapshot;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed snapshot storage
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at the configured path.
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        let path = config.path.as_deref().ok_or_else(|| StorageError::Connection {
            message: "DATABASE_PATH is not set; snapshot persistence is disabled".to_string(),
        })?;
        Self::open(path, config.max_connections).await
    }

    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path, max_connections: u32) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        info!(path = %path.display(), "Snapshot database ready");
        Ok(storage)
    }

    /// In-memory database for tests. Limited to one connection, since every
    /// SQLite memory connection is its own database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        debug!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        debug!("Database migrations completed");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for SqliteStorage {
    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> StorageResult<()> {
        let body = serde_json::to_string(snapshot).map_err(|e| StorageError::Serialization {
            message: format!("session {}: {}", snapshot.session_id, e),
        })?;
        let summary = SnapshotSummary::from_snapshot(snapshot, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO session_snapshots (session_id, snapshot, node_count, history_size, last_activity_ms, saved_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                node_count = excluded.node_count,
                history_size = excluded.history_size,
                last_activity_ms = excluded.last_activity_ms,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(&summary.session_id)
        .bind(&body)
        .bind(to_sql_int(summary.node_count))
        .bind(to_sql_int(summary.history_size))
        .bind(to_sql_int(summary.last_activity_ms))
        .bind(summary.saved_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            session_id = %summary.session_id,
            node_count = summary.node_count,
            "Saved session snapshot"
        );
        Ok(())
    }

    async fn load_snapshot(&self, session_id: &str) -> StorageResult<Option<SessionSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT session_id, snapshot
            FROM session_snapshots
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SnapshotRow::decode).transpose()
    }

    async fn load_snapshots_since(&self, min_last_activity_ms: u64) -> StorageResult<Vec<SessionSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT session_id, snapshot
            FROM session_snapshots
            WHERE last_activity_ms >= ?
            ORDER BY last_activity_ms ASC
            "#,
        )
        .bind(to_sql_int(min_last_activity_ms))
        .fetch_all(&self.pool)
        .await?;

        // A corrupt row must not keep every other session from loading.
        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let session_id = row.session_id.clone();
            match row.decode() {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(session_id = %session_id, error = %e, "Skipping unreadable snapshot"),
            }
        }
        Ok(snapshots)
    }

    async fn delete_snapshot(&self, session_id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM session_snapshots WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_snapshots(&self) -> StorageResult<Vec<SnapshotSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT session_id, node_count, history_size, last_activity_ms, saved_at
            FROM session_snapshots
            ORDER BY last_activity_ms DESC, session_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn purge_older_than(&self, cutoff_ms: u64) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM session_snapshots WHERE last_activity_ms < ?")
            .bind(to_sql_int(cutoff_ms))
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged = purged, cutoff_ms = cutoff_ms, "Purged stale snapshots");
        }
        Ok(purged)
    }
}

/// SQLite integers are signed 64-bit.
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    session_id: String,
    snapshot: String,
}

impl SnapshotRow {
    fn decode(self) -> StorageResult<SessionSnapshot> {
        serde_json::from_str(&self.snapshot).map_err(|e| StorageError::Serialization {
            message: format!("session {}: {}", self.session_id, e),
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    session_id: String,
    node_count: i64,
    history_size: i64,
    last_activity_ms: i64,
    saved_at: String,
}

impl From<SummaryRow> for SnapshotSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            session_id: row.session_id,
            node_count: row.node_count.max(0) as u64,
            history_size: row.history_size.max(0) as u64,
            last_activity_ms: row.last_activity_ms.max(0) as u64,
            saved_at: DateTime::parse_from_rfc3339(&row.saved_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}
