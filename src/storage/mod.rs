//! Snapshot persistence for session state.
//!
//! The engine itself never touches disk. The server saves a
//! [`SessionSnapshot`] after mutating calls, deletes snapshots of removed
//! sessions, and restores recent snapshots at startup.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::SessionSnapshot;
use crate::error::StorageResult;

/// Listing entry for a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub session_id: String,
    pub node_count: u64,
    pub history_size: u64,
    /// Last activity recorded in the snapshot, in epoch milliseconds.
    pub last_activity_ms: u64,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
}

impl SnapshotSummary {
    pub fn from_snapshot(snapshot: &SessionSnapshot, saved_at: DateTime<Utc>) -> Self {
        Self {
            session_id: snapshot.session_id.clone(),
            node_count: snapshot.tree.len() as u64,
            history_size: snapshot.history.history.len() as u64,
            last_activity_ms: snapshot.last_activity_ms,
            saved_at,
        }
    }
}

/// Persistence operations for session snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace the snapshot for its session.
    async fn save_snapshot(&self, snapshot: &SessionSnapshot) -> StorageResult<()>;
    /// Load one session's snapshot.
    async fn load_snapshot(&self, session_id: &str) -> StorageResult<Option<SessionSnapshot>>;
    /// Snapshots whose last activity is at or after `min_last_activity_ms`.
    async fn load_snapshots_since(&self, min_last_activity_ms: u64) -> StorageResult<Vec<SessionSnapshot>>;
    /// Delete one session's snapshot. Returns whether a row existed.
    async fn delete_snapshot(&self, session_id: &str) -> StorageResult<bool>;
    /// All stored snapshots, most recently active first.
    async fn list_snapshots(&self) -> StorageResult<Vec<SnapshotSummary>>;
    /// Delete snapshots whose last activity is before `cutoff_ms`. Returns the count.
    async fn purge_older_than(&self, cutoff_ms: u64) -> StorageResult<u64>;
}
