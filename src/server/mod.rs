//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state, snapshot persistence and the cleanup task

mod handlers;
mod mcp;
mod writer;

pub use handlers::*;
pub use mcp::*;
pub use writer::SnapshotWriter;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::ThinkingEngine;
use crate::error::AppResult;
use crate::storage::SnapshotStore;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Session trees, history and scoring.
    pub engine: ThinkingEngine,
    /// Snapshot backend; `None` when persistence is disabled.
    pub storage: Option<Arc<dyn SnapshotStore>>,
    writer: Option<SnapshotWriter>,
    /// Held while taking a snapshot and queueing it, so queue order matches
    /// the order the engine changed.
    write_order: Mutex<()>,
}

impl AppState {
    /// Create new application state.
    ///
    /// With storage set this spawns the snapshot writer, so it must run
    /// inside a Tokio runtime.
    pub fn new(config: Config, engine: ThinkingEngine, storage: Option<Arc<dyn SnapshotStore>>) -> Self {
        info!(
            persistence = storage.is_some(),
            "AppState initialized"
        );
        let writer = storage.clone().map(SnapshotWriter::spawn);
        Self {
            config,
            engine,
            storage,
            writer,
            write_order: Mutex::new(()),
        }
    }

    /// Whether snapshots are written.
    pub fn persistence_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Queue a save of the session's current snapshot.
    ///
    /// Deletes for sessions the engine removed since the last call are queued first.
    pub fn persist_session(&self, session_id: &str) {
        let _order = self.write_order.lock().unwrap_or_else(PoisonError::into_inner);
        self.queue_removed();
        let Some(writer) = self.writer.as_ref() else {
            return;
        };
        match self.engine.snapshot(session_id) {
            Ok(snapshot) => writer.save(snapshot),
            Err(e) => debug!(session_id = %session_id, error = %e, "No snapshot to persist"),
        }
    }

    /// Queue deletes for snapshots of sessions the engine removed.
    pub fn sync_removed(&self) {
        let _order = self.write_order.lock().unwrap_or_else(PoisonError::into_inner);
        self.queue_removed();
    }

    /// Wait until every queued snapshot write has reached storage.
    pub async fn flush_snapshots(&self) {
        if let Some(writer) = self.writer.as_ref() {
            writer.flush().await;
        }
    }

    fn queue_removed(&self) {
        let removed = match self.engine.take_removed_sessions() {
            Ok(removed) => removed,
            Err(e) => {
                error!(error = %e, "Failed to read removed sessions");
                return;
            }
        };
        if let Some(writer) = self.writer.as_ref() {
            for session_id in removed {
                writer.delete(session_id);
            }
        }
    }

    /// Load snapshots younger than the max tree age into the engine.
    ///
    /// Unusable snapshots are skipped with a warning. Returns the number restored.
    pub async fn restore_from_storage(&self) -> AppResult<usize> {
        let Some(storage) = self.storage.as_ref() else {
            return Ok(0);
        };

        let cutoff = self
            .engine
            .now_ms()
            .saturating_sub(self.config.tree.max_tree_age_ms);
        let purged = storage.purge_older_than(cutoff).await?;
        let snapshots = storage.load_snapshots_since(cutoff).await?;

        let mut restored = 0;
        for snapshot in snapshots {
            let session_id = snapshot.session_id.clone();
            match self.engine.restore(snapshot) {
                Ok(_) => restored += 1,
                Err(e) => warn!(session_id = %session_id, error = %e, "Skipping snapshot"),
            }
        }
        self.sync_removed();
        self.flush_snapshots().await;

        info!(restored = restored, purged = purged, "Restored sessions from snapshots");
        Ok(restored)
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// Run `cleanup()` every `cleanup_interval_ms` until the task is aborted.
pub fn spawn_cleanup_task(state: SharedState) -> JoinHandle<()> {
    let period = Duration::from_millis(state.config.tree.cleanup_interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.engine.cleanup() {
                Ok(report) => {
                    if !report.evicted.is_empty() {
                        state.sync_removed();
                    }
                }
                Err(e) => error!(error = %e, "Cleanup sweep failed"),
            }
        }
    })
}
