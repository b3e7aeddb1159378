//! Ordered snapshot writes.
//!
//! Every save and delete goes through one task reading a channel, so the
//! store sees them in the order they were queued.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::engine::SessionSnapshot;
use crate::storage::SnapshotStore;

enum WriteCommand {
    Save(Box<SessionSnapshot>),
    Delete(String),
    Flush(oneshot::Sender<()>),
}

/// Queue in front of a [`SnapshotStore`], drained by a single background task.
pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl SnapshotWriter {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(storage: Arc<dyn SnapshotStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriteCommand::Save(snapshot) => {
                        if let Err(e) = storage.save_snapshot(&snapshot).await {
                            warn!(session_id = %snapshot.session_id, error = %e, "Failed to save snapshot");
                        }
                    }
                    WriteCommand::Delete(session_id) => {
                        if let Err(e) = storage.delete_snapshot(&session_id).await {
                            warn!(session_id = %session_id, error = %e, "Failed to delete snapshot");
                        }
                    }
                    WriteCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Snapshot writer stopped");
        });
        Self { tx }
    }

    pub fn save(&self, snapshot: SessionSnapshot) {
        self.send(WriteCommand::Save(Box::new(snapshot)));
    }

    pub fn delete(&self, session_id: String) {
        self.send(WriteCommand::Delete(session_id));
    }

    /// Wait until everything queued before this call has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.send(WriteCommand::Flush(done));
        let _ = wait.await;
    }

    fn send(&self, command: WriteCommand) {
        if self.tx.send(command).is_err() {
            warn!("Snapshot writer is gone; dropping write");
        }
    }
}
