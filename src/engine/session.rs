use serde::{Deserialize, Serialize};

use crate::modes::ThinkingMode;
use crate::thoughts::HistorySnapshot;
use crate::tree::ThoughtTree;

/// Mutable per-session state, always accessed under the session's mutex.
#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    pub tree: ThoughtTree,
    pub mode: Option<ThinkingMode>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    /// Set under the lock when the session is removed; holders of a stale
    /// handle must treat the session as unknown.
    pub evicted: bool,
}

impl SessionState {
    pub fn new(session_id: &str, now_ms: u64) -> Self {
        Self {
            tree: ThoughtTree::new(session_id),
            mode: None,
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
            evicted: false,
        }
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = self.last_activity_ms.max(now_ms);
    }
}

/// Serializable copy of everything the engine holds for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub tree: ThoughtTree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ThinkingMode>,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub history: HistorySnapshot,
}
