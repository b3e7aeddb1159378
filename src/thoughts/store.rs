use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ThoughtRecord;
use crate::error::{AppError, AppResult};
use crate::history::CircularBuffer;

/// Per-session history: bounded recent thoughts plus per-branch lists.
#[derive(Debug, Clone)]
struct SessionHistory {
    buffer: CircularBuffer<ThoughtRecord>,
    /// Branch ids in first-seen order.
    branch_order: Vec<String>,
    branches: HashMap<String, Vec<ThoughtRecord>>,
}

impl SessionHistory {
    fn new(capacity: usize) -> AppResult<Self> {
        Ok(Self {
            buffer: CircularBuffer::new(capacity)?,
            branch_order: Vec::new(),
            branches: HashMap::new(),
        })
    }

    fn push(&mut self, record: ThoughtRecord) {
        if let Some(branch_id) = record.branch_id.clone() {
            if !self.branches.contains_key(&branch_id) {
                self.branch_order.push(branch_id.clone());
            }
            self.branches
                .entry(branch_id)
                .or_default()
                .push(record.clone());
        }
        self.buffer.add(record);
    }
}

/// Snapshot of a session's history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub history: Vec<ThoughtRecord>,
    /// Branch lists in first-seen order.
    pub branches: Vec<(String, Vec<ThoughtRecord>)>,
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub history_size: usize,
    pub history_capacity: usize,
    pub branch_count: usize,
    pub session_count: usize,
}

/// Thought history keyed by session id.
///
/// Reads against an unknown session return empty results: a session with no
/// thoughts yet is indistinguishable from one that never existed.
#[derive(Debug)]
pub struct SessionThoughtStore {
    capacity: usize,
    sessions: HashMap<String, SessionHistory>,
}

impl SessionThoughtStore {
    /// Create a store whose per-session buffers hold `capacity` records.
    pub fn new(capacity: usize) -> AppResult<Self> {
        if capacity == 0 {
            return Err(AppError::InvalidCapacity { capacity });
        }
        Ok(Self {
            capacity,
            sessions: HashMap::new(),
        })
    }

    /// Record a thought into its session's buffer and branch list.
    pub fn add_thought(&mut self, record: ThoughtRecord) -> AppResult<()> {
        if !self.sessions.contains_key(&record.session_id) {
            let history = SessionHistory::new(self.capacity)?;
            self.sessions.insert(record.session_id.clone(), history);
        }
        let history = self
            .sessions
            .get_mut(&record.session_id)
            .ok_or_else(|| AppError::Internal {
                message: format!("history for session {} vanished", record.session_id),
            })?;
        debug!(
            session_id = %record.session_id,
            thought_number = record.thought_number,
            branch_id = ?record.branch_id,
            "Stored thought"
        );
        history.push(record);
        Ok(())
    }

    /// Most recent `limit` records (all when `None`), oldest first.
    pub fn get_history(&self, session_id: &str, limit: Option<usize>) -> Vec<ThoughtRecord> {
        self.sessions
            .get(session_id)
            .map(|h| h.buffer.get_all(limit).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Known branch ids in first-seen order.
    pub fn get_branches(&self, session_id: &str) -> Vec<String> {
        self.sessions
            .get(session_id)
            .map(|h| h.branch_order.clone())
            .unwrap_or_default()
    }

    pub fn get_branch_thoughts(&self, session_id: &str, branch_id: &str) -> Vec<ThoughtRecord> {
        self.sessions
            .get(session_id)
            .and_then(|h| h.branches.get(branch_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn branch_len(&self, session_id: &str, branch_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .and_then(|h| h.branches.get(branch_id))
            .map_or(0, Vec::len)
    }

    /// Sizes for one session, or totals across all sessions when `None`.
    pub fn get_stats(&self, session_id: Option<&str>) -> StoreStats {
        match session_id {
            Some(id) => {
                let history = self.sessions.get(id);
                StoreStats {
                    history_size: history.map_or(0, |h| h.buffer.len()),
                    history_capacity: self.capacity,
                    branch_count: history.map_or(0, |h| h.branch_order.len()),
                    session_count: self.sessions.len(),
                }
            }
            None => StoreStats {
                history_size: self.sessions.values().map(|h| h.buffer.len()).sum(),
                history_capacity: self.capacity,
                branch_count: self.sessions.values().map(|h| h.branch_order.len()).sum(),
                session_count: self.sessions.len(),
            },
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Remove a pruned thought from its branch list; a branch left empty is
    /// forgotten. The recent-history buffer is left alone.
    pub fn drop_from_branch(&mut self, record: &ThoughtRecord) -> bool {
        let Some(branch_id) = record.branch_id.as_deref() else {
            return false;
        };
        let Some(history) = self.sessions.get_mut(&record.session_id) else {
            return false;
        };
        let Some(records) = history.branches.get_mut(branch_id) else {
            return false;
        };
        let Some(pos) = records.iter().position(|r| r == record) else {
            return false;
        };
        records.remove(pos);
        if records.is_empty() {
            history.branches.remove(branch_id);
            history.branch_order.retain(|id| id != branch_id);
        }
        true
    }

    /// Drop a session's history. Returns whether it existed.
    pub fn remove_session(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn snapshot(&self, session_id: &str) -> HistorySnapshot {
        match self.sessions.get(session_id) {
            Some(h) => HistorySnapshot {
                history: h.buffer.iter().cloned().collect(),
                branches: h
                    .branch_order
                    .iter()
                    .map(|id| (id.clone(), h.branches.get(id).cloned().unwrap_or_default()))
                    .collect(),
            },
            None => HistorySnapshot::default(),
        }
    }

    /// Replace a session's history from a snapshot.
    pub fn restore(&mut self, session_id: &str, snapshot: HistorySnapshot) -> AppResult<()> {
        let mut history = SessionHistory::new(self.capacity)?;
        for record in snapshot.history {
            history.buffer.add(record);
        }
        for (branch_id, records) in snapshot.branches {
            history.branch_order.push(branch_id.clone());
            history.branches.insert(branch_id, records);
        }
        self.sessions.insert(session_id.to_string(), history);
        Ok(())
    }
}
