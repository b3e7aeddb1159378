//! Thinking engine: the single entry point for thought-tree operations.
//!
//! Each session lives behind its own mutex; the session map and the history
//! store have their own locks. Lock order is session map, then session, then
//! store. Cross-session sweeps only ever `try_lock` a session, so a sweep
//! never waits on a caller and a busy session is retried on the next sweep.

mod results;
mod session;

pub use results::*;
pub use session::SessionSnapshot;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{Config, HistoryConfig, TreeConfig};
use crate::error::{AppError, AppResult};
use crate::lifecycle::{CleanupReport, LifecycleState, TreeLifecycle};
use crate::mcts::{MctsEngine, Strategy, Suggestions, TreeView};
use crate::modes::{ThinkingMode, ThinkingModeConfig};
use crate::thoughts::{SessionThoughtStore, ThoughtParams, ThoughtRecord};
use crate::tree::{NodeView, TreeStats};
use session::SessionState;

type SessionHandle = Arc<Mutex<SessionState>>;

/// Session trees, history and scoring behind one thread-safe facade.
pub struct ThinkingEngine {
    tree_config: TreeConfig,
    history_config: HistoryConfig,
    clock: Arc<dyn Clock>,
    mcts: MctsEngine,
    lifecycle: TreeLifecycle,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    store: Mutex<SessionThoughtStore>,
    /// Sessions removed since the last [`ThinkingEngine::take_removed_sessions`].
    removed: Mutex<Vec<String>>,
}

impl ThinkingEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> AppResult<Self> {
        config.validate()?;
        let engine = Self {
            tree_config: config.tree.clone(),
            history_config: config.history.clone(),
            clock,
            mcts: MctsEngine::new(config.tree.exploration_constant)?,
            lifecycle: TreeLifecycle::new(&config.tree)?,
            sessions: RwLock::new(HashMap::new()),
            store: Mutex::new(SessionThoughtStore::new(config.history.max_history_size)?),
            removed: Mutex::new(Vec::new()),
        };
        info!(
            max_nodes_per_tree = config.tree.max_nodes_per_tree,
            max_sessions = config.tree.max_sessions,
            max_tree_age_ms = config.tree.max_tree_age_ms,
            exploration_constant = config.tree.exploration_constant,
            enable_auto_tree = config.tree.enable_auto_tree,
            "Thinking engine initialized"
        );
        Ok(engine)
    }

    pub fn tree_config(&self) -> &TreeConfig {
        &self.tree_config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ========================================================================
    // Thought recording
    // ========================================================================

    /// Validate a thought, attach it to its session tree and record it in history.
    ///
    /// Every failure leaves the session exactly as it was.
    pub fn record_thought(&self, params: ThoughtParams) -> AppResult<RecordThoughtResult> {
        let now = self.clock.now_ms();
        let record = params.into_record(self.history_config.max_thought_length, now)?;
        let session_id = record.session_id.clone();

        let (handle, evicted_sessions) = match self.handle(&session_id)? {
            Some(handle) => (handle, Vec::new()),
            None => {
                if !self.tree_config.enable_auto_tree {
                    return Err(AppError::session_not_found(&session_id));
                }
                // A fresh tree can hold no reference target; reject before
                // creating anything.
                if record.referenced_thought().is_some() {
                    return Err(dangling_reference(&record));
                }
                let (handle, _, evicted) = self.admit_session(&session_id, now)?;
                (handle, evicted)
            }
        };

        let mut state = lock_live(&handle, &session_id)?;
        let placement = state
            .tree
            .placement_for(&record)
            .ok_or_else(|| dangling_reference(&record))?;
        let pruned = self.lifecycle.make_room(&mut state.tree, placement.parent())?;
        let attached = state.tree.insert(record.clone(), placement)?;
        state.touch(now);

        let mut warnings = Vec::new();
        if !pruned.is_empty() {
            warnings.push(format!(
                "Pruned {} inactive node(s) to stay within max_nodes_per_tree ({})",
                pruned.len(),
                self.lifecycle.max_nodes_per_tree()
            ));
        }

        let (branches, history_size) = {
            let mut store = self.lock_store()?;
            for node in &pruned {
                store.drop_from_branch(&node.record);
            }
            store.add_thought(record.clone())?;
            if let Some(branch_id) = &record.branch_id {
                let len = store.branch_len(&session_id, branch_id);
                if len > self.history_config.max_thoughts_per_branch {
                    warnings.push(format!(
                        "Branch '{}' holds {} thoughts, above max_thoughts_per_branch ({})",
                        branch_id, len, self.history_config.max_thoughts_per_branch
                    ));
                }
            }
            (
                store.get_branches(&session_id),
                store.get_stats(Some(&session_id)).history_size,
            )
        };

        let mode_guidance = state.mode.map(|mode| mode.guidance_for(record.thought_number));
        let tree_stats = state.tree.stats();

        debug!(
            session_id = %session_id,
            node_id = %attached.node_id,
            thought_number = record.thought_number,
            total_nodes = tree_stats.total_nodes,
            "Recorded thought"
        );

        Ok(RecordThoughtResult {
            session_id,
            node_id: attached.node_id,
            parent_node_id: attached.parent_node_id,
            thought_number: record.thought_number,
            total_thoughts: record.total_thoughts,
            next_thought_needed: record.next_thought_needed,
            branches,
            history_size,
            tree_stats,
            mode_guidance,
            warnings,
            evicted_sessions,
        })
    }

    // ========================================================================
    // Scoring and navigation
    // ========================================================================

    /// Backpropagate `value` from `node_id` to the root.
    pub fn evaluate_thought(&self, session_id: &str, node_id: &str, value: f64) -> AppResult<EvaluateResult> {
        let handle = self.require(session_id)?;
        let mut state = lock_live(&handle, session_id)?;
        let evaluation = self.mcts.evaluate(&mut state.tree, node_id, value)?;
        state.touch(self.clock.now_ms());
        Ok(EvaluateResult {
            session_id: session_id.to_string(),
            evaluation,
            tree_stats: state.tree.stats(),
        })
    }

    /// Rank expandable nodes. An unknown session yields no suggestion.
    pub fn suggest_next(&self, session_id: &str, strategy: Option<Strategy>) -> AppResult<SuggestResult> {
        let strategy = strategy.unwrap_or_default();
        let Some(handle) = self.handle(session_id)? else {
            return Ok(SuggestResult {
                session_id: session_id.to_string(),
                suggestions: Suggestions {
                    strategy,
                    exploration_constant: strategy
                        .exploration_constant(self.mcts.exploration_constant()),
                    suggestion: None,
                    alternatives: Vec::new(),
                },
                tree_stats: TreeStats::default(),
            });
        };

        let mut state = lock_live(&handle, session_id)?;
        let suggestions = self.mcts.suggest(&state.tree, strategy);
        state.touch(self.clock.now_ms());
        Ok(SuggestResult {
            session_id: session_id.to_string(),
            suggestions,
            tree_stats: state.tree.stats(),
        })
    }

    /// Move the active leaf to `node_id` and describe its neighbourhood.
    pub fn backtrack(&self, session_id: &str, node_id: &str) -> AppResult<BacktrackResult> {
        let handle = self.require(session_id)?;
        let mut state = lock_live(&handle, session_id)?;
        state.tree.set_active_leaf(node_id)?;
        state.touch(self.clock.now_ms());

        let tree = &state.tree;
        let node = tree
            .get(node_id)
            .ok_or_else(|| AppError::node_not_found(node_id))?
            .view();
        let children = tree.children_of(node_id).into_iter().map(|n| n.view()).collect();
        let path = tree
            .path_to_root(node_id)
            .iter()
            .rev()
            .filter_map(|id| tree.get(id))
            .map(|n| n.view())
            .collect();

        info!(session_id = %session_id, node_id = %node_id, "Backtracked");
        Ok(BacktrackResult {
            session_id: session_id.to_string(),
            node,
            children,
            path,
            tree_stats: tree.stats(),
        })
    }

    /// Best path and tree rendering, limited to `max_depth` levels when given.
    pub fn get_thinking_summary(&self, session_id: &str, max_depth: Option<usize>) -> AppResult<ThinkingSummary> {
        if max_depth == Some(0) {
            return Err(AppError::validation("max_depth", "must be >= 1"));
        }
        let handle = self.require(session_id)?;
        let state = lock_live(&handle, session_id)?;
        let best_path = self.mcts.best_path(&state.tree, max_depth);
        let tree = TreeView::build(&state.tree, max_depth);

        let store = self.lock_store()?;
        Ok(ThinkingSummary {
            session_id: session_id.to_string(),
            path_length: best_path.len(),
            best_path,
            tree,
            tree_stats: state.tree.stats(),
            mode: state.mode,
            branches: store.get_branches(session_id),
            history_size: store.get_stats(Some(session_id)).history_size,
        })
    }

    pub fn find_node_by_thought_number(&self, session_id: &str, thought_number: u32) -> AppResult<Option<NodeView>> {
        let Some(handle) = self.handle(session_id)? else {
            return Ok(None);
        };
        let state = lock_live(&handle, session_id)?;
        Ok(state
            .tree
            .find_node_by_thought_number(thought_number)
            .map(|n| n.view()))
    }

    // ========================================================================
    // Thinking modes
    // ========================================================================

    /// Store `mode` for the session, creating it when auto-creation is on.
    pub fn set_thinking_mode(&self, session_id: &str, mode: ThinkingMode) -> AppResult<ThinkingModeConfig> {
        let session_id = validate_session_id(session_id)?;
        let now = self.clock.now_ms();
        let handle = match self.handle(&session_id)? {
            Some(handle) => handle,
            None if self.tree_config.enable_auto_tree => self.admit_session(&session_id, now)?.0,
            None => return Err(AppError::session_not_found(&session_id)),
        };
        let mut state = lock_live(&handle, &session_id)?;
        state.mode = Some(mode);
        state.touch(now);
        info!(session_id = %session_id, mode = %mode, "Thinking mode set");
        Ok(mode.config())
    }

    /// `None` for unknown sessions and sessions without a mode.
    pub fn get_thinking_mode(&self, session_id: &str) -> AppResult<Option<ThinkingModeConfig>> {
        let Some(handle) = self.handle(session_id)? else {
            return Ok(None);
        };
        let state = lock_live(&handle, session_id)?;
        Ok(state.mode.map(ThinkingMode::config))
    }

    // ========================================================================
    // History reads
    // ========================================================================

    pub fn get_history(&self, session_id: &str, limit: Option<usize>) -> AppResult<Vec<ThoughtRecord>> {
        Ok(self.lock_store()?.get_history(session_id, limit))
    }

    pub fn get_branches(&self, session_id: &str) -> AppResult<Vec<String>> {
        Ok(self.lock_store()?.get_branches(session_id))
    }

    pub fn get_branch_thoughts(&self, session_id: &str, branch_id: &str) -> AppResult<Vec<ThoughtRecord>> {
        Ok(self.lock_store()?.get_branch_thoughts(session_id, branch_id))
    }

    /// Engine-wide counters, plus details for `session_id` when given.
    pub fn get_stats(&self, session_id: Option<&str>) -> AppResult<EngineStats> {
        let handles: Vec<(String, SessionHandle)> = self
            .read_sessions()?
            .iter()
            .map(|(id, h)| (id.clone(), Arc::clone(h)))
            .collect();

        let now = self.clock.now_ms();
        let mut total_nodes = 0;
        let mut session = None;
        for (id, handle) in &handles {
            let state = handle.lock().map_err(|_| poisoned("session"))?;
            total_nodes += state.tree.len();
            if session_id == Some(id.as_str()) {
                session = Some(SessionStats {
                    session_id: id.clone(),
                    state: self.lifecycle.state_of(now, Some(state.last_activity_ms)),
                    tree: Some(state.tree.stats()),
                    mode: state.mode,
                    last_activity_ms: Some(state.last_activity_ms),
                });
            }
        }
        if let (Some(id), None) = (session_id, &session) {
            session = Some(SessionStats {
                session_id: id.to_string(),
                state: LifecycleState::Evicted,
                tree: None,
                mode: None,
                last_activity_ms: None,
            });
        }

        Ok(EngineStats {
            live_sessions: handles.len(),
            total_nodes,
            max_sessions: self.lifecycle.max_sessions(),
            max_nodes_per_tree: self.lifecycle.max_nodes_per_tree(),
            history: self.lock_store()?.get_stats(session_id),
            session,
        })
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Explicitly create a session, generating an id when none is given.
    pub fn start_session(&self, session_id: Option<&str>) -> AppResult<SessionStarted> {
        let session_id = match session_id {
            Some(id) => validate_session_id(id)?,
            None => format!("session-{}", Uuid::new_v4()),
        };
        let (_, created, evicted_sessions) = self.admit_session(&session_id, self.clock.now_ms())?;
        Ok(SessionStarted {
            session_id,
            created,
            evicted_sessions,
        })
    }

    /// Drop a session's tree and history.
    pub fn end_session(&self, session_id: &str) -> AppResult<()> {
        let handle = self
            .write_sessions()?
            .remove(session_id)
            .ok_or_else(|| AppError::session_not_found(session_id))?;
        {
            let mut state = handle.lock().map_err(|_| poisoned("session"))?;
            state.evicted = true;
        }
        self.lock_store()?.remove_session(session_id);
        self.note_removed(vec![session_id.to_string()])?;
        info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    pub fn lifecycle_state(&self, session_id: &str) -> AppResult<LifecycleState> {
        let last_activity = match self.handle(session_id)? {
            Some(handle) => Some(lock_live(&handle, session_id)?.last_activity_ms),
            None => None,
        };
        Ok(self.lifecycle.state_of(self.clock.now_ms(), last_activity))
    }

    /// Evict every aged-out session that no caller currently holds.
    pub fn cleanup(&self) -> AppResult<CleanupReport> {
        let now = self.clock.now_ms();
        let mut report = CleanupReport::default();
        {
            let mut sessions = self.write_sessions()?;
            let ids: Vec<String> = sessions.keys().cloned().collect();
            for id in ids {
                let Some(handle) = sessions.get(&id).cloned() else {
                    continue;
                };
                let evict = match handle.try_lock() {
                    Ok(mut state) => {
                        let aged = self.lifecycle.is_aged_out(now, state.last_activity_ms);
                        if aged {
                            state.evicted = true;
                        }
                        aged
                    }
                    Err(TryLockError::WouldBlock) => {
                        report.skipped_busy.push(id);
                        continue;
                    }
                    Err(TryLockError::Poisoned(poison)) => {
                        warn!(session_id = %id, "Evicting session with poisoned lock");
                        poison.into_inner().evicted = true;
                        true
                    }
                };
                if evict {
                    sessions.remove(&id);
                    report.evicted.push(id);
                }
            }
            report.remaining = sessions.len();
        }

        if !report.evicted.is_empty() {
            let mut store = self.lock_store()?;
            for id in &report.evicted {
                store.remove_session(id);
            }
            drop(store);
            self.note_removed(report.evicted.clone())?;
            info!(
                evicted = report.evicted.len(),
                remaining = report.remaining,
                "Evicted aged-out sessions"
            );
        }
        if !report.skipped_busy.is_empty() {
            debug!(skipped = report.skipped_busy.len(), "Skipped busy sessions during cleanup");
        }
        Ok(report)
    }

    /// Ids of live sessions, sorted.
    pub fn session_ids(&self) -> AppResult<Vec<String>> {
        let mut ids: Vec<String> = self.read_sessions()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Drain the ids of sessions removed by eviction or teardown.
    pub fn take_removed_sessions(&self) -> AppResult<Vec<String>> {
        let mut removed = self.removed.lock().map_err(|_| poisoned("removed sessions"))?;
        Ok(std::mem::take(&mut *removed))
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn snapshot(&self, session_id: &str) -> AppResult<SessionSnapshot> {
        let handle = self.require(session_id)?;
        let state = lock_live(&handle, session_id)?;
        let history = self.lock_store()?.snapshot(session_id);
        Ok(SessionSnapshot {
            session_id: session_id.to_string(),
            tree: state.tree.clone(),
            mode: state.mode,
            created_at_ms: state.created_at_ms,
            last_activity_ms: state.last_activity_ms,
            history,
        })
    }

    /// Install a snapshot, replacing any live session with the same id.
    ///
    /// Returns sessions evicted to make room under the session cap.
    pub fn restore(&self, snapshot: SessionSnapshot) -> AppResult<Vec<String>> {
        if snapshot.tree.session_id() != snapshot.session_id {
            return Err(AppError::validation(
                "snapshot",
                format!(
                    "tree belongs to session {} but snapshot is for {}",
                    snapshot.tree.session_id(),
                    snapshot.session_id
                ),
            ));
        }
        let session_id = snapshot.session_id;
        if snapshot.tree.len() > self.lifecycle.max_nodes_per_tree() {
            warn!(
                session_id = %session_id,
                nodes = snapshot.tree.len(),
                "Restored tree exceeds max_nodes_per_tree; it will be pruned on the next insert"
            );
        }

        let (handle, _, evicted) = self.admit_session(&session_id, snapshot.last_activity_ms)?;
        let mut state = lock_live(&handle, &session_id)?;
        state.tree = snapshot.tree;
        state.mode = snapshot.mode;
        state.created_at_ms = snapshot.created_at_ms;
        state.last_activity_ms = snapshot.last_activity_ms;
        self.lock_store()?.restore(&session_id, snapshot.history)?;

        debug!(session_id = %session_id, nodes = state.tree.len(), "Restored session");
        Ok(evicted)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn read_sessions(&self) -> AppResult<RwLockReadGuard<'_, HashMap<String, SessionHandle>>> {
        self.sessions.read().map_err(|_| poisoned("session map"))
    }

    fn write_sessions(&self) -> AppResult<RwLockWriteGuard<'_, HashMap<String, SessionHandle>>> {
        self.sessions.write().map_err(|_| poisoned("session map"))
    }

    fn lock_store(&self) -> AppResult<MutexGuard<'_, SessionThoughtStore>> {
        self.store.lock().map_err(|_| poisoned("thought store"))
    }

    fn handle(&self, session_id: &str) -> AppResult<Option<SessionHandle>> {
        Ok(self.read_sessions()?.get(session_id).cloned())
    }

    fn require(&self, session_id: &str) -> AppResult<SessionHandle> {
        self.handle(session_id)?
            .ok_or_else(|| AppError::session_not_found(session_id))
    }

    fn note_removed(&self, ids: Vec<String>) -> AppResult<()> {
        self.removed
            .lock()
            .map_err(|_| poisoned("removed sessions"))?
            .extend(ids);
        Ok(())
    }

    /// Get or create a session, evicting the least recently active idle
    /// session when the session cap is reached.
    fn admit_session(&self, session_id: &str, now_ms: u64) -> AppResult<(SessionHandle, bool, Vec<String>)> {
        let mut sessions = self.write_sessions()?;
        if let Some(handle) = sessions.get(session_id) {
            return Ok((Arc::clone(handle), false, Vec::new()));
        }

        let mut evicted = Vec::new();
        if self.lifecycle.needs_session_eviction(sessions.len()) {
            let mut idle: Vec<(String, u64)> = sessions
                .iter()
                .filter_map(|(id, h)| h.try_lock().ok().map(|s| (id.clone(), s.last_activity_ms)))
                .collect();
            // A candidate can be locked by a caller between the scan and the
            // mark; the flag is only set under the victim's own lock.
            let victim = loop {
                let victim = self
                    .lifecycle
                    .pick_session_victim(idle.iter().map(|(id, at)| (id.as_str(), *at)))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AppError::business(format!(
                            "session limit ({}) reached and every session is busy",
                            self.lifecycle.max_sessions()
                        ))
                    })?;
                let Some(handle) = sessions.get(&victim).cloned() else {
                    idle.retain(|(id, _)| id != &victim);
                    continue;
                };
                let marked = match handle.try_lock() {
                    Ok(mut state) => {
                        state.evicted = true;
                        true
                    }
                    Err(TryLockError::Poisoned(poison)) => {
                        poison.into_inner().evicted = true;
                        true
                    }
                    Err(TryLockError::WouldBlock) => false,
                };
                if marked {
                    break victim;
                }
                debug!(session_id = %victim, "Eviction candidate became busy, trying the next");
                idle.retain(|(id, _)| id != &victim);
            };

            sessions.remove(&victim);
            self.lock_store()?.remove_session(&victim);
            info!(session_id = %victim, "Evicted least recently active session at session cap");
            evicted.push(victim);
        }

        let handle = Arc::new(Mutex::new(SessionState::new(session_id, now_ms)));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));
        drop(sessions);

        if !evicted.is_empty() {
            self.note_removed(evicted.clone())?;
        }
        debug!(session_id = %session_id, "Created session");
        Ok((handle, true, evicted))
    }
}

impl std::fmt::Debug for ThinkingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThinkingEngine")
            .field("tree_config", &self.tree_config)
            .field("history_config", &self.history_config)
            .finish_non_exhaustive()
    }
}

/// Lock a session and reject it if it was removed while we waited.
fn lock_live<'a>(handle: &'a SessionHandle, session_id: &str) -> AppResult<MutexGuard<'a, SessionState>> {
    let state = handle.lock().map_err(|_| poisoned("session"))?;
    if state.evicted {
        return Err(AppError::session_not_found(session_id));
    }
    Ok(state)
}

fn poisoned(what: &str) -> AppError {
    AppError::Internal {
        message: format!("{} lock poisoned", what),
    }
}

fn validate_session_id(session_id: &str) -> AppResult<String> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("session_id", "cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn dangling_reference(record: &ThoughtRecord) -> AppError {
    let (kind, target) = match (record.revises_thought, record.branch_from_thought) {
        (Some(n), _) => ("revises", n),
        (None, Some(n)) => ("branches from", n),
        (None, None) => ("references", record.thought_number),
    };
    AppError::business(format!(
        "thought {} {} thought {}, which does not exist in session {}",
        record.thought_number, kind, target, record.session_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn config() -> Config {
        let mut config = Config::default();
        config.tree.max_tree_age_ms = 1_000;
        config.tree.max_sessions = 3;
        config.tree.max_nodes_per_tree = 5;
        config.history.max_history_size = 10;
        config.history.max_thoughts_per_branch = 2;
        config
    }

    fn engine_with(config: Config) -> (ThinkingEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let engine = ThinkingEngine::new(&config, clock.clone()).unwrap();
        (engine, clock)
    }

    fn thought(session: &str, n: u32) -> ThoughtParams {
        ThoughtParams::new(session, format!("thought {}", n), n, 5)
    }

    // ========================================================================
    // Recording
    // ========================================================================

    #[test]
    fn test_record_creates_session_lazily() {
        let (engine, _) = engine_with(config());
        let result = engine.record_thought(thought("s1", 1)).unwrap();
        assert!(result.parent_node_id.is_none());
        assert_eq!(result.history_size, 1);
        assert_eq!(result.tree_stats.total_nodes, 1);
        assert!(result.mode_guidance.is_none());
        assert_eq!(engine.session_ids().unwrap(), vec!["s1"]);
    }

    #[test]
    fn test_dangling_reference_on_new_session_creates_nothing() {
        let (engine, _) = engine_with(config());
        let err = engine
            .record_thought(thought("s1", 3).revising(2))
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessLogic { .. }));
        assert!(engine.session_ids().unwrap().is_empty());
        assert!(engine.get_history("s1", None).unwrap().is_empty());
    }

    #[test]
    fn test_total_thoughts_raised() {
        let (engine, _) = engine_with(config());
        let result = engine
            .record_thought(ThoughtParams::new("s1", "x", 7, 3))
            .unwrap();
        assert_eq!(result.total_thoughts, 7);
    }

    #[test]
    fn test_auto_tree_disabled_requires_start() {
        let mut cfg = config();
        cfg.tree.enable_auto_tree = false;
        let (engine, _) = engine_with(cfg);

        let err = engine.record_thought(thought("s1", 1)).unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let started = engine.start_session(Some("s1")).unwrap();
        assert!(started.created);
        assert!(engine.record_thought(thought("s1", 1)).is_ok());
        assert!(!engine.start_session(Some("s1")).unwrap().created);
    }

    #[test]
    fn test_start_session_generates_id() {
        let (engine, _) = engine_with(config());
        let started = engine.start_session(None).unwrap();
        assert!(started.session_id.starts_with("session-"));
        assert!(engine.start_session(Some("   ")).is_err());
    }

    #[test]
    fn test_mode_guidance_attached() {
        let (engine, _) = engine_with(config());
        engine.set_thinking_mode("s1", ThinkingMode::Fast).unwrap();
        let result = engine.record_thought(thought("s1", 1)).unwrap();
        let guidance = result.mode_guidance.unwrap();
        assert_eq!(guidance.mode, ThinkingMode::Fast);
        assert_eq!(guidance.recommended_steps.min, 3);
    }

    #[test]
    fn test_branch_over_cap_warns_but_records() {
        let (engine, _) = engine_with(config());
        engine.record_thought(thought("s1", 1)).unwrap();
        for n in 2..=4 {
            let result = engine
                .record_thought(thought("s1", n).branching(1, "wide"))
                .unwrap();
            assert_eq!(result.warnings.is_empty(), n < 4);
        }
        assert_eq!(engine.get_branch_thoughts("s1", "wide").unwrap().len(), 3);
    }

    #[test]
    fn test_node_cap_rejection_leaves_state_untouched() {
        let (engine, _) = engine_with(config());
        for n in 1..=5 {
            engine.record_thought(thought("s1", n)).unwrap();
        }
        let err = engine.record_thought(thought("s1", 6)).unwrap_err();
        assert!(matches!(err, AppError::BusinessLogic { .. }));
        assert_eq!(engine.get_history("s1", None).unwrap().len(), 5);
        let stats = engine.get_stats(Some("s1")).unwrap();
        assert_eq!(stats.total_nodes, 5);
    }

    #[test]
    fn test_node_cap_prunes_inactive_branch() {
        let (engine, _) = engine_with(config());
        for n in 1..=3 {
            engine.record_thought(thought("s1", n)).unwrap();
        }
        engine
            .record_thought(thought("s1", 4).branching(1, "b"))
            .unwrap();
        engine.record_thought(thought("s1", 5)).unwrap();
        let result = engine.record_thought(thought("s1", 6)).unwrap();
        assert_eq!(result.tree_stats.total_nodes, 5);
        assert_eq!(result.warnings.len(), 1);
        assert!(engine.find_node_by_thought_number("s1", 3).unwrap().is_none());
    }

    #[test]
    fn test_pruned_branch_leaves_branch_index() {
        let (engine, _) = engine_with(config());
        engine.record_thought(thought("s1", 1)).unwrap();
        let second = engine.record_thought(thought("s1", 2)).unwrap();
        engine
            .record_thought(thought("s1", 3).branching(1, "side"))
            .unwrap();
        assert_eq!(engine.get_branches("s1").unwrap(), vec!["side"]);

        engine.backtrack("s1", &second.node_id).unwrap();
        engine.record_thought(thought("s1", 4)).unwrap();
        engine.record_thought(thought("s1", 5)).unwrap();
        let result = engine.record_thought(thought("s1", 6)).unwrap();

        assert_eq!(result.warnings.len(), 1);
        assert!(result.branches.is_empty());
        assert!(engine.get_branches("s1").unwrap().is_empty());
        assert!(engine.get_branch_thoughts("s1", "side").unwrap().is_empty());
        assert_eq!(engine.get_history("s1", None).unwrap().len(), 6);
    }

    // ========================================================================
    // Scoring
    // ========================================================================

    #[test]
    fn test_evaluate_unknown_session() {
        let (engine, _) = engine_with(config());
        let err = engine.evaluate_thought("nope", "node-x", 0.5).unwrap_err();
        assert!(matches!(err, AppError::NotFound { ref resource, .. } if resource == "Session"));
    }

    #[test]
    fn test_suggest_unknown_session_is_empty() {
        let (engine, _) = engine_with(config());
        let result = engine.suggest_next("nope", None).unwrap();
        assert!(result.suggestions.suggestion.is_none());
        assert_eq!(result.suggestions.strategy, Strategy::Balanced);
    }

    #[test]
    fn test_backtrack_moves_active_leaf() {
        let (engine, _) = engine_with(config());
        let first = engine.record_thought(thought("s1", 1)).unwrap();
        engine.record_thought(thought("s1", 2)).unwrap();

        let back = engine.backtrack("s1", &first.node_id).unwrap();
        assert_eq!(back.node.node_id, first.node_id);
        assert_eq!(back.children.len(), 1);
        assert_eq!(back.path.len(), 1);

        let next = engine.record_thought(thought("s1", 3)).unwrap();
        assert_eq!(next.parent_node_id.as_deref(), Some(first.node_id.as_str()));
    }

    #[test]
    fn test_backtrack_unknown_node() {
        let (engine, _) = engine_with(config());
        engine.record_thought(thought("s1", 1)).unwrap();
        let err = engine.backtrack("s1", "node-missing").unwrap_err();
        assert!(matches!(err, AppError::NotFound { ref resource, .. } if resource == "Node"));
    }

    #[test]
    fn test_summary_rejects_zero_depth() {
        let (engine, _) = engine_with(config());
        engine.record_thought(thought("s1", 1)).unwrap();
        assert!(engine.get_thinking_summary("s1", Some(0)).is_err());
        assert_eq!(
            engine.get_thinking_summary("s1", Some(1)).unwrap().path_length,
            1
        );
    }

    // ========================================================================
    // Modes
    // ========================================================================

    #[test]
    fn test_mode_unset_is_none() {
        let (engine, _) = engine_with(config());
        assert!(engine.get_thinking_mode("nope").unwrap().is_none());
        engine.record_thought(thought("s1", 1)).unwrap();
        assert!(engine.get_thinking_mode("s1").unwrap().is_none());
        engine.set_thinking_mode("s1", ThinkingMode::Deep).unwrap();
        assert_eq!(
            engine.get_thinking_mode("s1").unwrap().unwrap().mode,
            ThinkingMode::Deep
        );
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[test]
    fn test_cleanup_evicts_aged_sessions() {
        let (engine, clock) = engine_with(config());
        engine.record_thought(thought("old", 1)).unwrap();
        clock.advance(800);
        engine.record_thought(thought("fresh", 1)).unwrap();
        clock.advance(300);

        let report = engine.cleanup().unwrap();
        assert_eq!(report.evicted, vec!["old"]);
        assert_eq!(report.remaining, 1);
        assert!(engine.get_history("old", None).unwrap().is_empty());
        assert_eq!(engine.lifecycle_state("old").unwrap(), LifecycleState::Evicted);
        assert_eq!(engine.take_removed_sessions().unwrap(), vec!["old"]);
        assert!(engine.take_removed_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_skips_busy_session() {
        let (engine, clock) = engine_with(config());
        engine.record_thought(thought("s1", 1)).unwrap();
        clock.advance(5_000);

        let handle = engine.handle("s1").unwrap().unwrap();
        let guard = handle.lock().unwrap();
        let report = engine.cleanup().unwrap();
        assert_eq!(report.skipped_busy, vec!["s1"]);
        assert!(report.evicted.is_empty());
        drop(guard);

        let report = engine.cleanup().unwrap();
        assert_eq!(report.evicted, vec!["s1"]);
    }

    #[test]
    fn test_session_cap_evicts_least_recent() {
        let (engine, clock) = engine_with(config());
        for id in ["a", "b", "c"] {
            engine.record_thought(thought(id, 1)).unwrap();
            clock.advance(10);
        }
        engine.record_thought(thought("a", 2)).unwrap();

        let result = engine.record_thought(thought("d", 1)).unwrap();
        assert_eq!(result.evicted_sessions, vec!["b"]);
        assert_eq!(engine.session_ids().unwrap(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_cap_victim_handle_held_elsewhere_is_dead() {
        let (engine, clock) = engine_with(config());
        for id in ["a", "b", "c"] {
            engine.record_thought(thought(id, 1)).unwrap();
            clock.advance(10);
        }
        let stale = engine.handle("a").unwrap().unwrap();

        let started = engine.start_session(Some("d")).unwrap();
        assert_eq!(started.evicted_sessions, vec!["a"]);
        assert!(stale.lock().unwrap().evicted);
        assert!(matches!(lock_live(&stale, "a"), Err(AppError::NotFound { .. })));
        assert!(!engine.lock_store().unwrap().contains("a"));
    }

    #[test]
    fn test_cap_eviction_racing_writer_leaves_no_orphan_history() {
        let mut config = config();
        config.tree.max_sessions = 2;
        let (engine, clock) = engine_with(config);
        let engine = Arc::new(engine);

        let writer = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for n in 1..=200 {
                    let _ = engine.record_thought(thought("hot", n));
                }
            })
        };
        for i in 0..200 {
            clock.advance(1);
            let _ = engine.start_session(Some(&format!("cold-{}", i)));
        }
        writer.join().unwrap();

        let live = engine.session_ids().unwrap();
        let store = engine.lock_store().unwrap();
        let mut ids: Vec<String> = (0..200).map(|i| format!("cold-{}", i)).collect();
        ids.push("hot".to_string());
        for id in ids {
            if store.contains(&id) {
                assert!(live.contains(&id), "history kept for removed session {}", id);
            }
        }
    }

    #[test]
    fn test_end_session_clears_everything() {
        let (engine, _) = engine_with(config());
        engine.record_thought(thought("s1", 1)).unwrap();
        engine.end_session("s1").unwrap();
        assert!(engine.get_history("s1", None).unwrap().is_empty());
        assert!(matches!(
            engine.get_thinking_summary("s1", None),
            Err(AppError::NotFound { .. })
        ));
        assert!(engine.end_session("s1").is_err());
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    #[test]
    fn test_snapshot_restore_round_trip() {
        let (engine, _) = engine_with(config());
        let first = engine.record_thought(thought("s1", 1)).unwrap();
        engine
            .record_thought(thought("s1", 2).branching(1, "b"))
            .unwrap();
        engine.evaluate_thought("s1", &first.node_id, 0.75).unwrap();
        engine.set_thinking_mode("s1", ThinkingMode::Expert).unwrap();
        let snapshot = engine.snapshot("s1").unwrap();

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: SessionSnapshot = serde_json::from_str(&json).unwrap();

        let (other, _) = engine_with(config());
        other.restore(decoded).unwrap();
        let restored = other.snapshot("s1").unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(other.get_branches("s1").unwrap(), vec!["b"]);
    }

    #[test]
    fn test_restore_rejects_mismatched_ids() {
        let (engine, _) = engine_with(config());
        engine.record_thought(thought("s1", 1)).unwrap();
        let mut snapshot = engine.snapshot("s1").unwrap();
        snapshot.session_id = "s2".to_string();
        assert!(matches!(
            engine.restore(snapshot),
            Err(AppError::Validation { .. })
        ));
    }
}
