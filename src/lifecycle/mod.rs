//! Session tree lifecycle: aging, per-tree node caps and the session cap.
//!
//! A session moves `Active -> AgedOut -> Evicted`. Aging is purely a function
//! of the clock and the last activity time; eviction is destructive and the
//! engine forgets everything about an evicted session.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TreeConfig;
use crate::error::{AppError, AppResult};
use crate::tree::{ThoughtTree, TreeNode};

/// Lifecycle state of a session tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    /// Idle longer than the max tree age; removed by the next sweep.
    AgedOut,
    /// No longer held by the engine.
    Evicted,
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Sessions removed by this sweep.
    pub evicted: Vec<String>,
    /// Aged-out sessions skipped because a caller held them; retried next sweep.
    pub skipped_busy: Vec<String>,
    /// Sessions still live after the sweep.
    pub remaining: usize,
}

/// Capacity and aging policy applied to session trees.
#[derive(Debug, Clone, Copy)]
pub struct TreeLifecycle {
    max_nodes_per_tree: usize,
    max_tree_age_ms: u64,
    max_sessions: usize,
}

impl TreeLifecycle {
    pub fn new(config: &TreeConfig) -> AppResult<Self> {
        if config.max_nodes_per_tree == 0 {
            return Err(AppError::InvalidCapacity { capacity: 0 });
        }
        if config.max_sessions == 0 {
            return Err(AppError::InvalidCapacity { capacity: 0 });
        }
        Ok(Self {
            max_nodes_per_tree: config.max_nodes_per_tree,
            max_tree_age_ms: config.max_tree_age_ms,
            max_sessions: config.max_sessions,
        })
    }

    pub fn max_nodes_per_tree(&self) -> usize {
        self.max_nodes_per_tree
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// State of a session last active at `last_activity_ms`, or `Evicted` when
    /// the engine holds no such session.
    pub fn state_of(&self, now_ms: u64, last_activity_ms: Option<u64>) -> LifecycleState {
        match last_activity_ms {
            None => LifecycleState::Evicted,
            Some(last) if now_ms.saturating_sub(last) > self.max_tree_age_ms => {
                LifecycleState::AgedOut
            }
            Some(_) => LifecycleState::Active,
        }
    }

    pub fn is_aged_out(&self, now_ms: u64, last_activity_ms: u64) -> bool {
        self.state_of(now_ms, Some(last_activity_ms)) == LifecycleState::AgedOut
    }

    /// Prune inactive leaves until one more node fits under the cap.
    ///
    /// `keep` is the node the incoming thought attaches to; it and its
    /// ancestors are never pruned. Fails with `BusinessLogic` and leaves the
    /// tree untouched when no leaf can be pruned.
    pub fn make_room(&self, tree: &mut ThoughtTree, keep: Option<&str>) -> AppResult<Vec<TreeNode>> {
        let excess = (tree.len() + 1).saturating_sub(self.max_nodes_per_tree);
        match excess {
            0 => Ok(Vec::new()),
            1 => match tree.prune_oldest_inactive_leaf(keep) {
                Some(pruned) => Ok(vec![pruned]),
                None => Err(self.tree_full(tree)),
            },
            _ => {
                // Several prunes needed (cap lowered since the tree was built);
                // work on a copy so a failure changes nothing.
                let mut working = tree.clone();
                let mut pruned = Vec::with_capacity(excess);
                for _ in 0..excess {
                    match working.prune_oldest_inactive_leaf(keep) {
                        Some(node) => pruned.push(node),
                        None => return Err(self.tree_full(tree)),
                    }
                }
                *tree = working;
                debug!(
                    session_id = %tree.session_id(),
                    pruned = pruned.len(),
                    "Pruned tree down to node cap"
                );
                Ok(pruned)
            }
        }
    }

    fn tree_full(&self, tree: &ThoughtTree) -> AppError {
        AppError::business(format!(
            "session {} reached max_nodes_per_tree ({}) and has no inactive leaf to prune",
            tree.session_id(),
            self.max_nodes_per_tree
        ))
    }

    /// Whether admitting one more session requires evicting another.
    pub fn needs_session_eviction(&self, live_sessions: usize) -> bool {
        live_sessions >= self.max_sessions
    }

    /// Least recently active candidate, given `(session_id, last_activity_ms)`.
    pub fn pick_session_victim<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        candidates
            .into_iter()
            .min_by(|(id_a, a), (id_b, b)| a.cmp(b).then_with(|| id_a.cmp(id_b)))
            .map(|(id, _)| id)
    }
}
