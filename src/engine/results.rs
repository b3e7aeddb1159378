use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleState;
use crate::mcts::{Evaluation, Suggestions, TreeView};
use crate::modes::{ModeGuidance, ThinkingMode};
use crate::thoughts::StoreStats;
use crate::tree::{NodeView, TreeStats};

/// Result of recording a thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordThoughtResult {
    pub session_id: String,
    pub node_id: String,
    pub parent_node_id: Option<String>,
    pub thought_number: u32,
    /// Possibly raised to `thought_number`.
    pub total_thoughts: u32,
    pub next_thought_needed: bool,
    pub branches: Vec<String>,
    pub history_size: usize,
    pub tree_stats: TreeStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_guidance: Option<ModeGuidance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Sessions evicted to admit this one under the session cap.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evicted_sessions: Vec<String>,
}

/// Result of evaluating a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateResult {
    pub session_id: String,
    #[serde(flatten)]
    pub evaluation: Evaluation,
    pub tree_stats: TreeStats,
}

/// Ranked next-step suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestResult {
    pub session_id: String,
    #[serde(flatten)]
    pub suggestions: Suggestions,
    pub tree_stats: TreeStats,
}

/// A node, its children and its ancestry, after moving the active leaf to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktrackResult {
    pub session_id: String,
    pub node: NodeView,
    pub children: Vec<NodeView>,
    /// Root first, ending at `node`.
    pub path: Vec<NodeView>,
    pub tree_stats: TreeStats,
}

/// Best path plus the rendered tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingSummary {
    pub session_id: String,
    pub best_path: Vec<NodeView>,
    pub path_length: usize,
    pub tree: Option<TreeView>,
    pub tree_stats: TreeStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ThinkingMode>,
    pub branches: Vec<String>,
    pub history_size: usize,
}

/// Outcome of an explicit session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStarted {
    pub session_id: String,
    /// False when the session already existed.
    pub created: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evicted_sessions: Vec<String>,
}

/// Per-session details in [`EngineStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ThinkingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_ms: Option<u64>,
}

/// Engine-wide counters, optionally narrowed to one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub live_sessions: usize,
    pub total_nodes: usize,
    pub max_sessions: usize,
    pub max_nodes_per_tree: usize,
    pub history: StoreStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStats>,
}
