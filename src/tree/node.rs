use serde::{Deserialize, Serialize};

use crate::thoughts::ThoughtRecord;

/// One thought in a session tree plus its search statistics.
///
/// Parent and children are node ids into the owning tree's arena. The parent
/// link is for upward traversal only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub node_id: String,
    pub parent_node_id: Option<String>,
    /// Insertion order is exploration order.
    pub children: Vec<String>,
    pub record: ThoughtRecord,
    pub visit_count: u64,
    /// Sum of backpropagated evaluation values.
    pub total_value: f64,
    /// Root is 0.
    pub depth: usize,
    /// Set when the thought declared no further thought needed.
    pub is_terminal: bool,
    /// Monotonic creation counter within the tree.
    pub sequence: u64,
}

impl TreeNode {
    pub(crate) fn new(
        node_id: String,
        parent_node_id: Option<String>,
        record: ThoughtRecord,
        depth: usize,
        sequence: u64,
    ) -> Self {
        let is_terminal = !record.next_thought_needed;
        Self {
            node_id,
            parent_node_id,
            children: Vec::new(),
            record,
            visit_count: 0,
            total_value: 0.0,
            depth,
            is_terminal,
            sequence,
        }
    }

    /// `total_value / max(visit_count, 1)`; always finite.
    pub fn average_value(&self) -> f64 {
        let average = self.total_value / self.visit_count.max(1) as f64;
        if average.is_finite() {
            average
        } else {
            0.0
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent_node_id.is_none()
    }

    pub fn thought_number(&self) -> u32 {
        self.record.thought_number
    }

    /// Serializable summary without the child list.
    pub fn view(&self) -> NodeView {
        NodeView {
            node_id: self.node_id.clone(),
            parent_node_id: self.parent_node_id.clone(),
            thought_number: self.record.thought_number,
            thought: self.record.preview(),
            depth: self.depth,
            visit_count: self.visit_count,
            total_value: self.total_value,
            average_value: self.average_value(),
            is_terminal: self.is_terminal,
            is_revision: self.record.is_revision,
            branch_id: self.record.branch_id.clone(),
            child_count: self.children.len(),
        }
    }
}

/// Flat node summary returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: String,
    pub parent_node_id: Option<String>,
    pub thought_number: u32,
    pub thought: String,
    pub depth: usize,
    pub visit_count: u64,
    pub total_value: f64,
    pub average_value: f64,
    pub is_terminal: bool,
    #[serde(default)]
    pub is_revision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    pub child_count: usize,
}
