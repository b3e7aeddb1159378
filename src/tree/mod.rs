//! Per-session thought tree.
//!
//! Nodes live in an arena keyed by opaque node id; parent and child links are
//! ids, never references. The tree owns its arena exclusively. A
//! thought-number index gives O(1) lookup for revision and branch targets,
//! and `active_leaf_id` records where the next linear continuation attaches.
//!
//! Attachment rules:
//! - the first thought becomes the root (a tree never has a second root);
//! - a revision becomes a sibling of the revised node (a child of its parent),
//!   or a child of the root when the root itself is revised;
//! - a branch becomes a child of the node holding `branch_from_thought`;
//! - anything else continues from the active leaf.
//!
//! Every successful attach moves the active leaf to the new node.

mod node;

pub use node::*;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::thoughts::ThoughtRecord;

/// Where a new node will be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Root,
    Child(String),
}

impl Placement {
    pub fn parent(&self) -> Option<&str> {
        match self {
            Placement::Root => None,
            Placement::Child(id) => Some(id),
        }
    }
}

/// Identity of a freshly attached node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attached {
    pub node_id: String,
    pub parent_node_id: Option<String>,
}

/// Shape statistics for one tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeStats {
    pub total_nodes: usize,
    /// Deepest node depth (root = 0).
    pub max_depth: usize,
    pub leaf_count: usize,
    pub terminal_count: usize,
    /// Nodes with more than one child.
    pub branch_points: usize,
    /// Root visit count, i.e. total evaluations in the tree.
    pub total_visits: u64,
    pub root_node_id: Option<String>,
    pub active_leaf_id: Option<String>,
}

/// Arena-backed reasoning tree for a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtTree {
    session_id: String,
    nodes: HashMap<String, TreeNode>,
    root_id: Option<String>,
    active_leaf_id: Option<String>,
    /// thought_number -> most recent node carrying it
    thought_index: HashMap<u32, String>,
    next_sequence: u64,
}

impl ThoughtTree {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            nodes: HashMap::new(),
            root_id: None,
            active_leaf_id: None,
            thought_index: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root_id.as_deref().and_then(|id| self.nodes.get(id))
    }

    pub fn active_leaf_id(&self) -> Option<&str> {
        self.active_leaf_id.as_deref()
    }

    pub fn get(&self, node_id: &str) -> Option<&TreeNode> {
        self.nodes.get(node_id)
    }

    pub(crate) fn get_mut(&mut self, node_id: &str) -> Option<&mut TreeNode> {
        self.nodes.get_mut(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    /// O(1) lookup of the most recent node for `thought_number`.
    pub fn find_node_by_thought_number(&self, thought_number: u32) -> Option<&TreeNode> {
        self.thought_index
            .get(&thought_number)
            .and_then(|id| self.nodes.get(id))
    }

    /// Children of `node_id` in exploration order.
    pub fn children_of(&self, node_id: &str) -> Vec<&TreeNode> {
        self.nodes
            .get(node_id)
            .map(|n| {
                n.children
                    .iter()
                    .filter_map(|id| self.nodes.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids from `node_id` up to the root, inclusive on both ends.
    pub fn path_to_root(&self, node_id: &str) -> Vec<String> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(node_id.to_string());

        while let Some(id) = current {
            if !visited.insert(id.clone()) {
                warn!(
                    session_id = %self.session_id,
                    node_id = %id,
                    "Cycle detected while walking to root"
                );
                break;
            }
            match self.nodes.get(&id) {
                Some(node) => {
                    current = node.parent_node_id.clone();
                    path.push(id);
                }
                None => break,
            }
        }
        path
    }

    /// Decide where `record` would attach, without mutating anything.
    ///
    /// `None` means the referenced thought does not exist in this tree.
    pub fn placement_for(&self, record: &ThoughtRecord) -> Option<Placement> {
        if self.root_id.is_none() {
            // Nothing to reference yet; a revision or branch here is dangling.
            return match record.referenced_thought() {
                Some(_) => None,
                None => Some(Placement::Root),
            };
        }

        if let Some(target) = record.revises_thought {
            let revised = self.find_node_by_thought_number(target)?;
            let parent = revised
                .parent_node_id
                .clone()
                .unwrap_or_else(|| revised.node_id.clone());
            return Some(Placement::Child(parent));
        }

        if let Some(source) = record.branch_from_thought {
            let from = self.find_node_by_thought_number(source)?;
            return Some(Placement::Child(from.node_id.clone()));
        }

        self.active_leaf_id
            .clone()
            .or_else(|| self.root_id.clone())
            .map(Placement::Child)
    }

    /// Attach `record` at a placement computed by [`Self::placement_for`].
    pub fn insert(&mut self, record: ThoughtRecord, placement: Placement) -> AppResult<Attached> {
        let node_id = format!("node-{}", Uuid::new_v4());
        let sequence = self.next_sequence;

        let (parent_node_id, depth) = match &placement {
            Placement::Root => {
                if self.root_id.is_some() {
                    return Err(AppError::Internal {
                        message: format!("session {} already has a root", self.session_id),
                    });
                }
                (None, 0)
            }
            Placement::Child(parent_id) => {
                let parent = self
                    .nodes
                    .get_mut(parent_id)
                    .ok_or_else(|| AppError::node_not_found(parent_id))?;
                parent.children.push(node_id.clone());
                (Some(parent_id.clone()), parent.depth + 1)
            }
        };

        let thought_number = record.thought_number;
        let node = TreeNode::new(node_id.clone(), parent_node_id.clone(), record, depth, sequence);
        self.nodes.insert(node_id.clone(), node);
        self.thought_index.insert(thought_number, node_id.clone());
        if parent_node_id.is_none() {
            self.root_id = Some(node_id.clone());
        }
        self.active_leaf_id = Some(node_id.clone());
        self.next_sequence += 1;

        debug!(
            session_id = %self.session_id,
            node_id = %node_id,
            parent_node_id = ?parent_node_id,
            depth = depth,
            "Attached thought node"
        );

        Ok(Attached {
            node_id,
            parent_node_id,
        })
    }

    /// Place and attach in one step, returning `None` for a dangling reference.
    pub fn record_thought(&mut self, record: ThoughtRecord) -> Option<Attached> {
        let placement = self.placement_for(&record)?;
        self.insert(record, placement).ok()
    }

    /// Point linear continuation at `node_id`.
    pub fn set_active_leaf(&mut self, node_id: &str) -> AppResult<()> {
        if !self.nodes.contains_key(node_id) {
            return Err(AppError::node_not_found(node_id));
        }
        self.active_leaf_id = Some(node_id.to_string());
        Ok(())
    }

    /// Remove the oldest leaf that is neither the root nor an ancestor-or-self
    /// of the active leaf or of `keep`.
    pub fn prune_oldest_inactive_leaf(&mut self, keep: Option<&str>) -> Option<TreeNode> {
        let mut protected: HashSet<String> = HashSet::new();
        if let Some(active) = self.active_leaf_id.clone() {
            protected.extend(self.path_to_root(&active));
        }
        if let Some(keep) = keep {
            protected.extend(self.path_to_root(keep));
        }

        let victim_id = self
            .nodes
            .values()
            .filter(|n| n.is_leaf() && !n.is_root() && !protected.contains(&n.node_id))
            .min_by_key(|n| n.sequence)
            .map(|n| n.node_id.clone())?;

        let victim = self.nodes.remove(&victim_id)?;
        if let Some(parent_id) = &victim.parent_node_id {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.children.retain(|id| id != &victim_id);
            }
        }

        let number = victim.record.thought_number;
        if self.thought_index.get(&number) == Some(&victim_id) {
            // Fall back to the newest surviving node with the same number.
            match self
                .nodes
                .values()
                .filter(|n| n.record.thought_number == number)
                .max_by_key(|n| n.sequence)
            {
                Some(n) => {
                    let id = n.node_id.clone();
                    self.thought_index.insert(number, id);
                }
                None => {
                    self.thought_index.remove(&number);
                }
            }
        }

        debug!(
            session_id = %self.session_id,
            node_id = %victim_id,
            thought_number = number,
            "Pruned inactive leaf"
        );
        Some(victim)
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            total_nodes: self.nodes.len(),
            root_node_id: self.root_id.clone(),
            active_leaf_id: self.active_leaf_id.clone(),
            total_visits: self.root().map_or(0, |r| r.visit_count),
            ..TreeStats::default()
        };
        for node in self.nodes.values() {
            stats.max_depth = stats.max_depth.max(node.depth);
            if node.is_leaf() {
                stats.leaf_count += 1;
            }
            if node.is_terminal {
                stats.terminal_count += 1;
            }
            if node.children.len() > 1 {
                stats.branch_points += 1;
            }
        }
        stats
    }
}
