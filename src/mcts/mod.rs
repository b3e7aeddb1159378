//! MCTS-style scoring over thought trees.
//!
//! Callers supply evaluation values in `[0, 1]`; there is no simulation step.
//! This module provides:
//! - UCB1 scoring that never produces NaN
//! - Backpropagation of evaluations from a node to the root
//! - Next-node suggestions under explore / exploit / balanced strategies
//! - Greedy best-path extraction and a nested tree view for summaries

mod view;

pub use view::*;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::tree::{NodeView, ThoughtTree, TreeNode};

/// Alternatives returned alongside the top suggestion.
pub const MAX_ALTERNATIVES: usize = 3;

/// Exploration constant multiplier for [`Strategy::Explore`].
const EXPLORE_MULTIPLIER: f64 = 2.0;

/// Exploration constant multiplier for [`Strategy::Exploit`].
const EXPLOIT_MULTIPLIER: f64 = 0.25;

/// UCB1 score for a node.
///
/// - unvisited nodes score `+inf` regardless of `parent_visits`;
/// - with `parent_visits <= 1` the exploration term is zero (`ln` would be
///   `<= 0`), leaving pure exploitation;
/// - otherwise `avg + c * sqrt(ln(parent_visits) / visits)`.
pub fn ucb1(total_value: f64, visit_count: u64, parent_visits: u64, exploration_constant: f64) -> f64 {
    if visit_count == 0 {
        return f64::INFINITY;
    }
    let visits = visit_count as f64;
    let exploitation = total_value / visits;
    let exploitation = if exploitation.is_finite() { exploitation } else { 0.0 };

    if parent_visits <= 1 {
        return exploitation;
    }
    let exploration = exploration_constant * ((parent_visits as f64).ln() / visits).sqrt();
    if exploration.is_finite() {
        exploitation + exploration
    } else {
        exploitation
    }
}

/// Selection strategy for suggestions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Favor under-visited nodes.
    Explore,
    /// Favor nodes with the best observed value.
    Exploit,
    /// Configured exploration constant as-is.
    #[default]
    Balanced,
}

impl Strategy {
    /// Exploration constant used under this strategy.
    pub fn exploration_constant(self, base: f64) -> f64 {
        match self {
            Strategy::Explore => base * EXPLORE_MULTIPLIER,
            Strategy::Exploit => base * EXPLOIT_MULTIPLIER,
            Strategy::Balanced => base,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Explore => write!(f, "explore"),
            Strategy::Exploit => write!(f, "exploit"),
            Strategy::Balanced => write!(f, "balanced"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "explore" => Ok(Strategy::Explore),
            "exploit" => Ok(Strategy::Exploit),
            "balanced" => Ok(Strategy::Balanced),
            other => Err(AppError::validation(
                "strategy",
                format!("unknown strategy '{}' (expected explore, exploit or balanced)", other),
            )),
        }
    }
}

/// Effect of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub node_id: String,
    pub visit_count: u64,
    pub total_value: f64,
    pub average_value: f64,
    /// Nodes updated from the evaluated node to the root, inclusive.
    pub nodes_updated: usize,
}

/// A scored candidate for the next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub node: NodeView,
    /// UCB1 score; `None` for unvisited nodes, which take priority.
    pub ucb_score: Option<f64>,
    pub unexplored: bool,
    pub reason: String,
}

/// Ranked suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestions {
    pub strategy: Strategy,
    pub exploration_constant: f64,
    pub suggestion: Option<Candidate>,
    pub alternatives: Vec<Candidate>,
}

/// Scoring and backpropagation over a [`ThoughtTree`].
#[derive(Debug, Clone, Copy)]
pub struct MctsEngine {
    exploration_constant: f64,
}

impl MctsEngine {
    /// `exploration_constant` must be finite and strictly positive.
    pub fn new(exploration_constant: f64) -> AppResult<Self> {
        if !exploration_constant.is_finite() || exploration_constant <= 0.0 {
            return Err(AppError::Config {
                message: format!(
                    "exploration constant must be a finite number > 0 (got {})",
                    exploration_constant
                ),
            });
        }
        Ok(Self {
            exploration_constant,
        })
    }

    pub fn exploration_constant(&self) -> f64 {
        self.exploration_constant
    }

    /// UCB1 score of `node` within `tree`. The root has no parent visits.
    pub fn score(&self, tree: &ThoughtTree, node: &TreeNode, exploration_constant: f64) -> f64 {
        let parent_visits = node
            .parent_node_id
            .as_deref()
            .and_then(|id| tree.get(id))
            .map_or(0, |p| p.visit_count);
        ucb1(node.total_value, node.visit_count, parent_visits, exploration_constant)
    }

    /// Record one visit of `node_id` with `value` and propagate it to the root.
    pub fn evaluate(&self, tree: &mut ThoughtTree, node_id: &str, value: f64) -> AppResult<Evaluation> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(AppError::validation(
                "value",
                format!("must be a number between 0 and 1 (got {})", value),
            ));
        }
        if tree.get(node_id).is_none() {
            return Err(AppError::node_not_found(node_id));
        }

        let path = tree.path_to_root(node_id);
        for id in &path {
            if let Some(node) = tree.get_mut(id) {
                node.visit_count += 1;
                node.total_value += value;
            }
        }

        let node = tree
            .get(node_id)
            .ok_or_else(|| AppError::node_not_found(node_id))?;

        debug!(
            session_id = %tree.session_id(),
            node_id = %node_id,
            value = value,
            nodes_updated = path.len(),
            "Backpropagated evaluation"
        );

        Ok(Evaluation {
            node_id: node_id.to_string(),
            visit_count: node.visit_count,
            total_value: node.total_value,
            average_value: node.average_value(),
            nodes_updated: path.len(),
        })
    }

    /// Rank every expandable (non-terminal) node by UCB1.
    ///
    /// Ties, which include all unvisited nodes, go to the deeper node and then
    /// to the more recently created one.
    pub fn suggest(&self, tree: &ThoughtTree, strategy: Strategy) -> Suggestions {
        let c = strategy.exploration_constant(self.exploration_constant);

        let mut scored: Vec<(f64, &TreeNode)> = tree
            .nodes()
            .filter(|n| !n.is_terminal)
            .map(|n| (self.score(tree, n, c), n))
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| b.depth.cmp(&a.depth))
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        let mut candidates = scored
            .into_iter()
            .take(MAX_ALTERNATIVES + 1)
            .map(|(score, node)| candidate(score, node));

        let suggestion = candidates.next();
        let alternatives = candidates.collect();

        Suggestions {
            strategy,
            exploration_constant: c,
            suggestion,
            alternatives,
        }
    }

    /// Greedy root-to-leaf path by highest average value, at most `max_levels` nodes.
    ///
    /// Ties go to the more visited child, then to the earlier one.
    pub fn best_path(&self, tree: &ThoughtTree, max_levels: Option<usize>) -> Vec<NodeView> {
        let limit = max_levels.unwrap_or(usize::MAX);
        let mut path = Vec::new();
        let mut current = tree.root();

        while let Some(node) = current {
            if path.len() >= limit {
                break;
            }
            path.push(node.view());
            current = tree.children_of(&node.node_id).into_iter().max_by(|a, b| {
                a.average_value()
                    .total_cmp(&b.average_value())
                    .then_with(|| a.visit_count.cmp(&b.visit_count))
                    .then_with(|| b.sequence.cmp(&a.sequence))
            });
        }
        path
    }
}

fn candidate(score: f64, node: &TreeNode) -> Candidate {
    let unexplored = score.is_infinite();
    let reason = if unexplored {
        "Unvisited node: explore before revisiting evaluated paths".to_string()
    } else {
        format!(
            "UCB1 {:.3} (average {:.3} over {} visits)",
            score,
            node.average_value(),
            node.visit_count
        )
    };
    Candidate {
        node: node.view(),
        ucb_score: if unexplored { None } else { Some(score) },
        unexplored,
        reason,
    }
}
