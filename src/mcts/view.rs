use serde::{Deserialize, Serialize};

use crate::tree::{NodeView, ThoughtTree};

/// Levels rendered when the caller gives no depth limit.
pub const DEFAULT_VIEW_DEPTH: usize = 64;

/// Nested tree rendering for summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeView {
    #[serde(flatten)]
    pub node: NodeView,
    pub children: Vec<TreeView>,
    /// Children exist but were cut by the depth limit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl TreeView {
    /// Render `tree` from its root down to `max_levels` levels.
    pub fn build(tree: &ThoughtTree, max_levels: Option<usize>) -> Option<TreeView> {
        let levels = max_levels.unwrap_or(DEFAULT_VIEW_DEPTH).max(1);
        tree.root()
            .and_then(|root| Self::build_node(tree, &root.node_id, levels))
    }

    fn build_node(tree: &ThoughtTree, node_id: &str, levels_left: usize) -> Option<TreeView> {
        let node = tree.get(node_id)?;
        let (children, truncated) = if levels_left <= 1 {
            (Vec::new(), !node.children.is_empty())
        } else {
            let children = node
                .children
                .iter()
                .filter_map(|child| Self::build_node(tree, child, levels_left - 1))
                .collect();
            (children, false)
        };
        Some(TreeView {
            node: node.view(),
            children,
            truncated,
        })
    }

    /// Nodes in this view, including nested children.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeView::count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thoughts::ThoughtParams;

    fn tree_with_branch() -> ThoughtTree {
        let mut tree = ThoughtTree::new("s1");
        for n in 1..=3 {
            let record = ThoughtParams::new("s1", format!("t{}", n), n, 5)
                .into_record(100, 0)
                .unwrap();
            tree.record_thought(record).unwrap();
        }
        let branch = ThoughtParams::new("s1", "alt", 4, 5)
            .branching(1, "alt")
            .into_record(100, 0)
            .unwrap();
        tree.record_thought(branch).unwrap();
        tree
    }

    #[test]
    fn test_empty_tree_has_no_view() {
        assert!(TreeView::build(&ThoughtTree::new("s1"), None).is_none());
    }

    #[test]
    fn test_full_view() {
        let tree = tree_with_branch();
        let view = TreeView::build(&tree, None).unwrap();
        assert_eq!(view.count(), 4);
        assert_eq!(view.children.len(), 2);
        assert!(!view.truncated);
    }

    #[test]
    fn test_depth_limit_marks_truncation() {
        let tree = tree_with_branch();
        let view = TreeView::build(&tree, Some(1)).unwrap();
        assert_eq!(view.count(), 1);
        assert!(view.truncated);

        let view = TreeView::build(&tree, Some(2)).unwrap();
        assert_eq!(view.count(), 3);
        assert!(view.children[0].truncated);
        assert!(!view.children[1].truncated);
    }

    #[test]
    fn test_view_serializes_flat_node_fields() {
        let tree = tree_with_branch();
        let json = serde_json::to_value(TreeView::build(&tree, Some(1)).unwrap()).unwrap();
        assert!(json.get("node_id").is_some());
        assert_eq!(json["truncated"], true);
    }
}
