//! End-to-end scenarios for the thinking engine
//!
//! Drives the engine through its public API with a manual clock, the same
//! way the MCP handlers do.

use std::sync::Arc;
use std::thread;


use mcp_thought_tree::clock::ManualClock;
use mcp_thought_tree::config::Config;
use mcp_thought_tree::engine::ThinkingEngine;
use mcp_thought_tree::error::AppError;
use mcp_thought_tree::mcts::Strategy;
use mcp_thought_tree::modes::ThinkingMode;
use mcp_thought_tree::thoughts::ThoughtParams;

fn create_engine(config: Config) -> (ThinkingEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = ThinkingEngine::new(&config, clock.clone()).expect("valid config");
    (engine, clock)
}

fn step(session: &str, n: u32) -> ThoughtParams {
    ThoughtParams::new(session, format!("Thought {}", n), n, 5)
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_linear_chain_then_branch() {
        let (engine, _) = create_engine(Config::default());

        let first = engine.record_thought(step("s1", 1)).unwrap();
        let second = engine.record_thought(step("s1", 2)).unwrap();
        let third = engine.record_thought(step("s1", 3)).unwrap();
        assert_eq!(first.parent_node_id, None);
        assert_eq!(second.parent_node_id.as_deref(), Some(first.node_id.as_str()));
        assert_eq!(third.parent_node_id.as_deref(), Some(second.node_id.as_str()));

        let summary = engine.get_thinking_summary("s1", None).unwrap();
        assert_eq!(summary.path_length, 3);
        assert_eq!(summary.tree_stats.total_nodes, 3);
        assert_eq!(summary.tree_stats.leaf_count, 1);
        assert_eq!(summary.tree_stats.max_depth, 2);

        let branch = engine
            .record_thought(step("s1", 4).branching(2, "b1"))
            .unwrap();
        assert_eq!(branch.parent_node_id.as_deref(), Some(second.node_id.as_str()));
        assert_eq!(branch.branches, vec!["b1".to_string()]);
        assert_eq!(branch.tree_stats.leaf_count, 2);
        assert_eq!(branch.tree_stats.branch_points, 1);

        assert_eq!(engine.get_branches("s1").unwrap(), vec!["b1".to_string()]);
        let branch_thoughts = engine.get_branch_thoughts("s1", "b1").unwrap();
        assert_eq!(branch_thoughts.len(), 1);
        assert_eq!(branch_thoughts[0].thought_number, 4);
    }

    #[test]
    fn test_revision_requires_existing_target() {
        let (engine, _) = create_engine(Config::default());
        engine.record_thought(step("s1", 1)).unwrap();

        let err = engine
            .record_thought(step("s1", 3).revising(2))
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessLogic { .. }));
        assert_eq!(engine.get_history("s1", None).unwrap().len(), 1);
        assert_eq!(
            engine.get_stats(Some("s1")).unwrap().total_nodes,
            1,
            "rejected revision must not attach a node"
        );

        let second = engine.record_thought(step("s1", 2)).unwrap();
        let revision = engine
            .record_thought(step("s1", 3).revising(2))
            .unwrap();

        // Sibling of thought 2, original untouched.
        assert_eq!(revision.parent_node_id, second.parent_node_id);
        let original = engine
            .find_node_by_thought_number("s1", 2)
            .unwrap()
            .unwrap();
        assert_eq!(original.node_id, second.node_id);
        assert_eq!(original.thought, "Thought 2");
        assert!(!original.is_revision);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let (engine, _) = create_engine(Config::default());
        engine.record_thought(step("s1", 1)).unwrap();

        let err = engine
            .record_thought(step("s1", 2).branching(2, "self"))
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessLogic { .. }));
        assert!(engine.get_branches("s1").unwrap().is_empty());
    }

    #[test]
    fn test_backpropagation_reaches_root() {
        let (engine, _) = create_engine(Config::default());
        engine.record_thought(step("s1", 1)).unwrap();
        engine.record_thought(step("s1", 2)).unwrap();
        let leaf = engine.record_thought(step("s1", 3)).unwrap();

        let first = engine.evaluate_thought("s1", &leaf.node_id, 0.5).unwrap();
        assert_eq!(first.evaluation.nodes_updated, 3);
        engine.evaluate_thought("s1", &leaf.node_id, 0.25).unwrap();

        let path = engine.backtrack("s1", &leaf.node_id).unwrap().path;
        assert_eq!(path.len(), 3);
        for node in &path {
            assert_eq!(node.visit_count, 2, "node {}", node.thought_number);
            assert_eq!(node.total_value, 0.75, "node {}", node.thought_number);
        }
    }

    #[test]
    fn test_suggest_prefers_unvisited_then_value() {
        let (engine, _) = create_engine(Config::default());
        let root = engine.record_thought(step("s1", 1)).unwrap();
        let a = engine.record_thought(step("s1", 2)).unwrap();
        let b = engine
            .record_thought(step("s1", 3).branching(1, "alt"))
            .unwrap();

        engine.evaluate_thought("s1", &a.node_id, 1.0).unwrap();
        let suggested = engine.suggest_next("s1", Some(Strategy::Balanced)).unwrap();
        let top = suggested.suggestions.suggestion.unwrap();
        assert_eq!(top.node.node_id, b.node_id);
        assert!(top.unexplored);

        engine.evaluate_thought("s1", &b.node_id, 0.0).unwrap();
        let exploit = engine.suggest_next("s1", Some(Strategy::Exploit)).unwrap();
        let top = exploit.suggestions.suggestion.unwrap();
        assert_ne!(top.node.node_id, b.node_id);
        assert!(exploit
            .suggestions
            .alternatives
            .iter()
            .all(|c| c.node.node_id != top.node.node_id));
        assert!(root.node_id.starts_with("node-"));
    }

    #[test]
    fn test_backtrack_redirects_linear_continuation() {
        let (engine, _) = create_engine(Config::default());
        let first = engine.record_thought(step("s1", 1)).unwrap();
        engine.record_thought(step("s1", 2)).unwrap();

        engine.backtrack("s1", &first.node_id).unwrap();
        let next = engine.record_thought(step("s1", 3)).unwrap();
        assert_eq!(next.parent_node_id.as_deref(), Some(first.node_id.as_str()));
    }

    #[test]
    fn test_mode_guidance() {
        let (engine, _) = create_engine(Config::default());
        assert!(engine.get_thinking_mode("s1").unwrap().is_none());

        let config = engine.set_thinking_mode("s1", ThinkingMode::Fast).unwrap();
        assert_eq!(config.recommended_steps.max, 5);

        let recorded = engine.record_thought(step("s1", 1)).unwrap();
        let guidance = recorded.mode_guidance.unwrap();
        assert_eq!(guidance.mode, ThinkingMode::Fast);
        assert!(guidance.within_range);
    }
}

#[cfg(test)]
mod read_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unknown_session_reads_are_empty() {
        let (engine, _) = create_engine(Config::default());

        assert!(engine.get_history("never-seen-session", None).unwrap().is_empty());
        assert!(engine.get_branches("never-seen-session").unwrap().is_empty());
        assert!(engine
            .find_node_by_thought_number("never-seen-session", 1)
            .unwrap()
            .is_none());
        assert!(engine
            .suggest_next("never-seen-session", None)
            .unwrap()
            .suggestions
            .suggestion
            .is_none());
    }

    #[test]
    fn test_unknown_session_targeted_calls_fail() {
        let (engine, _) = create_engine(Config::default());

        assert!(matches!(
            engine.get_thinking_summary("ghost", None).unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert!(matches!(
            engine.backtrack("ghost", "node-1").unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert!(matches!(
            engine.end_session("ghost").unwrap_err(),
            AppError::NotFound { .. }
        ));
    }

    #[test]
    fn test_history_wraps_at_capacity() {
        let mut config = Config::default();
        config.history.max_history_size = 3;
        config.history.max_thoughts_per_branch = 3;
        let (engine, _) = create_engine(config);

        for n in 1..=5 {
            engine.record_thought(step("s1", n)).unwrap();
        }

        let numbers: Vec<u32> = engine
            .get_history("s1", None)
            .unwrap()
            .iter()
            .map(|t| t.thought_number)
            .collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        assert_eq!(engine.get_stats(Some("s1")).unwrap().total_nodes, 5);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use mcp_thought_tree::lifecycle::LifecycleState;

    #[test]
    fn test_aged_session_is_evicted() {
        let mut config = Config::default();
        config.tree.max_tree_age_ms = 100;
        let (engine, clock) = create_engine(config);

        engine.record_thought(step("s1", 1)).unwrap();
        clock.advance(150);
        assert_eq!(engine.lifecycle_state("s1").unwrap(), LifecycleState::AgedOut);

        let report = engine.cleanup().unwrap();
        assert_eq!(report.evicted, vec!["s1".to_string()]);
        assert_eq!(engine.lifecycle_state("s1").unwrap(), LifecycleState::Evicted);

        assert!(matches!(
            engine.get_thinking_summary("s1", None).unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert!(engine.get_history("s1", None).unwrap().is_empty());
        assert_eq!(engine.take_removed_sessions().unwrap(), vec!["s1".to_string()]);
    }

    #[test]
    fn test_recent_activity_keeps_session() {
        let mut config = Config::default();
        config.tree.max_tree_age_ms = 100;
        let (engine, clock) = create_engine(config);

        let first = engine.record_thought(step("s1", 1)).unwrap();
        clock.advance(80);
        engine.evaluate_thought("s1", &first.node_id, 0.5).unwrap();
        clock.advance(80);

        assert!(engine.cleanup().unwrap().evicted.is_empty());
        assert_eq!(engine.session_ids().unwrap(), vec!["s1".to_string()]);
    }

    #[test]
    fn test_sessions_are_independent_across_threads() {
        let (engine, _) = create_engine(Config::default());
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let session = format!("worker-{}", i);
                    for n in 1..=10 {
                        engine.record_thought(step(&session, n)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = engine.get_stats(None).unwrap();
        assert_eq!(stats.live_sessions, 4);
        assert_eq!(stats.total_nodes, 40);
        for i in 0..4 {
            let summary = engine
                .get_thinking_summary(&format!("worker-{}", i), None)
                .unwrap();
            assert_eq!(summary.path_length, 10);
        }
    }
}
