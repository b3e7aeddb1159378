//! Integration tests for MCP tool handling
//!
//! Drives the tool router the same way `tools/call` does, without stdio.

use std::sync::Arc;

use serde_json::{json, Value};

use mcp_thought_tree::clock::ManualClock;
use mcp_thought_tree::config::Config;
use mcp_thought_tree::engine::ThinkingEngine;
use mcp_thought_tree::error::McpError;
use mcp_thought_tree::server::{all_tools, handle_tool_call, AppState, SharedState};

fn create_state(config: Config) -> (SharedState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = ThinkingEngine::new(&config, clock.clone()).expect("valid config");
    (Arc::new(AppState::new(config, engine, None)), clock)
}

async fn call(state: &SharedState, tool: &str, args: Value) -> Value {
    handle_tool_call(state, tool, Some(args))
        .await
        .unwrap_or_else(|e| panic!("{} failed: {}", tool, e))
}

async fn record(state: &SharedState, session: &str, n: u32, extra: Value) -> Value {
    let mut args = json!({
        "sessionId": session,
        "thought": format!("Step {}", n),
        "thoughtNumber": n,
        "totalThoughts": 4,
        "nextThoughtNeeded": true
    });
    if let (Some(args), Some(extra)) = (args.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            args.insert(k.clone(), v.clone());
        }
    }
    call(state, "thought_record", args).await
}

#[cfg(test)]
mod catalogue_tests {
    use super::*;

    #[test]
    fn test_every_listed_tool_is_routed() {
        let names: Vec<String> = all_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 12);

        let (state, _) = create_state(Config::default());
        for name in names {
            let result = tokio_test::block_on(handle_tool_call(&state, &name, Some(json!({}))));
            assert!(
                !matches!(result, Err(McpError::UnknownTool { .. })),
                "{} is listed but not routed",
                name
            );
        }
    }
}

#[cfg(test)]
mod flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_reasoning_session() {
        let (state, _) = create_state(Config::default());

        call(&state, "thought_mode_set", json!({"session_id": "s1", "mode": "fast"})).await;
        let first = record(&state, "s1", 1, json!({})).await;
        assert_eq!(first["mode_guidance"]["mode"], "fast");
        let second = record(&state, "s1", 2, json!({})).await;
        let branch = record(
            &state,
            "s1",
            3,
            json!({"branchFromThought": 1, "branchId": "b1"}),
        )
        .await;
        assert_eq!(branch["parent_node_id"], first["node_id"]);
        assert_eq!(branch["branches"], json!(["b1"]));

        call(
            &state,
            "thought_evaluate",
            json!({"session_id": "s1", "node_id": second["node_id"], "value": 0.9}),
        )
        .await;

        let suggestion = call(&state, "thought_suggest", json!({"session_id": "s1"})).await;
        assert_eq!(suggestion["suggestion"]["node"]["node_id"], branch["node_id"]);
        assert_eq!(suggestion["suggestion"]["unexplored"], true);

        let summary = call(
            &state,
            "thought_summary",
            json!({"session_id": "s1", "max_depth": 5}),
        )
        .await;
        assert_eq!(summary["path_length"], 2);
        assert_eq!(summary["best_path"][1]["node_id"], second["node_id"]);
        assert_eq!(summary["tree"]["children"].as_array().unwrap().len(), 2);

        let history = call(
            &state,
            "thought_history",
            json!({"session_id": "s1", "limit": 2}),
        )
        .await;
        assert_eq!(history["count"], 2);
        assert_eq!(history["thoughts"][0]["thought_number"], 2);

        let branch_history = call(
            &state,
            "thought_history",
            json!({"session_id": "s1", "branch_id": "b1"}),
        )
        .await;
        assert_eq!(branch_history["count"], 1);

        let stats = call(&state, "thought_stats", json!({"session_id": "s1"})).await;
        assert_eq!(stats["total_nodes"], 3);
        assert_eq!(stats["session"]["state"], "active");
    }

    #[tokio::test]
    async fn test_backtrack_then_continue() {
        let (state, _) = create_state(Config::default());
        let first = record(&state, "s1", 1, json!({})).await;
        record(&state, "s1", 2, json!({})).await;

        let back = call(
            &state,
            "thought_backtrack",
            json!({"session_id": "s1", "node_id": first["node_id"]}),
        )
        .await;
        assert_eq!(back["path"].as_array().unwrap().len(), 1);
        assert_eq!(back["children"].as_array().unwrap().len(), 1);

        let next = record(&state, "s1", 3, json!({})).await;
        assert_eq!(next["parent_node_id"], first["node_id"]);
    }

    #[tokio::test]
    async fn test_explicit_sessions_when_auto_disabled() {
        let mut config = Config::default();
        config.tree.enable_auto_tree = false;
        let (state, _) = create_state(config);

        let err = handle_tool_call(
            &state,
            "thought_record",
            Some(json!({
                "session_id": "s1",
                "thought": "x",
                "thought_number": 1,
                "total_thoughts": 1,
                "next_thought_needed": false
            })),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));

        call(&state, "thought_session_start", json!({"session_id": "s1"})).await;
        let recorded = record(&state, "s1", 1, json!({})).await;
        assert_eq!(recorded["tree_stats"]["total_nodes"], 1);

        call(&state, "thought_session_end", json!({"session_id": "s1"})).await;
        let history = call(&state, "thought_history", json!({"session_id": "s1"})).await;
        assert_eq!(history["count"], 0);
    }

    #[tokio::test]
    async fn test_validation_errors_are_reported() {
        let (state, _) = create_state(Config::default());
        record(&state, "s1", 1, json!({})).await;

        let cases = [
            json!({"session_id": "s1", "thought": "   ", "thought_number": 2,
                   "total_thoughts": 2, "next_thought_needed": true}),
            json!({"session_id": "s1", "thought": "x", "thought_number": 2,
                   "total_thoughts": 2, "next_thought_needed": true, "is_revision": true}),
            json!({"session_id": "s1", "thought": "x", "thought_number": 2,
                   "total_thoughts": 2, "next_thought_needed": true, "revises_thought": 5,
                   "is_revision": true}),
        ];
        for args in cases {
            let result = handle_tool_call(&state, "thought_record", Some(args.clone())).await;
            assert!(
                matches!(result, Err(McpError::ExecutionFailed { .. })),
                "expected rejection for {}",
                args
            );
        }

        let history = call(&state, "thought_history", json!({"session_id": "s1"})).await;
        assert_eq!(history["count"], 1, "rejected thoughts must not be stored");
    }

    #[tokio::test]
    async fn test_aged_session_disappears_after_cleanup() {
        let mut config = Config::default();
        config.tree.max_tree_age_ms = 100;
        let (state, clock) = create_state(config);

        record(&state, "s1", 1, json!({})).await;
        clock.advance(150);
        state.engine.cleanup().unwrap();

        let err = handle_tool_call(
            &state,
            "thought_summary",
            Some(json!({"session_id": "s1"})),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
        let stats = call(&state, "thought_stats", json!({"session_id": "s1"})).await;
        assert_eq!(stats["session"]["state"], "evicted");
    }
}
