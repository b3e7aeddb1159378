use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::SharedState;
use crate::error::{AppError, AppResult, McpError, McpResult};
use crate::mcts::Strategy;
use crate::modes::ThinkingMode;
use crate::thoughts::ThoughtParams;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "thought_record" => handle_record(state, arguments),
        "thought_evaluate" => handle_evaluate(state, arguments),
        "thought_suggest" => handle_suggest(state, arguments),
        "thought_backtrack" => handle_backtrack(state, arguments),
        "thought_summary" => handle_summary(state, arguments),
        "thought_mode_set" => handle_mode_set(state, arguments),
        "thought_mode_get" => handle_mode_get(state, arguments),
        "thought_history" => handle_history(state, arguments),
        "thought_branches" => handle_branches(state, arguments),
        "thought_session_start" => handle_session_start(state, arguments),
        "thought_session_end" => handle_session_end(state, arguments),
        "thought_stats" => handle_stats(state, arguments),
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Tool parameters
// ============================================================================

/// Parameters naming only a session.
#[derive(Debug, Deserialize)]
pub struct SessionParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
}

/// Parameters for thought_evaluate.
#[derive(Debug, Deserialize)]
pub struct EvaluateParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(alias = "nodeId")]
    pub node_id: String,
    /// Evaluation in [0, 1].
    pub value: f64,
}

/// Parameters for thought_suggest.
#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub strategy: Option<Strategy>,
}

/// Parameters for thought_backtrack.
#[derive(Debug, Deserialize)]
pub struct BacktrackParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(alias = "nodeId")]
    pub node_id: String,
}

/// Parameters for thought_summary.
#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(default, alias = "maxDepth")]
    pub max_depth: Option<usize>,
}

/// Parameters for thought_mode_set.
#[derive(Debug, Deserialize)]
pub struct ModeSetParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    pub mode: String,
}

/// Parameters for thought_history.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    /// Zero or negative returns nothing.
    #[serde(default)]
    pub limit: Option<i64>,
    /// Return this branch's thoughts instead of the recent history.
    #[serde(default, alias = "branchId")]
    pub branch_id: Option<String>,
}

impl HistoryParams {
    fn clamped_limit(&self) -> Option<usize> {
        self.limit
            .map(|limit| usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
    }
}

/// Parameters for thought_session_start.
#[derive(Debug, Default, Deserialize)]
pub struct SessionStartParams {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

/// Parameters for thought_stats.
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle thought_record tool call
fn handle_record(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ThoughtParams = parse_arguments("thought_record", arguments)?;
    let result = run("thought_record", state.engine.record_thought(params))?;
    state.persist_session(&result.session_id);
    to_json(result)
}

/// Handle thought_evaluate tool call
fn handle_evaluate(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: EvaluateParams = parse_arguments("thought_evaluate", arguments)?;
    let result = run(
        "thought_evaluate",
        state
            .engine
            .evaluate_thought(&params.session_id, &params.node_id, params.value),
    )?;
    state.persist_session(&params.session_id);
    to_json(result)
}

/// Handle thought_suggest tool call
fn handle_suggest(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("thought_suggest", arguments, |params: SuggestParams| {
        state
            .engine
            .suggest_next(&params.session_id, params.strategy)
    })
}

/// Handle thought_backtrack tool call
fn handle_backtrack(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: BacktrackParams = parse_arguments("thought_backtrack", arguments)?;
    let result = run(
        "thought_backtrack",
        state.engine.backtrack(&params.session_id, &params.node_id),
    )?;
    state.persist_session(&params.session_id);
    to_json(result)
}

/// Handle thought_summary tool call
fn handle_summary(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("thought_summary", arguments, |params: SummaryParams| {
        state
            .engine
            .get_thinking_summary(&params.session_id, params.max_depth)
    })
}

/// Handle thought_mode_set tool call
fn handle_mode_set(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ModeSetParams = parse_arguments("thought_mode_set", arguments)?;
    let config = run(
        "thought_mode_set",
        params
            .mode
            .parse::<ThinkingMode>()
            .and_then(|mode| state.engine.set_thinking_mode(&params.session_id, mode)),
    )?;
    state.persist_session(&params.session_id);
    to_json(config)
}

/// Handle thought_mode_get tool call
fn handle_mode_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("thought_mode_get", arguments, |params: SessionParams| {
        state
            .engine
            .get_thinking_mode(&params.session_id)
            .map(|config| ModeResponse {
                session_id: params.session_id.clone(),
                configured: config.is_some(),
                config,
            })
    })
}

/// Handle thought_history tool call
fn handle_history(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("thought_history", arguments, |params: HistoryParams| {
        let thoughts = match &params.branch_id {
            Some(branch_id) => state
                .engine
                .get_branch_thoughts(&params.session_id, branch_id)?,
            None => state
                .engine
                .get_history(&params.session_id, params.clamped_limit())?,
        };
        Ok(HistoryResponse {
            session_id: params.session_id.clone(),
            branch_id: params.branch_id.clone(),
            count: thoughts.len(),
            thoughts,
        })
    })
}

/// Handle thought_branches tool call
fn handle_branches(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("thought_branches", arguments, |params: SessionParams| {
        let branches = state.engine.get_branches(&params.session_id)?;
        Ok(BranchesResponse {
            session_id: params.session_id.clone(),
            count: branches.len(),
            branches,
        })
    })
}

/// Handle thought_session_start tool call
fn handle_session_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionStartParams = match arguments {
        Some(_) => parse_arguments("thought_session_start", arguments)?,
        None => SessionStartParams::default(),
    };
    let started = run(
        "thought_session_start",
        state.engine.start_session(params.session_id.as_deref()),
    )?;
    state.persist_session(&started.session_id);
    to_json(started)
}

/// Handle thought_session_end tool call
fn handle_session_end(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionParams = parse_arguments("thought_session_end", arguments)?;
    run(
        "thought_session_end",
        state.engine.end_session(&params.session_id),
    )?;
    state.sync_removed();
    to_json(SessionEndedResponse {
        session_id: params.session_id,
        ended: true,
    })
}

/// Handle thought_stats tool call
fn handle_stats(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: StatsParams = match arguments {
        Some(_) => parse_arguments("thought_stats", arguments)?,
        None => StatsParams::default(),
    };
    let stats = run(
        "thought_stats",
        state.engine.get_stats(params.session_id.as_deref()),
    )?;
    to_json(stats)
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
struct ModeResponse {
    session_id: String,
    configured: bool,
    config: Option<crate::modes::ThinkingModeConfig>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch_id: Option<String>,
    count: usize,
    thoughts: Vec<crate::thoughts::ThoughtRecord>,
}

#[derive(Debug, Serialize)]
struct BranchesResponse {
    session_id: String,
    count: usize,
    branches: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SessionEndedResponse {
    session_id: String,
    ended: bool,
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse tool arguments into a typed parameter struct.
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Convert an engine result, logging failures at a level matching their cause.
fn run<R>(tool_name: &str, result: AppResult<R>) -> McpResult<R> {
    result.map_err(|e: AppError| {
        if e.is_caller_error() {
            info!(tool = %tool_name, error = %e, "Tool call rejected");
        } else {
            warn!(tool = %tool_name, error = %e, "Tool call failed");
        }
        McpError::from(e)
    })
}

fn to_json<R: Serialize>(result: R) -> McpResult<Value> {
    serde_json::to_value(result).map_err(McpError::Json)
}

/// Parse, run a read-only engine operation, serialize.
fn execute_handler<P, R, F>(tool_name: &str, arguments: Option<Value>, operation: F) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> AppResult<R>,
{
    let params: P = parse_arguments(tool_name, arguments)?;
    let result = run(tool_name, operation(params))?;
    to_json(result)
}
