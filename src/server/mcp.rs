//! JSON-RPC 2.0 over stdio and the thought-tree tool catalogue.
//!
//! One request per line on stdin, one response per line on stdout.
//! Tool failures are reported inside the tool result with `isError`, not as
//! JSON-RPC errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null for notifications; always serialized).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    /// Successful result carrying one text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::text(text)],
            is_error: None,
        }
    }

    /// Failed result; the message is shown to the client as tool output.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::text(message)],
            is_error: Some(true),
        }
    }
}

impl ToolResultContent {
    fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Handles JSON-RPC 2.0 messages over stdin/stdout for MCP protocol
/// communication with clients.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("MCP Thought Tree Server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            // Notifications get no response
            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request
    /// Returns None for notifications (requests without id)
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Check if this is a notification (no id = no response required)
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" => {
                // Notification - no response per JSON-RPC 2.0
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                // Notification - no response
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                // For unknown methods, only respond if it's a request (has id)
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "mcp-thought-tree".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        let tools = all_tools();
        debug!(count = tools.len(), "Listing tools");

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "tools": tools
            }),
        )
    }

    /// Handle tools/call request
    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let tool_result = match handle_tool_call(&self.state, &params.name, params.arguments).await
        {
            Ok(result) => match serde_json::to_string_pretty(&result) {
                Ok(text) => ToolCallResult::text(text),
                Err(e) => {
                    error!(error = %e, "Failed to serialize tool result");
                    ToolCallResult::failure(format!("Error: result serialization failed: {}", e))
                }
            },
            Err(e) => ToolCallResult::failure(format!("Error: {}", e)),
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id.clone(), -32603, format!("Internal error: {}", e))
            }
        }
    }
}


/// Every tool the server exposes, in listing order.
pub fn all_tools() -> Vec<Tool> {
    vec![
        get_record_tool(),
        get_evaluate_tool(),
        get_suggest_tool(),
        get_backtrack_tool(),
        get_summary_tool(),
        get_mode_set_tool(),
        get_mode_get_tool(),
        get_history_tool(),
        get_branches_tool(),
        get_session_start_tool(),
        get_session_end_tool(),
        get_stats_tool(),
    ]
}

fn session_id_property() -> Value {
    serde_json::json!({
        "type": "string",
        "description": "The session ID"
    })
}

/// Schema for a tool that takes only a session ID.
fn session_only_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "session_id": session_id_property()
        },
        "required": ["session_id"],
        "additionalProperties": false
    })
}

// ============================================================================
// Thought recording and scoring
// ============================================================================

/// Get the thought record tool definition
fn get_record_tool() -> Tool {
    Tool {
        name: "thought_record".to_string(),
        description: "Record one step of a reasoning chain. Plain steps continue the active path; revisions attach as siblings of the revised step; branches fork from an earlier step. Unknown sessions are created on first use.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_property(),
                "thought": {
                    "type": "string",
                    "description": "The thought content"
                },
                "thought_number": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Position of this thought in the chain"
                },
                "total_thoughts": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Current estimate of total thoughts (raised to thought_number if lower)"
                },
                "next_thought_needed": {
                    "type": "boolean",
                    "description": "Whether another thought will follow"
                },
                "is_revision": {
                    "type": "boolean",
                    "description": "Marks this thought as a revision (requires revises_thought)"
                },
                "revises_thought": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Earlier thought number being revised"
                },
                "branch_from_thought": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Earlier thought number to branch from (requires branch_id)"
                },
                "branch_id": {
                    "type": "string",
                    "description": "Identifier for the new branch"
                }
            },
            "required": ["session_id", "thought", "thought_number", "total_thoughts", "next_thought_needed"],
            "additionalProperties": false
        }),
    }
}

/// Get the thought evaluate tool definition
fn get_evaluate_tool() -> Tool {
    Tool {
        name: "thought_evaluate".to_string(),
        description: "Score a thought node in [0, 1]. The value is added to the node and every ancestor, and each visit count is incremented.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_property(),
                "node_id": {
                    "type": "string",
                    "description": "The node to evaluate"
                },
                "value": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Evaluation score (0.0-1.0)"
                }
            },
            "required": ["session_id", "node_id", "value"],
            "additionalProperties": false
        }),
    }
}

/// Get the thought suggest tool definition
fn get_suggest_tool() -> Tool {
    Tool {
        name: "thought_suggest".to_string(),
        description: "Rank open nodes by UCB1 and suggest where to continue, with up to three alternatives. Unvisited nodes are always explored first.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_property(),
                "strategy": {
                    "type": "string",
                    "enum": ["explore", "exploit", "balanced"],
                    "description": "Scales the exploration constant (default: balanced)"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the thought backtrack tool definition
fn get_backtrack_tool() -> Tool {
    Tool {
        name: "thought_backtrack".to_string(),
        description: "Return to an earlier node. The next plain thought continues beneath it. Returns the node, its children and its path from the root.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_property(),
                "node_id": {
                    "type": "string",
                    "description": "The node to return to"
                }
            },
            "required": ["session_id", "node_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the thought summary tool definition
fn get_summary_tool() -> Tool {
    Tool {
        name: "thought_summary".to_string(),
        description: "Summarize a session: the best path by average value, tree statistics and a nested view of the tree.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_property(),
                "max_depth": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of levels in the best path and tree view"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

// ============================================================================
// Thinking modes
// ============================================================================

/// Get the thought mode set tool definition
fn get_mode_set_tool() -> Tool {
    Tool {
        name: "thought_mode_set".to_string(),
        description: "Set the session's thinking mode. The mode only changes the step-range guidance attached to recorded thoughts.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_property(),
                "mode": {
                    "type": "string",
                    "enum": ["fast", "expert", "deep"],
                    "description": "fast: 3-5 steps, expert: 5-10 steps, deep: 10-20 steps"
                }
            },
            "required": ["session_id", "mode"],
            "additionalProperties": false
        }),
    }
}

/// Get the thought mode get tool definition
fn get_mode_get_tool() -> Tool {
    Tool {
        name: "thought_mode_get".to_string(),
        description: "Get the session's thinking mode and its guidance, if one is set.".to_string(),
        input_schema: session_only_schema(),
    }
}

// ============================================================================
// History
// ============================================================================

/// Get the thought history tool definition
fn get_history_tool() -> Tool {
    Tool {
        name: "thought_history".to_string(),
        description: "List recorded thoughts, oldest first. With branch_id, lists that branch's thoughts instead.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": session_id_property(),
                "limit": {
                    "type": "integer",
                    "description": "Return only the most recent N thoughts; zero or less returns none"
                },
                "branch_id": {
                    "type": "string",
                    "description": "Return the thoughts of this branch"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the thought branches tool definition
fn get_branches_tool() -> Tool {
    Tool {
        name: "thought_branches".to_string(),
        description: "List the session's branch IDs in creation order.".to_string(),
        input_schema: session_only_schema(),
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Get the thought session start tool definition
fn get_session_start_tool() -> Tool {
    Tool {
        name: "thought_session_start".to_string(),
        description: "Explicitly create a session. Required before recording when automatic session creation is disabled. Generates an ID when none is given.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Optional session ID to create"
                }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the thought session end tool definition
fn get_session_end_tool() -> Tool {
    Tool {
        name: "thought_session_end".to_string(),
        description: "End a session, discarding its tree, history and stored snapshot.".to_string(),
        input_schema: session_only_schema(),
    }
}

/// Get the thought stats tool definition
fn get_stats_tool() -> Tool {
    Tool {
        name: "thought_stats".to_string(),
        description: "Engine statistics: live sessions, node totals, caps and history usage. With session_id, also that session's lifecycle state and tree statistics.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Optional session to include"
                }
            },
            "additionalProperties": false
        }),
    }
}
