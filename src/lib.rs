//! # MCP Thought Tree Server
//!
//! A Model Context Protocol (MCP) server that records step-by-step reasoning
//! as a tree per session and ranks where to continue with UCB1.
//!
//! ## Features
//!
//! - **Thought trees**: linear continuations, revisions as sibling nodes, named branches
//! - **Scoring**: evaluations backpropagate to every ancestor
//! - **Suggestions**: UCB1 ranking with explore, exploit and balanced strategies
//! - **History**: bounded per-session history with branch indices
//! - **Lifecycle**: node caps, session caps and idle-session eviction
//! - **Thinking modes**: fast, expert and deep step-range guidance
//! - **Snapshots**: optional SQLite persistence restored at startup
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → McpServer (stdio) → ThinkingEngine → ThoughtTree / SessionThoughtStore
//!                    ↓
//!          SQLite snapshots (optional)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp_thought_tree::{clock::SystemClock, Config, ThinkingEngine};
//! use mcp_thought_tree::thoughts::ThoughtParams;
//!
//! let config = Config::default();
//! let engine = ThinkingEngine::new(&config, Arc::new(SystemClock)).unwrap();
//! let recorded = engine
//!     .record_thought(ThoughtParams::new("demo", "Restate the problem", 1, 3))
//!     .unwrap();
//! engine.evaluate_thought("demo", &recorded.node_id, 0.8).unwrap();
//! ```

/// Command-line subcommands.
pub mod cli;
/// Time source injected into the engine.
pub mod clock;
/// Configuration management for the MCP server.
pub mod config;
/// Session facade over trees, history and scoring.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Fixed-capacity history buffer.
pub mod history;
/// Node caps, session caps and idle eviction.
pub mod lifecycle;
/// UCB1 scoring, backpropagation and suggestions.
pub mod mcts;
/// Thinking-mode policy.
pub mod modes;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite snapshot persistence.
pub mod storage;
/// Thought records and the per-session history store.
pub mod thoughts;
/// The thought tree.
pub mod tree;

pub use config::Config;
pub use engine::ThinkingEngine;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
