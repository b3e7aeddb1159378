//! Command-line subcommands.
//!
//! `serve` is handled by the binary; the remaining commands are operational
//! helpers that run once and print a report.

use chrono::{TimeZone, Utc};
use clap::Subcommand;

use crate::config::Config;
use crate::storage::{SnapshotStore, SnapshotSummary};

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the MCP server on stdio (default)
    Serve,

    /// Validate and print the effective configuration
    CheckConfig,

    /// Inspect or prune stored session snapshots
    Snapshots {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
}

/// Snapshot database subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SnapshotCommands {
    /// List stored snapshots, most recently active first
    List {
        /// Maximum number of snapshots to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Delete snapshots whose last activity is older than the given age
    Purge {
        /// Age threshold in milliseconds
        #[arg(long)]
        older_than_ms: u64,
    },
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

const RULE: &str = "────────────────────────────────────────────────────────────\n";

/// Render the configuration after validating it.
pub fn execute_check_config(config: &Config) -> CliResult {
    if let Err(e) = config.validate() {
        return CliResult::error(format!("Invalid configuration: {}", e));
    }

    let mut output = String::new();
    output.push_str("\nConfiguration\n");
    output.push_str(RULE);

    output.push_str("\nTree:\n");
    output.push_str(&format!("  Max nodes per tree:   {}\n", config.tree.max_nodes_per_tree));
    output.push_str(&format!("  Max tree age:         {} ms\n", config.tree.max_tree_age_ms));
    output.push_str(&format!("  Exploration constant: {:.4}\n", config.tree.exploration_constant));
    output.push_str(&format!("  Auto-create sessions: {}\n", config.tree.enable_auto_tree));
    output.push_str(&format!("  Max sessions:         {}\n", config.tree.max_sessions));
    output.push_str(&format!("  Cleanup interval:     {} ms\n", config.tree.cleanup_interval_ms));

    output.push_str("\nHistory:\n");
    output.push_str(&format!("  Max history size:     {}\n", config.history.max_history_size));
    output.push_str(&format!(
        "  Max per branch:       {}\n",
        config.history.max_thoughts_per_branch
    ));
    output.push_str(&format!("  Max thought length:   {}\n", config.history.max_thought_length));

    output.push_str("\nPersistence:\n");
    match &config.database.path {
        Some(path) => {
            output.push_str(&format!("  Database:             {}\n", path.display()));
            output.push_str(&format!(
                "  Max connections:      {}\n",
                config.database.max_connections
            ));
        }
        None => output.push_str("  Disabled\n"),
    }

    output.push_str("\nLogging:\n");
    output.push_str(&format!("  Level:                {}\n", config.logging.level));
    output.push_str(&format!("  Format:               {:?}\n", config.logging.format));

    CliResult::success(output)
}

/// Execute a snapshot subcommand against `store`.
pub async fn execute_snapshot_command(
    command: SnapshotCommands,
    store: &dyn SnapshotStore,
    now_ms: u64,
) -> CliResult {
    match command {
        SnapshotCommands::List { limit } => execute_list(store, limit, now_ms).await,
        SnapshotCommands::Purge { older_than_ms } => {
            execute_purge(store, older_than_ms, now_ms).await
        }
    }
}

async fn execute_list(store: &dyn SnapshotStore, limit: usize, now_ms: u64) -> CliResult {
    let snapshots = match store.list_snapshots().await {
        Ok(s) => s,
        Err(e) => return CliResult::error(format!("Failed to list snapshots: {}", e)),
    };

    let mut output = String::new();
    output.push_str(&format!("\nStored Snapshots ({})\n", snapshots.len()));
    output.push_str(RULE);

    if snapshots.is_empty() {
        output.push_str("\n  No snapshots stored.\n");
        return CliResult::success(output);
    }

    output.push_str(&format!(
        "\n  {:<44} {:>6} {:>8} {:>10}  {}\n",
        "SESSION", "NODES", "HISTORY", "IDLE (s)", "SAVED AT"
    ));
    for summary in snapshots.iter().take(limit) {
        output.push_str(&format_summary(summary, now_ms));
    }
    if snapshots.len() > limit {
        output.push_str(&format!("\n  ... and {} more\n", snapshots.len() - limit));
    }

    CliResult::success(output)
}

async fn execute_purge(store: &dyn SnapshotStore, older_than_ms: u64, now_ms: u64) -> CliResult {
    let cutoff = now_ms.saturating_sub(older_than_ms);
    match store.purge_older_than(cutoff).await {
        Ok(purged) => {
            let cutoff_time = Utc
                .timestamp_millis_opt(cutoff as i64)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| cutoff.to_string());
            CliResult::success(format!(
                "Purged {} snapshot(s) inactive since before {}",
                purged, cutoff_time
            ))
        }
        Err(e) => CliResult::error(format!("Failed to purge snapshots: {}", e)),
    }
}

fn format_summary(summary: &SnapshotSummary, now_ms: u64) -> String {
    let idle_secs = now_ms.saturating_sub(summary.last_activity_ms) / 1000;
    format!(
        "  {:<44} {:>6} {:>8} {:>10}  {}\n",
        summary.session_id,
        summary.node_count,
        summary.history_size,
        idle_secs,
        summary.saved_at.format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockSnapshotStore;
    use crate::error::StorageError;

    fn summary(session_id: &str, last_activity_ms: u64) -> SnapshotSummary {
        SnapshotSummary {
            session_id: session_id.to_string(),
            node_count: 3,
            history_size: 4,
            last_activity_ms,
            saved_at: Utc.timestamp_millis_opt(last_activity_ms as i64).unwrap(),
        }
    }

    #[test]
    fn test_check_config_default() {
        let result = execute_check_config(&Config::default());
        assert_eq!(result.exit_code, 0);
        assert!(result.message.contains("Max nodes per tree:   500"));
        assert!(result.message.contains("Disabled"));
    }

    #[test]
    fn test_check_config_rejects_invalid() {
        let mut config = Config::default();
        config.tree.exploration_constant = 0.0;

        let result = execute_check_config(&config);
        assert_eq!(result.exit_code, 1);
        assert!(result.message.contains("Invalid configuration"));
    }

    #[tokio::test]
    async fn test_list_snapshots() {
        let mut mock = MockSnapshotStore::new();
        mock.expect_list_snapshots()
            .returning(|| Ok(vec![summary("s1", 50_000), summary("s2", 20_000)]));

        let result =
            execute_snapshot_command(SnapshotCommands::List { limit: 1 }, &mock, 60_000).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.message.contains("Stored Snapshots (2)"));
        assert!(result.message.contains("s1"));
        assert!(!result.message.contains("s2 "));
        assert!(result.message.contains("and 1 more"));
    }

    #[tokio::test]
    async fn test_list_empty() {
        let mut mock = MockSnapshotStore::new();
        mock.expect_list_snapshots().returning(|| Ok(vec![]));

        let result =
            execute_snapshot_command(SnapshotCommands::List { limit: 10 }, &mock, 0).await;
        assert!(result.message.contains("No snapshots stored"));
    }

    #[tokio::test]
    async fn test_purge_uses_cutoff_relative_to_now() {
        let mut mock = MockSnapshotStore::new();
        mock.expect_purge_older_than()
            .withf(|cutoff| *cutoff == 40_000)
            .times(1)
            .returning(|_| Ok(2));

        let result = execute_snapshot_command(
            SnapshotCommands::Purge {
                older_than_ms: 20_000,
            },
            &mock,
            60_000,
        )
        .await;
        assert_eq!(result.exit_code, 0);
        assert!(result.message.starts_with("Purged 2 snapshot(s)"));
    }

    #[tokio::test]
    async fn test_purge_failure() {
        let mut mock = MockSnapshotStore::new();
        mock.expect_purge_older_than().returning(|_| {
            Err(StorageError::Connection {
                message: "disk full".to_string(),
            })
        });

        let result = execute_snapshot_command(
            SnapshotCommands::Purge { older_than_ms: 1 },
            &mock,
            10,
        )
        .await;
        assert_eq!(result.exit_code, 1);
        assert!(result.message.contains("disk full"));
    }
}
