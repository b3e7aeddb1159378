use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Default UCB1 exploration constant (sqrt(2))
pub const DEFAULT_EXPLORATION_CONSTANT: f64 = std::f64::consts::SQRT_2;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub tree: TreeConfig,
    pub history: HistoryConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Thought tree and lifecycle configuration
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub max_nodes_per_tree: usize,
    pub max_tree_age_ms: u64,
    pub exploration_constant: f64,
    pub enable_auto_tree: bool,
    pub max_sessions: usize,
    pub cleanup_interval_ms: u64,
}

/// Per-session history configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub max_history_size: usize,
    pub max_thoughts_per_branch: usize,
    pub max_thought_length: usize,
}

/// Snapshot database configuration. `path == None` disables persistence.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let tree_defaults = TreeConfig::default();
        let tree = TreeConfig {
            max_nodes_per_tree: parse_env("TREE_MAX_NODES", tree_defaults.max_nodes_per_tree),
            max_tree_age_ms: parse_env("TREE_MAX_AGE_MS", tree_defaults.max_tree_age_ms),
            exploration_constant: parse_env(
                "TREE_EXPLORATION_CONSTANT",
                tree_defaults.exploration_constant,
            ),
            enable_auto_tree: parse_env("TREE_ENABLE_AUTO", tree_defaults.enable_auto_tree),
            max_sessions: parse_env("TREE_MAX_SESSIONS", tree_defaults.max_sessions),
            cleanup_interval_ms: parse_env(
                "TREE_CLEANUP_INTERVAL_MS",
                tree_defaults.cleanup_interval_ms,
            ),
        };

        let history_defaults = HistoryConfig::default();
        let history = HistoryConfig {
            max_history_size: parse_env("HISTORY_MAX_SIZE", history_defaults.max_history_size),
            max_thoughts_per_branch: parse_env(
                "HISTORY_MAX_THOUGHTS_PER_BRANCH",
                history_defaults.max_thoughts_per_branch,
            ),
            max_thought_length: parse_env(
                "THOUGHT_MAX_LENGTH",
                history_defaults.max_thought_length,
            ),
        };

        let database = DatabaseConfig {
            path: env::var("DATABASE_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty() && !p.eq_ignore_ascii_case("none"))
                .map(PathBuf::from),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let config = Config {
            tree,
            history,
            database,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation. Must pass before the engine is constructed.
    pub fn validate(&self) -> Result<(), AppError> {
        let tree = &self.tree;
        let history = &self.history;

        // Zero would silently turn exploration off.
        if !tree.exploration_constant.is_finite() || tree.exploration_constant <= 0.0 {
            return Err(config_error(format!(
                "TREE_EXPLORATION_CONSTANT must be a finite number > 0 (got {})",
                tree.exploration_constant
            )));
        }
        if tree.max_nodes_per_tree == 0 {
            return Err(config_error("TREE_MAX_NODES must be > 0"));
        }
        if tree.max_tree_age_ms == 0 {
            return Err(config_error("TREE_MAX_AGE_MS must be > 0"));
        }
        if tree.max_sessions == 0 {
            return Err(config_error("TREE_MAX_SESSIONS must be > 0"));
        }
        if tree.cleanup_interval_ms == 0 {
            return Err(config_error("TREE_CLEANUP_INTERVAL_MS must be > 0"));
        }
        if history.max_history_size == 0 {
            return Err(config_error("HISTORY_MAX_SIZE must be > 0"));
        }
        if history.max_thought_length == 0 {
            return Err(config_error("THOUGHT_MAX_LENGTH must be > 0"));
        }
        if history.max_thoughts_per_branch == 0 {
            return Err(config_error("HISTORY_MAX_THOUGHTS_PER_BRANCH must be > 0"));
        }
        if history.max_thoughts_per_branch > history.max_history_size {
            return Err(config_error(format!(
                "HISTORY_MAX_THOUGHTS_PER_BRANCH ({}) must not exceed HISTORY_MAX_SIZE ({})",
                history.max_thoughts_per_branch, history.max_history_size
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tree: TreeConfig::default(),
            history: HistoryConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_nodes_per_tree: 500,
            max_tree_age_ms: 3_600_000,
            exploration_constant: DEFAULT_EXPLORATION_CONSTANT,
            enable_auto_tree: true,
            max_sessions: 100,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: 1000,
            max_thoughts_per_branch: 100,
            max_thought_length: 10_000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_exploration_constant_rejected() {
        let mut config = Config::default();
        config.tree.exploration_constant = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TREE_EXPLORATION_CONSTANT"));
    }

    #[test]
    fn test_non_finite_exploration_constant_rejected() {
        let mut config = Config::default();
        config.tree.exploration_constant = f64::NAN;
        assert!(config.validate().is_err());

        config.tree.exploration_constant = f64::INFINITY;
        assert!(config.validate().is_err());

        config.tree.exploration_constant = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_branch_cap_must_fit_history() {
        let mut config = Config::default();
        config.history.max_history_size = 10;
        config.history.max_thoughts_per_branch = 11;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
        assert!(err.to_string().contains("must not exceed"));

        config.history.max_thoughts_per_branch = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacities_rejected() {
        let mut config = Config::default();
        config.tree.max_nodes_per_tree = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.max_history_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tree.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.tree.max_nodes_per_tree, 500);
        assert!(config.tree.enable_auto_tree);
        assert!((config.tree.exploration_constant - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(config.history.max_history_size, 1000);
        assert!(config.database.path.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }
}
