use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Business rule violated: {message}")]
    BusinessLogic { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Invalid capacity: {capacity} (must be a positive integer)")]
    InvalidCapacity { capacity: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Shorthand for a field validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a rejected reference or capacity rule.
    pub fn business(message: impl Into<String>) -> Self {
        AppError::BusinessLogic {
            message: message.into(),
        }
    }

    /// Unknown session.
    pub fn session_not_found(session_id: &str) -> Self {
        AppError::NotFound {
            resource: "Session".to_string(),
            id: session_id.to_string(),
        }
    }

    /// Unknown node within a known session.
    pub fn node_not_found(node_id: &str) -> Self {
        AppError::NotFound {
            resource: "Node".to_string(),
            id: node_id.to_string(),
        }
    }

    /// True for errors the caller can fix by resubmitting a corrected request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. } | AppError::BusinessLogic { .. } | AppError::NotFound { .. }
        )
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Snapshot serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
