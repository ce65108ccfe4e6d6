//! Custom error types and handling
//!
//! This module defines the pipeline's error type. Every failed operation
//! surfaces a specific kind plus human-readable detail; `error_code()` is the
//! stable tag written into `Task.error_log` and `ExecutionResult.output_summary`.

use std::time::Duration;

use crate::models::TaskStatus;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Resource errors
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Test case not found: {0}")]
    CaseNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    // Analysis errors
    #[error("Requirement analyzer failed: {0}")]
    AnalyzerFailure(String),

    // Container errors
    #[error("Failed to pull image: {0}")]
    ImagePullError(String),

    #[error("Failed to start container: {0}")]
    ContainerStartError(String),

    #[error("Command timed out after {0:?}")]
    ExecTimeout(Duration),

    #[error("Command execution failed: {0}")]
    ExecError(String),

    #[error("Steps cannot be run: {0}")]
    InvalidSteps(String),

    // Precondition violations
    #[error("Task {0} has no live container environment")]
    NotPrepared(String),

    #[error("Task {0} is already executing")]
    AlreadyExecuting(String),

    #[error("Task {task_id} is {status}, cannot {operation}")]
    InvalidState {
        task_id: String,
        status: TaskStatus,
        operation: &'static str,
    },

    #[error("Task {0} has no operation in flight")]
    NotCancellable(String),

    // Interrupted work
    #[error("Cancelled by caller request")]
    Cancelled,

    #[error("Interrupted: {0}")]
    Interrupted(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // External service errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Docker error: {0}")]
    Docker(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TaskNotFound(_) => "TaskNotFound",
            Self::CaseNotFound(_) => "CaseNotFound",
            Self::DocumentNotFound(_) => "DocumentNotFound",
            Self::AnalyzerFailure(_) => "AnalyzerFailure",
            Self::ImagePullError(_) => "ImagePullError",
            Self::ContainerStartError(_) => "ContainerStartError",
            Self::ExecTimeout(_) => "ExecTimeout",
            Self::ExecError(_) => "ExecError",
            Self::InvalidSteps(_) => "InvalidSteps",
            Self::NotPrepared(_) => "NotPrepared",
            Self::AlreadyExecuting(_) => "AlreadyExecuting",
            Self::InvalidState { .. } => "InvalidState",
            Self::NotCancellable(_) => "NotCancellable",
            Self::Cancelled => "Cancelled",
            Self::Interrupted(_) => "Interrupted",
            Self::Validation(_) => "ValidationError",
            Self::Database(_) => "DatabaseError",
            Self::Docker(_) => "DockerError",
            Self::Redis(_) => "RedisError",
            Self::Render(_) => "RenderError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
            Self::Configuration(_) => "ConfigurationError",
        }
    }

    /// Precondition violations are rejected before any state change
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_)
                | Self::CaseNotFound(_)
                | Self::DocumentNotFound(_)
                | Self::NotPrepared(_)
                | Self::AlreadyExecuting(_)
                | Self::InvalidState { .. }
                | Self::NotCancellable(_)
                | Self::Validation(_)
        )
    }

    /// Entry appended to `Task.error_log`
    pub fn log_entry(&self) -> String {
        format!("{}: {}", self.error_code(), self)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<bollard::errors::Error> for AppError {
    fn from(err: bollard::errors::Error) -> Self {
        AppError::Docker(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        AppError::Render(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.into())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
