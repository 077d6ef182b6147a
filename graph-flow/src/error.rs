use thiserror::Error;

/// Errors raised by the graph engine and by tasks running inside it
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
