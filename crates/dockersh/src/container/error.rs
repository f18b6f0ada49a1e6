//! Container runtime error types.

use thiserror::Error;

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors that can occur during container operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container command failed.
    #[error("container {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Another container already holds the name, usually a concurrent login
    /// that won the race to create it.
    #[error("container name '{0}' is already in use; try again")]
    NameConflict(String),

    /// Failed to parse container output.
    #[error("failed to parse container output: {0}")]
    ParseError(String),

    /// The runtime binary could not be executed.
    #[error("container runtime '{0}' not found")]
    RuntimeNotFound(String),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ContainerError {
    /// Whether running dockersh again may succeed without any change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ContainerError::NameConflict(_))
    }
}
