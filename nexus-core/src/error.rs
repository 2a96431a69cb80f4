//! Error types shared across the workspace

use thiserror::Error;

/// Errors from parsing and validating core types
#[derive(Error, Debug)]
pub enum NexusError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl NexusError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        NexusError::InvalidInput(msg.into())
    }
}

/// Result type alias for core operations
pub type NexusResult<T> = Result<T, NexusError>;
