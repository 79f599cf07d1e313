//! Variable pool errors

use thiserror::Error;

use crate::domain::node::NodeError;

/// Failure to read or write the variable pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariableError {
    #[error("Invalid variable path: {0}")]
    InvalidPath(String),

    #[error("Unknown producer: {0}")]
    UnknownProducer(String),

    #[error("Node '{0}' will never produce a value (pruned or failed)")]
    Unproduced(String),

    #[error("Path '{0}' not found in producer outputs")]
    PathNotFound(String),

    #[error("Outputs of '{0}' were already written")]
    AlreadyWritten(String),
}

impl VariableError {
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath(message.into())
    }
}

impl From<VariableError> for NodeError {
    fn from(error: VariableError) -> Self {
        NodeError::input_resolution(error.to_string())
    }
}
