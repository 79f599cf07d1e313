//! Typed node errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a node failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeErrorCode {
    Execution,
    Timeout,
    InputResolution,
    InvalidInput,
    MissingOutput,
    Cancelled,
}

impl NodeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::Timeout => "timeout",
            Self::InputResolution => "input_resolution",
            Self::InvalidInput => "invalid_input",
            Self::MissingOutput => "missing_output",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Error raised by a node implementation or by the engine on its behalf
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct NodeError {
    pub code: NodeErrorCode,
    pub message: String,
}

impl NodeError {
    pub fn new(code: NodeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(NodeErrorCode::Execution, message)
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            NodeErrorCode::Timeout,
            format!("Timed out after {}ms", timeout_ms),
        )
    }

    pub fn input_resolution(message: impl Into<String>) -> Self {
        Self::new(NodeErrorCode::InputResolution, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(NodeErrorCode::InvalidInput, message)
    }

    pub fn missing_output(name: &str) -> Self {
        Self::new(
            NodeErrorCode::MissingOutput,
            format!("Required output '{}' was not produced", name),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(NodeErrorCode::Cancelled, "Cancelled")
    }

    /// Whether another attempt can change the outcome
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.code,
            NodeErrorCode::InputResolution | NodeErrorCode::Cancelled
        )
    }
}
