//! Workflow error types

use thiserror::Error;

use crate::domain::node::NodeError;

/// Run-level errors surfaced to the caller
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Node '{node_id}' ({node_type}) failed: {source}")]
    NodeExecution {
        node_id: String,
        node_type: String,
        source: NodeError,
    },

    #[error("Workflow interrupted by node '{node_id}': {source}")]
    WorkflowInterrupted { node_id: String, source: NodeError },

    #[error("Workflow cancelled: {0}")]
    Cancelled(String),

    #[error("No implementation registered for node type: {0}")]
    UnsupportedNode(String),

    #[error("Workflow finished without an end node result")]
    NoEndResult,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn node_execution(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        source: NodeError,
    ) -> Self {
        Self::NodeExecution {
            node_id: node_id.into(),
            node_type: node_type.into(),
            source,
        }
    }

    pub fn interrupted(node_id: impl Into<String>, source: NodeError) -> Self {
        Self::WorkflowInterrupted {
            node_id: node_id.into(),
            source,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    pub fn unsupported_node(node_type: impl Into<String>) -> Self {
        Self::UnsupportedNode(node_type.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable code reported in error chunks and terminal error objects
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NodeExecution { .. } => "NODE_EXECUTION_ERROR",
            Self::WorkflowInterrupted { .. } => "WORKFLOW_INTERRUPTED",
            Self::Cancelled(_) => "CANCELLED",
            Self::UnsupportedNode(_) => "UNSUPPORTED_NODE",
            Self::NoEndResult => "NO_END_RESULT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Node the error is attributed to, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeExecution { node_id, .. } | Self::WorkflowInterrupted { node_id, .. } => {
                Some(node_id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::validation("dangling edge");
        assert_eq!(err.to_string(), "Validation error: dangling edge");

        let err = WorkflowError::interrupted("spark-llm::1", NodeError::execution("boom"));
        assert_eq!(
            err.to_string(),
            "Workflow interrupted by node 'spark-llm::1': boom"
        );

        let err = WorkflowError::node_execution("ifly-code::1", "ifly-code", NodeError::timeout(500));
        assert_eq!(
            err.to_string(),
            "Node 'ifly-code::1' (ifly-code) failed: Timed out after 500ms"
        );
    }

    #[test]
    fn test_codes_and_attribution() {
        let err = WorkflowError::interrupted("a", NodeError::execution("x"));
        assert_eq!(err.code(), "WORKFLOW_INTERRUPTED");
        assert_eq!(err.node_id(), Some("a"));

        let err = WorkflowError::cancelled("client disconnected");
        assert_eq!(err.code(), "CANCELLED");
        assert_eq!(err.node_id(), None);
    }
}
