//! Chunks delivered to streaming callers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::graph::NodeType;
use crate::domain::node::TokenCost;
use crate::domain::workflow::WorkflowError;

/// One event of a streamed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Completed output of an end-output node
    NodeOutput {
        node_id: String,
        node_type: NodeType,
        outputs: Map<String, Value>,
    },
    /// Partial output of a streaming node
    Delta { node_id: String, content: String },
    /// The run is paused awaiting an answer
    Interrupt { node_id: String, question: Value },
    /// Inline error; the stream ends after it
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
    },
    /// Finish marker carrying the end node output
    Finish {
        outputs: Map<String, Value>,
        token_cost: TokenCost,
    },
}

impl StreamChunk {
    pub fn delta(node_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Delta {
            node_id: node_id.into(),
            content: content.into(),
        }
    }

    pub fn error(error: &WorkflowError) -> Self {
        Self::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            node_id: error.node_id().map(str::to_string),
        }
    }

    /// Whether nothing follows this chunk
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Finish { .. })
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeOutput { node_id, .. }
            | Self::Delta { node_id, .. }
            | Self::Interrupt { node_id, .. } => Some(node_id),
            Self::Error { node_id, .. } => node_id.as_deref(),
            Self::Finish { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::NodeError;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let chunk = StreamChunk::delta("spark-llm::1", "Hel");
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"event": "delta", "node_id": "spark-llm::1", "content": "Hel"})
        );
    }

    #[test]
    fn test_error_chunk() {
        let err = WorkflowError::interrupted("spark-llm::1", NodeError::execution("boom"));
        let chunk = StreamChunk::error(&err);

        assert!(chunk.is_terminal());
        assert_eq!(chunk.node_id(), Some("spark-llm::1"));
        match chunk {
            StreamChunk::Error { code, .. } => assert_eq!(code, "WORKFLOW_INTERRUPTED"),
            other => panic!("unexpected chunk: {:?}", other),
        }
    }
}
