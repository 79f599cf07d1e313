//! Node run results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::NodeError;
use crate::domain::graph::NodeType;

/// Output key holding the failure code of an error-handled node
pub const ERROR_CODE_KEY: &str = "errorCode";

/// Output key holding the failure message of an error-handled node
pub const ERROR_MESSAGE_KEY: &str = "errorMessage";

/// Execution status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRunStatus {
    #[default]
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Pruned: never invoked
    Skipped,
}

/// Token accounting for LLM-class nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCost {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenCost {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &TokenCost) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Result of running a single node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRunResult {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub alias: String,
    pub status: NodeRunStatus,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    /// `errorCode` / `errorMessage` of an error-handled failure
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub error_outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_cost: Option<TokenCost>,
    /// Branch selected by a conditional node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_source_handle: Option<String>,
}

impl NodeRunResult {
    pub fn succeeded(outputs: Map<String, Value>) -> Self {
        Self {
            status: NodeRunStatus::Succeeded,
            outputs,
            ..Default::default()
        }
    }

    pub fn failed(error: NodeError) -> Self {
        Self {
            status: NodeRunStatus::Failed,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn skipped(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeRunStatus::Skipped,
            ..Default::default()
        }
    }

    /// A node the run stopped before it could settle
    pub fn cancelled(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeRunStatus::Cancelled,
            error: Some(NodeError::cancelled()),
            ..Default::default()
        }
    }

    pub fn with_edge_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.edge_source_handle = Some(handle.into());
        self
    }

    pub fn with_token_cost(mut self, cost: TokenCost) -> Self {
        self.token_cost = Some(cost);
        self
    }

    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == NodeRunStatus::Succeeded
    }

    /// Fills `errorCode` / `errorMessage` from the given failure
    pub fn record_error(&mut self, error: &NodeError) {
        self.error_outputs.insert(
            ERROR_CODE_KEY.to_string(),
            Value::String(error.code.as_str().to_string()),
        );
        self.error_outputs.insert(
            ERROR_MESSAGE_KEY.to_string(),
            Value::String(error.message.clone()),
        );
        self.error = Some(error.clone());
    }

    /// Entries written to the variable pool for this node
    pub fn pool_entries(&self) -> Map<String, Value> {
        let mut entries = self.outputs.clone();
        for (key, value) in &self.error_outputs {
            entries.insert(key.clone(), value.clone());
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_cost_add() {
        let mut total = TokenCost::default();
        total.add(&TokenCost::new(10, 5));
        total.add(&TokenCost::new(1, 2));

        assert_eq!(total, TokenCost::new(11, 7));
        assert_eq!(total.total_tokens, 18);
    }

    #[test]
    fn test_pool_entries_include_error_outputs() {
        let mut output = Map::new();
        output.insert("answer".to_string(), json!("fallback"));

        let mut result = NodeRunResult::succeeded(output.clone());
        result.record_error(&NodeError::execution("upstream 502"));

        assert_eq!(result.outputs, output);
        let entries = result.pool_entries();
        assert_eq!(entries["answer"], json!("fallback"));
        assert_eq!(entries[ERROR_CODE_KEY], json!("execution"));
        assert_eq!(entries[ERROR_MESSAGE_KEY], json!("upstream 502"));
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(NodeRunStatus::Succeeded).unwrap(),
            json!("SUCCEEDED")
        );
        assert_eq!(
            serde_json::to_value(NodeRunStatus::Skipped).unwrap(),
            json!("SKIPPED")
        );
    }
}
