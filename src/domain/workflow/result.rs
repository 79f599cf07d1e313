//! Run results and checkpoints

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::error::WorkflowError;
use super::request::ChatTurn;
use crate::domain::node::{NodeRunResult, NodeRunStatus, TokenCost};

/// Successful completion of a non-streaming run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub run_id: String,
    /// Resolved output of the end node
    pub outputs: Map<String, Value>,
    pub token_cost: TokenCost,
    pub trace: Vec<NodeRunResult>,
    pub elapsed_ms: u64,
}

impl WorkflowRunResult {
    pub fn node(&self, node_id: &str) -> Option<&NodeRunResult> {
        self.trace.iter().find(|r| r.node_id == node_id)
    }

    /// Whether the node was pruned instead of run
    pub fn was_skipped(&self, node_id: &str) -> bool {
        self.node(node_id)
            .is_some_and(|r| r.status == NodeRunStatus::Skipped)
    }
}

/// Terminal error object with the last known partial trace
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct WorkflowFailure {
    pub run_id: String,
    pub error: WorkflowError,
    pub trace: Vec<NodeRunResult>,
}

impl WorkflowFailure {
    pub fn new(run_id: impl Into<String>, error: WorkflowError) -> Self {
        Self {
            run_id: run_id.into(),
            error,
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<NodeRunResult>) -> Self {
        self.trace = trace;
        self
    }

    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

impl From<WorkflowFailure> for WorkflowError {
    fn from(failure: WorkflowFailure) -> Self {
        failure.error
    }
}

/// Question an interruptible node is waiting on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub node_id: String,
    pub question: Value,
}

/// Serializable state of a paused run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: String,
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    /// Settled nodes of the top-level graph
    pub results: BTreeMap<String, NodeRunResult>,
    pub pending: Option<PendingQuestion>,
    pub created_at: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn to_json(&self) -> Result<String, WorkflowError> {
        serde_json::to_string(self)
            .map_err(|e| WorkflowError::internal(format!("Failed to serialize checkpoint: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(json)
            .map_err(|e| WorkflowError::validation(format!("Malformed checkpoint: {}", e)))
    }
}
