//! Per-item execution of an iteration node's inner sub-graph

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::scheduler::{RunContext, Scheduler};
use crate::domain::node::{NodeError, SubgraphRunner};
use crate::domain::variable::VariablePool;
use crate::domain::workflow::WorkflowError;

/// Scope input holding the current item
pub const ITEM_INPUT: &str = "item";

/// Scope input holding the zero-based item position
pub const INDEX_INPUT: &str = "index";

/// Runs one inner scope per item, at most `iteration_concurrency` at a time
pub(crate) struct IterationRunner {
    run: Arc<RunContext>,
    scope_id: String,
    parent_pool: Arc<VariablePool>,
}

impl IterationRunner {
    pub(crate) fn new(run: Arc<RunContext>, scope_id: String, parent_pool: Arc<VariablePool>) -> Self {
        Self {
            run,
            scope_id,
            parent_pool,
        }
    }

    #[instrument(skip(self, item), fields(scope = %self.scope_id))]
    async fn run_item(&self, index: usize, item: Value) -> Result<Map<String, Value>, NodeError> {
        let mut inputs = Map::new();
        inputs.insert(ITEM_INPUT.to_string(), item);
        inputs.insert(INDEX_INPUT.to_string(), Value::from(index));

        let scheduler = Scheduler::nested(
            self.run.clone(),
            &self.scope_id,
            self.parent_pool.clone(),
            inputs,
        )
        .map_err(to_node_error)?;

        let outputs = Arc::new(scheduler).run().await.map_err(to_node_error)?;
        debug!(index, "Iteration item finished");

        Ok(outputs)
    }
}

#[async_trait]
impl SubgraphRunner for IterationRunner {
    async fn run_batch(&self, items: Vec<Value>) -> Vec<Result<Map<String, Value>, NodeError>> {
        let concurrency = self.run.config.iteration_concurrency.max(1);

        // `buffered` keeps input order whatever the completion order
        stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| self.run_item(index, item))
            .buffered(concurrency)
            .collect()
            .await
    }
}

fn to_node_error(error: WorkflowError) -> NodeError {
    match error {
        WorkflowError::WorkflowInterrupted { source, .. }
        | WorkflowError::NodeExecution { source, .. } => source,
        WorkflowError::Cancelled(_) => NodeError::cancelled(),
        other => NodeError::execution(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_errors_keep_their_cause() {
        let err = to_node_error(WorkflowError::interrupted(
            "ifly-code::1",
            NodeError::timeout(100),
        ));
        assert_eq!(err, NodeError::timeout(100));

        assert_eq!(
            to_node_error(WorkflowError::cancelled("Run cancelled")),
            NodeError::cancelled()
        );

        let err = to_node_error(WorkflowError::NoEndResult);
        assert_eq!(
            err.message,
            "Workflow finished without an end node result"
        );
    }
}
