//! `iteration` node - runs its inner sub-graph once per batch item

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::node::{NodeCapabilities, NodeContext, NodeError, NodeExecutor, NodeRunResult};

/// Input holding the batch
pub const BATCH_INPUT: &str = "input";

#[derive(Debug, Default, Clone, Copy)]
pub struct IterationNode;

impl IterationNode {
    pub fn new() -> Self {
        Self
    }

    fn batch(ctx: &NodeContext, inputs: &Map<String, Value>) -> Result<Vec<Value>, NodeError> {
        let value = match inputs.get(BATCH_INPUT) {
            Some(value) => value,
            None if inputs.len() == 1 => inputs.values().next().unwrap_or(&Value::Null),
            None => {
                return Err(NodeError::invalid_input(format!(
                    "Iteration '{}' needs an '{}' input",
                    ctx.node_id(),
                    BATCH_INPUT
                )));
            }
        };

        match value {
            Value::Array(items) => Ok(items.clone()),
            Value::Null => Ok(Vec::new()),
            other => Err(NodeError::invalid_input(format!(
                "Iteration '{}' expects a list, got {}",
                ctx.node_id(),
                other
            ))),
        }
    }
}

#[async_trait]
impl NodeExecutor for IterationNode {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::default().owns_subgraph()
    }

    async fn execute(
        &self,
        ctx: &NodeContext,
        inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError> {
        let items = Self::batch(ctx, &inputs)?;
        let runner = ctx.subgraph()?;

        debug!(node_id = %ctx.node_id(), items = items.len(), "Running iteration batch");

        let mut item_outputs = Vec::with_capacity(items.len());
        for result in runner.run_batch(items).await {
            item_outputs.push(result?);
        }

        let keys: Vec<String> = if ctx.node().outputs.is_empty() {
            item_outputs
                .first()
                .map(|first| first.keys().cloned().collect())
                .unwrap_or_default()
        } else {
            ctx.node().output_names().map(str::to_string).collect()
        };

        let mut outputs = Map::new();
        for key in keys {
            let column = item_outputs
                .iter()
                .map(|item| item.get(&key).cloned().unwrap_or(Value::Null))
                .collect();
            outputs.insert(key, Value::Array(column));
        }

        Ok(NodeRunResult::succeeded(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::domain::graph::{NodeSpec, NodeType, OutputSpec};
    use crate::domain::node::MockSubgraphRunner;

    fn node() -> NodeSpec {
        NodeSpec::new("iteration::1", NodeType::Iteration).with_output(OutputSpec::new("result"))
    }

    fn inputs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_collects_outputs_per_key() {
        let mut runner = MockSubgraphRunner::new();
        runner.expect_run_batch().times(1).returning(|items| {
            items
                .into_iter()
                .map(|item| {
                    let doubled = item.as_i64().unwrap() * 2;
                    Ok(inputs(json!({"result": doubled})))
                })
                .collect()
        });

        let ctx = NodeContext::new(Arc::new(node()), NodeType::Iteration, "run-1")
            .with_subgraph(Arc::new(runner));

        let result = IterationNode
            .execute(&ctx, inputs(json!({"input": [1, 2, 3]})))
            .await
            .unwrap();

        assert_eq!(result.outputs["result"], json!([2, 4, 6]));
    }

    #[tokio::test]
    async fn test_item_failure_fails_the_node() {
        let mut runner = MockSubgraphRunner::new();
        runner.expect_run_batch().returning(|_| {
            vec![
                Ok(Map::new()),
                Err(NodeError::execution("item 1 broke")),
                Err(NodeError::execution("item 2 broke")),
            ]
        });

        let ctx = NodeContext::new(Arc::new(node()), NodeType::Iteration, "run-1")
            .with_subgraph(Arc::new(runner));

        let err = IterationNode
            .execute(&ctx, inputs(json!({"input": [1, 2, 3]})))
            .await
            .unwrap_err();

        assert_eq!(err.message, "item 1 broke");
    }

    #[tokio::test]
    async fn test_rejects_non_list_batch() {
        let ctx = NodeContext::new(Arc::new(node()), NodeType::Iteration, "run-1")
            .with_subgraph(Arc::new(MockSubgraphRunner::new()));

        let err = IterationNode
            .execute(&ctx, inputs(json!({"input": "abc"})))
            .await
            .unwrap_err();

        assert!(err.message.contains("expects a list"));
    }
}
