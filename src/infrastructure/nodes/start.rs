//! Scope entry nodes: `node-start` and `iteration-node-start`

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::node::{NodeContext, NodeError, NodeExecutor, NodeRunResult};

/// Publishes the scope inputs (request inputs or the current iteration item)
///
/// With declared outputs only those are published, falling back to each
/// output's schema default; without declarations every scope input is passed on.
#[derive(Debug, Default, Clone, Copy)]
pub struct StartNode;

impl StartNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeExecutor for StartNode {
    async fn execute(
        &self,
        ctx: &NodeContext,
        _inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError> {
        let node = ctx.node();
        let scope_inputs = ctx.scope_inputs();

        if node.outputs.is_empty() {
            return Ok(NodeRunResult::succeeded(scope_inputs.clone()));
        }

        let mut outputs = Map::new();

        for output in &node.outputs {
            match scope_inputs.get(&output.name).or(output.default_value()) {
                Some(value) => {
                    outputs.insert(output.name.clone(), value.clone());
                }
                None if output.required => {
                    return Err(NodeError::invalid_input(format!(
                        "Missing required input '{}'",
                        output.name
                    )));
                }
                None => {}
            }
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

    fn ctx(node: NodeSpec, inputs: Value) -> NodeContext {
        NodeContext::new(Arc::new(node), NodeType::Start, "run-1")
            .with_scope_inputs(Arc::new(inputs.as_object().cloned().unwrap()))
    }

    #[tokio::test]
    async fn test_publishes_all_inputs_without_declarations() {
        let node = NodeSpec::new("node-start::1", NodeType::Start);
        let result = StartNode
            .execute(&ctx(node, json!({"q": "hi", "n": 2})), Map::new())
            .await
            .unwrap();

        assert_eq!(Value::Object(result.outputs), json!({"q": "hi", "n": 2}));
    }

    #[tokio::test]
    async fn test_declared_outputs_with_defaults() {
        let mut lang = OutputSpec::new("lang");
        lang.schema = Some(json!({"type": "string", "default": "en"}));

        let node = NodeSpec::new("node-start::1", NodeType::Start)
            .with_output(OutputSpec::new("q"))
            .with_output(lang);

        let result = StartNode
            .execute(&ctx(node, json!({"q": "hi", "extra": true})), Map::new())
            .await
            .unwrap();

        assert_eq!(Value::Object(result.outputs), json!({"q": "hi", "lang": "en"}));
    }

    #[tokio::test]
    async fn test_missing_required_input() {
        let node = NodeSpec::new("node-start::1", NodeType::Start)
            .with_output(OutputSpec::new("q").required());

        let err = StartNode
            .execute(&ctx(node, json!({})), Map::new())
            .await
            .unwrap_err();

        assert_eq!(err.message, "Missing required input 'q'");
    }
}
