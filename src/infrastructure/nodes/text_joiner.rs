//! `text-joiner` node - renders a `{{name}}` template from its inputs

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::node::{NodeContext, NodeError, NodeExecutor, NodeRunResult};
use crate::domain::variable::{placeholder_names, render_template};

pub const PROMPT_PARAM: &str = "prompt";

pub const OUTPUT_KEY: &str = "output";

#[derive(Debug, Default, Clone, Copy)]
pub struct TextJoinerNode;

impl TextJoinerNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeExecutor for TextJoinerNode {
    async fn execute(
        &self,
        ctx: &NodeContext,
        inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError> {
        let prompt = ctx.node().param_str(PROMPT_PARAM).unwrap_or_default();

        let unbound: Vec<String> = placeholder_names(prompt)
            .into_iter()
            .filter(|name| !inputs.contains_key(name))
            .collect();
        if !unbound.is_empty() {
            tracing::debug!(
                node_id = %ctx.node_id(),
                unbound = ?unbound,
                "Template placeholders without a bound input"
            );
        }

        let mut outputs = Map::new();
        outputs.insert(
            OUTPUT_KEY.to_string(),
            Value::String(render_template(prompt, &inputs)),
        );

        Ok(NodeRunResult::succeeded(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::domain::graph::{NodeSpec, NodeType};

    #[tokio::test]
    async fn test_joins_inputs() {
        let node = Arc::new(
            NodeSpec::new("text-joiner::1", NodeType::TextJoiner)
                .with_param(PROMPT_PARAM, json!("{{greeting}}, {{name}}! {{missing:(none)}}")),
        );
        let ctx = NodeContext::new(node, NodeType::TextJoiner, "run-1");
        let inputs = json!({"greeting": "Hello", "name": "Ada"})
            .as_object()
            .cloned()
            .unwrap();

        let result = TextJoinerNode.execute(&ctx, inputs).await.unwrap();

        assert_eq!(result.outputs[OUTPUT_KEY], json!("Hello, Ada! (none)"));
    }
}
