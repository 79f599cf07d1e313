//! `message` node - pushes a rendered message to the caller mid-run

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::end::{CONTENT_OUTPUT, TEMPLATE_PARAM};
use crate::domain::node::{NodeCapabilities, NodeContext, NodeError, NodeExecutor, NodeRunResult};
use crate::domain::variable::render_template;

#[derive(Debug, Default, Clone, Copy)]
pub struct MessageNode;

impl MessageNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeExecutor for MessageNode {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::default().end_output()
    }

    async fn execute(
        &self,
        ctx: &NodeContext,
        inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError> {
        let template = ctx.node().param_str(TEMPLATE_PARAM).ok_or_else(|| {
            NodeError::invalid_input(format!(
                "Message node '{}' has no '{}' parameter",
                ctx.node_id(),
                TEMPLATE_PARAM
            ))
        })?;

        let mut outputs = Map::new();
        outputs.insert(
            CONTENT_OUTPUT.to_string(),
            Value::String(render_template(template, &inputs)),
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
    async fn test_renders_message() {
        let node = Arc::new(
            NodeSpec::new("message::1", NodeType::Message)
                .with_param(TEMPLATE_PARAM, json!("Looking up {{city}}...")),
        );
        let ctx = NodeContext::new(node, NodeType::Message, "run-1");
        let inputs = json!({"city": "Lisbon"}).as_object().cloned().unwrap();

        let result = MessageNode.execute(&ctx, inputs).await.unwrap();

        assert_eq!(result.outputs[CONTENT_OUTPUT], json!("Looking up Lisbon..."));
    }

    #[tokio::test]
    async fn test_requires_template() {
        let node = Arc::new(NodeSpec::new("message::1", NodeType::Message));
        let ctx = NodeContext::new(node, NodeType::Message, "run-1");

        let err = MessageNode.execute(&ctx, Map::new()).await.unwrap_err();

        assert!(err.message.contains("has no 'template' parameter"));
    }
}
