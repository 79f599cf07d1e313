//! Scope exit nodes: `node-end` and `iteration-node-end`

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::node::{NodeCapabilities, NodeContext, NodeError, NodeExecutor, NodeRunResult};
use crate::domain::variable::render_template;

/// Parameter holding an optional answer template of the end node
pub const TEMPLATE_PARAM: &str = "template";

/// Output key of the rendered answer template
pub const CONTENT_OUTPUT: &str = "content";

/// Collects its resolved inputs as the scope result
#[derive(Debug, Clone, Copy)]
pub struct EndNode {
    streams_output: bool,
}

impl EndNode {
    /// End of the top-level graph; its output reaches the caller's stream
    pub fn new() -> Self {
        Self {
            streams_output: true,
        }
    }

    /// End of an iteration body
    pub fn iteration() -> Self {
        Self {
            streams_output: false,
        }
    }
}

impl Default for EndNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for EndNode {
    fn capabilities(&self) -> NodeCapabilities {
        if self.streams_output {
            NodeCapabilities::default().end_output()
        } else {
            NodeCapabilities::default()
        }
    }

    async fn execute(
        &self,
        ctx: &NodeContext,
        inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError> {
        let mut outputs = inputs.clone();

        if let Some(template) = ctx.node().param_str(TEMPLATE_PARAM) {
            outputs.insert(
                CONTENT_OUTPUT.to_string(),
                Value::String(render_template(template, &inputs)),
            );
        }

        Ok(NodeRunResult::succeeded(outputs).with_inputs(inputs))
    }
}
