//! `question-answer` node - pauses the run until the user answers

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::node::{NodeCapabilities, NodeContext, NodeError, NodeExecutor, NodeRunResult};
use crate::domain::variable::render_template;

pub const QUESTION_PARAM: &str = "question";

pub const QUERY_OUTPUT: &str = "query";

pub const ANSWER_OUTPUT: &str = "content";

#[derive(Debug, Default, Clone, Copy)]
pub struct QuestionAnswerNode;

impl QuestionAnswerNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeExecutor for QuestionAnswerNode {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::default().interruptible()
    }

    async fn execute(
        &self,
        ctx: &NodeContext,
        inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError> {
        let template = ctx.node().param_str(QUESTION_PARAM).ok_or_else(|| {
            NodeError::invalid_input(format!(
                "Question node '{}' has no '{}' parameter",
                ctx.node_id(),
                QUESTION_PARAM
            ))
        })?;
        let question = Value::String(render_template(template, &inputs));

        let answer = ctx
            .interrupter()?
            .ask(ctx.node_id(), question.clone())
            .await?;

        let mut outputs = Map::new();
        outputs.insert(QUERY_OUTPUT.to_string(), question);
        outputs.insert(ANSWER_OUTPUT.to_string(), answer);

        Ok(NodeRunResult::succeeded(outputs))
    }
}
