//! Built-in node implementations
//!
//! Provider-backed node types (LLM, knowledge bases, code, database, ...)
//! are registered by the embedding application.

mod end;
mod if_else;
mod iteration;
mod message;
mod question_answer;
mod start;
mod text_joiner;

use std::sync::Arc;

pub use end::EndNode;
pub use if_else::{CompareOperator, Condition, IfElseCase, IfElseNode, LogicalOperator};
pub use iteration::IterationNode;
pub use message::MessageNode;
pub use question_answer::QuestionAnswerNode;
pub use start::StartNode;
pub use text_joiner::TextJoinerNode;

use crate::domain::graph::NodeType;
use crate::domain::node::NodeRegistry;

/// Registers every built-in node type
pub fn register_builtin_nodes(registry: &mut NodeRegistry) -> &mut NodeRegistry {
    registry
        .register(NodeType::Start, Arc::new(StartNode::new()))
        .register(NodeType::End, Arc::new(EndNode::new()))
        .register(NodeType::Message, Arc::new(MessageNode::new()))
        .register(NodeType::IfElse, Arc::new(IfElseNode::new()))
        .register(NodeType::Iteration, Arc::new(IterationNode::new()))
        .register(NodeType::IterationStart, Arc::new(StartNode::new()))
        .register(NodeType::IterationEnd, Arc::new(EndNode::iteration()))
        .register(NodeType::TextJoiner, Arc::new(TextJoinerNode::new()))
        .register(NodeType::QuestionAnswer, Arc::new(QuestionAnswerNode::new()))
}

/// Registry holding only the built-in node types
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtin_nodes(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry();

        assert!(registry.contains(NodeType::Start));
        assert!(registry.contains(NodeType::IterationEnd));
        assert!(registry.contains(NodeType::QuestionAnswer));
        assert!(!registry.contains(NodeType::Llm));
        assert!(registry.get(NodeType::IfElse).unwrap().capabilities().branching);
        assert!(registry.get(NodeType::Iteration).unwrap().capabilities().owns_subgraph);
    }
}
