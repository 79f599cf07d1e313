//! Node type to implementation table

use std::collections::HashMap;
use std::sync::Arc;

use super::executor::NodeExecutor;
use crate::domain::graph::NodeType;
use crate::domain::workflow::WorkflowError;

/// Registry of node implementations, populated once at startup
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an implementation, replacing any previous one for the type
    pub fn register(&mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> &mut Self {
        self.executors.insert(node_type, executor);
        self
    }

    pub fn with(mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> Self {
        self.register(node_type, executor);
        self
    }

    pub fn get(&self, node_type: NodeType) -> Result<Arc<dyn NodeExecutor>, WorkflowError> {
        self.executors
            .get(&node_type)
            .cloned()
            .ok_or_else(|| WorkflowError::unsupported_node(node_type.as_str()))
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.executors.contains_key(&node_type)
    }

    /// Registered types, sorted
    pub fn types(&self) -> Vec<NodeType> {
        let mut types: Vec<_> = self.executors.keys().copied().collect();
        types.sort();
        types
    }

    /// Fails on the first type without an implementation
    pub fn ensure_supports(
        &self,
        types: impl IntoIterator<Item = NodeType>,
    ) -> Result<(), WorkflowError> {
        for node_type in types {
            if !self.contains(node_type) {
                return Err(WorkflowError::unsupported_node(node_type.as_str()));
            }
        }
        Ok(())
    }
}
