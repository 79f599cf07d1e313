//! Build output cached between runs

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dependency::{CompiledBinding, DependencyInfo, ScopeInfo, ROOT_SCOPE};
use crate::domain::graph::{NodeSpec, NodeType, WorkflowGraph};
use crate::domain::workflow::WorkflowError;

/// Validated graph plus everything derived from it once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledWorkflow {
    pub graph: WorkflowGraph,
    pub bindings: BTreeMap<String, Vec<CompiledBinding>>,
    pub dependencies: BTreeMap<String, DependencyInfo>,
    pub scopes: BTreeMap<String, ScopeInfo>,
    pub node_scope: BTreeMap<String, String>,
    pub build_timestamp: DateTime<Utc>,
}

impl CompiledWorkflow {
    pub fn root(&self) -> Result<&ScopeInfo, WorkflowError> {
        self.scope(ROOT_SCOPE)
    }

    pub fn scope(&self, scope_id: &str) -> Result<&ScopeInfo, WorkflowError> {
        self.scopes
            .get(scope_id)
            .ok_or_else(|| WorkflowError::internal(format!("Unknown scope '{}'", scope_id)))
    }

    /// Scope owned by an iteration node
    pub fn scope_owned_by(&self, node_id: &str) -> Option<&ScopeInfo> {
        self.scopes
            .values()
            .find(|scope| scope.owner.as_deref() == Some(node_id))
    }

    pub fn scope_of(&self, node_id: &str) -> Option<&str> {
        self.node_scope.get(node_id).map(String::as_str)
    }

    pub fn node(&self, node_id: &str) -> Result<&NodeSpec, WorkflowError> {
        self.graph
            .node(node_id)
            .ok_or_else(|| WorkflowError::internal(format!("Unknown node '{}'", node_id)))
    }

    pub fn node_type(&self, node_id: &str) -> Result<NodeType, WorkflowError> {
        self.graph
            .node_type(node_id)
            .ok_or_else(|| WorkflowError::internal(format!("Node '{}' has no type", node_id)))
    }

    pub fn dependency(&self, node_id: &str) -> Result<&DependencyInfo, WorkflowError> {
        self.dependencies.get(node_id).ok_or_else(|| {
            WorkflowError::internal(format!("No dependency info for '{}'", node_id))
        })
    }

    pub fn bindings(&self, node_id: &str) -> &[CompiledBinding] {
        self.bindings
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Distinct node types used anywhere in the graph
    pub fn node_types(&self) -> BTreeSet<NodeType> {
        self.graph.nodes().filter_map(|n| n.node_type).collect()
    }

    /// Whether a DSL last modified at `updated_at` is still represented by this build
    pub fn is_fresh(&self, updated_at: DateTime<Utc>) -> bool {
        updated_at < self.build_timestamp
    }
}
