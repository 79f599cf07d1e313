//! Per-node dependency annotations and scopes

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::variable::VariablePath;

/// Scope id of the top-level graph
pub const ROOT_SCOPE: &str = "root";

/// Output references a node holds on one producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDependency {
    pub paths: Vec<VariablePath>,
    /// Producer is a control ancestor, so it settles before the consumer starts
    pub control_ancestor: bool,
}

/// Control and data dependencies of one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// Control predecessors whose completion gates this node
    pub node_dep: BTreeSet<String>,
    /// Producers referenced by this node's inputs
    pub data_dep: BTreeMap<String, DataDependency>,
    /// Indices of incoming edges; their path status decides liveness
    pub incoming: Vec<usize>,
    /// Indices of outgoing edges this node decides on completion
    pub outgoing: Vec<usize>,
    /// Conditional ancestors whose branch choice can prune this node
    pub branch_sources: BTreeSet<String>,
}

impl DependencyInfo {
    /// True when the node can only be pruned by a conditional ancestor
    pub fn is_conditionally_live(&self) -> bool {
        !self.branch_sources.is_empty()
    }
}

/// Where an input value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BindingSource {
    Ref(VariablePath),
    Literal(Value),
}

/// Input binding with its path parsed once at build time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledBinding {
    pub name: String,
    pub source: BindingSource,
}

/// A top-level graph or the inner sub-graph of one iteration node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub id: String,
    /// Start node, or the iteration-start node
    pub entry: String,
    /// End node, or the iteration-end node
    pub exit: Option<String>,
    /// Iteration node owning this scope
    pub owner: Option<String>,
    pub parent: Option<String>,
    pub members: BTreeSet<String>,
    /// Members in a deterministic topological order
    pub topo_order: Vec<String>,
}
