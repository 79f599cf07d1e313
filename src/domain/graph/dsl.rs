//! DSL documents and the validated workflow graph

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::edge::Edge;
use super::node::{NodeSpec, NodeType};
use crate::domain::workflow::WorkflowError;

/// Minimum number of nodes in a runnable document
pub const MIN_NODES: usize = 2;

/// Declarative nodes + edges description of a workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDsl {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDsl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Connects two nodes with a normal edge
    pub fn connect(self, source: &str, target: &str) -> Self {
        self.with_edge(Edge::new(source, target))
    }

    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(json)
            .map_err(|e| WorkflowError::validation(format!("Malformed DSL document: {}", e)))
    }
}

/// Structurally validated graph: unique ids, resolved types, no dangling edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    nodes: BTreeMap<String, NodeSpec>,
    edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Validates a DSL document into a graph
    pub fn build(dsl: &WorkflowDsl) -> Result<Self, WorkflowError> {
        if dsl.nodes.len() < MIN_NODES {
            return Err(WorkflowError::validation(format!(
                "A workflow needs at least {} nodes, got {}",
                MIN_NODES,
                dsl.nodes.len()
            )));
        }

        let mut nodes = BTreeMap::new();

        for node in &dsl.nodes {
            if node.id.trim().is_empty() {
                return Err(WorkflowError::validation("Node id cannot be empty"));
            }

            if nodes.contains_key(&node.id) {
                return Err(WorkflowError::validation(format!(
                    "Duplicate node id: {}",
                    node.id
                )));
            }

            node.retry_config.validate(&node.id)?;

            let mut node = node.clone();
            node.node_type = Some(node.resolved_type()?);
            nodes.insert(node.id.clone(), node);
        }

        let mut seen = HashSet::new();
        let mut edges = Vec::with_capacity(dsl.edges.len());

        for edge in &dsl.edges {
            for endpoint in [&edge.source_node_id, &edge.target_node_id] {
                if !nodes.contains_key(endpoint) {
                    return Err(WorkflowError::validation(format!(
                        "Edge {} -> {} references unknown node '{}'",
                        edge.source_node_id, edge.target_node_id, endpoint
                    )));
                }
            }

            if edge.source_node_id == edge.target_node_id {
                return Err(WorkflowError::validation(format!(
                    "Edge on '{}' points to itself",
                    edge.source_node_id
                )));
            }

            if seen.insert((
                edge.source_node_id.clone(),
                edge.target_node_id.clone(),
                edge.source_handle.clone(),
            )) {
                edges.push(edge.clone());
            }
        }

        let graph = Self { nodes, edges };

        let starts = graph.nodes_of_type(NodeType::Start).count();
        if starts != 1 {
            return Err(WorkflowError::validation(format!(
                "A workflow needs exactly one start node, got {}",
                starts
            )));
        }

        let ends = graph.nodes_of_type(NodeType::End).count();
        if ends > 1 {
            return Err(WorkflowError::validation(format!(
                "A workflow can have at most one end node, got {}",
                ends
            )));
        }

        Ok(graph)
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> Option<&Edge> {
        self.edges.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Type of a node; every node in a built graph has one
    pub fn node_type(&self, id: &str) -> Option<NodeType> {
        self.nodes.get(id).and_then(|n| n.node_type)
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &NodeSpec> {
        self.nodes
            .values()
            .filter(move |n| n.node_type == Some(node_type))
    }

    pub fn start_node(&self) -> Option<&NodeSpec> {
        self.nodes_of_type(NodeType::Start).next()
    }
}
