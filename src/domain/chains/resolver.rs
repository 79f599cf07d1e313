//! Dependency resolution ("chains")
//!
//! Turns a validated graph into a [`CompiledWorkflow`]: scopes for the top-level
//! graph and every iteration sub-graph, control predecessors, data producers
//! and the conditional ancestors that can prune each node.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::Utc;
use tracing::debug;

use super::compiled::CompiledWorkflow;
use super::dependency::{
    BindingSource, CompiledBinding, DataDependency, DependencyInfo, ScopeInfo, ROOT_SCOPE,
};
use crate::domain::graph::{EdgeKind, NodeSpec, NodeType, ValueSpec, WorkflowDsl, WorkflowGraph};
use crate::domain::node::{ERROR_CODE_KEY, ERROR_MESSAGE_KEY};
use crate::domain::variable::VariablePath;
use crate::domain::workflow::WorkflowError;

/// Parameter of an iteration node naming its iteration-start node
pub const ITERATION_START_PARAM: &str = "iterationStartNodeId";

type Adjacency = BTreeMap<String, Vec<usize>>;

/// Builds dependency information for a workflow graph
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Validates a DSL document and resolves its dependencies
    pub fn compile(dsl: &WorkflowDsl) -> Result<CompiledWorkflow, WorkflowError> {
        let graph = WorkflowGraph::build(dsl)?;
        Self::resolve(graph)
    }

    pub fn resolve(graph: WorkflowGraph) -> Result<CompiledWorkflow, WorkflowError> {
        let ids: Vec<String> = graph.node_ids().map(str::to_string).collect();

        let mut incoming: Adjacency = ids.iter().map(|id| (id.clone(), Vec::new())).collect();
        let mut outgoing: Adjacency = incoming.clone();

        for (index, edge) in graph.edges().iter().enumerate() {
            if let Some(edges) = outgoing.get_mut(&edge.source_node_id) {
                edges.push(index);
            }
            if let Some(edges) = incoming.get_mut(&edge.target_node_id) {
                edges.push(index);
            }
        }

        let topo = topological_order(&graph, &incoming, &outgoing)?;
        let ancestors = ancestors(&graph, &topo, &incoming);
        let descendants = descendants(&graph, &topo, &outgoing);

        let (scopes, node_scope) = build_scopes(&graph, &topo, &incoming, &outgoing)?;

        let mut bindings = BTreeMap::new();
        let mut dependencies = BTreeMap::new();

        for node in graph.nodes() {
            let mut info = DependencyInfo {
                incoming: incoming.get(&node.id).cloned().unwrap_or_default(),
                outgoing: outgoing.get(&node.id).cloned().unwrap_or_default(),
                ..Default::default()
            };

            for index in &info.incoming {
                if let Some(edge) = graph.edge(*index) {
                    info.node_dep.insert(edge.source_node_id.clone());
                }
            }

            if let Some(node_ancestors) = ancestors.get(&node.id) {
                info.branch_sources = node_ancestors
                    .iter()
                    .filter(|a| has_conditional_edges(&graph, &outgoing, a))
                    .cloned()
                    .collect();
            }

            let mut compiled = Vec::with_capacity(node.inputs.len());

            for binding in &node.inputs {
                let source = match &binding.value {
                    ValueSpec::Literal(value) => BindingSource::Literal(value.clone()),
                    ValueSpec::Ref(reference) => {
                        let path = VariablePath::from_parts(&reference.node_id, &reference.name)
                            .map_err(|e| {
                                WorkflowError::validation(format!(
                                    "Input '{}' of '{}': {}",
                                    binding.name, node.id, e
                                ))
                            })?;

                        let control_ancestor = check_reference(
                            &graph,
                            node,
                            &path,
                            &scopes,
                            &node_scope,
                            &ancestors,
                            &descendants,
                        )?;

                        let dependency = info
                            .data_dep
                            .entry(path.node_id.clone())
                            .or_insert_with(|| DataDependency {
                                paths: Vec::new(),
                                control_ancestor,
                            });
                        dependency.paths.push(path.clone());

                        BindingSource::Ref(path)
                    }
                };

                compiled.push(CompiledBinding {
                    name: binding.name.clone(),
                    source,
                });
            }

            bindings.insert(node.id.clone(), compiled);
            dependencies.insert(node.id.clone(), info);
        }

        debug!(
            nodes = graph.len(),
            edges = graph.edges().len(),
            scopes = scopes.len(),
            "Resolved workflow dependencies"
        );

        Ok(CompiledWorkflow {
            graph,
            bindings,
            dependencies,
            scopes,
            node_scope,
            build_timestamp: Utc::now(),
        })
    }
}

/// Kahn's algorithm; ties broken by node id for a stable order
fn topological_order(
    graph: &WorkflowGraph,
    incoming: &Adjacency,
    outgoing: &Adjacency,
) -> Result<Vec<String>, WorkflowError> {
    let mut in_degree: BTreeMap<&str, usize> = incoming
        .iter()
        .map(|(id, edges)| (id.as_str(), edges.len()))
        .collect();

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());

        for index in outgoing.get(id).map(Vec::as_slice).unwrap_or_default() {
            let Some(edge) = graph.edge(*index) else {
                continue;
            };

            if let Some(degree) = in_degree.get_mut(edge.target_node_id.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(edge.target_node_id.as_str());
                }
            }
        }
    }

    if order.len() != graph.len() {
        let stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .collect();

        return Err(WorkflowError::validation(format!(
            "Circular dependency between nodes: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

fn ancestors(
    graph: &WorkflowGraph,
    topo: &[String],
    incoming: &Adjacency,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut result: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for id in topo {
        let mut set = BTreeSet::new();

        for index in incoming.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(edge) = graph.edge(*index) {
                set.insert(edge.source_node_id.clone());
                if let Some(upstream) = result.get(&edge.source_node_id) {
                    set.extend(upstream.iter().cloned());
                }
            }
        }

        result.insert(id.clone(), set);
    }

    result
}

fn descendants(
    graph: &WorkflowGraph,
    topo: &[String],
    outgoing: &Adjacency,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut result: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for id in topo.iter().rev() {
        let mut set = BTreeSet::new();

        for index in outgoing.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(edge) = graph.edge(*index) {
                set.insert(edge.target_node_id.clone());
                if let Some(downstream) = result.get(&edge.target_node_id) {
                    set.extend(downstream.iter().cloned());
                }
            }
        }

        result.insert(id.clone(), set);
    }

    result
}

fn has_conditional_edges(graph: &WorkflowGraph, outgoing: &Adjacency, node_id: &str) -> bool {
    outgoing
        .get(node_id)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|index| graph.edge(*index))
        .any(|edge| edge.kind() != EdgeKind::Normal)
}

fn reachable(graph: &WorkflowGraph, outgoing: &Adjacency, entry: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([entry.to_string()]);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }

        for index in outgoing.get(&id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(edge) = graph.edge(*index) {
                queue.push_back(edge.target_node_id.clone());
            }
        }
    }

    seen
}

fn build_scopes(
    graph: &WorkflowGraph,
    topo: &[String],
    incoming: &Adjacency,
    outgoing: &Adjacency,
) -> Result<(BTreeMap<String, ScopeInfo>, BTreeMap<String, String>), WorkflowError> {
    let start = graph
        .start_node()
        .ok_or_else(|| WorkflowError::validation("Workflow has no start node"))?;

    let mut scopes = BTreeMap::new();
    let mut node_scope: BTreeMap<String, String> = BTreeMap::new();
    let mut pending = VecDeque::from([(
        ROOT_SCOPE.to_string(),
        start.id.clone(),
        None::<String>,
        None::<String>,
    )]);

    while let Some((scope_id, entry, owner, parent)) = pending.pop_front() {
        if incoming.get(&entry).is_some_and(|edges| !edges.is_empty()) {
            return Err(WorkflowError::validation(format!(
                "Entry node '{}' cannot have incoming edges",
                entry
            )));
        }

        let members = reachable(graph, outgoing, &entry);

        for member in &members {
            if let Some(existing) = node_scope.insert(member.clone(), scope_id.clone()) {
                return Err(WorkflowError::validation(format!(
                    "Node '{}' belongs to both scope '{}' and scope '{}'",
                    member, existing, scope_id
                )));
            }
        }

        let exit_type = if owner.is_some() {
            NodeType::IterationEnd
        } else {
            NodeType::End
        };
        let exits: Vec<&str> = members
            .iter()
            .filter(|id| graph.node_type(id) == Some(exit_type))
            .map(String::as_str)
            .collect();

        if owner.is_some() && exits.len() != 1 {
            return Err(WorkflowError::validation(format!(
                "Iteration '{}' needs exactly one iteration end node, found {}",
                scope_id,
                exits.len()
            )));
        }

        for member in &members {
            let Some(node) = graph.node(member) else {
                continue;
            };
            if node.node_type == Some(NodeType::Iteration) {
                let inner_entry = iteration_entry(graph, node)?;
                pending.push_back((
                    node.id.clone(),
                    inner_entry,
                    Some(node.id.clone()),
                    Some(scope_id.clone()),
                ));
            }
        }

        let topo_order = topo
            .iter()
            .filter(|id| members.contains(*id))
            .cloned()
            .collect();

        scopes.insert(
            scope_id.clone(),
            ScopeInfo {
                id: scope_id,
                entry,
                exit: exits.first().map(|id| id.to_string()),
                owner,
                parent,
                members,
                topo_order,
            },
        );
    }

    if let Some(orphan) = graph.node_ids().find(|id| !node_scope.contains_key(*id)) {
        return Err(WorkflowError::validation(format!(
            "Node '{}' is not reachable from the start node or any iteration start",
            orphan
        )));
    }

    for edge in graph.edges() {
        if node_scope.get(&edge.source_node_id) != node_scope.get(&edge.target_node_id) {
            return Err(WorkflowError::validation(format!(
                "Edge {} -> {} crosses an iteration boundary",
                edge.source_node_id, edge.target_node_id
            )));
        }
    }

    Ok((scopes, node_scope))
}

fn iteration_entry(graph: &WorkflowGraph, node: &NodeSpec) -> Result<String, WorkflowError> {
    let entry = node.param_str(ITERATION_START_PARAM).ok_or_else(|| {
        WorkflowError::validation(format!(
            "Iteration '{}' is missing parameter '{}'",
            node.id, ITERATION_START_PARAM
        ))
    })?;

    if graph.node_type(entry) != Some(NodeType::IterationStart) {
        return Err(WorkflowError::validation(format!(
            "Iteration '{}' must point at an iteration start node, got '{}'",
            node.id, entry
        )));
    }

    Ok(entry.to_string())
}

/// Validates a reference and reports whether the producer is a control ancestor
fn check_reference(
    graph: &WorkflowGraph,
    consumer: &NodeSpec,
    path: &VariablePath,
    scopes: &BTreeMap<String, ScopeInfo>,
    node_scope: &BTreeMap<String, String>,
    ancestors: &BTreeMap<String, BTreeSet<String>>,
    descendants: &BTreeMap<String, BTreeSet<String>>,
) -> Result<bool, WorkflowError> {
    let producer = graph.node(&path.node_id).ok_or_else(|| {
        WorkflowError::validation(format!(
            "Node '{}' references unknown node '{}'",
            consumer.id, path.node_id
        ))
    })?;

    if !producer.outputs.is_empty()
        && let Some(head) = path.head()
        && head != ERROR_CODE_KEY
        && head != ERROR_MESSAGE_KEY
        && !producer.output_names().any(|name| name == head)
    {
        return Err(WorkflowError::validation(format!(
            "Node '{}' references '{}', which '{}' does not declare",
            consumer.id, path, producer.id
        )));
    }

    let producer_scope = node_scope.get(&producer.id);
    let mut scope = node_scope.get(&consumer.id);
    let mut representative = consumer.id.as_str();

    loop {
        if scope == producer_scope {
            if representative == producer.id {
                return Err(WorkflowError::validation(format!(
                    "Node '{}' cannot reference itself or its enclosing iteration",
                    consumer.id
                )));
            }

            if descendants
                .get(representative)
                .is_some_and(|d| d.contains(&producer.id))
            {
                return Err(WorkflowError::validation(format!(
                    "Node '{}' references downstream node '{}'",
                    consumer.id, producer.id
                )));
            }

            return Ok(ancestors
                .get(representative)
                .is_some_and(|a| a.contains(&producer.id)));
        }

        let info = scope.and_then(|id| scopes.get(id));
        match info.and_then(|s| s.owner.as_deref().map(|owner| (owner, s.parent.as_ref()))) {
            Some((owner, parent)) => {
                representative = owner;
                scope = parent;
            }
            None => {
                return Err(WorkflowError::validation(format!(
                    "Node '{}' references '{}' outside its visible scopes",
                    consumer.id, producer.id
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{Edge, InputBinding, OutputSpec, FAIL_HANDLE};
    use serde_json::json;

    fn start() -> NodeSpec {
        NodeSpec::new("node-start::1", NodeType::Start).with_output(OutputSpec::new("query"))
    }

    fn end() -> NodeSpec {
        NodeSpec::new("node-end::1", NodeType::End)
    }

    fn branching() -> WorkflowDsl {
        WorkflowDsl::new()
            .with_node(start())
            .with_node(NodeSpec::new("if-else::1", NodeType::IfElse))
            .with_node(NodeSpec::new("spark-llm::a", NodeType::Llm))
            .with_node(NodeSpec::new("spark-llm::b", NodeType::Llm))
            .with_node(
                end()
                    .with_input(InputBinding::reference("a", "spark-llm::a", "output"))
                    .with_input(InputBinding::reference("q", "node-start::1", "query")),
            )
            .connect("node-start::1", "if-else::1")
            .with_edge(Edge::new("if-else::1", "spark-llm::a").with_handle("branch_one_of::t"))
            .with_edge(Edge::new("if-else::1", "spark-llm::b").with_handle("branch_one_of::f"))
            .connect("spark-llm::a", "node-end::1")
            .connect("spark-llm::b", "node-end::1")
    }

    fn iteration() -> WorkflowDsl {
        WorkflowDsl::new()
            .with_node(start())
            .with_node(
                NodeSpec::new("iteration::1", NodeType::Iteration)
                    .with_param(ITERATION_START_PARAM, json!("iteration-node-start::1"))
                    .with_input(InputBinding::reference("items", "node-start::1", "query")),
            )
            .with_node(NodeSpec::new("iteration-node-start::1", NodeType::IterationStart))
            .with_node(
                NodeSpec::new("ifly-code::1", NodeType::Code)
                    .with_input(InputBinding::reference("x", "iteration-node-start::1", "item"))
                    .with_input(InputBinding::reference("q", "node-start::1", "query")),
            )
            .with_node(NodeSpec::new("iteration-node-end::1", NodeType::IterationEnd))
            .with_node(end())
            .connect("node-start::1", "iteration::1")
            .connect("iteration::1", "node-end::1")
            .connect("iteration-node-start::1", "ifly-code::1")
            .connect("ifly-code::1", "iteration-node-end::1")
    }

    #[test]
    fn test_node_and_data_dependencies() {
        let compiled = DependencyResolver::compile(&branching()).unwrap();

        let end = compiled.dependency("node-end::1").unwrap();
        assert_eq!(
            end.node_dep,
            BTreeSet::from(["spark-llm::a".to_string(), "spark-llm::b".to_string()])
        );
        assert_eq!(end.incoming.len(), 2);

        // The start node is referenced from several hops away
        let start_dep = &end.data_dep["node-start::1"];
        assert!(start_dep.control_ancestor);
        assert_eq!(start_dep.paths[0].to_string(), "node-start::1.query");
    }

    #[test]
    fn test_branch_sources() {
        let compiled = DependencyResolver::compile(&branching()).unwrap();

        let a = compiled.dependency("spark-llm::a").unwrap();
        assert_eq!(a.branch_sources, BTreeSet::from(["if-else::1".to_string()]));

        let cond = compiled.dependency("if-else::1").unwrap();
        assert!(!cond.is_conditionally_live());
    }

    #[test]
    fn test_root_scope() {
        let compiled = DependencyResolver::compile(&branching()).unwrap();
        let root = compiled.root().unwrap();

        assert_eq!(root.entry, "node-start::1");
        assert_eq!(root.exit.as_deref(), Some("node-end::1"));
        assert_eq!(root.members.len(), 5);
        assert_eq!(root.topo_order.first().map(String::as_str), Some("node-start::1"));
        assert_eq!(root.topo_order.last().map(String::as_str), Some("node-end::1"));
    }

    #[test]
    fn test_iteration_scope() {
        let compiled = DependencyResolver::compile(&iteration()).unwrap();

        let inner = compiled.scope_owned_by("iteration::1").unwrap();
        assert_eq!(inner.entry, "iteration-node-start::1");
        assert_eq!(inner.exit.as_deref(), Some("iteration-node-end::1"));
        assert_eq!(inner.parent.as_deref(), Some(ROOT_SCOPE));
        assert_eq!(compiled.scope_of("ifly-code::1"), Some("iteration::1"));

        // Inner nodes may read outer producers that precede the iteration
        let code = compiled.dependency("ifly-code::1").unwrap();
        assert!(code.data_dep["node-start::1"].control_ancestor);
    }

    #[test]
    fn test_rejects_cycle() {
        let dsl = branching().connect("node-end::1", "if-else::1");

        let err = DependencyResolver::compile(&dsl).unwrap_err();
        assert!(err.to_string().contains("Circular dependency"));
    }

    #[test]
    fn test_rejects_unreachable_node() {
        let dsl = branching().with_node(NodeSpec::new("spark-llm::c", NodeType::Llm));

        let err = DependencyResolver::compile(&dsl).unwrap_err();
        assert!(err.to_string().contains("'spark-llm::c' is not reachable"));
    }

    #[test]
    fn test_rejects_downstream_reference() {
        let mut dsl = branching();
        dsl.nodes[1] = NodeSpec::new("if-else::1", NodeType::IfElse)
            .with_input(InputBinding::reference("x", "spark-llm::a", "output"));

        let err = DependencyResolver::compile(&dsl).unwrap_err();
        assert!(err.to_string().contains("downstream node 'spark-llm::a'"));
    }

    #[test]
    fn test_rejects_undeclared_output() {
        let mut dsl = branching();
        dsl.nodes[4] = end().with_input(InputBinding::reference("q", "node-start::1", "nope"));

        let err = DependencyResolver::compile(&dsl).unwrap_err();
        assert!(err.to_string().contains("does not declare"));
    }

    #[test]
    fn test_error_outputs_always_referenceable() {
        let mut dsl = branching();
        dsl.nodes[4] = end().with_input(InputBinding::reference(
            "e",
            "node-start::1",
            ERROR_MESSAGE_KEY,
        ));

        assert!(DependencyResolver::compile(&dsl).is_ok());
    }

    #[test]
    fn test_rejects_reference_into_iteration() {
        let mut dsl = iteration();
        dsl.nodes[5] = end().with_input(InputBinding::reference("x", "ifly-code::1", "y"));

        let err = DependencyResolver::compile(&dsl).unwrap_err();
        assert!(err.to_string().contains("outside its visible scopes"));
    }

    #[test]
    fn test_rejects_edge_across_iteration_boundary() {
        let dsl = iteration().connect("ifly-code::1", "node-end::1");

        assert!(DependencyResolver::compile(&dsl).is_err());
    }

    #[test]
    fn test_rejects_iteration_without_start_param() {
        let mut dsl = iteration();
        dsl.nodes[1] = NodeSpec::new("iteration::1", NodeType::Iteration);

        let err = DependencyResolver::compile(&dsl).unwrap_err();
        assert!(err.to_string().contains(ITERATION_START_PARAM));
    }

    #[test]
    fn test_fail_edge_makes_branch_source() {
        let dsl = WorkflowDsl::new()
            .with_node(start())
            .with_node(NodeSpec::new("spark-llm::a", NodeType::Llm))
            .with_node(NodeSpec::new("message::fallback", NodeType::Message))
            .with_node(end())
            .connect("node-start::1", "spark-llm::a")
            .connect("spark-llm::a", "node-end::1")
            .with_edge(Edge::new("spark-llm::a", "message::fallback").with_handle(FAIL_HANDLE))
            .connect("message::fallback", "node-end::1");

        let compiled = DependencyResolver::compile(&dsl).unwrap();
        let fallback = compiled.dependency("message::fallback").unwrap();
        assert!(fallback.branch_sources.contains("spark-llm::a"));
    }
}
