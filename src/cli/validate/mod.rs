//! Validate command - compiles a workflow document and reports its shape

use std::path::Path;

use tracing::info;

use super::{bootstrap, read_dsl};
use crate::domain::chains::ROOT_SCOPE;
use crate::infrastructure::nodes::builtin_registry;
use crate::infrastructure::workflow::WorkflowEngine;

/// Validate a workflow document against the built-in node types
pub async fn run(path: &Path) -> anyhow::Result<()> {
    bootstrap();

    let dsl = read_dsl(path)?;
    let compiled = WorkflowEngine::new(builtin_registry()).compile(&dsl)?;

    let iterations = compiled.scopes.len().saturating_sub(1);
    info!(
        nodes = compiled.graph.len(),
        edges = compiled.graph.edges().len(),
        iterations,
        "Workflow is valid"
    );

    let root = compiled.scope(ROOT_SCOPE)?;
    println!("{} is valid", path.display());
    println!("  nodes:      {}", compiled.graph.len());
    println!("  edges:      {}", compiled.graph.edges().len());
    println!("  iterations: {}", iterations);
    println!("  order:      {}", root.topo_order.join(" -> "));

    Ok(())
}
