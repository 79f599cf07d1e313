//! Graph model - nodes, edges and the validated DSL document

mod dsl;
mod edge;
mod node;
mod retry;

pub use dsl::{WorkflowDsl, WorkflowGraph, MIN_NODES};
pub use edge::{Edge, EdgeKind, DEFAULT_BRANCH, FAIL_HANDLE, INTENT_PREFIX};
pub use node::{InputBinding, NodeRef, NodeSpec, NodeType, OutputSpec, ValueSpec};
pub use retry::{ErrorStrategy, RetryConfig};
