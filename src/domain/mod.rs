//! Domain layer - Core engine types, traits and errors

pub mod cache;
pub mod chains;
pub mod error;
pub mod graph;
pub mod node;
pub mod stream;
pub mod variable;
pub mod workflow;

pub use cache::{Cache, CacheExt, EngineCacheKey};
pub use chains::{CompiledWorkflow, DependencyResolver};
pub use error::DomainError;
pub use graph::{Edge, ErrorStrategy, NodeSpec, NodeType, RetryConfig, WorkflowDsl};
pub use node::{
    NodeCapabilities, NodeContext, NodeError, NodeExecutor, NodeRegistry, NodeRunResult,
    NodeRunStatus, TokenCost,
};
pub use stream::{StreamChunk, StreamSink, WorkflowStream};
pub use variable::{VariablePath, VariablePool};
pub use workflow::{
    ChatTurn, PendingQuestion, RunCheckpoint, RunRequest, WorkflowError, WorkflowFailure,
    WorkflowRunResult,
};
