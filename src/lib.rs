//! Agentflow Engine
//!
//! Executes graph-defined LLM agent workflows:
//! - Validated DSL graphs with conditional and failure branches
//! - Dataflow scheduling with per-node retry, timeout and error strategies
//! - Iteration sub-graphs with bounded fan-out
//! - Ordered streaming, pause/resume and checkpoints
//! - Compiled-workflow caching (in-memory or Redis)

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    CompiledWorkflow, DomainError, NodeError, NodeExecutor, NodeRegistry, NodeRunResult,
    RunCheckpoint, RunRequest, StreamChunk, WorkflowDsl, WorkflowError, WorkflowRunResult,
};
pub use infrastructure::nodes::{builtin_registry, register_builtin_nodes};
pub use infrastructure::workflow::{EngineConfig, RunControl, RunHandle, WorkflowEngine};
