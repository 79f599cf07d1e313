//! Uniform execution contract for node implementations

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

#[cfg(test)]
use mockall::automock;

use super::error::NodeError;
use super::result::NodeRunResult;
use crate::domain::graph::{NodeSpec, NodeType};
use crate::domain::stream::{StreamChunk, StreamSink};
use crate::domain::workflow::ChatTurn;

/// What a node implementation can do, as far as the scheduler cares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCapabilities {
    /// Pushes partial output while running
    pub streaming: bool,
    /// Selects one of its out-edges through `edge_source_handle`
    pub branching: bool,
    /// Runs a nested sub-graph
    pub owns_subgraph: bool,
    /// May pause the run awaiting external input
    pub interruptible: bool,
    /// Its completed output is delivered to the caller's stream
    pub end_output: bool,
}

impl NodeCapabilities {
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn branching(mut self) -> Self {
        self.branching = true;
        self
    }

    pub fn owns_subgraph(mut self) -> Self {
        self.owns_subgraph = true;
        self
    }

    pub fn interruptible(mut self) -> Self {
        self.interruptible = true;
        self
    }

    pub fn end_output(mut self) -> Self {
        self.end_output = true;
        self
    }
}

/// Runs the sub-graph owned by a node once per batch item
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubgraphRunner: Send + Sync {
    /// Results are returned in input order; one failed item does not stop its siblings
    async fn run_batch(&self, items: Vec<Value>) -> Vec<Result<Map<String, Value>, NodeError>>;
}

/// Pauses the run until the caller supplies an answer
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Interrupter: Send + Sync {
    async fn ask(&self, node_id: &str, question: Value) -> Result<Value, NodeError>;
}

/// Handle for streaming partial output of one node
#[derive(Clone)]
pub struct DeltaSender {
    node_id: String,
    sink: Arc<dyn StreamSink>,
    emitted: Arc<AtomicBool>,
}

impl Debug for DeltaSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSender")
            .field("node_id", &self.node_id)
            .field("emitted", &self.has_emitted())
            .finish()
    }
}

impl DeltaSender {
    pub fn new(node_id: impl Into<String>, sink: Arc<dyn StreamSink>) -> Self {
        Self {
            node_id: node_id.into(),
            sink,
            emitted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pushes a delta; fails when the caller has gone away
    pub async fn send(&self, content: impl Into<String>) -> Result<(), NodeError> {
        self.emitted.store(true, Ordering::SeqCst);
        self.sink
            .send(StreamChunk::delta(&self.node_id, content))
            .await
            .map_err(|_| NodeError::cancelled())
    }

    /// Whether any delta has reached the caller
    pub fn has_emitted(&self) -> bool {
        self.emitted.load(Ordering::SeqCst)
    }
}

/// Everything a node implementation may consult while running
#[derive(Clone)]
pub struct NodeContext {
    node: Arc<NodeSpec>,
    node_type: NodeType,
    run_id: String,
    scope_inputs: Arc<Map<String, Value>>,
    history: Arc<Vec<ChatTurn>>,
    deltas: Option<DeltaSender>,
    subgraph: Option<Arc<dyn SubgraphRunner>>,
    interrupter: Option<Arc<dyn Interrupter>>,
}

impl Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_id", &self.node.id)
            .field("node_type", &self.node_type)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl NodeContext {
    pub fn new(node: Arc<NodeSpec>, node_type: NodeType, run_id: impl Into<String>) -> Self {
        Self {
            node,
            node_type,
            run_id: run_id.into(),
            scope_inputs: Arc::new(Map::new()),
            history: Arc::new(Vec::new()),
            deltas: None,
            subgraph: None,
            interrupter: None,
        }
    }

    pub fn with_scope_inputs(mut self, inputs: Arc<Map<String, Value>>) -> Self {
        self.scope_inputs = inputs;
        self
    }

    pub fn with_history(mut self, history: Arc<Vec<ChatTurn>>) -> Self {
        self.history = history;
        self
    }

    pub fn with_deltas(mut self, deltas: DeltaSender) -> Self {
        self.deltas = Some(deltas);
        self
    }

    pub fn with_subgraph(mut self, runner: Arc<dyn SubgraphRunner>) -> Self {
        self.subgraph = Some(runner);
        self
    }

    pub fn with_interrupter(mut self, interrupter: Arc<dyn Interrupter>) -> Self {
        self.interrupter = Some(interrupter);
        self
    }

    pub fn node(&self) -> &NodeSpec {
        &self.node
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request inputs for the run, or the item inputs inside an iteration
    pub fn scope_inputs(&self) -> &Map<String, Value> {
        &self.scope_inputs
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn deltas(&self) -> Option<&DeltaSender> {
        self.deltas.as_ref()
    }

    pub fn subgraph(&self) -> Result<&Arc<dyn SubgraphRunner>, NodeError> {
        self.subgraph.as_ref().ok_or_else(|| {
            NodeError::execution(format!("Node '{}' has no sub-graph to run", self.node.id))
        })
    }

    pub fn interrupter(&self) -> Result<&Arc<dyn Interrupter>, NodeError> {
        self.interrupter.as_ref().ok_or_else(|| {
            NodeError::execution(format!(
                "Node '{}' cannot pause this run",
                self.node.id
            ))
        })
    }
}

/// Implementation of one node type
#[async_trait]
pub trait NodeExecutor: Send + Sync + Debug {
    fn capabilities(&self) -> NodeCapabilities {
        NodeCapabilities::default()
    }

    /// Runs the node against its resolved inputs
    async fn execute(
        &self,
        ctx: &NodeContext,
        inputs: Map<String, Value>,
    ) -> Result<NodeRunResult, NodeError>;
}

#[cfg(test)]
pub mod mock {
    //! Configurable node implementations for engine tests

    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    type Handler = dyn Fn(&Map<String, Value>) -> Result<NodeRunResult, NodeError> + Send + Sync;

    /// Node implementation driven by a closure, counting its invocations
    pub struct FnNode {
        handler: Box<Handler>,
        capabilities: NodeCapabilities,
        delay: Option<Duration>,
        calls: Arc<AtomicU32>,
    }

    impl Debug for FnNode {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FnNode")
                .field("capabilities", &self.capabilities)
                .field("calls", &self.calls())
                .finish()
        }
    }

    impl FnNode {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&Map<String, Value>) -> Result<NodeRunResult, NodeError> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                capabilities: NodeCapabilities::default(),
                delay: None,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        /// Always succeeds with the given outputs
        pub fn returning(outputs: Value) -> Self {
            let outputs = outputs.as_object().cloned().unwrap_or_default();
            Self::new(move |_| Ok(NodeRunResult::succeeded(outputs.clone())))
        }

        /// Always fails with the given message
        pub fn failing(message: &str) -> Self {
            let message = message.to_string();
            Self::new(move |_| Err(NodeError::execution(message.clone())))
        }

        pub fn with_capabilities(mut self, capabilities: NodeCapabilities) -> Self {
            self.capabilities = capabilities;
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn call_counter(&self) -> Arc<AtomicU32> {
            self.calls.clone()
        }
    }

    #[async_trait]
    impl NodeExecutor for FnNode {
        fn capabilities(&self) -> NodeCapabilities {
            self.capabilities
        }

        async fn execute(
            &self,
            _ctx: &NodeContext,
            inputs: Map<String, Value>,
        ) -> Result<NodeRunResult, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            (self.handler)(&inputs)
        }
    }
}
