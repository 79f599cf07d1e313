//! Workflow engine - compiles DSL documents and drives runs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use super::interrupt::InterruptGate;
use super::scheduler::{RunContext, Scheduler};
use crate::config::EngineSettings;
use crate::domain::cache::EngineCacheKey;
use crate::domain::chains::{CompiledWorkflow, DependencyResolver};
use crate::domain::graph::WorkflowDsl;
use crate::domain::node::{NodeRegistry, NodeRunResult, NodeRunStatus, Signal};
use crate::domain::stream::{NullSink, StreamChunk, StreamSink, WorkflowStream};
use crate::domain::workflow::{
    PendingQuestion, RunCheckpoint, RunRequest, WorkflowError, WorkflowFailure, WorkflowRunResult,
};
use crate::infrastructure::cache::EngineCache;
use crate::infrastructure::stream::ChannelSink;

/// Engine knobs that apply to every run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Items of an iteration node processed at once
    pub iteration_concurrency: usize,
    /// Capacity of the streaming channel
    pub stream_buffer: usize,
    /// Attempt timeout of nodes whose retry configuration sets none
    pub default_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            iteration_concurrency: 1,
            stream_buffer: 64,
            default_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn with_iteration_concurrency(mut self, concurrency: usize) -> Self {
        self.iteration_concurrency = concurrency;
        self
    }

    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            iteration_concurrency: settings.iteration_concurrency.max(1),
            stream_buffer: settings.stream_buffer.max(1),
            default_timeout: Duration::from_secs(settings.default_timeout_secs),
        }
    }
}

/// A streaming run: its chunks plus the handle controlling it
pub struct RunHandle {
    pub run_id: String,
    pub stream: WorkflowStream,
    pub control: RunControl,
}

/// Controls a streaming run from outside
#[derive(Clone)]
pub struct RunControl {
    run: Arc<RunContext>,
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("run_id", &self.run.run_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl RunControl {
    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// Stops the run; waiting nodes observe cancellation
    pub fn cancel(&self) {
        if self.run.cancel.fire() {
            info!(run_id = %self.run.run_id, "Run cancelled by caller");
        }
        self.run.gate.release();
    }

    pub fn is_cancelled(&self) -> bool {
        self.run.cancel.is_set()
    }

    /// Question the run is currently paused on
    pub fn pending(&self) -> Option<PendingQuestion> {
        self.run.gate.pending()
    }

    /// Answers the pending question and lets the run continue
    pub fn resume(&self, answer: Value) -> Result<(), WorkflowError> {
        self.run.gate.answer(answer)
    }

    /// Serializable state of the run as settled so far
    pub fn checkpoint(&self) -> RunCheckpoint {
        let results = self
            .run
            .trace()
            .into_iter()
            .filter(|result| result.status != NodeRunStatus::Cancelled)
            .map(|result| (result.node_id.clone(), result))
            .collect();

        RunCheckpoint {
            run_id: self.run.run_id.clone(),
            inputs: (*self.run.inputs).clone(),
            history: (*self.run.history).clone(),
            results,
            pending: self.pending(),
            created_at: Utc::now(),
        }
    }
}

/// Compiles workflows and executes them against a node registry
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    cache: Option<EngineCache>,
}

impl WorkflowEngine {
    pub fn new(registry: NodeRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config: EngineConfig::default(),
            cache: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Memoizes compiled workflows for [`WorkflowEngine::load`]
    pub fn with_cache(mut self, cache: EngineCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates a document and resolves its dependencies
    #[instrument(skip_all, fields(nodes = dsl.nodes.len(), edges = dsl.edges.len()))]
    pub fn compile(&self, dsl: &WorkflowDsl) -> Result<Arc<CompiledWorkflow>, WorkflowError> {
        let compiled = DependencyResolver::compile(dsl)?;
        self.ensure_supported(&compiled)?;

        debug!("Workflow compiled");
        Ok(Arc::new(compiled))
    }

    fn ensure_supported(&self, compiled: &CompiledWorkflow) -> Result<(), WorkflowError> {
        self.registry
            .ensure_supports(compiled.node_types())
            .map_err(|e| WorkflowError::validation(e.to_string()))
    }

    /// Compiles through the engine cache when one is configured
    ///
    /// Cache failures are logged and fall back to compiling.
    #[instrument(skip(self, dsl), fields(flow_id = %key.flow_id))]
    pub async fn load(
        &self,
        key: &EngineCacheKey,
        dsl: &WorkflowDsl,
        dsl_updated_at: DateTime<Utc>,
    ) -> Result<Arc<CompiledWorkflow>, WorkflowError> {
        let Some(cache) = &self.cache else {
            return self.compile(dsl);
        };

        match cache.get(key, dsl_updated_at).await {
            Ok(Some(compiled)) => {
                self.ensure_supported(&compiled)?;
                debug!("Using cached workflow build");
                return Ok(Arc::new(compiled));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Engine cache lookup failed, compiling"),
        }

        let compiled = self.compile(dsl)?;

        if let Err(e) = cache.set(key, &compiled).await {
            warn!(error = %e, "Failed to store workflow build");
        }

        Ok(compiled)
    }

    /// Runs to completion without streaming
    ///
    /// Interruptible nodes fail here since nobody can answer them.
    #[instrument(skip(self, compiled, request), fields(run_id = %request.run_id))]
    pub async fn run(
        &self,
        compiled: Arc<CompiledWorkflow>,
        request: RunRequest,
    ) -> Result<WorkflowRunResult, WorkflowFailure> {
        let started = Instant::now();
        let run_id = request.run_id.clone();
        let sink: Arc<dyn StreamSink> = Arc::new(NullSink);
        let cancel = Signal::new();
        let gate = InterruptGate::detached(sink.clone(), cancel.clone());

        let run = Arc::new(RunContext::new(
            compiled,
            self.registry.clone(),
            self.config.clone(),
            request,
            cancel,
            Arc::new(gate),
        ));

        info!("Workflow run started");

        match run_root(&run, sink, BTreeMap::new()).await {
            Ok(outputs) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(elapsed_ms, "Workflow run finished");

                Ok(WorkflowRunResult {
                    run_id,
                    outputs,
                    token_cost: run.token_cost(),
                    trace: run.trace(),
                    elapsed_ms,
                })
            }
            Err(e) => {
                error!(error = %e, code = e.code(), "Workflow run failed");
                Err(WorkflowFailure::new(run_id, e).with_trace(run.trace()))
            }
        }
    }

    /// Starts a run whose end outputs, deltas and questions arrive on a stream
    ///
    /// The stream ends with a finish marker or an error chunk. Dropping it
    /// cancels the run.
    pub fn run_streaming(&self, compiled: Arc<CompiledWorkflow>, request: RunRequest) -> RunHandle {
        self.launch(compiled, request, BTreeMap::new(), None)
    }

    /// Continues a paused run from its checkpoint with the given answer
    ///
    /// Nodes settled before the pause are replayed from the checkpoint.
    pub fn resume(
        &self,
        compiled: Arc<CompiledWorkflow>,
        checkpoint: RunCheckpoint,
        answer: Value,
    ) -> Result<RunHandle, WorkflowError> {
        let pending = checkpoint
            .pending
            .ok_or_else(|| WorkflowError::validation("Checkpoint has no pending question"))?;

        if compiled.graph.node(&pending.node_id).is_none() {
            return Err(WorkflowError::validation(format!(
                "Pending node '{}' is not part of the workflow",
                pending.node_id
            )));
        }

        let mut replay = checkpoint.results;
        replay.remove(&pending.node_id);

        info!(
            run_id = %checkpoint.run_id,
            node_id = %pending.node_id,
            replayed = replay.len(),
            "Resuming run from checkpoint"
        );

        let request = RunRequest {
            run_id: checkpoint.run_id,
            inputs: checkpoint.inputs,
            history: checkpoint.history,
        };

        Ok(self.launch(compiled, request, replay, Some((pending.node_id, answer))))
    }

    fn launch(
        &self,
        compiled: Arc<CompiledWorkflow>,
        request: RunRequest,
        replay: BTreeMap<String, NodeRunResult>,
        preset: Option<(String, Value)>,
    ) -> RunHandle {
        let run_id = request.run_id.clone();
        let (sink, stream) = ChannelSink::channel(self.config.stream_buffer);
        let shared: Arc<dyn StreamSink> = Arc::new(sink.clone());
        let cancel = Signal::new();

        let mut gate = InterruptGate::interactive(shared.clone(), cancel.clone());
        if let Some((node_id, answer)) = preset {
            gate = gate.with_preset_answer(node_id, answer);
        }

        let run = Arc::new(RunContext::new(
            compiled,
            self.registry.clone(),
            self.config.clone(),
            request,
            cancel,
            Arc::new(gate),
        ));

        let task_run = run.clone();
        tokio::spawn(async move {
            info!(run_id = %task_run.run_id, "Streaming run started");

            let outcome = tokio::select! {
                outcome = run_root(&task_run, shared, replay) => outcome,
                _ = sink.closed() => {
                    task_run.cancel.fire();
                    Err(WorkflowError::cancelled("Stream receiver closed"))
                }
            };

            let last = match outcome {
                Ok(outputs) => {
                    info!(run_id = %task_run.run_id, "Streaming run finished");
                    StreamChunk::Finish {
                        outputs,
                        token_cost: task_run.token_cost(),
                    }
                }
                Err(e) => {
                    error!(run_id = %task_run.run_id, error = %e, code = e.code(), "Streaming run failed");
                    StreamChunk::error(&e)
                }
            };

            if sink.send(last).await.is_err() {
                debug!(run_id = %task_run.run_id, "Stream closed before the final chunk");
            }
        });

        RunHandle {
            run_id,
            stream,
            control: RunControl { run },
        }
    }
}

async fn run_root(
    run: &Arc<RunContext>,
    sink: Arc<dyn StreamSink>,
    replay: BTreeMap<String, NodeRunResult>,
) -> Result<Map<String, Value>, WorkflowError> {
    let scheduler = Scheduler::root(run.clone(), sink, replay)?;
    Arc::new(scheduler).run().await
}
