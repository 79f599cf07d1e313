//! Dataflow scheduler of one scope (the top-level graph or one iteration item)

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::engine::EngineConfig;
use super::interrupt::InterruptGate;
use super::iteration::IterationRunner;
use crate::domain::chains::{BindingSource, CompiledWorkflow, DependencyInfo, ScopeInfo, ROOT_SCOPE};
use crate::domain::graph::{
    EdgeKind, ErrorStrategy, NodeSpec, NodeType, DEFAULT_BRANCH, INTENT_PREFIX,
};
use crate::domain::node::{
    DeltaSender, NodeCapabilities, NodeContext, NodeError, NodeErrorCode, NodeExecutor,
    NodeRegistry, NodeRunResult, NodeRunStatus, NodeRunningStatus, Signal, TokenCost,
};
use crate::domain::stream::{NullSink, OrderedEmitter, StreamChunk, StreamSink};
use crate::domain::variable::VariablePool;
use crate::domain::workflow::{ChatTurn, RunRequest, WorkflowError};

/// State shared by every scope of one run
pub(crate) struct RunContext {
    pub(crate) compiled: Arc<CompiledWorkflow>,
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) config: EngineConfig,
    pub(crate) run_id: String,
    pub(crate) inputs: Arc<Map<String, Value>>,
    pub(crate) history: Arc<Vec<ChatTurn>>,
    pub(crate) cancel: Signal,
    pub(crate) gate: Arc<InterruptGate>,
    /// Settled top-level nodes in completion order
    trace: Mutex<Vec<NodeRunResult>>,
}

impl RunContext {
    pub(crate) fn new(
        compiled: Arc<CompiledWorkflow>,
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        request: RunRequest,
        cancel: Signal,
        gate: Arc<InterruptGate>,
    ) -> Self {
        Self {
            compiled,
            registry,
            config,
            run_id: request.run_id,
            inputs: Arc::new(request.inputs),
            history: Arc::new(request.history),
            cancel,
            gate,
            trace: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn trace(&self) -> Vec<NodeRunResult> {
        self.trace
            .lock()
            .map(|trace| trace.clone())
            .unwrap_or_default()
    }

    pub(crate) fn token_cost(&self) -> TokenCost {
        let mut total = TokenCost::default();
        for result in self.trace() {
            if let Some(cost) = &result.token_cost {
                total.add(cost);
            }
        }
        total
    }

    fn record(&self, result: NodeRunResult) {
        if let Ok(mut trace) = self.trace.lock() {
            trace.push(result);
        }
    }
}

/// Traversal decision attached to an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathStatus {
    Pending,
    Active,
    Inactive,
}

/// Edge decisions, written by the source before its completion signal fires
struct PathTable {
    statuses: Mutex<Vec<PathStatus>>,
}

impl PathTable {
    fn new(edges: usize) -> Self {
        Self {
            statuses: Mutex::new(vec![PathStatus::Pending; edges]),
        }
    }

    fn get(&self, index: usize) -> PathStatus {
        self.statuses
            .lock()
            .ok()
            .and_then(|statuses| statuses.get(index).copied())
            .unwrap_or(PathStatus::Pending)
    }

    fn set(&self, index: usize, status: PathStatus) {
        if let Ok(mut statuses) = self.statuses.lock()
            && let Some(slot) = statuses.get_mut(index)
        {
            *slot = status;
        }
    }
}

/// A scope member with everything resolved once
struct Member {
    spec: Arc<NodeSpec>,
    node_type: NodeType,
    executor: Arc<dyn NodeExecutor>,
    capabilities: NodeCapabilities,
    status: NodeRunningStatus,
}

/// How the attempts of a live node ended
enum Attempted {
    Succeeded(NodeRunResult, u32),
    Exhausted(NodeError, u32),
}

/// Runs one scope: one task per member, each gated on its control predecessors
pub(crate) struct Scheduler {
    run: Arc<RunContext>,
    scope: ScopeInfo,
    pool: Arc<VariablePool>,
    scope_inputs: Arc<Map<String, Value>>,
    sink: Arc<dyn StreamSink>,
    top_level: bool,
    replay: BTreeMap<String, NodeRunResult>,
    members: HashMap<String, Member>,
    paths: PathTable,
    emitter: OrderedEmitter,
    results: Mutex<HashMap<String, NodeRunResult>>,
}

impl Scheduler {
    /// Scheduler of the top-level graph; `replay` holds results recorded before a pause
    pub(crate) fn root(
        run: Arc<RunContext>,
        sink: Arc<dyn StreamSink>,
        replay: BTreeMap<String, NodeRunResult>,
    ) -> Result<Self, WorkflowError> {
        let scope = run.compiled.scope(ROOT_SCOPE)?.clone();
        let pool = Arc::new(VariablePool::new(scope.members.iter().cloned()));
        let inputs = run.inputs.clone();

        Self::build(run, scope, pool, inputs, sink, true, replay)
    }

    /// Scheduler of one iteration item
    pub(crate) fn nested(
        run: Arc<RunContext>,
        scope_id: &str,
        parent_pool: Arc<VariablePool>,
        item_inputs: Map<String, Value>,
    ) -> Result<Self, WorkflowError> {
        let scope = run.compiled.scope(scope_id)?.clone();
        let pool = Arc::new(VariablePool::child(
            parent_pool,
            scope.members.iter().cloned(),
        ));

        Self::build(
            run,
            scope,
            pool,
            Arc::new(item_inputs),
            Arc::new(NullSink),
            false,
            BTreeMap::new(),
        )
    }

    fn build(
        run: Arc<RunContext>,
        scope: ScopeInfo,
        pool: Arc<VariablePool>,
        scope_inputs: Arc<Map<String, Value>>,
        sink: Arc<dyn StreamSink>,
        top_level: bool,
        replay: BTreeMap<String, NodeRunResult>,
    ) -> Result<Self, WorkflowError> {
        let mut members = HashMap::with_capacity(scope.members.len());

        for node_id in &scope.members {
            let spec = run.compiled.node(node_id)?;
            let node_type = run.compiled.node_type(node_id)?;
            let executor = run.registry.get(node_type)?;

            members.insert(
                node_id.clone(),
                Member {
                    spec: Arc::new(spec.clone()),
                    node_type,
                    capabilities: executor.capabilities(),
                    executor,
                    status: NodeRunningStatus::new(),
                },
            );
        }

        let stream_order = scope
            .topo_order
            .iter()
            .filter(|id| members.get(*id).is_some_and(|m| m.capabilities.end_output))
            .cloned()
            .collect();

        Ok(Self {
            paths: PathTable::new(run.compiled.graph.edges().len()),
            emitter: OrderedEmitter::new(stream_order, sink.clone()),
            run,
            scope,
            pool,
            scope_inputs,
            sink,
            top_level,
            replay,
            members,
            results: Mutex::new(HashMap::new()),
        })
    }

    /// Runs the scope to completion and returns the exit node's outputs
    pub(crate) async fn run(self: Arc<Self>) -> Result<Map<String, Value>, WorkflowError> {
        let mut tasks = JoinSet::new();

        for node_id in &self.scope.topo_order {
            tasks.spawn(self.clone().drive(node_id.clone()));
        }

        let cancel = self.run.cancel.clone();

        let failure = loop {
            tokio::select! {
                _ = cancel.wait() => break WorkflowError::cancelled("Run cancelled"),
                joined = tasks.join_next() => match joined {
                    None => return self.exit_outputs(),
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(error))) => break error,
                    Some(Err(join_error)) => {
                        break WorkflowError::internal(format!("Node task failed: {}", join_error));
                    }
                },
            }
        };

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        if matches!(failure, WorkflowError::Cancelled(_)) {
            self.record_cancelled();
        }

        Err(failure)
    }

    /// Records every member that had not settled when the run stopped
    fn record_cancelled(&self) {
        for node_id in &self.scope.topo_order {
            let Some(member) = self.members.get(node_id) else {
                continue;
            };
            if member.status.is_complete() {
                continue;
            }

            let mut cancelled = NodeRunResult::cancelled(node_id.as_str());
            cancelled.node_type = Some(member.node_type);
            cancelled.alias = member.spec.alias.clone();
            debug!(node_id = %node_id, "Node cancelled");
            self.record(cancelled);
        }
    }

    fn member(&self, node_id: &str) -> Result<&Member, WorkflowError> {
        self.members.get(node_id).ok_or_else(|| {
            WorkflowError::internal(format!(
                "Node '{}' is not part of scope '{}'",
                node_id, self.scope.id
            ))
        })
    }

    async fn drive(self: Arc<Self>, node_id: String) -> Result<(), WorkflowError> {
        let member = self.member(&node_id)?;
        member.status.start_with_thread.fire();

        let dependency = self.run.compiled.dependency(&node_id)?;
        for predecessor in &dependency.node_dep {
            self.member(predecessor)?.status.complete.wait().await;
        }
        member.status.pre_processing.fire();

        if !self.is_live(&node_id, dependency) {
            return self.prune(&node_id, member, dependency).await;
        }

        member.status.processing.fire();

        match self.replay.get(&node_id) {
            Some(recorded) if recorded.status == NodeRunStatus::Skipped => {
                self.prune(&node_id, member, dependency).await
            }
            Some(recorded) => {
                debug!(node_id = %node_id, "Replaying recorded result");
                self.settle(member, dependency, recorded.clone(), false)
                    .await
            }
            None => {
                let result = self.execute(member).await?;
                self.settle(member, dependency, result, true).await
            }
        }
    }

    fn is_live(&self, node_id: &str, dependency: &DependencyInfo) -> bool {
        node_id == self.scope.entry
            || dependency
                .incoming
                .iter()
                .any(|index| self.paths.get(*index) == PathStatus::Active)
    }

    async fn prune(
        &self,
        node_id: &str,
        member: &Member,
        dependency: &DependencyInfo,
    ) -> Result<(), WorkflowError> {
        self.pool.mark_unproduced(node_id);
        for index in &dependency.outgoing {
            self.paths.set(*index, PathStatus::Inactive);
        }

        let mut skipped = NodeRunResult::skipped(node_id);
        skipped.node_type = Some(member.node_type);
        skipped.alias = member.spec.alias.clone();
        self.record(skipped);

        let delivered = self.emitter.skip(node_id).await;
        member.status.mark_not_run();
        debug!(node_id = %node_id, "Node pruned");

        delivered.map_err(|_| WorkflowError::cancelled("Stream receiver closed"))
    }

    async fn settle(
        &self,
        member: &Member,
        dependency: &DependencyInfo,
        result: NodeRunResult,
        emit: bool,
    ) -> Result<(), WorkflowError> {
        let node_id = member.spec.id.as_str();

        self.pool
            .write(node_id, result.pool_entries())
            .map_err(|e| WorkflowError::internal(e.to_string()))?;

        self.route(
            dependency,
            result.edge_source_handle.as_deref(),
            result.status == NodeRunStatus::Failed,
        );

        let delivered = if emit && result.is_success() && member.capabilities.end_output {
            let chunk = StreamChunk::NodeOutput {
                node_id: node_id.to_string(),
                node_type: member.node_type,
                outputs: result.outputs.clone(),
            };
            self.emitter.complete(node_id, chunk).await
        } else {
            self.emitter.skip(node_id).await
        };

        debug!(
            node_id = %node_id,
            status = ?result.status,
            attempts = result.attempts,
            "Node settled"
        );
        self.record(result);
        member.status.complete.fire();

        delivered.map_err(|_| WorkflowError::cancelled("Stream receiver closed"))
    }

    /// Decides every outgoing edge of a settled node
    fn route(&self, dependency: &DependencyInfo, handle: Option<&str>, failed: bool) {
        let handle = handle.map(|h| h.strip_prefix(INTENT_PREFIX).unwrap_or(h));
        let edges: Vec<_> = dependency
            .outgoing
            .iter()
            .filter_map(|index| {
                self.run
                    .compiled
                    .graph
                    .edge(*index)
                    .map(|edge| (*index, edge.kind()))
            })
            .collect();

        let matched = handle.is_some_and(|selected| {
            edges
                .iter()
                .any(|(_, kind)| *kind == EdgeKind::Branch(selected))
        });

        for (index, kind) in &edges {
            let active = match kind {
                EdgeKind::Fail => failed,
                _ if failed => false,
                EdgeKind::Normal => true,
                EdgeKind::Branch(class) if matched => Some(*class) == handle,
                EdgeKind::Branch(class) => *class == DEFAULT_BRANCH,
            };

            let status = if active {
                PathStatus::Active
            } else {
                PathStatus::Inactive
            };
            self.paths.set(*index, status);
        }
    }

    fn record(&self, result: NodeRunResult) {
        if self.top_level {
            self.run.record(result.clone());
        }
        if let Ok(mut results) = self.results.lock() {
            results.insert(result.node_id.clone(), result);
        }
    }

    async fn execute(&self, member: &Member) -> Result<NodeRunResult, WorkflowError> {
        let node = member.spec.as_ref();
        let started_at = Utc::now();
        let clock = Instant::now();

        let ctx = self.node_context(member);

        let (attempted, inputs) = match self.resolve_inputs(&node.id).await {
            Ok(inputs) => (self.attempt(member, &ctx, &inputs).await?, inputs),
            Err(error) => {
                warn!(node_id = %node.id, error = %error, "Input resolution failed");
                (Attempted::Exhausted(error, 0), Map::new())
            }
        };

        let mut result = match attempted {
            Attempted::Succeeded(result, attempts) => NodeRunResult { attempts, ..result },
            Attempted::Exhausted(error, attempts) => NodeRunResult {
                attempts,
                ..self.apply_strategy(node, error)?
            },
        };

        result.node_id = node.id.clone();
        result.node_type = Some(member.node_type);
        result.alias = node.alias.clone();
        if result.inputs.is_empty() {
            result.inputs = inputs;
        }
        result.started_at = Some(started_at);
        result.elapsed_ms = clock.elapsed().as_millis() as u64;

        Ok(result)
    }

    async fn resolve_inputs(&self, node_id: &str) -> Result<Map<String, Value>, NodeError> {
        let mut inputs = Map::new();

        for binding in self.run.compiled.bindings(node_id) {
            let value = match &binding.source {
                BindingSource::Literal(value) => value.clone(),
                BindingSource::Ref(path) => self.pool.resolve(path).await?,
            };
            inputs.insert(binding.name.clone(), value);
        }

        Ok(inputs)
    }

    /// Runs the node up to its attempt budget
    async fn attempt(
        &self,
        member: &Member,
        ctx: &NodeContext,
        inputs: &Map<String, Value>,
    ) -> Result<Attempted, WorkflowError> {
        let node = member.spec.as_ref();
        let max_attempts = node.retry_config.max_attempts();

        // Interruptible nodes wait on a person, not on I/O
        let limit = if member.capabilities.interruptible {
            None
        } else {
            Some(
                node.retry_config
                    .timeout_duration()
                    .unwrap_or(self.run.config.default_timeout),
            )
        };

        let mut last_error = NodeError::execution("Node was not attempted");

        for attempt in 1..=max_attempts {
            let call = member.executor.execute(ctx, inputs.clone());
            let outcome = match limit {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(NodeError::timeout(limit.as_millis() as u64)),
                },
                None => call.await,
            };

            let error = match outcome.and_then(|result| check_required_outputs(node, result)) {
                Ok(result) => return Ok(Attempted::Succeeded(result, attempt)),
                Err(error) => error,
            };

            if error.code == NodeErrorCode::Cancelled {
                return Err(WorkflowError::cancelled(format!(
                    "Node '{}' was cancelled",
                    node.id
                )));
            }

            if ctx.deltas().is_some_and(DeltaSender::has_emitted) {
                error!(node_id = %node.id, error = %error, "Streaming node failed after emitting output");
                return Err(WorkflowError::interrupted(&node.id, error));
            }

            warn!(
                node_id = %node.id,
                attempt,
                max_attempts,
                error = %error,
                "Node attempt failed"
            );

            let retryable = error.is_retryable();
            last_error = error;

            if !retryable {
                return Ok(Attempted::Exhausted(last_error, attempt));
            }
        }

        Ok(Attempted::Exhausted(last_error, max_attempts))
    }

    fn apply_strategy(
        &self,
        node: &NodeSpec,
        error: NodeError,
    ) -> Result<NodeRunResult, WorkflowError> {
        let retry = &node.retry_config;

        match retry.error_strategy {
            ErrorStrategy::Interrupted => {
                error!(node_id = %node.id, error = %error, "Node failed, interrupting run");
                Err(WorkflowError::interrupted(&node.id, error))
            }
            ErrorStrategy::CustomReturn => {
                debug!(node_id = %node.id, "Node failed, returning custom output");
                let mut result = NodeRunResult::succeeded(retry.custom_output.clone());
                result.record_error(&error);
                Ok(result)
            }
            ErrorStrategy::FailBranch => {
                debug!(node_id = %node.id, "Node failed, taking failure branch");
                let mut result = NodeRunResult::failed(error.clone());
                result.record_error(&error);
                Ok(result)
            }
        }
    }

    fn node_context(&self, member: &Member) -> NodeContext {
        let node_id = member.spec.id.as_str();
        let mut ctx = NodeContext::new(member.spec.clone(), member.node_type, &self.run.run_id)
            .with_scope_inputs(self.scope_inputs.clone())
            .with_history(self.run.history.clone());

        // Nested scopes never stream to the caller
        if member.capabilities.streaming && self.top_level {
            ctx = ctx.with_deltas(DeltaSender::new(node_id, self.sink.clone()));
        }

        if member.capabilities.owns_subgraph
            && let Some(scope) = self.run.compiled.scope_owned_by(node_id)
        {
            ctx = ctx.with_subgraph(Arc::new(IterationRunner::new(
                self.run.clone(),
                scope.id.clone(),
                self.pool.clone(),
            )));
        }

        if member.capabilities.interruptible {
            ctx = ctx.with_interrupter(self.run.gate.clone());
        }

        ctx
    }

    fn exit_outputs(&self) -> Result<Map<String, Value>, WorkflowError> {
        let Some(exit) = &self.scope.exit else {
            return Ok(Map::new());
        };

        let results = self
            .results
            .lock()
            .map_err(|_| WorkflowError::internal("Result table poisoned"))?;

        match results.get(exit) {
            Some(result) if result.is_success() => Ok(result.outputs.clone()),
            Some(result) if result.status == NodeRunStatus::Failed => {
                let source = result
                    .error
                    .clone()
                    .unwrap_or_else(|| NodeError::execution("Exit node failed"));
                let node_type = result.node_type.map(|t| t.as_str()).unwrap_or_default();
                Err(WorkflowError::node_execution(exit, node_type, source))
            }
            _ => Err(WorkflowError::NoEndResult),
        }
    }
}

fn check_required_outputs(
    node: &NodeSpec,
    result: NodeRunResult,
) -> Result<NodeRunResult, NodeError> {
    match node
        .outputs
        .iter()
        .find(|output| output.required && !result.outputs.contains_key(&output.name))
    {
        Some(missing) => Err(NodeError::missing_output(&missing.name)),
        None => Ok(result),
    }
}
