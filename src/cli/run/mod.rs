//! Run command - executes a workflow document from disk

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use super::{bootstrap, read_dsl};
use crate::config::AppConfig;
use crate::domain::cache::EngineCacheKey;
use crate::domain::chains::CompiledWorkflow;
use crate::domain::graph::WorkflowDsl;
use crate::domain::stream::StreamChunk;
use crate::domain::workflow::RunRequest;
use crate::infrastructure::cache::{CacheConfig, CacheFactory, EngineCache};
use crate::infrastructure::nodes::builtin_registry;
use crate::infrastructure::workflow::{EngineConfig, WorkflowEngine};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the DSL document (JSON)
    pub dsl: PathBuf,

    /// Request inputs as a JSON object
    #[arg(long)]
    pub inputs: Option<String>,

    /// Print chunks as they are produced instead of the final result
    #[arg(long)]
    pub stream: bool,

    /// Flow id; enables the engine cache for this document
    #[arg(long)]
    pub flow_id: Option<String>,

    /// Flow version used in the cache key
    #[arg(long, default_value = "draft")]
    pub version: String,

    /// Cache the build as a published release instead of a debug draft
    #[arg(long)]
    pub release: bool,
}

/// Run a workflow document
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = bootstrap();
    let engine = build_engine(&config).await?;

    let dsl = read_dsl(&args.dsl)?;
    let compiled = compile(&engine, &args, &dsl).await?;
    let request = RunRequest::from_value(parse_inputs(args.inputs.as_deref())?);

    info!(run_id = %request.run_id, dsl = %args.dsl.display(), "Running workflow");

    if args.stream {
        run_streaming(&engine, compiled, request).await
    } else {
        run_blocking(&engine, compiled, request).await
    }
}

async fn build_engine(config: &AppConfig) -> anyhow::Result<WorkflowEngine> {
    let cache_config = CacheConfig::from_settings(&config.cache)?;
    let cache = CacheFactory::new()
        .create(&cache_config)
        .await
        .context("Failed to create engine cache")?;

    Ok(WorkflowEngine::new(builtin_registry())
        .with_config(EngineConfig::from(&config.engine))
        .with_cache(EngineCache::new(cache)))
}

async fn compile(
    engine: &WorkflowEngine,
    args: &RunArgs,
    dsl: &WorkflowDsl,
) -> anyhow::Result<Arc<CompiledWorkflow>> {
    let Some(flow_id) = &args.flow_id else {
        return Ok(engine.compile(dsl)?);
    };

    let key = EngineCacheKey::new(args.release, flow_id, &args.version, "cli");
    let updated_at: DateTime<Utc> = std::fs::metadata(&args.dsl)
        .and_then(|meta| meta.modified())
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(engine.load(&key, dsl, updated_at).await?)
}

fn parse_inputs(raw: Option<&str>) -> anyhow::Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };

    let value: Value = serde_json::from_str(raw).context("--inputs is not valid JSON")?;
    anyhow::ensure!(value.is_object(), "--inputs must be a JSON object");

    Ok(value)
}

async fn run_blocking(
    engine: &WorkflowEngine,
    compiled: Arc<CompiledWorkflow>,
    request: RunRequest,
) -> anyhow::Result<()> {
    tokio::select! {
        outcome = engine.run(compiled, request) => {
            let result = outcome?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl+C, abandoning run");
            anyhow::bail!("Run cancelled")
        }
    }
}

async fn run_streaming(
    engine: &WorkflowEngine,
    compiled: Arc<CompiledWorkflow>,
    request: RunRequest,
) -> anyhow::Result<()> {
    let mut handle = engine.run_streaming(compiled, request);
    let mut answers = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let chunk = tokio::select! {
            chunk = handle.stream.next() => chunk,
            _ = signal::ctrl_c() => {
                warn!("Received Ctrl+C, cancelling run");
                handle.control.cancel();
                continue;
            }
        };

        let Some(chunk) = chunk else {
            break;
        };
        println!("{}", serde_json::to_string(&chunk)?);

        match chunk {
            StreamChunk::Interrupt { .. } => {
                let answer = answers.next_line().await?.unwrap_or_default();
                handle.control.resume(Value::String(answer))?;
            }
            StreamChunk::Error { code, message, .. } => {
                anyhow::bail!("{}: {}", code, message);
            }
            StreamChunk::Finish { .. } => break,
            _ => {}
        }
    }

    Ok(())
}
