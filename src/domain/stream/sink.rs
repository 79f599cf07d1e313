//! Streaming sink trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use super::chunk::StreamChunk;

/// Stream of chunks handed to the caller
pub type WorkflowStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// The receiving side is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Stream receiver closed")]
pub struct SinkClosed;

/// Ordered delivery of chunks to the caller
#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn send(&self, chunk: StreamChunk) -> Result<(), SinkClosed>;

    fn is_closed(&self) -> bool {
        false
    }
}

/// Sink that drops everything, used for non-streaming and nested runs
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl StreamSink for NullSink {
    async fn send(&self, _chunk: StreamChunk) -> Result<(), SinkClosed> {
        Ok(())
    }
}
