//! Streaming sink - chunks, sink trait and ordered emission

mod chunk;
mod ordering;
mod sink;

pub use chunk::StreamChunk;
pub use ordering::OrderedEmitter;
pub use sink::{NullSink, SinkClosed, StreamSink, WorkflowStream};

#[cfg(test)]
pub use sink::mock;
