//! In-order release of end-output chunks

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::chunk::StreamChunk;
use super::sink::{SinkClosed, StreamSink};

enum Slot {
    Ready(StreamChunk),
    Skipped,
}

struct EmitterState {
    next: usize,
    slots: HashMap<String, Slot>,
}

/// Buffers end-output chunks and releases them in a fixed node order
///
/// A chunk is released once every node before it in the order has either
/// produced its chunk or been skipped. Nodes outside the order pass through.
pub struct OrderedEmitter {
    order: Vec<String>,
    sink: Arc<dyn StreamSink>,
    state: Mutex<EmitterState>,
}

impl std::fmt::Debug for OrderedEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedEmitter")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl OrderedEmitter {
    pub fn new(order: Vec<String>, sink: Arc<dyn StreamSink>) -> Self {
        Self {
            order,
            sink,
            state: Mutex::new(EmitterState {
                next: 0,
                slots: HashMap::new(),
            }),
        }
    }

    /// Records the chunk of a completed node and flushes what became releasable
    pub async fn complete(&self, node_id: &str, chunk: StreamChunk) -> Result<(), SinkClosed> {
        if !self.order.iter().any(|id| id == node_id) {
            return self.sink.send(chunk).await;
        }

        self.settle(node_id, Slot::Ready(chunk)).await
    }

    /// Marks a node that will never produce a chunk
    pub async fn skip(&self, node_id: &str) -> Result<(), SinkClosed> {
        if !self.order.iter().any(|id| id == node_id) {
            return Ok(());
        }

        self.settle(node_id, Slot::Skipped).await
    }

    async fn settle(&self, node_id: &str, slot: Slot) -> Result<(), SinkClosed> {
        // Sends happen under the lock so concurrent completions cannot reorder
        let mut state = self.state.lock().await;
        state.slots.insert(node_id.to_string(), slot);

        while let Some(next_id) = self.order.get(state.next) {
            match state.slots.remove(next_id) {
                Some(Slot::Ready(chunk)) => {
                    state.next += 1;
                    self.sink.send(chunk).await?;
                }
                Some(Slot::Skipped) => state.next += 1,
                None => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::NodeType;
    use crate::domain::stream::mock::CollectingSink;
    use serde_json::Map;

    fn output(node_id: &str) -> StreamChunk {
        StreamChunk::NodeOutput {
            node_id: node_id.to_string(),
            node_type: NodeType::Message,
            outputs: Map::new(),
        }
    }

    fn emitter(sink: Arc<CollectingSink>) -> OrderedEmitter {
        OrderedEmitter::new(
            vec!["message::1".into(), "message::2".into(), "node-end::1".into()],
            sink,
        )
    }

    #[tokio::test]
    async fn test_out_of_order_completion_is_buffered() {
        let sink = Arc::new(CollectingSink::new());
        let emitter = emitter(sink.clone());

        emitter.complete("node-end::1", output("node-end::1")).await.unwrap();
        emitter.complete("message::2", output("message::2")).await.unwrap();
        assert!(sink.chunks().is_empty());

        emitter.complete("message::1", output("message::1")).await.unwrap();
        assert_eq!(
            sink.output_order(),
            vec!["message::1", "message::2", "node-end::1"]
        );
    }

    #[tokio::test]
    async fn test_skipped_nodes_unblock_successors() {
        let sink = Arc::new(CollectingSink::new());
        let emitter = emitter(sink.clone());

        emitter.complete("message::2", output("message::2")).await.unwrap();
        emitter.skip("message::1").await.unwrap();
        emitter.complete("node-end::1", output("node-end::1")).await.unwrap();

        assert_eq!(sink.output_order(), vec!["message::2", "node-end::1"]);
    }

    #[tokio::test]
    async fn test_unordered_nodes_pass_through() {
        let sink = Arc::new(CollectingSink::new());
        let emitter = emitter(sink.clone());

        emitter.complete("message::9", output("message::9")).await.unwrap();
        assert_eq!(sink.output_order(), vec!["message::9"]);
    }
}
