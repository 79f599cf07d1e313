//! Bounded channel delivering chunks to a streaming caller

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::domain::stream::{SinkClosed, StreamChunk, StreamSink, WorkflowStream};

/// Sending half of a workflow stream
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<StreamChunk>,
}

impl ChannelSink {
    /// Creates a sink and the stream its chunks arrive on
    pub fn channel(buffer: usize) -> (Self, WorkflowStream) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, Box::pin(ReceiverStream::new(receiver)))
    }

    /// Resolves once the caller has dropped the stream
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

#[async_trait]
impl StreamSink for ChannelSink {
    async fn send(&self, chunk: StreamChunk) -> Result<(), SinkClosed> {
        self.sender.send(chunk).await.map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let (sink, mut stream) = ChannelSink::channel(4);

        assert_ok!(sink.send(StreamChunk::delta("a", "1")).await);
        assert_ok!(sink.send(StreamChunk::delta("a", "2")).await);
        drop(sink);

        let chunks: Vec<_> = stream.by_ref().collect().await;
        assert_eq!(
            chunks,
            vec![StreamChunk::delta("a", "1"), StreamChunk::delta("a", "2")]
        );
    }

    #[tokio::test]
    async fn test_dropped_stream_closes_sink() {
        let (sink, stream) = ChannelSink::channel(1);
        assert!(!sink.is_closed());

        drop(stream);

        assert!(sink.is_closed());
        assert_eq!(sink.send(StreamChunk::delta("a", "1")).await, Err(SinkClosed));
        sink.closed().await;
    }
}
