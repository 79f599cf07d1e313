//! Wait state of interruptible nodes

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::info;

use crate::domain::node::{Interrupter, NodeError, Signal};
use crate::domain::stream::{StreamChunk, StreamSink};
use crate::domain::workflow::{PendingQuestion, WorkflowError};

#[derive(Default)]
struct GateState {
    pending: Option<PendingQuestion>,
    answer_tx: Option<oneshot::Sender<Value>>,
    /// Answer supplied up front when resuming from a checkpoint
    preset: Option<(String, Value)>,
}

/// Pauses interruptible nodes until the caller answers
///
/// Only one node waits at a time; others queue on the wait lock.
pub struct InterruptGate {
    wait_lock: tokio::sync::Mutex<()>,
    state: Mutex<GateState>,
    sink: Arc<dyn StreamSink>,
    cancel: Signal,
    interactive: bool,
}

impl std::fmt::Debug for InterruptGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptGate")
            .field("interactive", &self.interactive)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl InterruptGate {
    /// Gate of a streaming run; questions are announced on `sink`
    pub fn interactive(sink: Arc<dyn StreamSink>, cancel: Signal) -> Self {
        Self {
            wait_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(GateState::default()),
            sink,
            cancel,
            interactive: true,
        }
    }

    /// Gate of a run nobody can answer; every question fails
    pub fn detached(sink: Arc<dyn StreamSink>, cancel: Signal) -> Self {
        Self {
            interactive: false,
            ..Self::interactive(sink, cancel)
        }
    }

    pub fn with_preset_answer(self, node_id: impl Into<String>, answer: Value) -> Self {
        self.lock_state().preset = Some((node_id.into(), answer));
        self
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pending(&self) -> Option<PendingQuestion> {
        self.lock_state().pending.clone()
    }

    /// Delivers the answer to the waiting node
    pub fn answer(&self, answer: Value) -> Result<(), WorkflowError> {
        let mut state = self.lock_state();

        let tx = state
            .answer_tx
            .take()
            .ok_or_else(|| WorkflowError::validation("Run is not waiting for an answer"))?;
        state.pending = None;

        tx.send(answer)
            .map_err(|_| WorkflowError::cancelled("Waiting node is gone"))
    }

    /// Drops any wait state; a waiting node observes cancellation
    pub fn release(&self) {
        let mut state = self.lock_state();
        state.pending = None;
        state.answer_tx = None;
    }

    fn take_preset(&self, node_id: &str) -> Option<Value> {
        let mut state = self.lock_state();

        match &state.preset {
            Some((preset_node, _)) if preset_node == node_id => {
                state.preset.take().map(|(_, answer)| answer)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Interrupter for InterruptGate {
    async fn ask(&self, node_id: &str, question: Value) -> Result<Value, NodeError> {
        if let Some(answer) = self.take_preset(node_id) {
            info!(node_id = %node_id, "Using answer supplied on resume");
            return Ok(answer);
        }

        if !self.interactive {
            return Err(NodeError::execution(format!(
                "Node '{}' needs an answer but the run is not interactive",
                node_id
            )));
        }

        let _guard = self.wait_lock.lock().await;
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.lock_state();
            state.pending = Some(PendingQuestion {
                node_id: node_id.to_string(),
                question: question.clone(),
            });
            state.answer_tx = Some(tx);
        }

        self.sink
            .send(StreamChunk::Interrupt {
                node_id: node_id.to_string(),
                question,
            })
            .await
            .map_err(|_| NodeError::cancelled())?;

        info!(node_id = %node_id, "Run paused awaiting an answer");

        let answer = tokio::select! {
            answer = rx => answer.map_err(|_| NodeError::cancelled()),
            _ = self.cancel.wait() => Err(NodeError::cancelled()),
        };

        self.lock_state().pending = None;
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::domain::stream::mock::CollectingSink;

    async fn wait_for_pending(gate: &InterruptGate) -> PendingQuestion {
        for _ in 0..100 {
            if let Some(pending) = gate.pending() {
                return pending;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("gate never paused");
    }

    #[tokio::test]
    async fn test_answer_resumes_waiting_node() {
        let sink = Arc::new(CollectingSink::new());
        let gate = Arc::new(InterruptGate::interactive(sink.clone(), Signal::new()));

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.ask("question-answer::1", json!("City?")).await })
        };

        let pending = wait_for_pending(&gate).await;
        assert_eq!(pending.node_id, "question-answer::1");
        assert!(matches!(sink.chunks()[0], StreamChunk::Interrupt { .. }));

        gate.answer(json!("Porto")).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), json!("Porto"));
        assert!(gate.pending().is_none());
    }

    #[tokio::test]
    async fn test_cancel_releases_waiting_node() {
        let cancel = Signal::new();
        let gate = Arc::new(InterruptGate::interactive(
            Arc::new(CollectingSink::new()),
            cancel.clone(),
        ));

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.ask("question-answer::1", json!("City?")).await })
        };

        wait_for_pending(&gate).await;
        cancel.fire();
        gate.release();

        assert_eq!(waiter.await.unwrap().unwrap_err(), NodeError::cancelled());
        assert!(gate.answer(json!("late")).is_err());
    }

    #[tokio::test]
    async fn test_preset_answer_skips_waiting() {
        let gate = InterruptGate::detached(Arc::new(CollectingSink::new()), Signal::new())
            .with_preset_answer("question-answer::1", json!("Lisbon"));

        let answer = gate.ask("question-answer::1", json!("City?")).await.unwrap();
        assert_eq!(answer, json!("Lisbon"));

        let err = gate.ask("question-answer::1", json!("City?")).await.unwrap_err();
        assert!(err.message.contains("not interactive"));
    }
}
