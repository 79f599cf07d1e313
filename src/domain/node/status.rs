//! Broadcast-once signals and per-node progression

use std::sync::Arc;

use tokio::sync::watch;

/// One-shot broadcast flag; any number of tasks may wait on it
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the signal; returns `false` if it had already fired
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|set| {
            if *set {
                false
            } else {
                *set = true;
                true
            }
        })
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Suspends until the signal fires
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(|set| *set).await;
    }
}

/// Progression signals of a node within one run
#[derive(Debug, Clone, Default)]
pub struct NodeRunningStatus {
    pub start_with_thread: Signal,
    pub pre_processing: Signal,
    pub processing: Signal,
    pub complete: Signal,
    pub not_run: Signal,
}

impl NodeRunningStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the node as pruned; completion fires last
    pub fn mark_not_run(&self) {
        self.not_run.fire();
        self.start_with_thread.fire();
        self.pre_processing.fire();
        self.processing.fire();
        self.complete.fire();
    }

    pub fn is_complete(&self) -> bool {
        self.complete.is_set()
    }

    /// `complete ∧ not_run`
    pub fn was_pruned(&self) -> bool {
        self.complete.is_set() && self.not_run.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_fires_once() {
        let signal = Signal::new();
        assert!(!signal.is_set());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn test_signal_wakes_all_waiters() {
        let signal = Signal::new();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let signal = Signal::new();
        signal.fire();

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_mark_not_run() {
        let status = NodeRunningStatus::new();
        assert!(!status.was_pruned());

        status.mark_not_run();
        assert!(status.was_pruned());
        assert!(status.processing.is_set());
    }
}
