use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Process-wide stop request, shared between the dispatcher and the server loop.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // Sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Trigger after `grace` on a detached task, leaving the caller free to respond.
    pub fn schedule(&self, grace: Duration) {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            info!(target: "dispatcher", "Shutdown grace period elapsed");
            signal.trigger();
        });
    }
}
