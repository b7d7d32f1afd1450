//! Cooperative control handle for a running task.
//!
//! One handle per task, cloneable across threads. The executor checks it at
//! every suspension point: cancellation wins over everything, pause parks
//! the loop between steps without busy-waiting.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct TaskControl {
    cancel: CancellationToken,
    paused_tx: Arc<watch::Sender<bool>>,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskControl {
    pub fn new() -> Self {
        let (paused_tx, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused_tx: Arc::new(paused_tx),
        }
    }

    /// Requests a pause; takes effect at the next step boundary.
    pub fn pause(&self) {
        let _ = self.paused_tx.send_replace(true);
    }

    /// Releases a pause.
    pub fn resume(&self) {
        let _ = self.paused_tx.send_replace(false);
    }

    /// Requests cancellation; observed within one suspension point. A pause
    /// does not mask it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused_tx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Parks until resumed or cancelled. Returns true when resumed, false
    /// when cancelled.
    pub async fn wait_resumed(&self) -> bool {
        let mut rx = self.paused_tx.subscribe();
        loop {
            if self.is_cancelled() {
                return false;
            }
            if !*rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: pause parks wait_resumed until resume flips it; the
    /// return value distinguishes resume from stop.
    #[tokio::test]
    async fn pause_resume_and_stop() {
        let control = TaskControl::new();
        control.pause();
        assert!(control.is_paused());

        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.wait_resumed().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!handle.is_finished(), "still parked while paused");

        control.resume();
        assert!(handle.await.unwrap(), "resumed");

        let control = TaskControl::new();
        control.pause();
        let waiter = control.clone();
        let handle = tokio::spawn(async move { waiter.wait_resumed().await });
        control.stop();
        assert!(!handle.await.unwrap(), "cancelled while paused");
    }

    /// **Scenario**: an unpaused handle returns immediately.
    #[tokio::test]
    async fn unpaused_returns_immediately() {
        let control = TaskControl::new();
        assert!(control.wait_resumed().await);
    }
}
