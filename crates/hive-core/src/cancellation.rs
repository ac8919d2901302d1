//! Per-run cancellation signal (spec.md §5 "Cancellation").
//!
//! One `RunCancellation` is created per triggered run and shared between its
//! `RunHandle` and the `GraphExecutor` task executing it: the same
//! `AtomicBool` + `Notify` shape `AgentRuntime`'s shutdown coordinator uses
//! (spec.md §4.8), scoped down to a single run instead of the whole process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct RunCancellation {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl RunCancellation {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called. Raced against an in-flight
    /// suspension via `tokio::select!` so cancellation during a tool call
    /// wins within one suspension quantum instead of waiting for the call
    /// to finish on its own.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for RunCancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_resolves_immediately_once_flagged() {
        let c = RunCancellation::new();
        assert!(!c.is_cancelled());
        c.cancel();
        assert!(c.is_cancelled());
        tokio::time::timeout(Duration::from_millis(50), c.cancelled())
            .await
            .expect("cancelled() must resolve once cancel() has been called");
    }

    #[tokio::test]
    async fn cancelled_wakes_a_pending_waiter() {
        let c = RunCancellation::new();
        let waiter = c.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        c.cancel();
        tokio::time::timeout(Duration::from_millis(50), handle)
            .await
            .expect("waiter must wake up after cancel()")
            .unwrap();
    }
}
