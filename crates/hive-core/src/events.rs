//! Event Bus & Streaming (C7, spec.md §4.7).
//!
//! Adapted from the teacher's `orca::events::ExecutionEvent` tagged-enum
//! shape, generalized to the run/node vocabulary of this engine and backed
//! by a real pub/sub fanout instead of a single logger, since the spec
//! requires actual subscribers with a configurable backpressure policy
//! rather than just a tracing sink.

use crate::config::EventDropPolicy;
use crate::decision::AttemptStatus;
use crate::error::HiveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HiveEvent {
    RunStarted { run_id: String, goal_id: String, entry_node: String, timestamp: DateTime<Utc> },
    NodeEntered { run_id: String, node_id: String, timestamp: DateTime<Utc> },
    NodeToken { run_id: String, node_id: String, token: String, timestamp: DateTime<Utc> },
    ToolCalled { run_id: String, node_id: String, tool_id: String, arguments: Value, timestamp: DateTime<Utc> },
    ToolReturned { run_id: String, node_id: String, tool_id: String, ok: bool, timestamp: DateTime<Utc> },
    NodeExited { run_id: String, node_id: String, status: AttemptStatus, timestamp: DateTime<Utc> },
    RunPaused { run_id: String, node_id: String, timestamp: DateTime<Utc> },
    RunResumed { run_id: String, node_id: String, timestamp: DateTime<Utc> },
    RunCancelled { run_id: String, node_id: String, timestamp: DateTime<Utc> },
    RunCompleted { run_id: String, path: Vec<String>, timestamp: DateTime<Utc> },
    RunFailed { run_id: String, error: HiveError, timestamp: DateTime<Utc> },
}

impl HiveEvent {
    pub fn run_id(&self) -> &str {
        match self {
            HiveEvent::RunStarted { run_id, .. }
            | HiveEvent::NodeEntered { run_id, .. }
            | HiveEvent::NodeToken { run_id, .. }
            | HiveEvent::ToolCalled { run_id, .. }
            | HiveEvent::ToolReturned { run_id, .. }
            | HiveEvent::NodeExited { run_id, .. }
            | HiveEvent::RunPaused { run_id, .. }
            | HiveEvent::RunResumed { run_id, .. }
            | HiveEvent::RunCancelled { run_id, .. }
            | HiveEvent::RunCompleted { run_id, .. }
            | HiveEvent::RunFailed { run_id, .. } => run_id,
        }
    }
}

/// Non-blocking in-process pub/sub. `publish` never awaits and never blocks
/// the caller on a slow subscriber (spec.md §4.7, §5).
///
/// `drop-oldest` is backed by a broadcast channel, whose built-in lag
/// behavior (overwrite the oldest unread slot) is exactly that policy.
/// `drop-newest` is backed by one bounded mpsc channel per subscriber with
/// `try_send`, so a full subscriber queue causes the just-published event to
/// be discarded instead.
enum Backend {
    Broadcast(broadcast::Sender<HiveEvent>),
    Fanout { subscribers: std::sync::Mutex<Vec<mpsc::Sender<HiveEvent>>>, capacity: usize },
}

pub struct EventBus {
    backend: Backend,
}

pub enum EventReceiver {
    Broadcast(broadcast::Receiver<HiveEvent>),
    Fanout(mpsc::Receiver<HiveEvent>),
}

impl EventReceiver {
    /// Returns `None` once the bus is dropped (or, for `drop-oldest`, after
    /// all pending lag has been skipped past and the sender is gone).
    pub async fn recv(&mut self) -> Option<HiveEvent> {
        match self {
            EventReceiver::Broadcast(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            EventReceiver::Fanout(rx) => rx.recv().await,
        }
    }
}

const DEFAULT_CAPACITY: usize = 1024;

impl EventBus {
    pub fn new(policy: EventDropPolicy) -> Self {
        Self::with_capacity(policy, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(policy: EventDropPolicy, capacity: usize) -> Self {
        let backend = match policy {
            EventDropPolicy::DropOldest => Backend::Broadcast(broadcast::channel(capacity).0),
            EventDropPolicy::DropNewest => Backend::Fanout { subscribers: std::sync::Mutex::new(Vec::new()), capacity },
        };
        Self { backend }
    }

    pub fn subscribe(&self) -> EventReceiver {
        match &self.backend {
            Backend::Broadcast(tx) => EventReceiver::Broadcast(tx.subscribe()),
            Backend::Fanout { subscribers, capacity } => {
                let (tx, rx) = mpsc::channel(*capacity);
                subscribers.lock().unwrap().push(tx);
                EventReceiver::Fanout(rx)
            }
        }
    }

    /// Publish an event. Never blocks and never errors back to the caller.
    pub fn publish(&self, event: HiveEvent) {
        match &self.backend {
            Backend::Broadcast(tx) => {
                // No subscribers yet is not an error: events are fire-and-forget.
                let _ = tx.send(event);
            }
            Backend::Fanout { subscribers, .. } => {
                let mut subs = subscribers.lock().unwrap();
                subs.retain(|tx| {
                    match tx.try_send(event.clone()) {
                        Ok(()) => true,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            trace!("subscriber queue full, dropping newest event");
                            true
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => false,
                    }
                });
            }
        }
    }
}
