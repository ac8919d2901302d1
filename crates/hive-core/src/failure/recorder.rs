//! Non-blocking ingestion path for C3 (spec.md §4.3).
//!
//! The executor hands a `FailureDescriptor` to an unbounded channel and
//! moves on; a single dedicated writer task consumes it, fingerprints it,
//! merges stats, masks it, and appends it to durable storage. This keeps
//! filesystem appends off the execution loop's hot path (spec.md §9).

use super::{fingerprint::fingerprint, privacy::sanitize, Environment, FailureRecord, FailureStats};
use crate::storage::Storage;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Everything the writer needs to turn one node failure into a masked,
/// deduplicated `FailureRecord`.
#[derive(Debug, Clone)]
pub struct FailureDescriptor {
    pub goal_id: String,
    pub node_id: String,
    pub error_kind: String,
    pub message: String,
    pub stack: Option<String>,
    pub input_snapshot: IndexMap<String, Value>,
    pub memory_snapshot: IndexMap<String, Value>,
}

/// Cheap, cloneable producer handle given to the executor.
#[derive(Clone)]
pub struct FailureRecorderHandle {
    sender: mpsc::UnboundedSender<FailureDescriptor>,
    dropped: Arc<std::sync::atomic::AtomicU64>,
}

impl FailureRecorderHandle {
    /// Enqueue a failure. Never blocks; never returns an error into the
    /// execution loop (spec.md §4.3 "Failure modes of C3 itself").
    pub fn record(&self, descriptor: FailureDescriptor) {
        if self.sender.send(descriptor).is_err() {
            // Writer task is gone (e.g. during shutdown); count it and move on.
            self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            warn!("failure recorder channel closed, dropping failure record");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Owns the writer task's join handle and the shared "dropped" counter.
pub struct FailureRecorder {
    handle: FailureRecorderHandle,
    join: tokio::task::JoinHandle<()>,
}

impl FailureRecorder {
    /// Spawn the single writer task (spec.md §4.3: "single, to enforce file
    /// append ordering").
    pub fn spawn(storage: Arc<dyn Storage>, cap_per_fingerprint: usize, sensitive_key_patterns: Vec<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dropped = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let join = tokio::spawn(writer_loop(rx, storage, cap_per_fingerprint, sensitive_key_patterns, dropped.clone()));
        Self {
            handle: FailureRecorderHandle { sender: tx, dropped },
            join,
        }
    }

    pub fn handle(&self) -> FailureRecorderHandle {
        self.handle.clone()
    }

    /// Stop accepting new work and wait for the writer to drain its queue.
    pub async fn shutdown(self) {
        drop(self.handle.sender);
        let _ = self.join.await;
    }
}

async fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<FailureDescriptor>,
    storage: Arc<dyn Storage>,
    cap_per_fingerprint: usize,
    sensitive_key_patterns: Vec<String>,
    dropped: Arc<std::sync::atomic::AtomicU64>,
) {
    // Per-goal in-memory stats, refreshed from storage lazily on first sight
    // of a goal so restarts don't reset counts to zero.
    let mut stats_by_goal: HashMap<String, HashMap<String, FailureStats>> = HashMap::new();

    while let Some(descriptor) = rx.recv().await {
        if let Err(e) = process_one(&descriptor, &storage, cap_per_fingerprint, &sensitive_key_patterns, &mut stats_by_goal).await {
            error!(error = %e, "failed to persist failure record after backoff, dropping");
            dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

async fn process_one(
    descriptor: &FailureDescriptor,
    storage: &Arc<dyn Storage>,
    cap_per_fingerprint: usize,
    sensitive_key_patterns: &[String],
    stats_by_goal: &mut HashMap<String, HashMap<String, FailureStats>>,
) -> crate::error::Result<()> {
    let fp = fingerprint(&descriptor.node_id, &descriptor.error_kind, &descriptor.message);

    if !stats_by_goal.contains_key(&descriptor.goal_id) {
        let loaded = with_backoff(|| {
            let storage = storage.clone();
            let goal_id = descriptor.goal_id.clone();
            async move { storage.read_failure_stats(&goal_id).await }
        })
        .await?;
        stats_by_goal.insert(descriptor.goal_id.clone(), loaded);
    }
    let goal_stats = stats_by_goal.entry(descriptor.goal_id.clone()).or_default();

    let now = Utc::now();
    let entry = goal_stats.entry(fp.clone()).or_insert_with(|| FailureStats {
        count: 0,
        first_seen: now,
        last_seen: now,
    });
    entry.count += 1;
    entry.last_seen = now;
    let occurrence_count = entry.count;
    let first_seen = entry.first_seen;

    with_backoff(|| {
        let storage = storage.clone();
        let goal_id = descriptor.goal_id.clone();
        let snapshot = goal_stats.clone();
        async move { storage.write_failure_stats(&goal_id, &snapshot).await }
    })
    .await?;

    // Only the first K occurrences per fingerprint get a full record
    // (spec.md §4.3 "Deduplication strategy (log capping)").
    if occurrence_count <= cap_per_fingerprint as u64 {
        let record = FailureRecord {
            fingerprint: fp,
            goal_id: descriptor.goal_id.clone(),
            node_id: descriptor.node_id.clone(),
            error_kind: descriptor.error_kind.clone(),
            first_seen_at: first_seen,
            last_seen_at: now,
            occurrence_count,
            environment: Environment::capture(),
            sanitized_input_snapshot: sanitize_map(&descriptor.input_snapshot, sensitive_key_patterns),
            sanitized_memory_snapshot: sanitize_map(&descriptor.memory_snapshot, sensitive_key_patterns),
            sample_stack_trace: descriptor.stack.clone(),
        };

        with_backoff(|| {
            let storage = storage.clone();
            let goal_id = descriptor.goal_id.clone();
            let record = record.clone();
            async move { storage.append_failure_record(&goal_id, &record).await }
        })
        .await?;
    } else {
        debug!(fingerprint = %fp, occurrence_count, "failure cap reached, counter-only update");
    }

    Ok(())
}

fn sanitize_map(map: &IndexMap<String, Value>, patterns: &[String]) -> IndexMap<String, Value> {
    let value = Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    let sanitized = sanitize(&value, patterns);
    match sanitized {
        Value::Object(obj) => obj.into_iter().collect(),
        _ => IndexMap::new(),
    }
}

/// Exponential-backoff retry around a storage write; exhausting retries
/// drops the record rather than ever propagating into the execution loop
/// (spec.md §4.3 "Failure modes of C3 itself").
async fn with_backoff<F, Fut>(mut f: F) -> crate::error::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<()>>,
{
    const ATTEMPTS: u32 = 4;
    let mut delay = Duration::from_millis(100);
    let mut last_err = None;
    for attempt in 0..ATTEMPTS {
        match f().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, error = %e, "failure-log write failed, backing off");
                last_err = Some(e);
                if attempt + 1 < ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}
