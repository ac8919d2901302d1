//! `Storage` collaborator (spec.md §6) and a filesystem-backed reference
//! implementation matching the bit-specified persisted state layout:
//!
//! ```text
//! agents/{agent_id}/
//!   runtime_logs/sessions/{session_id}/logs/
//!     summary.json
//!     details.jsonl
//!     tool_logs.jsonl
//!   failures/
//!     stats_{goal_id}.json
//!     failures_{goal_id}.jsonl
//! ```

use crate::decision::Attempt;
use crate::error::{ErrorKind, HiveError, Result};
use crate::failure::{FailureRecord, FailureStats};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Run-level result minus the full decision list, written once at run end.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub success: bool,
    pub path: Vec<String>,
    pub terminal_node_id: Option<String>,
    pub paused_at: Option<String>,
    pub error: Option<HiveError>,
}

/// One tool invocation, logged independently of the owning Attempt so
/// tool-level detail survives even if the node-level Attempt record is
/// still buffered (spec.md §6 `tool_logs.jsonl`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolLogEntry {
    pub run_id: String,
    pub node_id: String,
    pub tool_id: String,
    pub arguments: serde_json::Value,
    pub ok: bool,
    pub duration_ms: u64,
}

/// Append-only write of decision logs and failure logs; read-by-goal for
/// replay (spec.md §6 `Storage` collaborator table).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn append_detail(&self, agent_id: &str, session_id: &str, attempt: &Attempt) -> Result<()>;
    async fn append_tool_log(&self, agent_id: &str, session_id: &str, entry: &ToolLogEntry) -> Result<()>;
    async fn write_summary(&self, agent_id: &str, session_id: &str, summary: &RunSummary) -> Result<()>;

    async fn append_failure_record(&self, goal_id: &str, record: &FailureRecord) -> Result<()>;
    async fn write_failure_stats(&self, goal_id: &str, stats: &HashMap<String, FailureStats>) -> Result<()>;
    async fn read_failure_stats(&self, goal_id: &str) -> Result<HashMap<String, FailureStats>>;

    /// Read every recorded Attempt for a session, in append order, for replay.
    async fn read_details(&self, agent_id: &str, session_id: &str) -> Result<Vec<Attempt>>;
}

/// Filesystem-backed `Storage`. One exclusive append writer per goal for the
/// failure log (spec.md §5 "Shared resources"); readers may open
/// concurrently.
pub struct FsStorage {
    base_path: PathBuf,
    failure_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FsStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            failure_locks: Mutex::new(HashMap::new()),
        }
    }

    fn session_dir(&self, agent_id: &str, session_id: &str) -> PathBuf {
        self.base_path
            .join("agents")
            .join(agent_id)
            .join("runtime_logs/sessions")
            .join(session_id)
            .join("logs")
    }

    fn failures_dir(&self) -> PathBuf {
        self.base_path.join("failures")
    }

    async fn lock_for_goal(&self, goal_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.failure_locks.lock().await;
        locks
            .entry(goal_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn append_jsonl(path: &Path, line: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(storage_err)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(storage_err)?;
        file.write_all(line.as_bytes()).await.map_err(storage_err)?;
        file.write_all(b"\n").await.map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(e: impl std::fmt::Display) -> HiveError {
    HiveError::new(ErrorKind::StorageUnavailable, e.to_string())
}

#[async_trait]
impl Storage for FsStorage {
    async fn append_detail(&self, agent_id: &str, session_id: &str, attempt: &Attempt) -> Result<()> {
        let path = self.session_dir(agent_id, session_id).join("details.jsonl");
        let line = serde_json::to_string(attempt).map_err(storage_err)?;
        Self::append_jsonl(&path, &line).await
    }

    async fn append_tool_log(&self, agent_id: &str, session_id: &str, entry: &ToolLogEntry) -> Result<()> {
        let path = self.session_dir(agent_id, session_id).join("tool_logs.jsonl");
        let line = serde_json::to_string(entry).map_err(storage_err)?;
        Self::append_jsonl(&path, &line).await
    }

    async fn write_summary(&self, agent_id: &str, session_id: &str, summary: &RunSummary) -> Result<()> {
        let path = self.session_dir(agent_id, session_id).join("summary.json");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }
        let body = serde_json::to_vec_pretty(summary).map_err(storage_err)?;
        tokio::fs::write(&path, body).await.map_err(storage_err)
    }

    async fn append_failure_record(&self, goal_id: &str, record: &FailureRecord) -> Result<()> {
        let lock = self.lock_for_goal(goal_id).await;
        let _guard = lock.lock().await;
        let path = self.failures_dir().join(format!("failures_{goal_id}.jsonl"));
        let line = serde_json::to_string(record).map_err(storage_err)?;
        Self::append_jsonl(&path, &line).await
    }

    async fn write_failure_stats(&self, goal_id: &str, stats: &HashMap<String, FailureStats>) -> Result<()> {
        let lock = self.lock_for_goal(goal_id).await;
        let _guard = lock.lock().await;
        let path = self.failures_dir().join(format!("stats_{goal_id}.json"));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
        }
        let body = serde_json::to_vec_pretty(stats).map_err(storage_err)?;
        tokio::fs::write(&path, body).await.map_err(storage_err)
    }

    async fn read_failure_stats(&self, goal_id: &str) -> Result<HashMap<String, FailureStats>> {
        let path = self.failures_dir().join(format!("stats_{goal_id}.json"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(storage_err),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn read_details(&self, agent_id: &str, session_id: &str) -> Result<Vec<Attempt>> {
        let path = self.session_dir(agent_id, session_id).join("details.jsonl");
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(e)),
        };
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(storage_err))
            .collect()
    }
}

/// Discards everything. Useful for tests and for runtimes that opt out of
/// durable logging entirely (spec.md §9 treats persistence as pluggable).
pub struct NullStorage;

#[async_trait]
impl Storage for NullStorage {
    async fn append_detail(&self, _agent_id: &str, _session_id: &str, _attempt: &Attempt) -> Result<()> {
        Ok(())
    }

    async fn append_tool_log(&self, _agent_id: &str, _session_id: &str, _entry: &ToolLogEntry) -> Result<()> {
        Ok(())
    }

    async fn write_summary(&self, _agent_id: &str, _session_id: &str, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }

    async fn append_failure_record(&self, _goal_id: &str, _record: &FailureRecord) -> Result<()> {
        Ok(())
    }

    async fn write_failure_stats(&self, _goal_id: &str, _stats: &HashMap<String, FailureStats>) -> Result<()> {
        Ok(())
    }

    async fn read_failure_stats(&self, _goal_id: &str) -> Result<HashMap<String, FailureStats>> {
        Ok(HashMap::new())
    }

    async fn read_details(&self, _agent_id: &str, _session_id: &str) -> Result<Vec<Attempt>> {
        Ok(Vec::new())
    }
}
