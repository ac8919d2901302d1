//! Failure Recorder (C3, spec.md §4.3): async, fingerprinted, deduplicated,
//! privacy-filtered failure store that never blocks the execution loop.

pub mod fingerprint;
pub mod privacy;
mod recorder;

pub use recorder::{FailureDescriptor, FailureRecorder, FailureRecorderHandle};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub os: String,
    pub runtime_version: String,
    pub arch: String,
    pub host: String,
}

impl Environment {
    /// Auto-captured at process scope (spec.md §3).
    pub fn capture() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            runtime_version: option_env!("CARGO_PKG_RUST_VERSION")
                .unwrap_or("unknown")
                .to_string(),
            arch: std::env::consts::ARCH.to_string(),
            host: hostname(),
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub fingerprint: String,
    pub goal_id: String,
    pub node_id: String,
    pub error_kind: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub occurrence_count: u64,
    pub environment: Environment,
    pub sanitized_input_snapshot: IndexMap<String, Value>,
    pub sanitized_memory_snapshot: IndexMap<String, Value>,
    pub sample_stack_trace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureStats {
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
