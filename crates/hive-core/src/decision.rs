//! Decision & Evidence Log (C2, spec.md §3 `Attempt`, §4.2).

use crate::error::HiveError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
    Retried,
    Skipped,
}

/// Classification of how well an outcome was observed (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Confirmed,
    Observed,
    Assumed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub attempt_id: String,
    pub node_id: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input_snapshot: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<IndexMap<String, Value>>,
    pub status: AttemptStatus,
    pub evidence_type: EvidenceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HiveError>,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub tool_calls: Option<u32>,
    pub cost_estimate: Option<f64>,
}

/// Ordered, append-only record of Attempts for a single run.
///
/// Records are timestamped monotonically: `DecisionLog` is the sole writer
/// of its `Vec`, so ordering follows call order rather than wall-clock
/// comparisons.
#[derive(Debug, Clone, Default)]
pub struct DecisionLog {
    attempts: Vec<Attempt>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, attempt: Attempt) {
        self.attempts.push(attempt);
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<Attempt> {
        self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_attempt(node_id: &str, status: AttemptStatus) -> Attempt {
        let now = Utc::now();
        Attempt {
            attempt_id: "a1".into(),
            node_id: node_id.into(),
            run_id: "r1".into(),
            started_at: now,
            finished_at: now,
            input_snapshot: IndexMap::new(),
            output: None,
            status,
            evidence_type: EvidenceType::Observed,
            error: None,
            tokens_in: None,
            tokens_out: None,
            tool_calls: None,
            cost_estimate: None,
        }
    }

    #[test]
    fn append_preserves_call_order() {
        let mut log = DecisionLog::new();
        log.append(sample_attempt("a", AttemptStatus::Failed));
        log.append(sample_attempt("a", AttemptStatus::Success));
        let attempts = log.attempts();
        assert_eq!(attempts[0].status, AttemptStatus::Failed);
        assert_eq!(attempts[1].status, AttemptStatus::Success);
    }
}
