//! Health & Observability (C9, spec.md §4.9).
//!
//! Shape adapted from the teacher's `orca::health::{HealthStatus,
//! ComponentHealth, HealthReport, HealthChecker}`: component checks reduce
//! to one overall status by worst-of-all-checks, with liveness/readiness as
//! cheap derived views rather than separate code paths.

use crate::runtime::{AgentRuntime, RuntimeState};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory counters surfaced through the health status payload, mirroring
/// the teacher's `orchestrator::api::ws::metrics` pattern of exposing
/// internal counts through the health surface rather than a separate
/// metrics endpoint.
#[derive(Debug, Default)]
pub struct Metrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_paused: AtomicU64,
    retries_issued: AtomicU64,
}

impl Metrics {
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_paused(&self) {
        self.runs_paused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, failure_records_dropped: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_paused: self.runs_paused.load(Ordering::Relaxed),
            retries_issued: self.retries_issued.load(Ordering::Relaxed),
            failure_records_dropped,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_paused: u64,
    pub retries_issued: u64,
    pub failure_records_dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthStatus::Healthy, detail: None }
    }

    pub fn degraded(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthStatus::Degraded, detail: Some(detail.into()) }
    }

    pub fn unhealthy(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { name: name.into(), status: HealthStatus::Unhealthy, detail: Some(detail.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub state: RuntimeState,
    pub uptime_seconds: u64,
    pub active_run_count: u32,
    pub components: Vec<ComponentHealth>,
    pub metrics: MetricsSnapshot,
}

impl HealthReport {
    pub fn new(
        state: RuntimeState,
        uptime_seconds: u64,
        active_run_count: u32,
        components: Vec<ComponentHealth>,
        metrics: MetricsSnapshot,
    ) -> Self {
        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self { status, state, uptime_seconds, active_run_count, components, metrics }
    }
}

/// Drives both probe endpoints and the full status payload off a single
/// `AgentRuntime` and its `Storage` collaborator.
pub struct HealthChecker {
    runtime: Arc<AgentRuntime>,
    storage: Arc<dyn Storage>,
    llm_provider_initialized: bool,
}

impl HealthChecker {
    pub fn new(runtime: Arc<AgentRuntime>, storage: Arc<dyn Storage>, llm_provider_initialized: bool) -> Self {
        Self { runtime, storage, llm_provider_initialized }
    }

    /// Liveness: healthy unless the runtime is in the `error` sink state.
    pub fn is_alive(&self) -> bool {
        self.runtime.state() != RuntimeState::Error
    }

    /// Readiness: healthy only while accepting or running work.
    pub fn is_ready(&self) -> bool {
        matches!(self.runtime.state(), RuntimeState::Ready | RuntimeState::Running)
    }

    pub async fn full_report(&self) -> HealthReport {
        let mut components = Vec::new();

        match self.storage.read_failure_stats("__health_check__").await {
            Ok(_) => components.push(ComponentHealth::healthy("storage")),
            Err(e) => components.push(ComponentHealth::unhealthy("storage", e.to_string())),
        }

        // In-process pub/sub has no external dependency to probe; its only
        // failure mode (a poisoned lock) would already have panicked a caller.
        components.push(ComponentHealth::healthy("event_bus"));

        components.push(if self.llm_provider_initialized {
            ComponentHealth::healthy("llm_provider")
        } else {
            ComponentHealth::degraded("llm_provider", "no LLM provider configured")
        });

        HealthReport::new(
            self.runtime.state(),
            self.runtime.uptime().as_secs(),
            self.runtime.active_run_count(),
            components,
            self.runtime.metrics().snapshot(self.runtime.failure_records_dropped()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HiveConfig;
    use crate::function_registry::FunctionRegistry;
    use crate::llm::{BoxStream, CompletionRequest, CompletionResponse, LlmProviderError, StreamChunk, ToolDescription, ToolTurn};
    use crate::storage::NullStorage;
    use crate::tool::ToolExecutor;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use serde_json::Value;
    use std::time::Duration;

    struct UnusedLlm;
    #[async_trait]
    impl crate::llm::LLMProvider for UnusedLlm {
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmProviderError> {
            unreachable!()
        }
        async fn stream_complete(&self, _r: CompletionRequest) -> Result<BoxStream<Result<StreamChunk, LlmProviderError>>, LlmProviderError> {
            unreachable!()
        }
        async fn tool_complete(&self, _r: CompletionRequest, _t: Vec<ToolDescription>) -> Result<Vec<ToolTurn>, LlmProviderError> {
            unreachable!()
        }
    }

    struct UnusedTools;
    #[async_trait]
    impl ToolExecutor for UnusedTools {
        async fn execute(&self, _id: &str, _args: Value, _t: Duration) -> crate::tool::ToolOutcome {
            unreachable!()
        }
    }

    fn test_runtime() -> Arc<AgentRuntime> {
        Arc::new(AgentRuntime::new(
            HiveConfig::default(),
            Arc::new(NullStorage),
            Arc::new(UnusedLlm),
            Arc::new(UnusedTools),
            Arc::new(FunctionRegistry::new()),
        ))
    }

    #[tokio::test]
    async fn healthy_runtime_reports_ready_and_overall_healthy() {
        let runtime = test_runtime();
        let checker = HealthChecker::new(runtime, Arc::new(NullStorage), true);
        assert!(checker.is_alive());
        assert!(checker.is_ready());
        let report = checker.full_report().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.state, RuntimeState::Ready);
    }

    #[tokio::test]
    async fn error_state_is_not_alive_and_not_ready() {
        let runtime = test_runtime();
        runtime.mark_error("simulated failure");
        let checker = HealthChecker::new(runtime, Arc::new(NullStorage), true);
        assert!(!checker.is_alive());
        assert!(!checker.is_ready());
    }

    #[tokio::test]
    async fn missing_llm_provider_degrades_overall_status() {
        let runtime = test_runtime();
        let checker = HealthChecker::new(runtime, Arc::new(NullStorage), false);
        let report = checker.full_report().await;
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn metrics_snapshot_reflects_recorded_counts() {
        let metrics = Metrics::default();
        metrics.record_run_started();
        metrics.record_run_started();
        metrics.record_run_completed();
        metrics.record_run_failed();
        metrics.record_retry();
        metrics.record_retry();
        metrics.record_retry();

        let snapshot = metrics.snapshot(7);
        assert_eq!(snapshot.runs_started, 2);
        assert_eq!(snapshot.runs_completed, 1);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.runs_paused, 0);
        assert_eq!(snapshot.retries_issued, 3);
        assert_eq!(snapshot.failure_records_dropped, 7);
    }

    #[tokio::test]
    async fn full_report_counts_a_completed_run() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("noop", |_input| async move { Ok(IndexMap::new()) });
        let runtime = Arc::new(AgentRuntime::new(
            HiveConfig::default(),
            Arc::new(NullStorage),
            Arc::new(UnusedLlm),
            Arc::new(UnusedTools),
            Arc::new(registry),
        ));
        let node = crate::graph::NodeSpec {
            id: "n".into(),
            name: "n".into(),
            description: String::new(),
            kind: crate::graph::NodeKind::Function,
            input_keys: vec![],
            output_keys: vec![],
            system_prompt: None,
            tools: std::collections::HashSet::new(),
            function: Some("noop".into()),
            max_retries: Some(0),
            streaming_enabled: false,
            max_tokens: None,
            temperature: None,
            model: None,
            tool_timeout_seconds: None,
            is_entry: true,
            is_terminal: true,
            is_pause: false,
            forbidden_tokens: vec![],
        };
        let graph = Arc::new(crate::graph::GraphSpec {
            id: "g".into(),
            goal_id: "goal".into(),
            version: "1".into(),
            entry_node: node.id.clone(),
            entry_points: Default::default(),
            terminal_nodes: [node.id.clone()].into_iter().collect(),
            pause_nodes: Default::default(),
            nodes: vec![node],
            edges: vec![],
            default_model: None,
            max_tokens: None,
            max_retries_per_node: 3,
            default_tool_timeout_seconds: None,
        });
        runtime.register_entry_point("main", graph, None);
        let handle = runtime.trigger("main", IndexMap::new()).unwrap();
        handle.wait(Some(Duration::from_secs(5))).await.unwrap();

        let checker = HealthChecker::new(runtime, Arc::new(NullStorage), true);
        let report = checker.full_report().await;
        assert_eq!(report.metrics.runs_started, 1);
        assert_eq!(report.metrics.runs_completed, 1);
    }
}
