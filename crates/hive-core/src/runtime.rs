//! Agent Runtime & Lifecycle (C8, spec.md §4.8).
//!
//! State machine and shutdown coordination are adapted from the teacher's
//! `orca::shutdown::ShutdownCoordinator` (`AtomicBool` + `tokio::sync::Notify`,
//! no signal handling baked into the core — that stays at the embedding
//! binary's edge per spec.md §9).

use crate::cancellation::RunCancellation;
use crate::config::HiveConfig;
use crate::error::{ErrorKind, HiveError, Result};
use crate::events::EventBus;
use crate::executor::{ExecutionResult, GraphExecutor};
use crate::failure::FailureRecorder;
use crate::function_registry::FunctionRegistry;
use crate::graph::GraphSpec;
use crate::health::Metrics;
use crate::llm::LLMProvider;
use crate::storage::Storage;
use crate::tool::ToolExecutor;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Initializing,
    Ready,
    Running,
    Paused,
    Draining,
    Stopped,
    Error,
}

impl RuntimeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initializing,
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Paused,
            4 => Self::Draining,
            5 => Self::Stopped,
            _ => Self::Error,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Handle to an in-flight or completed run, returned by `AgentRuntime::trigger`.
pub struct RunHandle {
    pub run_id: String,
    join: JoinHandle<ExecutionResult>,
    cancellation: RunCancellation,
}

impl RunHandle {
    /// Await the run to completion, or time out without cancelling it.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<ExecutionResult> {
        let fut = self.join;
        let result = match timeout {
            Some(t) => tokio::time::timeout(t, fut).await.map_err(|_| {
                HiveError::new(ErrorKind::RunCancelled, "wait timed out before the run finished")
            })?,
            None => fut.await,
        };
        result.map_err(|e| HiveError::new(ErrorKind::RunCancelled, format!("run task panicked: {e}")))
    }

    /// Cancel this run (spec.md §6 `cancel(run_handle)`). Signals the
    /// executor's cooperative loop, which aborts whatever suspension is in
    /// flight and records `run.cancelled` within one suspension quantum
    /// (spec.md §5, §8) before returning — so unlike a raw task abort, the
    /// resulting `ExecutionResult` is always available to the caller.
    pub async fn cancel(self) -> Result<ExecutionResult> {
        self.cancellation.cancel();
        self.join
            .await
            .map_err(|e| HiveError::new(ErrorKind::RunCancelled, format!("run task panicked: {e}")))
    }
}

struct EntryPointTarget {
    graph: Arc<GraphSpec>,
    entry_point: Option<String>,
}

/// Everything needed to re-enter the graph where a run left off, kept so
/// `AgentRuntime::resume` can seed the executor without re-running anything
/// (spec.md §6 `resume(run_handle, payload?)`).
struct PausedRun {
    graph: Arc<GraphSpec>,
    entry_point: Option<String>,
    paused_at: String,
    memory: IndexMap<String, Value>,
    path: Vec<String>,
}

/// Hosts compiled graphs, accepts triggers, and owns the lifecycle state
/// machine described in spec.md §4.8.
pub struct AgentRuntime {
    config: HiveConfig,
    state: Arc<AtomicU8>,
    active_runs: Arc<AtomicU32>,
    shutdown_notify: Arc<Notify>,
    draining_notify: Arc<Notify>,
    entry_points: std::sync::Mutex<HashMap<String, EntryPointTarget>>,
    event_bus: Arc<EventBus>,
    storage: Arc<dyn Storage>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<dyn ToolExecutor>,
    functions: Arc<FunctionRegistry>,
    failure_recorder: std::sync::Mutex<Option<FailureRecorder>>,
    metrics: Arc<Metrics>,
    paused_runs: Arc<std::sync::Mutex<HashMap<String, PausedRun>>>,
    started_at: Instant,
}

impl AgentRuntime {
    pub fn new(
        config: HiveConfig,
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LLMProvider>,
        tools: Arc<dyn ToolExecutor>,
        functions: Arc<FunctionRegistry>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_subscriber_drop_policy));
        let failure_recorder = FailureRecorder::spawn(
            storage.clone(),
            config.failure_log_cap_per_fingerprint,
            config.sensitive_key_patterns.clone(),
        );
        let runtime = Self {
            config,
            state: Arc::new(AtomicU8::new(RuntimeState::Initializing.as_u8())),
            active_runs: Arc::new(AtomicU32::new(0)),
            shutdown_notify: Arc::new(Notify::new()),
            draining_notify: Arc::new(Notify::new()),
            entry_points: std::sync::Mutex::new(HashMap::new()),
            event_bus,
            storage,
            llm,
            tools,
            functions,
            failure_recorder: std::sync::Mutex::new(Some(failure_recorder)),
            metrics: Arc::new(Metrics::default()),
            paused_runs: Arc::new(std::sync::Mutex::new(HashMap::new())),
            started_at: Instant::now(),
        };
        runtime.transition(RuntimeState::Ready);
        runtime
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn active_run_count(&self) -> u32 {
        self.active_runs.load(Ordering::SeqCst)
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn failure_records_dropped(&self) -> u64 {
        self.failure_recorder
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.handle().dropped_count())
            .unwrap_or_default()
    }

    fn transition(&self, to: RuntimeState) {
        let from = self.state();
        self.state.store(to.as_u8(), Ordering::SeqCst);
        debug!(?from, ?to, "runtime state transition");
    }

    /// Register a named entry point: an external trigger alias mapped to a
    /// graph and, optionally, a specific entry point within it.
    pub fn register_entry_point(&self, name: impl Into<String>, graph: Arc<GraphSpec>, entry_point: Option<String>) {
        self.entry_points.lock().unwrap().insert(name.into(), EntryPointTarget { graph, entry_point });
    }

    /// Transition into `paused`: no new runs are accepted until `resume_accepting_runs`.
    pub fn pause(&self) {
        if matches!(self.state(), RuntimeState::Ready | RuntimeState::Running) {
            self.transition(RuntimeState::Paused);
        }
    }

    pub fn resume_accepting_runs(&self) {
        if self.state() == RuntimeState::Paused {
            self.transition(if self.active_run_count() > 0 { RuntimeState::Running } else { RuntimeState::Ready });
        }
    }

    pub fn mark_error(&self, reason: &str) {
        warn!(reason, "runtime entering error state");
        self.transition(RuntimeState::Error);
    }

    /// Start a run against the named entry point. Spawns one task per run
    /// (spec.md §5 "one run = one logical task").
    pub fn trigger(&self, entry_point: &str, payload: IndexMap<String, Value>) -> Result<RunHandle> {
        match self.state() {
            RuntimeState::Ready | RuntimeState::Running => {}
            other => {
                return Err(HiveError::new(
                    ErrorKind::RunCancelled,
                    format!("runtime does not accept new runs in state {other:?}"),
                ));
            }
        }

        let target = {
            let guard = self.entry_points.lock().unwrap();
            let target = guard
                .get(entry_point)
                .ok_or_else(|| HiveError::new(ErrorKind::GraphInvalid, format!("unknown entry point `{entry_point}`")))?;
            (target.graph.clone(), target.entry_point.clone())
        };
        let (graph, graph_entry_point) = target;

        let run_id = Uuid::new_v4().to_string();
        self.transition(RuntimeState::Running);
        self.active_runs.fetch_add(1, Ordering::SeqCst);
        self.metrics.record_run_started();

        let failure_handle = {
            let guard = self.failure_recorder.lock().unwrap();
            guard.as_ref().expect("runtime is shut down").handle()
        };
        let executor = GraphExecutor::new(
            self.config.clone(),
            self.storage.clone(),
            self.llm.clone(),
            self.tools.clone(),
            self.functions.clone(),
            self.event_bus.clone(),
            failure_handle,
            self.metrics.clone(),
        );

        let cancellation = RunCancellation::new();
        let task_cancellation = cancellation.clone();
        let active_runs = self.active_runs.clone();
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let paused_runs = self.paused_runs.clone();
        let task_graph = graph.clone();
        let run_id_for_task = run_id.clone();
        let join = tokio::spawn(async move {
            let result = executor.run(&task_graph, graph_entry_point.as_deref(), run_id_for_task, payload, &task_cancellation).await;
            Self::finish_run(&result, &metrics, &active_runs, &state, &paused_runs, &task_graph, &graph_entry_point);
            result
        });

        Ok(RunHandle { run_id, join, cancellation })
    }

    /// Re-enter a previously paused run (spec.md §6 `resume(run_handle,
    /// payload?)`), seeding shared memory from the snapshot taken at pause
    /// time and overlaying `payload` on top of it.
    pub fn resume(&self, run_id: &str, payload: IndexMap<String, Value>) -> Result<RunHandle> {
        match self.state() {
            RuntimeState::Ready | RuntimeState::Running => {}
            other => {
                return Err(HiveError::new(
                    ErrorKind::RunCancelled,
                    format!("runtime does not accept resumed runs in state {other:?}"),
                ));
            }
        }

        let paused = self
            .paused_runs
            .lock()
            .unwrap()
            .remove(run_id)
            .ok_or_else(|| HiveError::new(ErrorKind::RunPaused, format!("no paused run `{run_id}` to resume")))?;

        self.transition(RuntimeState::Running);
        self.active_runs.fetch_add(1, Ordering::SeqCst);

        let failure_handle = {
            let guard = self.failure_recorder.lock().unwrap();
            guard.as_ref().expect("runtime is shut down").handle()
        };
        let executor = GraphExecutor::new(
            self.config.clone(),
            self.storage.clone(),
            self.llm.clone(),
            self.tools.clone(),
            self.functions.clone(),
            self.event_bus.clone(),
            failure_handle,
            self.metrics.clone(),
        );

        let cancellation = RunCancellation::new();
        let task_cancellation = cancellation.clone();
        let active_runs = self.active_runs.clone();
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let paused_runs = self.paused_runs.clone();
        let task_graph = paused.graph.clone();
        let task_entry_point = paused.entry_point.clone();
        let run_id_for_task = run_id.to_string();
        let join = tokio::spawn(async move {
            let result = executor
                .resume(&task_graph, run_id_for_task, paused.paused_at, paused.memory, payload, paused.path, &task_cancellation)
                .await;
            Self::finish_run(&result, &metrics, &active_runs, &state, &paused_runs, &task_graph, &task_entry_point);
            result
        });

        Ok(RunHandle { run_id: run_id.to_string(), join, cancellation })
    }

    fn finish_run(
        result: &ExecutionResult,
        metrics: &Arc<Metrics>,
        active_runs: &Arc<AtomicU32>,
        state: &Arc<AtomicU8>,
        paused_runs: &std::sync::Mutex<HashMap<String, PausedRun>>,
        graph: &Arc<GraphSpec>,
        entry_point: &Option<String>,
    ) {
        if result.paused {
            metrics.record_run_paused();
            paused_runs.lock().unwrap().insert(
                result.run_id.clone(),
                PausedRun {
                    graph: graph.clone(),
                    entry_point: entry_point.clone(),
                    paused_at: result.paused_at.clone().expect("paused result always carries paused_at"),
                    memory: result.paused_memory.clone().expect("paused result always carries a memory snapshot"),
                    path: result.path.clone(),
                },
            );
        } else if result.success {
            metrics.record_run_completed();
        } else {
            metrics.record_run_failed();
        }
        if active_runs.fetch_sub(1, Ordering::SeqCst) == 1 {
            let current = RuntimeState::from_u8(state.load(Ordering::SeqCst));
            if current == RuntimeState::Running {
                state.store(RuntimeState::Ready.as_u8(), Ordering::SeqCst);
            }
        }
    }

    /// Begin graceful shutdown: stop accepting new runs, let in-flight runs
    /// finish for up to `drain_timeout_seconds`, then force-stop.
    pub async fn shutdown(&self) {
        if self.state() == RuntimeState::Stopped {
            return;
        }
        info!("runtime draining");
        self.transition(RuntimeState::Draining);
        self.shutdown_notify.notify_waiters();

        let deadline = Duration::from_secs(self.config.drain_timeout_seconds);
        let waited = tokio::time::timeout(deadline, self.wait_for_drain()).await;
        if waited.is_err() {
            warn!(active = self.active_run_count(), "drain timeout elapsed with runs still in flight");
        }

        let recorder = self.failure_recorder.lock().unwrap().take();
        if let Some(recorder) = recorder {
            recorder.shutdown().await;
        }

        self.transition(RuntimeState::Stopped);
        self.draining_notify.notify_waiters();
    }

    async fn wait_for_drain(&self) {
        while self.active_run_count() > 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Resolves once shutdown has been requested (draining or stopped).
    pub async fn wait_for_shutdown_signal(&self) {
        self.shutdown_notify.notified().await;
    }

    pub async fn wait_for_stopped(&self) {
        if self.state() != RuntimeState::Stopped {
            self.draining_notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, NodeSpec};
    use crate::llm::{BoxStream, CompletionRequest, CompletionResponse, LlmProviderError, StreamChunk, ToolDescription, ToolTurn};
    use crate::tool::ToolOutcome;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration as StdDuration;

    struct UnusedLlm;
    #[async_trait]
    impl LLMProvider for UnusedLlm {
        async fn complete(&self, _r: CompletionRequest) -> std::result::Result<CompletionResponse, LlmProviderError> {
            unreachable!()
        }
        async fn stream_complete(
            &self,
            _r: CompletionRequest,
        ) -> std::result::Result<BoxStream<std::result::Result<StreamChunk, LlmProviderError>>, LlmProviderError> {
            unreachable!()
        }
        async fn tool_complete(
            &self,
            _r: CompletionRequest,
            _t: Vec<ToolDescription>,
        ) -> std::result::Result<Vec<ToolTurn>, LlmProviderError> {
            unreachable!()
        }
    }

    struct UnusedTools;
    #[async_trait]
    impl ToolExecutor for UnusedTools {
        async fn execute(&self, _id: &str, _args: Value, _t: StdDuration) -> ToolOutcome {
            unreachable!()
        }
    }

    fn function_node(id: &str, is_entry: bool, is_terminal: bool) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            kind: NodeKind::Function,
            input_keys: vec![],
            output_keys: vec!["doubled".to_string()],
            system_prompt: None,
            tools: HashSet::new(),
            function: Some("double".to_string()),
            max_retries: Some(0),
            streaming_enabled: false,
            max_tokens: None,
            temperature: None,
            model: None,
            tool_timeout_seconds: None,
            is_entry,
            is_terminal,
            is_pause: false,
            forbidden_tokens: vec![],
        }
    }

    fn test_runtime() -> (AgentRuntime, Arc<GraphSpec>) {
        let node = function_node("double_it", true, true);
        let graph = Arc::new(GraphSpec {
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

        let mut registry = FunctionRegistry::new();
        registry.register_fn("double", |input| async move {
            let x = input.get("x").and_then(Value::as_i64).unwrap_or(0);
            Ok(IndexMap::from([("doubled".to_string(), serde_json::json!(x * 2))]))
        });

        let storage: Arc<dyn Storage> = Arc::new(crate::storage::NullStorage);
        let runtime = AgentRuntime::new(
            HiveConfig::default(),
            storage,
            Arc::new(UnusedLlm),
            Arc::new(UnusedTools),
            Arc::new(registry),
        );
        runtime.register_entry_point("main", graph.clone(), None);
        (runtime, graph)
    }

    #[tokio::test]
    async fn starts_in_ready_state() {
        let (runtime, _graph) = test_runtime();
        assert_eq!(runtime.state(), RuntimeState::Ready);
    }

    #[tokio::test]
    async fn trigger_runs_graph_to_completion() {
        let (runtime, _graph) = test_runtime();
        let handle = runtime
            .trigger("main", IndexMap::from([("x".to_string(), Value::from(21))]))
            .unwrap();
        let result = handle.wait(Some(StdDuration::from_secs(5))).await.unwrap();
        assert!(result.success);
        assert_eq!(runtime.active_run_count(), 0);
    }

    #[tokio::test]
    async fn paused_runtime_rejects_new_triggers() {
        let (runtime, _graph) = test_runtime();
        runtime.pause();
        let err = runtime.trigger("main", IndexMap::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RunCancelled);
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_runs_then_stops() {
        let (runtime, _graph) = test_runtime();
        let handle = runtime
            .trigger("main", IndexMap::from([("x".to_string(), Value::from(1))]))
            .unwrap();
        let _ = handle.wait(Some(StdDuration::from_secs(5))).await.unwrap();
        runtime.shutdown().await;
        assert_eq!(runtime.state(), RuntimeState::Stopped);
    }
}
