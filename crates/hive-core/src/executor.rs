//! Graph Executor (C6, spec.md §4.6): the single-threaded cooperative loop
//! that walks a graph for one run.

use crate::cancellation::RunCancellation;
use crate::config::HiveConfig;
use crate::decision::{Attempt, AttemptStatus, DecisionLog, EvidenceType};
use crate::edge::{AttemptOutcome, EdgeEvaluator};
use crate::error::{ErrorKind, HiveError};
use crate::events::{EventBus, HiveEvent};
use crate::failure::{FailureDescriptor, FailureRecorderHandle};
use crate::function_registry::FunctionRegistry;
use crate::graph::GraphSpec;
use crate::health::Metrics;
use crate::llm::LLMProvider;
use crate::memory::SharedMemory;
use crate::node::{NodeCollaborators, NodeKernel};
use crate::storage::{RunSummary, Storage};
use crate::tool::ToolExecutor;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one call to `GraphExecutor::run` produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: String,
    pub success: bool,
    pub paused: bool,
    pub path: Vec<String>,
    pub output: Option<IndexMap<String, Value>>,
    pub paused_at: Option<String>,
    pub error: Option<HiveError>,
    /// Memory snapshot taken at the moment of pause, carried so a later
    /// `resume` can seed `SharedMemory` without re-running anything. `None`
    /// whenever `paused` is `false`.
    pub paused_memory: Option<IndexMap<String, Value>>,
}

impl ExecutionResult {
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.error, Some(e) if e.kind == ErrorKind::RunCancelled)
    }
}

pub struct GraphExecutor {
    config: HiveConfig,
    storage: Arc<dyn Storage>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<dyn ToolExecutor>,
    functions: Arc<FunctionRegistry>,
    events: Arc<EventBus>,
    failures: FailureRecorderHandle,
    metrics: Arc<Metrics>,
    kernel: NodeKernel,
    edges: EdgeEvaluator,
}

impl GraphExecutor {
    pub fn new(
        config: HiveConfig,
        storage: Arc<dyn Storage>,
        llm: Arc<dyn LLMProvider>,
        tools: Arc<dyn ToolExecutor>,
        functions: Arc<FunctionRegistry>,
        events: Arc<EventBus>,
        failures: FailureRecorderHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            storage,
            llm,
            tools,
            functions,
            events,
            failures,
            metrics,
            kernel: NodeKernel::new(),
            edges: EdgeEvaluator::new(),
        }
    }

    /// Run `graph` from `entry_point` (or its default entry node) to
    /// completion, pause, or failure (spec.md §4.6 main loop).
    pub async fn run(
        &self,
        graph: &GraphSpec,
        entry_point: Option<&str>,
        run_id: String,
        payload: IndexMap<String, Value>,
        cancellation: &RunCancellation,
    ) -> ExecutionResult {
        let validation = graph.validate();
        if !validation.is_valid() {
            warn!(run_id, errors = ?validation.errors, "graph failed validation, refusing to run");
            return ExecutionResult {
                run_id,
                success: false,
                paused: false,
                path: vec![],
                output: None,
                paused_at: None,
                error: Some(HiveError::new(
                    ErrorKind::GraphInvalid,
                    format!("graph failed validation: {:?}", validation.errors),
                )),
                paused_memory: None,
            };
        }

        let Some(entry_node) = graph.entry_for(entry_point).map(str::to_string) else {
            return ExecutionResult {
                run_id,
                success: false,
                paused: false,
                path: vec![],
                output: None,
                paused_at: None,
                error: Some(HiveError::new(
                    ErrorKind::GraphInvalid,
                    format!("unknown entry point `{}`", entry_point.unwrap_or("<default>")),
                )),
                paused_memory: None,
            };
        };

        info!(run_id, goal_id = %graph.goal_id, entry_node, "run started");
        self.events.publish(HiveEvent::RunStarted {
            run_id: run_id.clone(),
            goal_id: graph.goal_id.clone(),
            entry_node: entry_node.clone(),
            timestamp: Utc::now(),
        });

        let memory = SharedMemory::seed(payload);
        self.execute_loop(graph, run_id, entry_node, memory, DecisionLog::new(), Vec::new(), false, cancellation)
            .await
    }

    /// Resume a previously paused run at `paused_at`, seeding `SharedMemory`
    /// from the snapshot `ExecutionResult::paused_memory` carried when it
    /// paused, overlaid with `resume_payload` (spec.md §6
    /// `resume(run_handle, payload?)`).
    pub async fn resume(
        &self,
        graph: &GraphSpec,
        run_id: String,
        paused_at: String,
        memory_snapshot: IndexMap<String, Value>,
        resume_payload: IndexMap<String, Value>,
        path_so_far: Vec<String>,
        cancellation: &RunCancellation,
    ) -> ExecutionResult {
        let mut seed = memory_snapshot;
        seed.extend(resume_payload);

        info!(run_id, node_id = %paused_at, "run resumed");
        self.events.publish(HiveEvent::RunResumed {
            run_id: run_id.clone(),
            node_id: paused_at.clone(),
            timestamp: Utc::now(),
        });

        let memory = SharedMemory::seed(seed);
        self.execute_loop(graph, run_id, paused_at, memory, DecisionLog::new(), path_so_far, true, cancellation)
            .await
    }

    /// Shared cooperative loop walked by both `run` and `resume`. `entry_node`
    /// is the node to start at; `skip_pause_once` suppresses the pause check
    /// for that first node only, so resuming at a pause node re-enters the
    /// graph instead of pausing again immediately.
    #[allow(clippy::too_many_arguments)]
    async fn execute_loop(
        &self,
        graph: &GraphSpec,
        run_id: String,
        entry_node: String,
        mut memory: SharedMemory,
        mut decisions: DecisionLog,
        mut path: Vec<String>,
        mut skip_pause_once: bool,
        cancellation: &RunCancellation,
    ) -> ExecutionResult {
        let mut current = entry_node;

        loop {
            if cancellation.is_cancelled() {
                return self.finish_cancelled(run_id, graph, &mut decisions, path, current, &memory).await;
            }

            if graph.pause_nodes.contains(&current) && !skip_pause_once {
                debug!(run_id, node_id = %current, "run pausing");
                self.events.publish(HiveEvent::RunPaused {
                    run_id: run_id.clone(),
                    node_id: current.clone(),
                    timestamp: Utc::now(),
                });
                self.persist(&run_id, graph, &decisions, RunSummary {
                    run_id: run_id.clone(),
                    success: false,
                    path: path.clone(),
                    terminal_node_id: None,
                    paused_at: Some(current.clone()),
                    error: None,
                })
                .await;
                let paused_memory = memory.as_map().clone();
                return ExecutionResult {
                    run_id,
                    success: false,
                    paused: true,
                    path,
                    output: None,
                    paused_at: Some(current),
                    error: None,
                    paused_memory: Some(paused_memory),
                };
            }
            skip_pause_once = false;

            let Some(node) = graph.node(&current) else {
                let error = HiveError::new(ErrorKind::GraphDeadEnd, format!("node `{current}` does not exist"));
                return self.finish_failed(run_id, graph, &mut decisions, path, current, error, &memory).await;
            };

            self.events.publish(HiveEvent::NodeEntered {
                run_id: run_id.clone(),
                node_id: current.clone(),
                timestamp: Utc::now(),
            });
            path.push(current.clone());

            let outcome = match memory.read(&node.input_keys) {
                Ok(input) => {
                    let collaborators = NodeCollaborators {
                        llm: self.llm.as_ref(),
                        tools: self.tools.as_ref(),
                        functions: self.functions.as_ref(),
                        default_model: &self.config.default_model,
                        default_max_tokens: self.config.default_max_tokens,
                        default_tool_timeout_seconds: self.config.default_tool_timeout_seconds,
                    };
                    let kernel_fut = self.kernel.execute_node(node, graph, &run_id, input, &collaborators);
                    tokio::pin!(kernel_fut);
                    let visit = tokio::select! {
                        visit = &mut kernel_fut => visit,
                        _ = cancellation.cancelled() => {
                            return self.finish_cancelled(run_id, graph, &mut decisions, path, current, &memory).await;
                        }
                    };
                    for attempt in &visit.attempts {
                        if attempt.status == AttemptStatus::Retried {
                            self.metrics.record_retry();
                        }
                        decisions.append(attempt.clone());
                        self.log_attempt(&run_id, attempt).await;
                    }
                    if let Some(output) = &visit.output {
                        memory.write(output.clone());
                    }
                    NodeOutcome { aggregate: visit.outcome, final_error: visit.attempts.last().and_then(|a| a.error.clone()) }
                }
                Err(missing_input_error) => {
                    let attempt = Attempt {
                        attempt_id: Uuid::new_v4().to_string(),
                        node_id: node.id.clone(),
                        run_id: run_id.clone(),
                        started_at: Utc::now(),
                        finished_at: Utc::now(),
                        input_snapshot: IndexMap::new(),
                        output: None,
                        status: AttemptStatus::Failed,
                        evidence_type: EvidenceType::Confirmed,
                        error: Some(missing_input_error.clone()),
                        tokens_in: None,
                        tokens_out: None,
                        tool_calls: None,
                        cost_estimate: None,
                    };
                    decisions.append(attempt.clone());
                    self.log_attempt(&run_id, &attempt).await;
                    NodeOutcome { aggregate: AttemptOutcome::FailedRetriesExhausted, final_error: Some(missing_input_error) }
                }
            };

            self.events.publish(HiveEvent::NodeExited {
                run_id: run_id.clone(),
                node_id: current.clone(),
                status: match outcome.aggregate {
                    AttemptOutcome::Success => AttemptStatus::Success,
                    AttemptOutcome::FailedRetriesExhausted => AttemptStatus::Failed,
                },
                timestamp: Utc::now(),
            });

            if outcome.aggregate == AttemptOutcome::FailedRetriesExhausted {
                let has_failure_edge = graph
                    .edges_from(&current)
                    .any(|e| matches!(e.condition, crate::graph::EdgeCondition::OnFailure));
                if !has_failure_edge {
                    let error = outcome.final_error.unwrap_or_else(|| {
                        HiveError::new(ErrorKind::GraphDeadEnd, "node failed with no recorded error")
                    });
                    return self.finish_failed(run_id, graph, &mut decisions, path, current, error, &memory).await;
                }
            }

            let next = self.edges.select_next(graph, &current, outcome.aggregate, &memory.snapshot());
            match next {
                Some(edge) => {
                    debug!(run_id, from = %current, to = %edge.target, edge_id = %edge.id, "edge traversal");
                    current = edge.target.clone();
                }
                None if graph.terminal_nodes.contains(&current) => {
                    let output = memory.as_map().clone();
                    info!(run_id, "run completed");
                    self.events.publish(HiveEvent::RunCompleted {
                        run_id: run_id.clone(),
                        path: path.clone(),
                        timestamp: Utc::now(),
                    });
                    self.persist(&run_id, graph, &decisions, RunSummary {
                        run_id: run_id.clone(),
                        success: true,
                        path: path.clone(),
                        terminal_node_id: Some(current.clone()),
                        paused_at: None,
                        error: None,
                    })
                    .await;
                    return ExecutionResult {
                        run_id,
                        success: true,
                        paused: false,
                        path,
                        output: Some(output),
                        paused_at: None,
                        error: None,
                        paused_memory: None,
                    };
                }
                None => {
                    let error = HiveError::new(
                        ErrorKind::GraphDeadEnd,
                        format!("node `{current}` has no eligible outgoing edge and is not terminal"),
                    );
                    return self.finish_failed(run_id, graph, &mut decisions, path, current, error, &memory).await;
                }
            }
        }
    }

    async fn finish_failed(
        &self,
        run_id: String,
        graph: &GraphSpec,
        decisions: &mut DecisionLog,
        path: Vec<String>,
        node_id: String,
        error: HiveError,
        memory: &SharedMemory,
    ) -> ExecutionResult {
        warn!(run_id, node_id = %node_id, error = %error, "run failed");

        self.failures.record(FailureDescriptor {
            goal_id: graph.goal_id.clone(),
            node_id: node_id.clone(),
            error_kind: error.kind.to_string(),
            message: error.message.clone(),
            stack: error.stack.clone(),
            input_snapshot: decisions
                .attempts()
                .last()
                .map(|a| a.input_snapshot.clone())
                .unwrap_or_default(),
            memory_snapshot: memory.as_map().clone(),
        });

        self.events.publish(HiveEvent::RunFailed {
            run_id: run_id.clone(),
            error: error.clone(),
            timestamp: Utc::now(),
        });

        self.persist(&run_id, graph, decisions, RunSummary {
            run_id: run_id.clone(),
            success: false,
            path: path.clone(),
            terminal_node_id: None,
            paused_at: None,
            error: Some(error.clone()),
        })
        .await;

        ExecutionResult {
            run_id,
            success: false,
            paused: false,
            path,
            output: None,
            paused_at: None,
            error: Some(error),
            paused_memory: None,
        }
    }

    /// Record a cancellation mid-run: one `Attempt` for the node that was
    /// in flight, status `failed` / kind `run.cancelled` / evidence
    /// `unknown`, and no further edge traversal (spec.md §5, §8).
    async fn finish_cancelled(
        &self,
        run_id: String,
        graph: &GraphSpec,
        decisions: &mut DecisionLog,
        path: Vec<String>,
        node_id: String,
        memory: &SharedMemory,
    ) -> ExecutionResult {
        warn!(run_id, node_id = %node_id, "run cancelled");
        let error = HiveError::new(ErrorKind::RunCancelled, format!("run cancelled at node `{node_id}`"));

        let attempt = Attempt {
            attempt_id: Uuid::new_v4().to_string(),
            node_id: node_id.clone(),
            run_id: run_id.clone(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            input_snapshot: IndexMap::new(),
            output: None,
            status: AttemptStatus::Failed,
            evidence_type: EvidenceType::Unknown,
            error: Some(error.clone()),
            tokens_in: None,
            tokens_out: None,
            tool_calls: None,
            cost_estimate: None,
        };
        decisions.append(attempt.clone());
        self.log_attempt(&run_id, &attempt).await;

        self.events.publish(HiveEvent::RunCancelled {
            run_id: run_id.clone(),
            node_id,
            timestamp: Utc::now(),
        });

        self.persist(&run_id, graph, decisions, RunSummary {
            run_id: run_id.clone(),
            success: false,
            path: path.clone(),
            terminal_node_id: None,
            paused_at: None,
            error: Some(error.clone()),
        })
        .await;

        ExecutionResult {
            run_id,
            success: false,
            paused: false,
            path,
            output: Some(memory.as_map().clone()),
            paused_at: None,
            error: Some(error),
            paused_memory: None,
        }
    }

    async fn log_attempt(&self, run_id: &str, attempt: &Attempt) {
        if let Err(e) = self.storage.append_detail(&self.config.agent_id, run_id, attempt).await {
            warn!(run_id, error = %e, "failed to append decision-log detail");
        }
    }

    async fn persist(&self, run_id: &str, _graph: &GraphSpec, _decisions: &DecisionLog, summary: RunSummary) {
        if let Err(e) = self.storage.write_summary(&self.config.agent_id, run_id, &summary).await {
            warn!(run_id, error = %e, "failed to write run summary");
        }
    }
}

struct NodeOutcome {
    aggregate: AttemptOutcome,
    final_error: Option<HiveError>,
}
