//! Node Execution Kernel (C4, spec.md §4.4).
//!
//! Dispatches on `NodeSpec.kind`, applies the common contract (read declared
//! inputs, run kind-specific logic, validate declared outputs) and the retry
//! policy, and returns every raw `Attempt` made for one node visit plus the
//! aggregate outcome the Edge Evaluator needs.

mod function;
pub mod hallucination;
mod llm_generate;
mod llm_tool_use;
pub mod parser;
mod router;
pub mod retry;

use crate::decision::{Attempt, AttemptStatus, EvidenceType};
use crate::edge::AttemptOutcome;
use crate::error::{ErrorKind, HiveError};
use crate::function_registry::FunctionRegistry;
use crate::graph::{GraphSpec, NodeKind, NodeSpec};
use crate::llm::LLMProvider;
use crate::tool::ToolExecutor;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub use llm_generate::render_input_block;

/// Result of a single raw attempt at a node, before retry/contract logic.
pub(crate) struct RawOutcome {
    pub output: Option<IndexMap<String, Value>>,
    pub evidence: EvidenceType,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub tool_calls: Option<u32>,
    pub error: Option<HiveError>,
}

impl RawOutcome {
    pub fn success(output: IndexMap<String, Value>, evidence: EvidenceType) -> Self {
        Self { output: Some(output), evidence, tokens_in: None, tokens_out: None, tool_calls: None, error: None }
    }

    pub fn failure(error: HiveError, evidence: EvidenceType) -> Self {
        Self { output: None, evidence, tokens_in: None, tokens_out: None, tool_calls: None, error: Some(error) }
    }

    fn with_tokens(mut self, tokens_in: Option<u32>, tokens_out: Option<u32>) -> Self {
        self.tokens_in = tokens_in;
        self.tokens_out = tokens_out;
        self
    }

    fn with_tool_calls(mut self, count: u32) -> Self {
        self.tool_calls = Some(count);
        self
    }
}

/// Everything one visit to a node produced: every raw attempt (for the
/// Decision Log) plus the aggregate outcome the executor acts on.
pub struct NodeVisitResult {
    pub attempts: Vec<Attempt>,
    pub outcome: AttemptOutcome,
    pub output: Option<IndexMap<String, Value>>,
}

/// External collaborators the kernel needs to dispatch LLM/tool/function
/// node kinds. Borrowed for the duration of one node visit.
pub struct NodeCollaborators<'a> {
    pub llm: &'a dyn LLMProvider,
    pub tools: &'a dyn ToolExecutor,
    pub functions: &'a FunctionRegistry,
    pub default_model: &'a str,
    pub default_max_tokens: u32,
    pub default_tool_timeout_seconds: u64,
}

pub struct NodeKernel;

impl NodeKernel {
    pub fn new() -> Self {
        Self
    }

    /// Execute `node` to completion (including retries), given the `input`
    /// already read from shared memory per `node.input_keys` (spec.md
    /// §4.4.1 step 1 is the caller's responsibility — it needs access to
    /// `SharedMemory`, which this kernel does not hold).
    pub async fn execute_node(
        &self,
        node: &NodeSpec,
        graph: &GraphSpec,
        run_id: &str,
        input: IndexMap<String, Value>,
        collaborators: &NodeCollaborators<'_>,
    ) -> NodeVisitResult {
        let effective_max_retries = node.effective_max_retries(graph.max_retries_per_node);
        let mut attempts = Vec::new();
        let mut attempt_number: u32 = 0;

        loop {
            let started_at = Utc::now();
            let raw = self.dispatch(node, graph, input.clone(), collaborators).await;
            let finished_at = Utc::now();

            // Output-contract validation happens after kind-specific execution
            // regardless of whether that execution reported its own error
            // (spec.md §4.4.1 step 3, §4.1 "validated after the node returns").
            let (final_output, error) = match raw.output {
                Some(proposed) => match crate::memory::SharedMemory::validate_write_set(&node.output_keys, &proposed) {
                    Ok(accepted) => (Some(accepted), raw.error),
                    Err(undeclared) => (
                        None,
                        Some(HiveError::new(
                            ErrorKind::ContractUndeclaredOutput,
                            format!("node wrote undeclared output keys: {}", undeclared.join(", ")),
                        )),
                    ),
                },
                None => (None, raw.error),
            };

            let is_final_attempt_in_series = attempt_number >= effective_max_retries
                || error.as_ref().is_none_or(|e| !e.is_retriable());

            let status = match &error {
                None => AttemptStatus::Success,
                Some(_) if is_final_attempt_in_series => AttemptStatus::Failed,
                Some(_) => AttemptStatus::Retried,
            };

            attempts.push(Attempt {
                attempt_id: Uuid::new_v4().to_string(),
                node_id: node.id.clone(),
                run_id: run_id.to_string(),
                started_at,
                finished_at,
                input_snapshot: input.clone(),
                output: final_output.clone(),
                status,
                evidence_type: raw.evidence,
                error,
                tokens_in: raw.tokens_in,
                tokens_out: raw.tokens_out,
                tool_calls: raw.tool_calls,
                cost_estimate: None,
            });

            if status == AttemptStatus::Success {
                debug!(run_id, node_id = %node.id, attempt_number, "node attempt succeeded");
                return NodeVisitResult { attempts, outcome: AttemptOutcome::Success, output: final_output };
            }

            if status == AttemptStatus::Failed {
                warn!(run_id, node_id = %node.id, attempt_number, "node retries exhausted");
                return NodeVisitResult { attempts, outcome: AttemptOutcome::FailedRetriesExhausted, output: None };
            }

            let delay = retry::backoff_delay(attempt_number + 1);
            debug!(run_id, node_id = %node.id, attempt_number, delay_ms = delay.as_millis() as u64, "node attempt failed, retrying");
            attempt_number += 1;
            tokio::time::sleep(delay).await;
        }
    }

    async fn dispatch(
        &self,
        node: &NodeSpec,
        graph: &GraphSpec,
        input: IndexMap<String, Value>,
        collaborators: &NodeCollaborators<'_>,
    ) -> RawOutcome {
        match node.kind {
            NodeKind::LlmGenerate => {
                llm_generate::run(
                    node,
                    graph,
                    input,
                    collaborators.llm,
                    collaborators.default_model,
                    collaborators.default_max_tokens,
                )
                .await
            }
            NodeKind::LlmToolUse => {
                let default_timeout = Duration::from_secs(collaborators.default_tool_timeout_seconds);
                llm_tool_use::run(
                    node,
                    graph,
                    input,
                    collaborators.llm,
                    collaborators.tools,
                    collaborators.default_model,
                    collaborators.default_max_tokens,
                    default_timeout,
                )
                .await
            }
            NodeKind::Router => router::run(node, input),
            NodeKind::Function => function::run(node, input, collaborators.functions).await,
        }
    }
}

impl Default for NodeKernel {
    fn default() -> Self {
        Self::new()
    }
}
