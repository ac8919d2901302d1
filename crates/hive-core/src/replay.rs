//! Deterministic replay harness.
//!
//! Not named as a component in the core component table, but implied by the
//! determinism requirement in spec.md §4.6 ("given the same graph, same
//! initial memory, same LLM/tool responses, the executor must visit the
//! same path... byte-for-byte"): this is the harness that exercises that
//! guarantee by re-running a graph against its own recorded decision log
//! instead of live collaborators.

use crate::decision::{Attempt, AttemptStatus};
use crate::function_registry::{FunctionError, FunctionRegistry};
use crate::graph::GraphSpec;
use crate::llm::{
    BoxStream, CompletionRequest, CompletionResponse, LLMProvider, LlmProviderError, StreamChunk, ToolDescription, ToolTurn,
};
use crate::tool::{ToolExecutor, ToolOutcome};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Replays a previously recorded run: every `complete`/`tool_complete`/
/// function call is answered with the next non-retried Attempt's output, in
/// the order it was originally recorded. Because the graph, entry point,
/// and trigger payload are unchanged, re-running the executor against this
/// harness should retrace the identical path and produce the identical
/// final memory — retried (intermediate failure) attempts are skipped
/// since replay verifies the path, not the original transient failures.
pub struct Replayer {
    queue: Mutex<VecDeque<Attempt>>,
}

impl Replayer {
    pub fn from_attempts(attempts: &[Attempt]) -> Self {
        let queue = attempts
            .iter()
            .filter(|a| a.status != AttemptStatus::Retried)
            .cloned()
            .collect();
        Self { queue: Mutex::new(queue) }
    }

    fn pop(&self) -> Option<Attempt> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Remaining un-replayed attempts; a non-empty result after a full run
    /// means the replayed execution took a shorter path than the original.
    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn next_output(&self) -> std::result::Result<IndexMap<String, Value>, String> {
        match self.pop() {
            Some(attempt) => match attempt.output {
                Some(output) => Ok(output),
                None => Err(attempt
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "replayed attempt recorded no output".to_string())),
            },
            None => Err("replay queue exhausted: graph took a different path than the recording".to_string()),
        }
    }

    /// An `LLMProvider` that answers with recorded outputs instead of
    /// calling a real model.
    pub fn llm_provider(self: &std::sync::Arc<Self>) -> ReplayLlmProvider {
        ReplayLlmProvider { replayer: self.clone() }
    }

    /// A `ToolExecutor` that should never actually be invoked during replay
    /// (the LLM mock resolves tool-use nodes directly to their final
    /// content), kept only so callers have a complete collaborator set to
    /// hand the executor.
    pub fn tool_executor(self: &std::sync::Arc<Self>) -> ReplayToolExecutor {
        ReplayToolExecutor
    }

    /// A `FunctionRegistry` with one entry per distinct function name used
    /// in `graph`, each replaying recorded outputs verbatim.
    pub fn function_registry(self: &std::sync::Arc<Self>, graph: &GraphSpec) -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        let names: HashSet<String> = graph.nodes.iter().filter_map(|n| n.function.clone()).collect();
        for name in names {
            let replayer = self.clone();
            registry.register_fn(name, move |_input| {
                let replayer = replayer.clone();
                async move { replayer.next_output().map_err(|message| FunctionError { message }) }
            });
        }
        registry
    }
}

fn serialize_output(output: &IndexMap<String, Value>) -> String {
    let object: serde_json::Map<String, Value> = output.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    Value::Object(object).to_string()
}

pub struct ReplayLlmProvider {
    replayer: std::sync::Arc<Replayer>,
}

#[async_trait]
impl LLMProvider for ReplayLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> std::result::Result<CompletionResponse, LlmProviderError> {
        let output = self.replayer.next_output().map_err(LlmProviderError::Provider)?;
        Ok(CompletionResponse { content: serialize_output(&output), tokens_in: 0, tokens_out: 0, stop_reason: "replay".to_string() })
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<BoxStream<std::result::Result<StreamChunk, LlmProviderError>>, LlmProviderError> {
        let response = self.complete(request).await?;
        let chunk = StreamChunk {
            content: response.content,
            tokens_in: Some(response.tokens_in),
            tokens_out: Some(response.tokens_out),
            is_complete: true,
            stop_reason: Some(response.stop_reason),
        };
        Ok(Box::pin(futures::stream::once(async move { Ok(chunk) })))
    }

    async fn tool_complete(
        &self,
        _request: CompletionRequest,
        _tools: Vec<ToolDescription>,
    ) -> std::result::Result<Vec<ToolTurn>, LlmProviderError> {
        let output = self.replayer.next_output().map_err(LlmProviderError::Provider)?;
        Ok(vec![ToolTurn::Content(serialize_output(&output))])
    }
}

pub struct ReplayToolExecutor;

#[async_trait]
impl ToolExecutor for ReplayToolExecutor {
    async fn execute(&self, tool_id: &str, _arguments: Value, _timeout: Duration) -> ToolOutcome {
        ToolOutcome::error("replay.unexpected_tool_call", format!("tool `{tool_id}` should not be invoked during replay"))
    }
}
