//! LLM-tool-use node kind (spec.md §4.4.3).

use super::llm_generate::{render_input_block, resolve_max_tokens, resolve_model};
use super::RawOutcome;
use crate::decision::EvidenceType;
use crate::error::{ErrorKind, HiveError};
use crate::graph::{GraphSpec, NodeSpec};
use crate::llm::{CompletionRequest, LLMProvider, Message, ToolDescription, ToolTurn};
use crate::tool::ToolExecutor;
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Hard cap on tool-call/response round-trips for one node visit, purely to
/// bound a misbehaving provider that never stops calling tools.
const MAX_TOOL_ROUNDS: u32 = 25;

pub async fn run(
    node: &NodeSpec,
    graph: &GraphSpec,
    input: IndexMap<String, Value>,
    llm: &dyn LLMProvider,
    tools: &dyn ToolExecutor,
    default_model: &str,
    default_max_tokens: u32,
    default_timeout: Duration,
) -> RawOutcome {
    let tool_descriptions: Vec<ToolDescription> = node
        .tools
        .iter()
        .map(|id| ToolDescription { name: id.clone(), description: String::new(), parameters_schema: Value::Null })
        .collect();

    let timeout = node
        .tool_timeout_seconds
        .map(Duration::from_secs)
        .or(graph.default_tool_timeout_seconds.map(Duration::from_secs))
        .unwrap_or(default_timeout);

    let mut messages = vec![Message::user(render_input_block(&input))];
    let mut tool_call_count: u32 = 0;

    for _round in 0..MAX_TOOL_ROUNDS {
        let request = CompletionRequest {
            messages: messages.clone(),
            system: node.system_prompt.clone(),
            model: resolve_model(node, graph, default_model),
            max_tokens: resolve_max_tokens(node, graph, default_max_tokens),
            temperature: node.temperature.unwrap_or(0.0),
        };

        let turns = match llm.tool_complete(request, tool_descriptions.clone()).await {
            Ok(turns) => turns,
            Err(e) => {
                return RawOutcome::failure(HiveError::new(ErrorKind::LlmProviderError, e.to_string()), EvidenceType::Unknown)
                    .with_tool_calls(tool_call_count);
            }
        };

        let mut final_content = None;
        for turn in turns {
            match turn {
                ToolTurn::Content(text) => {
                    final_content = Some(text);
                }
                ToolTurn::ToolCall(call) => {
                    if !node.tools.contains(&call.name) {
                        warn!(node_id = %node.id, tool = %call.name, "node called a tool it is not permitted to use");
                        return RawOutcome::failure(
                            HiveError::new(ErrorKind::ToolNotPermitted, format!("tool `{}` is not permitted for this node", call.name)),
                            EvidenceType::Confirmed,
                        )
                        .with_tool_calls(tool_call_count);
                    }

                    tool_call_count += 1;
                    debug!(node_id = %node.id, tool = %call.name, tool_call_count, "dispatching tool call");
                    messages.push(Message::assistant(format!("(tool call: {} {})", call.name, call.arguments)));

                    let outcome = match tokio::time::timeout(timeout, tools.execute(&call.name, call.arguments, timeout)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            return RawOutcome::failure(
                                HiveError::new(ErrorKind::ToolTimeout, format!("tool `{}` timed out", call.name)),
                                EvidenceType::Unknown,
                            )
                            .with_tool_calls(tool_call_count);
                        }
                    };

                    if !outcome.ok {
                        let kind = if outcome.error_kind.as_deref() == Some("timeout") {
                            ErrorKind::ToolTimeout
                        } else {
                            ErrorKind::ToolError
                        };
                        let evidence = if kind == ErrorKind::ToolTimeout { EvidenceType::Unknown } else { EvidenceType::Observed };
                        return RawOutcome::failure(
                            HiveError::new(kind, outcome.error_message.unwrap_or_else(|| "tool execution failed".to_string())),
                            evidence,
                        )
                        .with_tool_calls(tool_call_count);
                    }

                    let result_text = outcome.value.map(|v| v.to_string()).unwrap_or_default();
                    messages.push(Message::tool_result(call.id, result_text));
                }
            }
        }

        if let Some(content) = final_content {
            return super::llm_generate::finalize(node, &content).with_tool_calls(tool_call_count);
        }
    }

    RawOutcome::failure(
        HiveError::new(ErrorKind::LlmProviderError, "tool-use node exceeded the maximum number of tool rounds"),
        EvidenceType::Unknown,
    )
    .with_tool_calls(tool_call_count)
}
