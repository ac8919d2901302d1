//! LLM-generate node kind (spec.md §4.4.2).

use super::hallucination::find_forbidden_token;
use super::parser::extract_structured_object;
use super::RawOutcome;
use crate::decision::EvidenceType;
use crate::error::{ErrorKind, HiveError};
use crate::graph::{GraphSpec, NodeSpec};
use crate::llm::{CompletionRequest, LLMProvider, Message};
use futures::StreamExt;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

/// Canonical, stable serialization of the input map: sorted keys, fixed
/// number formatting, so identical inputs always yield identical prompt
/// bytes (spec.md §4.4.2, §4.6 determinism requirement).
pub fn render_input_block(input: &IndexMap<String, Value>) -> String {
    let mut keys: Vec<&String> = input.keys().collect();
    keys.sort();

    let mut lines = Vec::with_capacity(keys.len());
    for key in keys {
        let value = &input[key];
        let rendered = canonical_value(value);
        lines.push(format!("{key}: {rendered}"));
    }
    lines.join("\n")
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            // `serde_json::to_string` on a `Value` already emits sorted
            // object keys are NOT guaranteed by default; re-sort explicitly.
            serde_json::to_string(&sort_keys(other)).unwrap_or_default()
        }
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

pub(super) fn resolve_model(node: &NodeSpec, graph: &GraphSpec, fallback: &str) -> String {
    node.model
        .clone()
        .or_else(|| graph.default_model.clone())
        .unwrap_or_else(|| fallback.to_string())
}

pub(super) fn resolve_max_tokens(node: &NodeSpec, graph: &GraphSpec, fallback: u32) -> u32 {
    node.max_tokens.or(graph.max_tokens).unwrap_or(fallback)
}

pub async fn run(
    node: &NodeSpec,
    graph: &GraphSpec,
    input: IndexMap<String, Value>,
    llm: &dyn LLMProvider,
    default_model: &str,
    default_max_tokens: u32,
) -> RawOutcome {
    let rendered = render_input_block(&input);
    let system_prompt = node.system_prompt.clone().unwrap_or_default();

    let request = CompletionRequest {
        messages: vec![Message::user(rendered)],
        system: Some(system_prompt),
        model: resolve_model(node, graph, default_model),
        max_tokens: resolve_max_tokens(node, graph, default_max_tokens),
        temperature: node.temperature.unwrap_or(0.0),
    };

    let (content, tokens_in, tokens_out) = if node.streaming_enabled {
        match aggregate_stream(llm, request).await {
            Ok(triple) => triple,
            Err(outcome) => return outcome,
        }
    } else {
        match llm.complete(request).await {
            Ok(response) => (response.content, Some(response.tokens_in), Some(response.tokens_out)),
            Err(e) => {
                return RawOutcome::failure(
                    HiveError::new(ErrorKind::LlmProviderError, e.to_string()),
                    EvidenceType::Unknown,
                )
            }
        }
    };

    finalize(node, &content).with_tokens(tokens_in, tokens_out)
}

async fn aggregate_stream(
    llm: &dyn LLMProvider,
    request: CompletionRequest,
) -> Result<(String, Option<u32>, Option<u32>), RawOutcome> {
    let mut stream = llm.stream_complete(request).await.map_err(|e| {
        RawOutcome::failure(HiveError::new(ErrorKind::LlmProviderError, e.to_string()), EvidenceType::Unknown)
    })?;

    let mut content = String::new();
    let mut tokens_in = None;
    let mut tokens_out = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(c) => {
                content.push_str(&c.content);
                tokens_in = c.tokens_in.or(tokens_in);
                tokens_out = c.tokens_out.or(tokens_out);
            }
            Err(e) => {
                return Err(RawOutcome::failure(
                    HiveError::new(ErrorKind::LlmProviderError, e.to_string()),
                    EvidenceType::Unknown,
                ))
            }
        }
    }
    Ok((content, tokens_in, tokens_out))
}

/// Shared tail of generate/tool-use: hallucination guard, JSON extraction,
/// output-key mapping (spec.md §4.4.2 last three bullets).
pub(super) fn finalize(node: &NodeSpec, content: &str) -> RawOutcome {
    if let Some(token) = find_forbidden_token(content, &node.forbidden_tokens) {
        warn!(node_id = %node.id, token, "forbidden token detected in LLM output");
        return RawOutcome::failure(
            HiveError::new(
                ErrorKind::LlmHallucinationDetected,
                format!("forbidden token `{token}` found in output"),
            ),
            EvidenceType::Observed,
        );
    }

    let Some(json_str) = extract_structured_object(content) else {
        return RawOutcome::failure(
            HiveError::new(ErrorKind::LlmInvalidJson, "no JSON object found in LLM output"),
            EvidenceType::Observed,
        );
    };

    let parsed: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => {
            return RawOutcome::failure(
                HiveError::new(ErrorKind::LlmInvalidJson, format!("invalid JSON: {e}")),
                EvidenceType::Observed,
            )
        }
    };

    let Some(obj) = parsed.as_object() else {
        return RawOutcome::failure(
            HiveError::new(ErrorKind::LlmInvalidJson, "parsed JSON is not an object"),
            EvidenceType::Observed,
        );
    };

    let mut output = IndexMap::new();
    for key in &node.output_keys {
        match obj.get(key) {
            Some(v) => {
                output.insert(key.clone(), v.clone());
            }
            None => {
                return RawOutcome::failure(
                    HiveError::new(ErrorKind::LlmMissingOutput, format!("missing declared output key `{key}`")),
                    EvidenceType::Observed,
                )
            }
        }
    }

    RawOutcome::success(output, EvidenceType::Observed)
}
