//! Function node kind (spec.md §4.4.5).

use super::RawOutcome;
use crate::decision::EvidenceType;
use crate::error::{ErrorKind, HiveError};
use crate::function_registry::FunctionRegistry;
use crate::graph::NodeSpec;
use indexmap::IndexMap;
use serde_json::Value;

pub async fn run(node: &NodeSpec, input: IndexMap<String, Value>, functions: &FunctionRegistry) -> RawOutcome {
    let Some(name) = node.function.as_deref() else {
        return RawOutcome::failure(
            HiveError::new(ErrorKind::FunctionException, "function node has no `function` identifier configured"),
            EvidenceType::Confirmed,
        );
    };

    let Some(function) = functions.lookup(name) else {
        return RawOutcome::failure(
            HiveError::new(ErrorKind::FunctionException, format!("no function registered under `{name}`")),
            EvidenceType::Confirmed,
        );
    };

    match function.call(input).await {
        Ok(output) => RawOutcome::success(output, EvidenceType::Confirmed),
        Err(e) => RawOutcome::failure(HiveError::new(ErrorKind::FunctionException, e.to_string()), EvidenceType::Observed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_registry::FunctionError;
    use crate::graph::NodeKind;
    use serde_json::json;
    use std::collections::HashSet;

    fn function_node(function: Option<&str>, output_keys: Vec<&str>) -> NodeSpec {
        NodeSpec {
            id: "fn".into(),
            name: "fn".into(),
            description: String::new(),
            kind: NodeKind::Function,
            input_keys: vec![],
            output_keys: output_keys.into_iter().map(String::from).collect(),
            system_prompt: None,
            tools: HashSet::new(),
            function: function.map(String::from),
            max_retries: None,
            streaming_enabled: false,
            max_tokens: None,
            temperature: None,
            model: None,
            tool_timeout_seconds: None,
            is_entry: false,
            is_terminal: false,
            is_pause: false,
            forbidden_tokens: vec![],
        }
    }

    #[tokio::test]
    async fn unknown_function_name_is_a_function_exception() {
        let registry = FunctionRegistry::new();
        let node = function_node(Some("missing"), vec![]);
        let outcome = run(&node, IndexMap::new(), &registry).await;
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::FunctionException);
    }

    #[tokio::test]
    async fn raised_exception_becomes_observed_evidence() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("boom", |_input| async move { Err(FunctionError { message: "nope".into() }) });
        let node = function_node(Some("boom"), vec![]);
        let outcome = run(&node, IndexMap::new(), &registry).await;
        assert_eq!(outcome.evidence, EvidenceType::Observed);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::FunctionException);
    }

    #[tokio::test]
    async fn successful_call_maps_output() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("double", |input| async move {
            let x = input.get("x").and_then(Value::as_i64).unwrap_or(0);
            Ok(IndexMap::from([("doubled".to_string(), json!(x * 2))]))
        });
        let node = function_node(Some("double"), vec!["doubled"]);
        let outcome = run(&node, IndexMap::from([("x".to_string(), json!(4))]), &registry).await;
        assert_eq!(outcome.output.unwrap().get("doubled"), Some(&json!(8)));
    }
}
