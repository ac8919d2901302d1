//! Router node kind (spec.md §4.4.4).
//!
//! No external calls: the router's whole job is to pass through (or narrow)
//! a subset of its declared inputs so a `conditional` edge downstream can
//! read the branch key it wrote.

use super::RawOutcome;
use crate::decision::EvidenceType;
use crate::graph::NodeSpec;
use indexmap::IndexMap;
use serde_json::Value;

pub fn run(node: &NodeSpec, input: IndexMap<String, Value>) -> RawOutcome {
    let mut output = IndexMap::new();
    for key in &node.output_keys {
        if let Some(value) = input.get(key) {
            output.insert(key.clone(), value.clone());
        }
    }
    RawOutcome::success(output, EvidenceType::Confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use serde_json::json;
    use std::collections::HashSet;

    fn router_node(output_keys: Vec<&str>) -> NodeSpec {
        NodeSpec {
            id: "route".into(),
            name: "route".into(),
            description: String::new(),
            kind: NodeKind::Router,
            input_keys: vec![],
            output_keys: output_keys.into_iter().map(String::from).collect(),
            system_prompt: None,
            tools: HashSet::new(),
            function: None,
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

    #[test]
    fn carries_forward_only_declared_output_keys() {
        let node = router_node(vec!["urgency"]);
        let input = IndexMap::from([
            ("urgency".to_string(), json!("high")),
            ("internal_scratch".to_string(), json!("unused")),
        ]);
        let outcome = run(&node, input);
        let output = outcome.output.unwrap();
        assert_eq!(output.get("urgency"), Some(&json!("high")));
        assert!(!output.contains_key("internal_scratch"));
    }
}
