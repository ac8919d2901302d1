//! End-to-end scenarios driven through `AgentRuntime::trigger`, exercising
//! the full wiring (executor, node kernel, edge evaluator, storage,
//! failure recorder) the way a deployment actually calls this crate,
//! rather than through `GraphExecutor` directly.

use async_trait::async_trait;
use hive_core::{
    AgentRuntime, BoxStream, CompletionRequest, CompletionResponse, EdgeCondition, EdgeSpec, FunctionRegistry, GraphSpec, HiveConfig,
    LLMProvider, LlmProviderError, NodeKind, NodeSpec, StreamChunk, ToolDescription, ToolExecutor, ToolOutcome, ToolTurn,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

struct UnusedTools;
#[async_trait]
impl ToolExecutor for UnusedTools {
    async fn execute(&self, _id: &str, _args: Value, _t: Duration) -> ToolOutcome {
        unreachable!("this scenario does not dispatch tools")
    }
}

/// Hands back one scripted JSON body per call, in order.
struct ScriptedLlm {
    replies: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut replies: Vec<String> = replies.into_iter().map(Into::into).collect();
        replies.reverse();
        Self { replies: Mutex::new(replies) }
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmProviderError> {
        let content = self.replies.lock().unwrap().pop().expect("scripted llm ran out of replies");
        Ok(CompletionResponse { content, tokens_in: 0, tokens_out: 0, stop_reason: "stop".into() })
    }

    async fn stream_complete(&self, _request: CompletionRequest) -> Result<BoxStream<Result<StreamChunk, LlmProviderError>>, LlmProviderError> {
        unreachable!("this scenario does not stream")
    }

    async fn tool_complete(&self, _request: CompletionRequest, _tools: Vec<ToolDescription>) -> Result<Vec<ToolTurn>, LlmProviderError> {
        unreachable!("this scenario does not use tool-calling nodes")
    }
}

fn function_node(id: &str, function: &str, input_keys: &[&str], output_keys: &[&str]) -> NodeSpec {
    NodeSpec {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        kind: NodeKind::Function,
        input_keys: input_keys.iter().map(|s| s.to_string()).collect(),
        output_keys: output_keys.iter().map(|s| s.to_string()).collect(),
        system_prompt: None,
        tools: HashSet::new(),
        function: Some(function.to_string()),
        max_retries: Some(0),
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

fn llm_generate_node(id: &str, input_keys: &[&str], output_keys: &[&str]) -> NodeSpec {
    let mut node = function_node(id, "unused", input_keys, output_keys);
    node.kind = NodeKind::LlmGenerate;
    node.function = None;
    node
}

#[tokio::test]
async fn linear_two_node_success_matches_the_named_scenario() {
    let mut functions = FunctionRegistry::new();
    functions.register_fn("greet", |input| async move {
        let name = input.get("name").and_then(Value::as_str).unwrap_or_default();
        Ok(IndexMap::from([("greeting".to_string(), json!(format!("Hello, {name}!")))]))
    });
    functions.register_fn("upper", |input| async move {
        let greeting = input.get("greeting").and_then(Value::as_str).unwrap_or_default();
        Ok(IndexMap::from([(
            "final_result".to_string(),
            json!(format!("{} WELCOME TO HIVE.", greeting.to_uppercase())),
        )]))
    });

    let mut greet = function_node("greet", "greet", &["name"], &["greeting"]);
    greet.is_entry = true;
    let mut upper = function_node("upper", "upper", &["greeting"], &["final_result"]);
    upper.is_terminal = true;

    let graph = GraphSpec {
        id: "linear".into(),
        goal_id: "goal-linear".into(),
        version: "1".into(),
        entry_node: "greet".into(),
        entry_points: HashMap::new(),
        terminal_nodes: ["upper".to_string()].into_iter().collect(),
        pause_nodes: HashSet::new(),
        nodes: vec![greet, upper],
        edges: vec![EdgeSpec { id: "e1".into(), source: "greet".into(), target: "upper".into(), condition: EdgeCondition::OnSuccess, priority: 0, guard: None }],
        default_model: None,
        max_tokens: None,
        max_retries_per_node: 3,
        default_tool_timeout_seconds: None,
    };

    let dir = tempfile::tempdir().unwrap();
    let storage = std::sync::Arc::new(hive_core::FsStorage::new(dir.path()));
    let runtime = AgentRuntime::new(
        HiveConfig::default(),
        storage,
        std::sync::Arc::new(ScriptedLlm::new(Vec::<String>::new())),
        std::sync::Arc::new(UnusedTools),
        std::sync::Arc::new(functions),
    );
    runtime.register_entry_point("main", std::sync::Arc::new(graph), None);

    let payload = IndexMap::from([("name".to_string(), json!("Alice"))]);
    let handle = runtime.trigger("main", payload).unwrap();
    let result = handle.wait(Some(Duration::from_secs(5))).await.unwrap();

    assert!(result.success);
    assert_eq!(result.path, vec!["greet".to_string(), "upper".to_string()]);
    assert_eq!(result.output.unwrap().get("final_result"), Some(&json!("HELLO, ALICE! WELCOME TO HIVE.")));

    runtime.shutdown().await;
}

#[tokio::test]
async fn router_branching_takes_the_fast_path_only() {
    let mut functions = FunctionRegistry::new();
    functions.register_fn("fast_path", |_input| async move { Ok(IndexMap::from([("handled_by".to_string(), json!("fast"))])) });
    functions.register_fn("normal_path", |_input| async move { Ok(IndexMap::from([("handled_by".to_string(), json!("normal"))])) });

    let mut parse = llm_generate_node("parse", &[], &["urgency"]);
    parse.is_entry = true;
    let mut fast = function_node("fast_path", "fast_path", &[], &["handled_by"]);
    fast.is_terminal = true;
    let mut normal = function_node("normal_path", "normal_path", &[], &["handled_by"]);
    normal.is_terminal = true;

    let graph = GraphSpec {
        id: "router".into(),
        goal_id: "goal-router".into(),
        version: "1".into(),
        entry_node: "parse".into(),
        entry_points: HashMap::new(),
        terminal_nodes: ["fast_path".to_string(), "normal_path".to_string()].into_iter().collect(),
        pause_nodes: HashSet::new(),
        nodes: vec![parse, fast, normal],
        edges: vec![
            EdgeSpec {
                id: "to-fast".into(),
                source: "parse".into(),
                target: "fast_path".into(),
                condition: EdgeCondition::Conditional,
                priority: 0,
                guard: Some("urgency == \"high\"".to_string()),
            },
            EdgeSpec {
                id: "to-normal".into(),
                source: "parse".into(),
                target: "normal_path".into(),
                condition: EdgeCondition::Conditional,
                priority: 1,
                guard: Some("urgency != \"high\"".to_string()),
            },
        ],
        default_model: None,
        max_tokens: None,
        max_retries_per_node: 3,
        default_tool_timeout_seconds: None,
    };

    let dir = tempfile::tempdir().unwrap();
    let storage = std::sync::Arc::new(hive_core::FsStorage::new(dir.path()));
    let runtime = AgentRuntime::new(
        HiveConfig::default(),
        storage,
        std::sync::Arc::new(ScriptedLlm::new([r#"{"urgency":"high"}"#])),
        std::sync::Arc::new(UnusedTools),
        std::sync::Arc::new(functions),
    );
    runtime.register_entry_point("main", std::sync::Arc::new(graph), None);

    let handle = runtime.trigger("main", IndexMap::new()).unwrap();
    let result = handle.wait(Some(Duration::from_secs(5))).await.unwrap();

    assert!(result.success);
    assert!(result.path.contains(&"fast_path".to_string()));
    assert!(!result.path.contains(&"normal_path".to_string()));

    runtime.shutdown().await;
}
