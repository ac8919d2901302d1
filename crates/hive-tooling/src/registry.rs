//! Named tool registry: dispatches by `tool_id` and enforces the caller's
//! per-call timeout around each invocation, matching the node kernel's
//! tool-use contract (spec.md §4.4.3 node > graph default > 30s chain
//! resolves before this trait is ever called — the timeout arrives
//! pre-resolved).

use async_trait::async_trait;
use hive_core::{ToolExecutor, ToolOutcome};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Adapts a plain closure into a [`Tool`].
pub struct FnTool<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, ToolError>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.f)(arguments).await
    }
}

#[derive(Clone, Default)]
pub struct NamedToolExecutor {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl NamedToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool_id: impl Into<String>, tool: Arc<dyn Tool>) {
        self.tools.insert(tool_id.into(), tool);
    }

    pub fn register_fn<F, Fut>(&mut self, tool_id: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(tool_id, Arc::new(FnTool { f }));
    }
}

#[async_trait]
impl ToolExecutor for NamedToolExecutor {
    async fn execute(&self, tool_id: &str, arguments: Value, timeout: Duration) -> ToolOutcome {
        let Some(tool) = self.tools.get(tool_id) else {
            return ToolOutcome::error("tool.not_found", format!("no tool registered for `{tool_id}`"));
        };

        match tokio::time::timeout(timeout, tool.call(arguments)).await {
            Ok(Ok(value)) => ToolOutcome::ok(value),
            Ok(Err(e)) => ToolOutcome::error("tool.failed", e.to_string()),
            Err(_) => {
                warn!(tool_id, timeout_ms = timeout.as_millis() as u64, "tool call timed out");
                ToolOutcome::error("tool.timeout", format!("tool `{tool_id}` exceeded its {timeout:?} deadline"))
            }
        }
    }
}
