//! `ToolExecutor` collaborator interface (spec.md §6).
//!
//! The specific tool catalogue (web scrape, filesystem, CRM, ...) is out of
//! scope (spec.md §1); the core only consumes this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub ok: bool,
    pub value: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl ToolOutcome {
    pub fn ok(value: serde_json::Value) -> Self {
        Self { ok: true, value: Some(value), error_kind: None, error_message: None }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            error_kind: Some(kind.into()),
            error_message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_id: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> ToolOutcome;
}
