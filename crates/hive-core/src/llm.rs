//! `LLMProvider` collaborator interface (spec.md §6).
//!
//! The core never talks to a vendor directly; it calls this trait. Vendor
//! adapters are out of scope (spec.md §1) — `hive-llm` supplies reference
//! implementations for local development and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Present on `Tool`-role messages carrying a result back to the model.
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into(), tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into(), tool_call_id: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: MessageRole::Tool, content: content.into(), tool_call_id: Some(tool_call_id.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub is_complete: bool,
    pub stop_reason: Option<String>,
}

/// One turn of a tool-calling conversation: either prose, or a tool call the
/// node kernel must dispatch and feed back (spec.md §4.4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolTurn {
    Content(String),
    ToolCall(ToolCall),
}

#[derive(Debug, thiserror::Error)]
pub enum LlmProviderError {
    #[error("llm provider error: {0}")]
    Provider(String),
    #[error("llm request timed out")]
    Timeout,
}

pub type BoxStream<T> = std::pin::Pin<Box<dyn futures::Stream<Item = T> + Send>>;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmProviderError>;

    async fn stream_complete(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<Result<StreamChunk, LlmProviderError>>, LlmProviderError>;

    async fn tool_complete(
        &self,
        request: CompletionRequest,
        tools: Vec<ToolDescription>,
    ) -> Result<Vec<ToolTurn>, LlmProviderError>;
}
