//! Deterministic scripted provider.
//!
//! Hands back pre-recorded responses in call order instead of talking to a
//! model. Useful for integration tests that exercise the executor end to
//! end without a network dependency, and for local development against a
//! graph before a real provider is wired up.

use async_trait::async_trait;
use hive_core::{
    BoxStream, CompletionRequest, CompletionResponse, LLMProvider, LlmProviderError, StreamChunk, ToolCall, ToolDescription,
    ToolTurn,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted response. `Content` answers `complete`/`stream_complete`;
/// `Calls` answers `tool_complete` with one or more tool invocations the
/// node kernel should dispatch before the next scripted turn is consumed.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Content(String),
    Calls(Vec<ToolCall>),
}

/// Plays back a fixed queue of [`ScriptedTurn`]s, one per call, regardless
/// of which method is invoked or what the request contains.
pub struct MockLlmProvider {
    script: Mutex<VecDeque<ScriptedTurn>>,
}

impl MockLlmProvider {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self { script: Mutex::new(turns.into_iter().collect()) }
    }

    /// Convenience constructor for providers that only ever return prose.
    pub fn with_replies(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(replies.into_iter().map(|r| ScriptedTurn::Content(r.into())))
    }

    fn next_turn(&self) -> Result<ScriptedTurn, LlmProviderError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmProviderError::Provider("mock provider script exhausted".to_string()))
    }
}

#[async_trait]
impl LLMProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmProviderError> {
        let content = match self.next_turn()? {
            ScriptedTurn::Content(content) => content,
            ScriptedTurn::Calls(_) => return Err(LlmProviderError::Provider("mock script has a tool call queued, not prose".to_string())),
        };
        let tokens_in = request.messages.iter().map(|m| m.content.len() as u32 / 4).sum();
        Ok(CompletionResponse { tokens_out: content.len() as u32 / 4, content, tokens_in, stop_reason: "stop".to_string() })
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<Result<StreamChunk, LlmProviderError>>, LlmProviderError> {
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

    async fn tool_complete(&self, _request: CompletionRequest, _tools: Vec<ToolDescription>) -> Result<Vec<ToolTurn>, LlmProviderError> {
        match self.next_turn()? {
            ScriptedTurn::Content(content) => Ok(vec![ToolTurn::Content(content)]),
            ScriptedTurn::Calls(calls) => Ok(calls.into_iter().map(ToolTurn::ToolCall).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{Message, MessageRole};

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message { role: MessageRole::User, content: "hi".into(), tool_call_id: None }],
            system: None,
            model: "mock".into(),
            max_tokens: 64,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn replies_are_consumed_in_order() {
        let provider = MockLlmProvider::with_replies(["first", "second"]);
        let a = provider.complete(request()).await.unwrap();
        let b = provider.complete(request()).await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
    }

    #[tokio::test]
    async fn exhausted_script_is_a_provider_error() {
        let provider = MockLlmProvider::with_replies(Vec::<String>::new());
        assert!(provider.complete(request()).await.is_err());
    }

    #[tokio::test]
    async fn tool_complete_on_a_content_turn_wraps_in_tool_turn_content() {
        let provider = MockLlmProvider::with_replies(["done"]);
        let turns = provider.tool_complete(request(), vec![]).await.unwrap();
        assert!(matches!(turns.as_slice(), [ToolTurn::Content(c)] if c == "done"));
    }
}
