//! Generic OpenAI-compatible HTTP provider.
//!
//! Targets the `/chat/completions` wire format shared by OpenAI itself and
//! by the local servers people point hive at during development (Ollama,
//! LM Studio, vLLM). Vendor-specific quirks (thinking-model markers,
//! provider-specific headers) are deliberately not handled here — that's
//! what a vendor adapter crate is for.

use async_trait::async_trait;
use hive_core::{
    BoxStream, CompletionRequest, CompletionResponse, LLMProvider, LlmProviderError, Message, MessageRole, StreamChunk, ToolCall,
    ToolDescription, ToolTurn,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpLlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpLlmConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: None, timeout: Duration::from_secs(60) }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

pub struct HttpLlmProvider {
    config: HttpLlmConfig,
    client: Client,
}

impl HttpLlmProvider {
    pub fn new(config: HttpLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    fn convert_message(msg: &Message) -> WireMessage {
        WireMessage {
            role: match msg.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => "tool",
            }
            .to_string(),
            content: Some(msg.content.clone()),
            tool_call_id: msg.tool_call_id.clone(),
            tool_calls: None,
        }
    }

    fn build_messages(&self, request: &CompletionRequest) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage { role: "system".into(), content: Some(system.clone()), tool_call_id: None, tool_calls: None });
        }
        messages.extend(request.messages.iter().map(Self::convert_message));
        messages
    }

    async fn send(&self, body: WireRequest<'_>) -> Result<WireResponse, LlmProviderError> {
        let mut req = self.client.post(format!("{}/chat/completions", self.config.base_url)).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| LlmProviderError::Provider(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmProviderError::Provider(format!("http provider returned {status}: {text}")));
        }
        response.json().await.map_err(|e| LlmProviderError::Provider(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl LLMProvider for HttpLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmProviderError> {
        let wire_messages = self.build_messages(&request);
        let body = WireRequest {
            model: &request.model,
            messages: wire_messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: None,
        };
        let response = self.send(body).await?;
        let choice = response.choices.into_iter().next().ok_or_else(|| LlmProviderError::Provider("empty choices array".to_string()))?;
        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            tokens_in: response.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            tokens_out: response.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            stop_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }

    async fn stream_complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<BoxStream<Result<StreamChunk, LlmProviderError>>, LlmProviderError> {
        Err(LlmProviderError::Provider("streaming is not implemented for the generic HTTP provider".to_string()))
    }

    async fn tool_complete(&self, request: CompletionRequest, tools: Vec<ToolDescription>) -> Result<Vec<ToolTurn>, LlmProviderError> {
        let wire_messages = self.build_messages(&request);
        let wire_tools: Vec<WireTool> = tools
            .into_iter()
            .map(|t| WireTool { kind: "function".into(), function: WireFunctionDescription { name: t.name, description: t.description, parameters: t.parameters_schema } })
            .collect();
        let body = WireRequest { model: &request.model, messages: wire_messages, temperature: request.temperature, max_tokens: request.max_tokens, tools: Some(wire_tools) };
        let response = self.send(body).await?;
        let choice = response.choices.into_iter().next().ok_or_else(|| LlmProviderError::Provider("empty choices array".to_string()))?;

        match choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => Ok(calls
                .into_iter()
                .map(|c| {
                    ToolTurn::ToolCall(ToolCall {
                        id: c.id,
                        name: c.function.name,
                        arguments: serde_json::from_str(&c.function.arguments).unwrap_or(serde_json::Value::Null),
                    })
                })
                .collect()),
            _ => Ok(vec![ToolTurn::Content(choice.message.content.unwrap_or_default())]),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionDescription,
}

#[derive(Debug, Serialize)]
struct WireFunctionDescription {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
