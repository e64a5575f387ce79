//! OpenAI-compatible chat completions client.
//!
//! Speaks `POST {api_base}/chat/completions` directly over reqwest, so it
//! works against OpenAI, OpenRouter, vLLM and Ollama's `/v1` endpoint alike.

use crate::llm::client::{LLMClient, LLMResponse, ModelParams};
use crate::llm::transcript::Message;
use crate::types::{AppError, Result, ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
    params: ModelParams,
}

impl OpenAIClient {
    pub fn new(
        api_key: Option<String>,
        api_base: String,
        model: String,
        params: ModelParams,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(params.timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.is_empty()),
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            params,
        })
    }

    fn build_request(&self, prompt: &str, history: &[Message], tools: &[ToolDefinition]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage::user(prompt));
        messages.extend(history.iter().map(WireMessage::from));

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<LLMResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(format!("Model request to {} timed out", url))
            } else {
                AppError::LLM(format!("Model request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LLM(format!(
                "Model endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Invalid model response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLM("Model response contained no choices".to_string()))?;

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .into_iter()
            .map(ToolCallRequest::from)
            .collect();

        let finish_reason = choice.finish_reason.unwrap_or_else(|| {
            if tool_calls.is_empty() {
                "stop".to_string()
            } else {
                "tool_calls".to_string()
            }
        });

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason,
        })
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self.build_request(prompt, &[], &[]);
        Ok(self.send(&request).await?.content)
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let request = self.build_request(prompt, history, tools);
        self.send(&request).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============= Wire Types =============

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        match message {
            Message::Model { content } => Self {
                role: "assistant".to_string(),
                content: Some(content.clone()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
            Message::ModelToolCalls { calls } => Self {
                role: "assistant".to_string(),
                content: None,
                tool_calls: calls.iter().map(WireToolCall::from).collect(),
                tool_call_id: None,
            },
            Message::Tool { call_id, output } => Self {
                role: "tool".to_string(),
                content: Some(output.clone()),
                tool_calls: Vec::new(),
                tool_call_id: Some(call_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// A JSON-encoded string for OpenAI, sometimes a bare object elsewhere.
    #[serde(default)]
    arguments: Value,
}

impl From<&ToolCallRequest> for WireToolCall {
    fn from(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: Value::String(call.arguments.to_string()),
            },
        }
    }
}

impl From<WireToolCall> for ToolCallRequest {
    fn from(call: WireToolCall) -> Self {
        let arguments = match call.function.arguments {
            Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
            Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        ToolCallRequest {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireToolSchema,
}

#[derive(Debug, Serialize)]
struct WireToolSchema {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: function_kind(),
            function: WireToolSchema {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}
