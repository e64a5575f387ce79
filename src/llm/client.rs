//! LLM Client abstractions and provider management
//!
//! This module provides a unified interface for the model collaborator:
//! a prompt (plus the loop transcript so far) goes in, and either free text
//! or a batch of tool-call requests comes out.
//!
//! Both supported provider kinds speak the OpenAI-compatible chat
//! completions protocol:
//! - **OpenAI**: `https://api.openai.com/v1` or any compatible gateway
//! - **Ollama**: the local server's `/v1` endpoint

use crate::llm::transcript::Message;
use crate::types::{AppError, Result, ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Generic LLM client trait for provider abstraction
///
/// All LLM providers implement this trait, allowing for easy swapping
/// between providers without changing application code.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with tool calling support.
    ///
    /// `history` is the calling loop's transcript after the prompt. An empty
    /// `tools` slice means the call is not tool-capable.
    async fn generate_with_tools(
        &self,
        prompt: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Response from an LLM generation request
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// The text content of the response
    pub content: String,
    /// Any tool calls requested by the model
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason generation stopped (e.g., "stop", "tool_calls", "length")
    pub finish_reason: String,
}

impl LLMResponse {
    /// A plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
        }
    }

    /// A reply requesting tool calls.
    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
            finish_reason: "tool_calls".to_string(),
        }
    }
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including Azure OpenAI and compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    ///     params: ModelParams::default(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
        params: ModelParams,
    },

    /// Ollama local LLM provider, reached through its OpenAI-compatible API
    ///
    /// Tool calling requires model support (e.g., llama3.1+, mistral-nemo, qwen2.5).
    Ollama {
        base_url: String,
        model: String,
        params: ModelParams,
    },
}

/// Sampling and transport parameters applied to every request.
#[derive(Debug, Clone)]
pub struct ModelParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
        }
    }
}

impl Provider {
    /// Create a client instance for this provider
    pub fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                params,
            } => Ok(Arc::new(super::openai::OpenAIClient::new(
                Some(api_key.clone()),
                api_base.clone(),
                model.clone(),
                params.clone(),
            )?)),

            Provider::Ollama {
                base_url,
                model,
                params,
            } => {
                let api_base = format!("{}/v1", base_url.trim_end_matches('/'));
                Ok(Arc::new(super::openai::OpenAIClient::new(
                    None,
                    api_base,
                    model.clone(),
                    params.clone(),
                )?))
            }
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}

/// Factory for the clients used by each agent.
///
/// The server resolves clients from `crew.toml`; tests substitute a factory
/// that hands out scripted clients.
#[async_trait]
pub trait LLMClientFactoryTrait: Send + Sync {
    /// Client for the default model
    async fn create_default(&self) -> Result<Arc<dyn LLMClient>>;

    /// Client for a named model from the `[models]` table
    async fn create_for_model(&self, model: &str) -> Result<Arc<dyn LLMClient>>;
}

/// Factory with a single fixed provider.
pub struct LLMClientFactory {
    default_provider: Provider,
}

impl LLMClientFactory {
    /// Create a new factory with the specified default provider
    pub fn new(default_provider: Provider) -> Self {
        Self { default_provider }
    }

    /// Get a reference to the default provider
    pub fn default_provider(&self) -> &Provider {
        &self.default_provider
    }
}

#[async_trait]
impl LLMClientFactoryTrait for LLMClientFactory {
    async fn create_default(&self) -> Result<Arc<dyn LLMClient>> {
        self.default_provider.create_client()
    }

    async fn create_for_model(&self, model: &str) -> Result<Arc<dyn LLMClient>> {
        if model != self.default_provider.model() {
            return Err(AppError::Configuration(format!(
                "Model '{}' is not served by this factory (default is '{}')",
                model,
                self.default_provider.model()
            )));
        }
        self.default_provider.create_client()
    }
}
