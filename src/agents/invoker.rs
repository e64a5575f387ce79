//! Single model call on behalf of a named agent.
//!
//! The invoker renders the agent's prompt, calls the agent's model once
//! (optionally with a bound tool set) and classifies the reply.

use crate::agents::prompt::{PromptContext, PromptLibrary};
use crate::llm::{LLMClient, LLMClientFactoryTrait, Message};
use crate::types::{AppError, Result, ToolCallRequest, ToolDefinition};
use crate::utils::toml_config::CrewConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

/// Classified model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    FinalAnswer(String),
    ToolCallBatch(Vec<ToolCallRequest>),
}

pub struct AgentInvoker {
    default_client: Arc<dyn LLMClient>,
    /// Agents configured with their own model
    clients: HashMap<String, Arc<dyn LLMClient>>,
    prompts: Arc<PromptLibrary>,
    model_timeout: Duration,
}

impl AgentInvoker {
    pub fn new(default_client: Arc<dyn LLMClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            default_client,
            clients: HashMap::new(),
            prompts,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    /// Resolve prompts and per-agent clients from configuration.
    pub async fn from_config(
        config: &CrewConfig,
        factory: &dyn LLMClientFactoryTrait,
    ) -> Result<Self> {
        let prompts = Arc::new(PromptLibrary::from_config(config)?);
        let mut invoker = Self::new(factory.create_default().await?, prompts)
            .with_model_timeout(config.research.model_timeout());

        for (agent, agent_config) in &config.agents {
            if let Some(ref model) = agent_config.model {
                let client = factory.create_for_model(model).await?;
                invoker.clients.insert(agent.clone(), client);
            }
        }

        Ok(invoker)
    }

    pub fn with_client(mut self, agent: impl Into<String>, client: Arc<dyn LLMClient>) -> Self {
        self.clients.insert(agent.into(), client);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    fn client_for(&self, agent: &str) -> &Arc<dyn LLMClient> {
        self.clients.get(agent).unwrap_or(&self.default_client)
    }

    /// Render the agent's template and make exactly one model call.
    ///
    /// With an empty `tools` slice the reply is always a final answer, even
    /// if the model asked for tools.
    pub async fn invoke(
        &self,
        agent: &str,
        context: &PromptContext,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AgentReply> {
        let prompt = self.prompts.render(agent, context)?;
        let client = self.client_for(agent);

        debug!(
            agent,
            model = client.model_name(),
            tools = tools.len(),
            history = history.len(),
            "invoking model"
        );

        let response = tokio::time::timeout(
            self.model_timeout,
            client.generate_with_tools(&prompt, history, tools),
        )
        .await
        .map_err(|_| {
            AppError::Timeout(format!(
                "model call for agent '{}' exceeded {:?}",
                agent, self.model_timeout
            ))
        })??;

        if tools.is_empty() || response.tool_calls.is_empty() {
            Ok(AgentReply::FinalAnswer(response.content))
        } else {
            Ok(AgentReply::ToolCallBatch(response.tool_calls))
        }
    }
}
