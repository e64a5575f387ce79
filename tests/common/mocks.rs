//! Mock implementations for testing.
//!
//! Scripted LLM clients and stub tools shared by the integration tests, so
//! no test ever talks to a real model or search engine.
#![allow(dead_code)]

use async_trait::async_trait;
use crew::agents::{AgentInvoker, PromptLibrary, WorkerIdentity};
use crew::llm::{LLMClient, LLMClientFactoryTrait, LLMResponse, Message};
use crew::tools::registry::{Tool, ToolError, ToolRegistry};
use crew::types::{AppError, Result, ToolCallRequest, ToolDefinition};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Script = dyn Fn(&str, &[Message], &[ToolDefinition]) -> Result<LLMResponse> + Send + Sync;

/// Which agent a rendered default prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Planner,
    Worker(WorkerIdentity),
    Writer,
    Reviewer,
    Unknown,
}

/// Classify a prompt rendered from the built-in templates.
pub fn caller_of(prompt: &str) -> Caller {
    if prompt.starts_with("Create a research plan") {
        return Caller::Planner;
    }
    if prompt.starts_with("Write a research report") {
        return Caller::Writer;
    }
    if prompt.starts_with("Review and revise") {
        return Caller::Reviewer;
    }
    prompt
        .strip_prefix("You are the '")
        .and_then(|rest| rest.split('\'').next())
        .and_then(|name| name.parse().ok())
        .map(Caller::Worker)
        .unwrap_or(Caller::Unknown)
}

/// Number of tool results already in a loop's history.
pub fn tool_results(history: &[Message]) -> usize {
    history
        .iter()
        .filter(|m| matches!(m, Message::Tool { .. }))
        .count()
}

/// Output of the most recent tool result in a loop's history.
pub fn last_tool_output(history: &[Message]) -> Option<&str> {
    history.iter().rev().find_map(|m| match m {
        Message::Tool { output, .. } => Some(output.as_str()),
        _ => None,
    })
}

/// Tool-call reply with a single call.
pub fn call(id: &str, tool: &str, arguments: Value) -> LLMResponse {
    LLMResponse::tool_calls(vec![ToolCallRequest::new(id, tool, arguments)])
}

/// LLM client whose every reply is computed by a closure over
/// `(prompt, history, tools)`.
pub struct ScriptedLLMClient {
    script: Box<Script>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedLLMClient {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &[Message], &[ToolDefinition]) -> Result<LLMResponse> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Always answer with the same text.
    pub fn constant(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_, _, _| Ok(LLMResponse::text(answer.clone())))
    }

    /// Canonical happy path: planner, workers answering `"<identity> findings"`,
    /// writer and reviewer stubs.
    pub fn research_crew() -> Self {
        Self::new(|prompt, _, _| {
            let text = match caller_of(prompt) {
                Caller::Planner => "PLAN: cover who, what, when, where, how, why".to_string(),
                Caller::Worker(identity) => format!("{} findings", identity),
                Caller::Writer => format!("DRAFT based on:\n{}", research_section(prompt)),
                Caller::Reviewer => format!("FINAL REPORT\n{}", draft_section(prompt)),
                Caller::Unknown => "unexpected prompt".to_string(),
            };
            Ok(LLMResponse::text(text))
        })
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn research_section(prompt: &str) -> &str {
    prompt
        .split_once("Research findings:\n")
        .map(|(_, rest)| rest)
        .unwrap_or_default()
}

fn draft_section(prompt: &str) -> &str {
    prompt
        .split_once("Draft:\n")
        .and_then(|(_, rest)| rest.split("\n\nReturn the final report.").next())
        .unwrap_or_default()
}

#[async_trait]
impl LLMClient for ScriptedLLMClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(self.generate_with_tools(prompt, &[], &[]).await?.content)
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(prompt, history, tools)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Factory handing out the same scripted client for every model.
pub struct MockLLMFactory {
    client: Arc<dyn LLMClient>,
}

impl MockLLMFactory {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LLMClientFactoryTrait for MockLLMFactory {
    async fn create_default(&self) -> Result<Arc<dyn LLMClient>> {
        Ok(Arc::clone(&self.client))
    }

    async fn create_for_model(&self, _model: &str) -> Result<Arc<dyn LLMClient>> {
        Ok(Arc::clone(&self.client))
    }
}

/// Invoker over a scripted client with the built-in prompts.
pub fn invoker(client: ScriptedLLMClient) -> Arc<AgentInvoker> {
    Arc::new(AgentInvoker::new(
        Arc::new(client),
        Arc::new(PromptLibrary::with_defaults()),
    ))
}

/// Returns `"<prefix>: <query>"`.
pub struct EchoTool {
    name: String,
    prefix: String,
}

impl EchoTool {
    pub fn new(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo the query back"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> std::result::Result<Value, ToolError> {
        let query = args["query"].as_str().unwrap_or_default();
        Ok(Value::String(format!("{}: {}", self.prefix, query)))
    }
}

/// Always fails with the given message.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A tool that always fails"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> std::result::Result<Value, ToolError> {
        Err(ToolError::failed(&self.name, self.message.clone()))
    }
}

/// Sleeps before answering `"slept"`.
pub struct SlowTool {
    name: String,
    delay: Duration,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A tool that takes its time"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> std::result::Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::String("slept".to_string()))
    }
}

/// Registry with an echoing `web_search` and a failing `fetch_page`.
pub fn stub_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool::new("web_search", "results")));
    registry.register(Arc::new(FailingTool::new("fetch_page", "connection refused")));
    Arc::new(registry)
}

/// Model failure helper for scripts.
pub fn llm_error(message: &str) -> AppError {
    AppError::LLM(message.to_string())
}
