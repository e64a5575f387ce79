//! # crew - multi-agent research orchestrator
//!
//! Turns a topic into a reviewed research report. A planner drafts a plan,
//! six aspect workers (who, what, when, where, how, why) research it
//! concurrently with tool-calling loops, their findings are merged into one
//! research context, and a writer and a reviewer produce the final report.
//!
//! ## Overview
//!
//! crew can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `crew-server` binary
//! 2. **As a library** - Embed the pipeline in your own Rust project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use crew::{CrewConfigManager, ConfigBasedLLMFactory, ToolRegistry, WorkflowEngine};
//! use crew::types::ResearchRequest;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = CrewConfigManager::new("crew.toml")?;
//! let config = manager.config();
//! let factory = ConfigBasedLLMFactory::from_config(&config)?;
//! let tools = Arc::new(ToolRegistry::from_config(&config)?);
//!
//! let engine = WorkflowEngine::from_config(&config, &factory, tools).await?;
//! let state = engine
//!     .run(&ResearchRequest::new("Quantum Machine Learning"), None, &CancellationToken::new())
//!     .await?;
//! println!("{}", state.final_report().unwrap_or_default());
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `web-search` | `web_search` and `fetch_page` tools via daedra (default) |
//! | `swagger-ui` | Interactive API docs at `/swagger-ui/` |
//!
//! ## Modules
//!
//! - [`agents`] - Worker identities, prompt templates and the model invoker
//! - [`api`] - REST API handlers and routes
//! - [`llm`] - OpenAI-compatible model client and provider registry
//! - [`tools`] - Tool trait, registry and built-in tools
//! - [`workflows`] - Tool-calling loop, fan-out and the stage pipeline
//! - [`types`] - Common types and error handling
//! - [`utils`] - `crew.toml` configuration with hot reload

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Worker identities, prompts and the agent invoker.
pub mod agents;
/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface definitions and output helpers.
pub mod cli;
/// LLM provider clients and abstractions.
pub mod llm;
/// Tool registry and built-in tools.
pub mod tools;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;
/// Research pipeline: tool loop, fan-out and stages.
pub mod workflows;

// Re-export commonly used types
pub use agents::{AgentInvoker, PromptLibrary, WorkerIdentity};
pub use llm::client::LLMClientFactoryTrait;
pub use llm::{
    ConfigBasedLLMFactory, LLMClient, LLMClientFactory, LLMResponse, Provider, ProviderRegistry,
};
pub use tools::registry::ToolRegistry;
pub use types::{AppError, Result};
pub use utils::toml_config::{CrewConfig, CrewConfigManager};
pub use workflows::{Stage, StageEvent, WorkflowEngine, WorkflowState};

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config_manager: Arc<CrewConfigManager>,
    /// LLM client factory
    pub llm_factory: Arc<dyn LLMClientFactoryTrait>,
    /// Tool registry shared by every worker loop
    pub tool_registry: Arc<ToolRegistry>,
}

impl AppState {
    /// Build a workflow engine from the current configuration.
    ///
    /// Called per request so that a reloaded `crew.toml` (prompts, limits,
    /// research mode) applies to the next run.
    pub async fn engine(&self) -> Result<WorkflowEngine> {
        let config = self.config_manager.config();
        WorkflowEngine::from_config(
            &config,
            self.llm_factory.as_ref(),
            Arc::clone(&self.tool_registry),
        )
        .await
    }
}
