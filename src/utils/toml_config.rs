//! TOML-based configuration for crew
//!
//! This module provides declarative configuration for providers, models,
//! agents, tools, the research fan-out and delegated workers via a TOML file
//! (`crew.toml`).
//!
//! # Hot Reloading
//!
//! Configuration changes are automatically detected and applied at runtime.
//! Use `CrewConfigManager` for thread-safe access to the current configuration.
//! A run reads the configuration once when it starts; later reloads only
//! affect new runs.

use crate::agents::identity::stage_agents;
use crate::agents::WorkerIdentity;
use crate::workflows::fanout::FailurePolicy;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from crew.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Named LLM provider configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Named model configurations that reference providers
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,

    /// Tool configurations
    #[serde(default)]
    pub tools: HashMap<String, ToolConfig>,

    /// Agent configurations keyed by agent name (`planner`, `who`, ...)
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub delegation: DelegationConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum accepted request body, in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            body_limit: default_body_limit(),
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        default_model: String,
    },
    OpenAI {
        /// Environment variable containing API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        default_model: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

// ============= Model Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Reference to a provider name defined in [providers]
    pub provider: String,

    /// Model name/identifier to use with the provider
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,

    /// HTTP timeout for a single request to the provider
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_model_max_tokens() -> u32 {
    1024
}

fn default_request_timeout() -> u64 {
    120
}

// ============= Tool Configuration =============

/// Which capability backs a configured tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// daedra web search
    WebSearch,
    /// daedra page fetch
    FetchPage,
    /// HTTP service taking the argument object as its JSON body
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Backing capability. Inferred from the tool name or `url` when omitted.
    #[serde(default)]
    pub kind: Option<ToolKind>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,

    /// Per-call timeout; falls back to `[research].tool_timeout_secs`
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Endpoint for `remote` tools
    #[serde(default)]
    pub url: Option<String>,

    /// JSON schema of the argument object
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            kind: None,
            enabled: true,
            description: None,
            timeout_secs: None,
            url: None,
            parameters: None,
        }
    }
}

impl ToolConfig {
    /// Resolve the backing capability for the tool registered as `name`.
    pub fn resolved_kind(&self, name: &str) -> Option<ToolKind> {
        if let Some(kind) = self.kind {
            return Some(kind);
        }
        match name {
            "web_search" => Some(ToolKind::WebSearch),
            "fetch_page" => Some(ToolKind::FetchPage),
            _ if self.url.is_some() => Some(ToolKind::Remote),
            _ => None,
        }
    }
}

// ============= Agent Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Reference to a model name defined in [models]; the default model if unset
    #[serde(default)]
    pub model: Option<String>,

    /// Prompt template (minijinja syntax); the built-in template if unset
    #[serde(default)]
    pub prompt: Option<String>,

    /// List of tool names this agent can use
    #[serde(default)]
    pub tools: Vec<String>,

    /// Whether to execute one batch of tool calls concurrently
    #[serde(default)]
    pub parallel_tools: bool,
}

// ============= Research Configuration =============

/// How the Research stage runs its workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResearchMode {
    /// One in-process tool-calling loop per configured worker
    #[default]
    Parallel,
    /// A single `researcher` loop
    Sequential,
    /// Workers are remote services reached through `[delegation]`
    Delegated,
}

impl std::fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResearchMode::Parallel => "parallel",
            ResearchMode::Sequential => "sequential",
            ResearchMode::Delegated => "delegated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default = "default_workers")]
    pub workers: Vec<WorkerIdentity>,

    #[serde(default)]
    pub mode: ResearchMode,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Model used by agents that do not name one
    #[serde(default)]
    pub default_model: Option<String>,

    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_secs: u64,
}

fn default_workers() -> Vec<WorkerIdentity> {
    WorkerIdentity::ASPECTS.to_vec()
}

fn default_max_tool_iterations() -> usize {
    10
}

fn default_model_timeout() -> u64 {
    120
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_worker_timeout() -> u64 {
    600
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            mode: ResearchMode::default(),
            failure_policy: FailurePolicy::default(),
            default_model: None,
            max_tool_iterations: default_max_tool_iterations(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            worker_timeout_secs: default_worker_timeout(),
        }
    }
}

impl ResearchConfig {
    /// Workers actually launched for the configured mode.
    pub fn effective_workers(&self) -> Vec<WorkerIdentity> {
        match self.mode {
            ResearchMode::Sequential => vec![WorkerIdentity::Researcher],
            ResearchMode::Parallel | ResearchMode::Delegated => self.workers.clone(),
        }
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }
}

// ============= Delegation Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Base URL per worker identity, e.g. `who = "http://localhost:8001"`
    #[serde(default)]
    pub services: BTreeMap<String, String>,

    /// Fallback base URL for identities without their own entry
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_delegation_timeout")]
    pub timeout_secs: u64,
}

fn default_delegation_timeout() -> u64 {
    60
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            services: BTreeMap::new(),
            base_url: None,
            timeout_secs: default_delegation_timeout(),
        }
    }
}

impl DelegationConfig {
    /// Base URL serving `/run_<identity>` for a worker.
    pub fn service_url(&self, identity: WorkerIdentity) -> Option<&str> {
        self.services
            .iter()
            .find(|(name, _)| name.parse::<WorkerIdentity>().ok() == Some(identity))
            .map(|(_, url)| url.as_str())
            .or(self.base_url.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    UnusedProvider,
    UnusedModel,
    UnusedTool,
    UnusedAgent,
    UnavailableTool,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Provider '{0}' referenced by model '{1}' does not exist")]
    MissingProvider(String, String),

    #[error("Model '{0}' referenced by agent '{1}' does not exist")]
    MissingModel(String, String),

    #[error("Tool '{0}' referenced by agent '{1}' does not exist")]
    MissingTool(String, String),

    #[error("No delegation service URL configured for worker '{0}'")]
    MissingServiceUrl(WorkerIdentity),

    #[error("Prompt template for agent '{0}' is invalid: {1}")]
    InvalidTemplate(String, String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl std::str::FromStr for CrewConfig {
    type Err = ConfigError;

    /// Parse and validate configuration text.
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: CrewConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl CrewConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        content.parse()
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        for provider in self.providers.values() {
            if let ProviderConfig::OpenAI { api_key_env, .. } = provider {
                self.validate_env_var(api_key_env)?;
            }
        }

        // Validate model -> provider references
        for (model_name, model_config) in &self.models {
            if !self.providers.contains_key(&model_config.provider) {
                return Err(ConfigError::MissingProvider(
                    model_config.provider.clone(),
                    model_name.clone(),
                ));
            }
        }

        if let Some(ref default_model) = self.research.default_model {
            if !self.models.contains_key(default_model) {
                return Err(ConfigError::MissingModel(
                    default_model.clone(),
                    "[research].default_model".to_string(),
                ));
            }
        }

        // Validate agent -> model, agent -> tools and template syntax
        for (agent_name, agent_config) in &self.agents {
            if let Some(ref model) = agent_config.model {
                if !self.models.contains_key(model) {
                    return Err(ConfigError::MissingModel(model.clone(), agent_name.clone()));
                }
            }

            for tool_name in &agent_config.tools {
                if !self.tools.contains_key(tool_name) {
                    return Err(ConfigError::MissingTool(
                        tool_name.clone(),
                        agent_name.clone(),
                    ));
                }
            }

            if let Some(ref prompt) = agent_config.prompt {
                let env = minijinja::Environment::new();
                if let Err(e) = env.template_from_str(prompt) {
                    return Err(ConfigError::InvalidTemplate(
                        agent_name.clone(),
                        e.to_string(),
                    ));
                }
            }
        }

        for (tool_name, tool_config) in &self.tools {
            match tool_config.resolved_kind(tool_name) {
                None => {
                    return Err(ConfigError::ValidationError(format!(
                        "Tool '{}' has no kind and no url",
                        tool_name
                    )));
                }
                Some(ToolKind::Remote) if tool_config.url.is_none() => {
                    return Err(ConfigError::ValidationError(format!(
                        "Remote tool '{}' requires a url",
                        tool_name
                    )));
                }
                Some(_) => {}
            }
            if tool_config.timeout_secs == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "Tool '{}' has a zero timeout",
                    tool_name
                )));
            }
        }

        self.validate_research()?;

        Ok(())
    }

    fn validate_research(&self) -> Result<(), ConfigError> {
        let research = &self.research;

        if research.mode != ResearchMode::Sequential {
            if research.workers.is_empty() {
                return Err(ConfigError::ValidationError(
                    "[research].workers must name at least one worker".to_string(),
                ));
            }
            let mut seen = HashSet::new();
            for worker in &research.workers {
                if !seen.insert(*worker) {
                    return Err(ConfigError::ValidationError(format!(
                        "Worker '{}' is listed more than once in [research].workers",
                        worker
                    )));
                }
            }
        }

        if research.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "[research].max_tool_iterations must be at least 1".to_string(),
            ));
        }

        for (name, secs) in [
            ("model_timeout_secs", research.model_timeout_secs),
            ("tool_timeout_secs", research.tool_timeout_secs),
            ("worker_timeout_secs", research.worker_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "[research].{} must be greater than zero",
                    name
                )));
            }
        }

        for name in self.delegation.services.keys() {
            if name.parse::<WorkerIdentity>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "[delegation].services has unknown worker '{}'",
                    name
                )));
            }
        }

        if research.mode == ResearchMode::Delegated {
            for worker in &research.workers {
                if self.delegation.service_url(*worker).is_none() {
                    return Err(ConfigError::MissingServiceUrl(*worker));
                }
            }
        }

        Ok(())
    }

    /// Validate configuration with warnings for unused items
    ///
    /// Returns Ok with warnings, or Err if validation fails
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(self.check_unused_providers());
        warnings.extend(self.check_unused_models());
        warnings.extend(self.check_unused_tools());
        warnings.extend(self.check_unused_agents());
        warnings.extend(self.check_unavailable_tools());

        Ok(warnings)
    }

    /// Check for providers that aren't referenced by any model
    fn check_unused_providers(&self) -> Vec<ConfigWarning> {
        let referenced: HashSet<_> = self.models.values().map(|m| m.provider.as_str()).collect();

        self.providers
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedProvider,
                message: format!(
                    "Provider '{}' is defined but not referenced by any model",
                    name
                ),
            })
            .collect()
    }

    /// Check for models that nothing resolves to
    fn check_unused_models(&self) -> Vec<ConfigWarning> {
        let mut referenced: HashSet<&str> = self
            .agents
            .values()
            .filter_map(|a| a.model.as_deref())
            .collect();
        if let Some(default_model) = self.default_model() {
            referenced.insert(default_model);
        }

        self.models
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedModel,
                message: format!(
                    "Model '{}' is defined but not referenced by any agent",
                    name
                ),
            })
            .collect()
    }

    /// Check for tools that aren't referenced by any agent
    fn check_unused_tools(&self) -> Vec<ConfigWarning> {
        let referenced: HashSet<_> = self
            .agents
            .values()
            .flat_map(|a| a.tools.iter().map(|t| t.as_str()))
            .collect();

        self.tools
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedTool,
                message: format!("Tool '{}' is defined but not referenced by any agent", name),
            })
            .collect()
    }

    /// Check for agents that are neither a stage agent nor a launched worker
    fn check_unused_agents(&self) -> Vec<ConfigWarning> {
        let mut used: HashSet<&str> = [
            stage_agents::PLANNER,
            stage_agents::WRITER,
            stage_agents::REVIEWER,
        ]
        .into_iter()
        .collect();
        let workers = self.research.effective_workers();
        used.extend(workers.iter().map(|w| w.agent_name()));

        self.agents
            .keys()
            .filter(|name| !used.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedAgent,
                message: format!(
                    "Agent '{}' is defined but is not a pipeline agent or a configured worker",
                    name
                ),
            })
            .collect()
    }

    /// Check for tools whose backing feature is compiled out
    fn check_unavailable_tools(&self) -> Vec<ConfigWarning> {
        if cfg!(feature = "web-search") {
            return Vec::new();
        }
        self.tools
            .iter()
            .filter(|(name, config)| {
                matches!(
                    config.resolved_kind(name),
                    Some(ToolKind::WebSearch) | Some(ToolKind::FetchPage)
                )
            })
            .map(|(name, _)| ConfigWarning {
                kind: ConfigWarningKind::UnavailableTool,
                message: format!(
                    "Tool '{}' needs the 'web-search' feature and will not be registered",
                    name
                ),
            })
            .collect()
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    /// Get a resolved value from an env var reference
    pub fn resolve_env(&self, env_name: &str) -> Option<String> {
        std::env::var(env_name).ok()
    }

    /// Get provider by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Get model by name
    pub fn get_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Get agent config by name
    pub fn get_agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }

    /// Get tool config by name
    pub fn get_tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.get(name)
    }

    /// Model used by agents without an explicit `model`.
    ///
    /// `[research].default_model`, else a model named `default`, else the
    /// alphabetically first model.
    pub fn default_model(&self) -> Option<&str> {
        if let Some(ref name) = self.research.default_model {
            return Some(name.as_str());
        }
        if self.models.contains_key("default") {
            return Some("default");
        }
        self.models.keys().map(|k| k.as_str()).min()
    }

    /// Model an agent resolves to.
    pub fn agent_model(&self, agent_name: &str) -> Option<&str> {
        self.get_agent(agent_name)
            .and_then(|a| a.model.as_deref())
            .or_else(|| self.default_model())
    }

    /// Get all enabled tools
    pub fn enabled_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tools
            .iter()
            .filter(|(_, config)| config.enabled)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Get all enabled tools for an agent, in declaration order
    pub fn agent_tools(&self, agent_name: &str) -> Vec<&str> {
        self.get_agent(agent_name)
            .map(|agent| {
                agent
                    .tools
                    .iter()
                    .filter(|t| self.get_tool(t).map(|tc| tc.enabled).unwrap_or(false))
                    .map(|s| s.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Timeout applied to one call of the named tool.
    pub fn tool_timeout(&self, tool_name: &str) -> Duration {
        self.get_tool(tool_name)
            .and_then(|t| t.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.research.tool_timeout())
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct CrewConfigManager {
    config: Arc<ArcSwap<CrewConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
    reload_tx: Option<mpsc::UnboundedSender<()>>,
}

impl CrewConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute paths keep the watcher stable across cwd changes
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = CrewConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
            reload_tx: None,
        })
    }

    /// Create a config manager directly from a config (useful for testing)
    /// This won't have file watching capabilities.
    pub fn from_config(config: CrewConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("crew.toml"),
            watcher: RwLock::new(None),
            reload_tx: None,
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<CrewConfig> {
        self.config.load_full()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = CrewConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&mut self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        self.reload_tx = Some(tx.clone());

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        // Debounced in the receiver
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Editors replace files, so watch the parent directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|t| t.elapsed() < debounce_duration) {
                    continue;
                }

                // Let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match CrewConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Clone for CrewConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None), // Watcher is not cloned
            reload_tx: self.reload_tx.clone(),
        }
    }
}
