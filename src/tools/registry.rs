use crate::types::ToolDefinition;
use crate::utils::toml_config::{CrewConfig, ToolKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-call timeout for tools registered without one.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure of a single tool call. Recoverable: the calling loop reports it
/// back to the model and carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool '{tool}' timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

impl ToolError {
    pub fn invalid_arguments(tool: &str, message: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    pub fn failed(tool: &str, message: impl Into<String>) -> Self {
        ToolError::Failed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

struct Registration {
    tool: Arc<dyn Tool>,
    timeout: Duration,
    description: Option<String>,
}

/// Name → capability map, built once at startup and shared read-only.
pub struct ToolRegistry {
    tools: HashMap<String, Registration>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a new registry with the default web tools (search, page fetch)
    #[cfg(feature = "web-search")]
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::tools::search::SearchTool::new()));
        registry.register(Arc::new(crate::tools::search::FetchPageTool::new()));
        registry
    }

    /// Build the registry from the enabled `[tools]` entries.
    pub fn from_config(config: &CrewConfig) -> crate::types::Result<Self> {
        let mut registry = Self::new();

        for name in config.enabled_tools() {
            let Some(tool_config) = config.get_tool(name) else {
                continue;
            };
            let timeout = config.tool_timeout(name);

            let tool: Arc<dyn Tool> = match tool_config.resolved_kind(name) {
                Some(ToolKind::Remote) => Arc::new(crate::tools::remote::RemoteTool::from_config(
                    name,
                    tool_config,
                )?),
                #[cfg(feature = "web-search")]
                Some(ToolKind::WebSearch) => Arc::new(
                    crate::tools::search::SearchTool::new().with_name(name),
                ),
                #[cfg(feature = "web-search")]
                Some(ToolKind::FetchPage) => Arc::new(
                    crate::tools::search::FetchPageTool::new().with_name(name),
                ),
                #[cfg(not(feature = "web-search"))]
                Some(ToolKind::WebSearch) | Some(ToolKind::FetchPage) => {
                    warn!(tool = name, "web-search feature disabled; tool not registered");
                    continue;
                }
                None => {
                    warn!(tool = name, "tool has no kind and no url; not registered");
                    continue;
                }
            };

            registry.register_with_timeout(tool, timeout);
            if let Some(ref description) = tool_config.description {
                if let Some(reg) = registry.tools.get_mut(name) {
                    reg.description = Some(description.clone());
                }
            }
        }

        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.register_with_timeout(tool, DEFAULT_TOOL_TIMEOUT);
    }

    pub fn register_with_timeout(&mut self, tool: Arc<dyn Tool>, timeout: Duration) {
        self.tools.insert(
            tool.name().to_string(),
            Registration {
                tool,
                timeout,
                description: None,
            },
        );
    }

    fn definition(name: &str, reg: &Registration) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: reg
                .description
                .clone()
                .unwrap_or_else(|| reg.tool.description().to_string()),
            parameters: reg.tool.parameters_schema(),
        }
    }

    /// Definitions for the named tools, in the given order. Unknown names are skipped.
    pub fn definitions_for<S: AsRef<str>>(&self, names: &[S]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.tools.get(name).map(|reg| Self::definition(name, reg))
            })
            .collect()
    }

    /// Invoke a tool by name, bounded by its registered timeout.
    ///
    /// String results are returned as-is; any other JSON value is rendered
    /// as compact JSON text. Calls are never retried.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let reg = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if !args.is_object() {
            return Err(ToolError::invalid_arguments(
                name,
                format!("expected a JSON object, got {}", args),
            ));
        }

        debug!(tool = name, timeout = ?reg.timeout, "invoking tool");
        let value = tokio::time::timeout(reg.timeout, reg.tool.execute(args))
            .await
            .map_err(|_| ToolError::Timeout {
                tool: name.to_string(),
                after: reg.timeout,
            })??;

        Ok(match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Get a list of all registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a tool is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn timeout_for(&self, name: &str) -> Option<Duration> {
        self.tools.get(name).map(|reg| reg.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase text"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            let text = args
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::invalid_arguments("upper", "missing 'text'"))?;
            Ok(Value::String(text.to_uppercase()))
        }
    }

    struct Stats;

    #[async_trait]
    impl Tool for Stats {
        fn name(&self) -> &str {
            "stats"
        }
        fn description(&self) -> &str {
            "Returns an object"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
            Ok(json!({"count": 3}))
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn description(&self) -> &str {
            "Never answers in time"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Upper));
        registry.register(Arc::new(Stats));
        registry.register_with_timeout(Arc::new(Sleepy), Duration::from_millis(20));
        registry
    }

    #[test]
    fn test_registry_creation() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.tool_names().len(), 0);
    }

    #[tokio::test]
    async fn test_invoke_renders_strings_raw_and_values_as_json() {
        let registry = registry();
        assert_eq!(
            registry.invoke("upper", json!({"text": "qml"})).await.unwrap(),
            "QML"
        );
        assert_eq!(
            registry.invoke("stats", json!({})).await.unwrap(),
            r#"{"count":3}"#
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = registry().invoke("nonexistent_tool", json!({})).await;
        assert_eq!(
            result,
            Err(ToolError::UnknownTool("nonexistent_tool".to_string()))
        );
    }

    #[tokio::test]
    async fn test_non_object_arguments_rejected() {
        let result = registry().invoke("upper", json!("qml")).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn test_tool_error_passes_through() {
        let result = registry().invoke("upper", json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { tool, .. }) if tool == "upper"));
    }

    #[tokio::test]
    async fn test_timeout_applied_per_registration() {
        let result = registry().invoke("sleepy", json!({})).await;
        assert!(matches!(result, Err(ToolError::Timeout { tool, .. }) if tool == "sleepy"));
    }

    #[test]
    fn test_definitions_for_keeps_requested_order() {
        let registry = registry();
        let defs = registry.definitions_for(&["stats", "missing", "upper"]);
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["stats", "upper"]);
        assert!(defs.iter().all(|d| d.parameters.is_object()));
    }

    #[test]
    fn test_from_config_registers_enabled_remote_tools() {
        let config: CrewConfig = r#"
[tools.code_executor]
url = "http://localhost:9001/execute"
description = "Run Python code"
timeout_secs = 5

[tools.librarian]
url = "http://localhost:9002/search"
enabled = false
"#
        .parse()
        .unwrap();

        let registry = ToolRegistry::from_config(&config).unwrap();
        assert!(registry.has_tool("code_executor"));
        assert!(!registry.has_tool("librarian"));
        assert_eq!(
            registry.timeout_for("code_executor"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            registry.definitions_for(&["code_executor"])[0].description,
            "Run Python code"
        );
    }

    #[cfg(feature = "web-search")]
    #[test]
    fn test_registry_with_default_tools() {
        let registry = ToolRegistry::with_default_tools();
        assert!(registry.has_tool("web_search"));
        assert!(registry.has_tool("fetch_page"));
    }
}
