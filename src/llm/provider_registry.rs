//! Provider Registry for managing multiple LLM providers
//!
//! Named providers and models come from the `[providers]` and `[models]`
//! tables of `crew.toml`. A model name resolves through its provider to a
//! concrete [`Provider`], which builds the client.

use crate::llm::client::{LLMClient, LLMClientFactoryTrait, ModelParams, Provider};
use crate::types::{AppError, Result};
use crate::utils::toml_config::{CrewConfig, ModelConfig, ProviderConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

impl Provider {
    /// Build a provider from a model entry and the provider it references.
    ///
    /// OpenAI credentials are read from the environment variable named in
    /// the provider entry.
    pub fn from_model_config(model: &ModelConfig, provider: &ProviderConfig) -> Result<Self> {
        let params = ModelParams {
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            timeout: Duration::from_secs(model.request_timeout_secs),
        };

        match provider {
            ProviderConfig::Ollama { base_url, .. } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.model.clone(),
                params,
            }),
            ProviderConfig::OpenAI {
                api_key_env,
                api_base,
                ..
            } => {
                let api_key = std::env::var(api_key_env).map_err(|_| {
                    AppError::Configuration(format!(
                        "Environment variable '{}' for model '{}' is not set",
                        api_key_env, model.model
                    ))
                })?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model.model.clone(),
                    params,
                })
            }
        }
    }
}

/// Registry for managing multiple named LLM providers
pub struct ProviderRegistry {
    /// Provider configurations keyed by name
    providers: HashMap<String, ProviderConfig>,
    /// Model configurations keyed by name
    models: HashMap<String, ModelConfig>,
    /// Default model name to use when none specified
    default_model: Option<String>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            models: HashMap::new(),
            default_model: None,
        }
    }

    /// Create a provider registry from TOML configuration
    pub fn from_config(config: &CrewConfig) -> Self {
        Self {
            providers: config.providers.clone(),
            models: config.models.clone(),
            default_model: config.default_model().map(str::to_string),
        }
    }

    /// Set the default model name
    pub fn set_default_model(&mut self, model_name: &str) {
        self.default_model = Some(model_name.to_string());
    }

    /// Register a provider configuration
    pub fn register_provider(&mut self, name: &str, config: ProviderConfig) {
        self.providers.insert(name.to_string(), config);
    }

    /// Register a model configuration
    pub fn register_model(&mut self, name: &str, config: ModelConfig) {
        self.models.insert(name.to_string(), config);
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Get all model names, sorted
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Resolve the model -> provider chain for a model name.
    pub fn provider_for_model(&self, model_name: &str) -> Result<Provider> {
        let model_config = self.models.get(model_name).ok_or_else(|| {
            AppError::Configuration(format!("Model '{}' not found in configuration", model_name))
        })?;

        let provider_config = self.providers.get(&model_config.provider).ok_or_else(|| {
            AppError::Configuration(format!(
                "Provider '{}' referenced by model '{}' not found",
                model_config.provider, model_name
            ))
        })?;

        Provider::from_model_config(model_config, provider_config)
    }

    /// Create an LLM client for a specific model by name
    pub fn create_client_for_model(&self, model_name: &str) -> Result<Arc<dyn LLMClient>> {
        self.provider_for_model(model_name)?.create_client()
    }

    /// Create an LLM client using the default model
    pub fn create_default_client(&self) -> Result<Arc<dyn LLMClient>> {
        let model_name = self
            .default_model
            .as_deref()
            .ok_or_else(|| AppError::Configuration("No default model configured".into()))?;

        self.create_client_for_model(model_name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration-based LLM client factory using the provider registry
pub struct ConfigBasedLLMFactory {
    registry: Arc<ProviderRegistry>,
}

impl ConfigBasedLLMFactory {
    /// Create a new factory from a provider registry
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Create a factory from TOML configuration
    pub fn from_config(config: &CrewConfig) -> Result<Self> {
        let registry = ProviderRegistry::from_config(config);
        if registry.default_model().is_none() {
            return Err(AppError::Configuration(
                "No models defined in configuration".into(),
            ));
        }
        Ok(Self::new(Arc::new(registry)))
    }

    /// Get the provider registry
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }
}

#[async_trait]
impl LLMClientFactoryTrait for ConfigBasedLLMFactory {
    async fn create_default(&self) -> Result<Arc<dyn LLMClient>> {
        self.registry.create_default_client()
    }

    async fn create_for_model(&self, model: &str) -> Result<Arc<dyn LLMClient>> {
        self.registry.create_client_for_model(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(provider: &str, id: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.to_string(),
            model: id.to_string(),
            temperature: 0.3,
            max_tokens: 256,
            request_timeout_secs: 30,
        }
    }

    fn create_test_registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register_provider(
            "ollama",
            ProviderConfig::Ollama {
                base_url: "http://localhost:11434".to_string(),
                default_model: "llama3.2".to_string(),
            },
        );
        registry.register_provider(
            "openai",
            ProviderConfig::OpenAI {
                api_key_env: "CREW_REGISTRY_TEST_UNSET_KEY".to_string(),
                api_base: "https://api.openai.com/v1".to_string(),
                default_model: "gpt-4o-mini".to_string(),
            },
        );
        registry.register_model("fast-local", model("ollama", "llama3.2"));
        registry.register_model("cloud", model("openai", "gpt-4o-mini"));
        registry.register_model("orphan", model("missing", "x"));
        registry
    }

    #[test]
    fn test_empty_registry() {
        let registry = ProviderRegistry::new();
        assert!(registry.model_names().is_empty());
        assert!(registry.create_default_client().is_err());
    }

    #[test]
    fn test_resolves_model_through_provider() {
        let registry = create_test_registry();
        let provider = registry.provider_for_model("fast-local").unwrap();
        assert_eq!(provider.name(), "Ollama");
        assert_eq!(provider.model(), "llama3.2");

        let client = registry.create_client_for_model("fast-local").unwrap();
        assert_eq!(client.model_name(), "llama3.2");
    }

    #[test]
    fn test_unknown_model_and_provider_are_configuration_errors() {
        let registry = create_test_registry();
        assert!(matches!(
            registry.provider_for_model("nope"),
            Err(AppError::Configuration(_))
        ));
        assert!(matches!(
            registry.provider_for_model("orphan"),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_unset_api_key_is_configuration_error() {
        let registry = create_test_registry();
        let err = registry.provider_for_model("cloud").unwrap_err();
        assert!(err.to_string().contains("CREW_REGISTRY_TEST_UNSET_KEY"));
    }

    #[tokio::test]
    async fn test_factory_uses_default_model() {
        let mut registry = create_test_registry();
        registry.set_default_model("fast-local");
        let factory = ConfigBasedLLMFactory::new(Arc::new(registry));
        let client = factory.create_default().await.unwrap();
        assert_eq!(client.model_name(), "llama3.2");
    }

    #[test]
    fn test_factory_from_config_requires_models() {
        assert!(ConfigBasedLLMFactory::from_config(&CrewConfig::default()).is_err());
    }
}
