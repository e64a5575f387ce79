//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for the model collaborator. It
//! abstracts provider-specific details behind common traits, allowing the rest
//! of the application to work with any supported endpoint.
//!
//! # Architecture
//!
//! The module follows a factory pattern:
//! - [`LLMClient`] - The core trait that all clients implement
//! - [`LLMClientFactoryTrait`] - Resolves a client per agent model
//! - [`ProviderRegistry`] - Registry for managing multiple providers
//! - [`ConfigBasedLLMFactory`] - Creates clients based on `crew.toml` configuration
//! - [`Transcript`] - A tool-calling loop's private message history
//!
//! # Example
//!
//! ```ignore
//! use crew::llm::{ConfigBasedLLMFactory, LLMClientFactoryTrait};
//!
//! let factory = ConfigBasedLLMFactory::from_config(&config)?;
//! let client = factory.create_for_model("default").await?;
//!
//! let text = client.generate("What is quantum machine learning?").await?;
//! println!("{}", text);
//! ```

/// Core LLM client trait and provider selection.
pub mod client;
/// OpenAI-compatible chat completions client.
pub mod openai;
/// Registry for managing multiple LLM provider instances.
pub mod provider_registry;
/// Loop transcript types.
pub mod transcript;

pub use client::{LLMClient, LLMClientFactory, LLMClientFactoryTrait, LLMResponse, ModelParams, Provider};
pub use provider_registry::{ConfigBasedLLMFactory, ProviderRegistry};
pub use transcript::{Message, Transcript};
