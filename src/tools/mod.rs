//! Tools available to research workers
//!
//! A tool is a named request/response capability: a JSON argument object goes
//! in, a JSON value (or a [`ToolError`](registry::ToolError)) comes out.
//! Workers only ever reach tools through the [`ToolRegistry`](registry::ToolRegistry),
//! which is built once from `crew.toml` and shared by every run.
//!
//! # Module Structure
//!
//! - [`registry`](crate::tools::registry) - Tool registration, timeouts and invocation
//! - [`remote`](crate::tools::remote) - Tools hosted as HTTP services
//! - [`search`](crate::tools::search) - Web search and page fetch (`web-search` feature)
//!
//! # Example
//!
//! ```ignore
//! let registry = ToolRegistry::from_config(&config)?;
//! let defs = registry.definitions_for(&["web_search"]);
//! let text = registry.invoke("web_search", json!({"query": "qml"})).await?;
//! ```

/// Tool registry for managing available tools.
pub mod registry;
/// HTTP-hosted tools.
pub mod remote;
/// Web search tools using DuckDuckGo.
#[cfg(feature = "web-search")]
pub mod search;

pub use registry::{Tool, ToolError, ToolRegistry};
