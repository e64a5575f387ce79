//! Agents: worker identities, prompt templates and the model invoker.
//!
//! An agent here is a name (`planner`, `writer`, `reviewer`, or a worker
//! identity) that selects a prompt template, a model and a tool set.

pub mod identity;
pub mod invoker;
pub mod prompt;

pub use identity::{stage_agents, WorkerIdentity};
pub use invoker::{AgentInvoker, AgentReply};
pub use prompt::{PromptContext, PromptLibrary};
