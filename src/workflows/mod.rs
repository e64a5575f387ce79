//! Research Workflow
//!
//! The pipeline that turns a topic into a reviewed report:
//!
//! ```text
//! Plan → Research → Synthesize → Write → Review → Complete
//! ```
//!
//! Research fans out to one worker per aspect (who/what/when/where/how/why),
//! either as in-process tool-calling loops or through remote worker services.
//!
//! # Usage
//!
//! ```ignore
//! let engine = WorkflowEngine::from_config(&config, &factory, tools).await?;
//! let state = engine
//!     .run(&ResearchRequest::new("solid-state batteries"), None, &CancellationToken::new())
//!     .await?;
//! println!("{}", state.final_report().unwrap_or_default());
//! ```

pub mod engine;
pub mod fanout;
pub mod gateway;
pub mod state;
pub mod tool_loop;

pub use engine::{StageEvent, WorkflowEngine};
pub use fanout::{FailurePolicy, FanOut, FanOutResult, InProcessFanOut, ResearchSeed};
pub use gateway::DelegationGateway;
pub use state::{
    AbortReason, Finding, Findings, Stage, StageRecord, WorkerReport, WorkerStatus, WorkflowState,
};
pub use tool_loop::{LoopConfig, LoopOutcome, ToolBinding, ToolCallRecord, ToolLoop};
