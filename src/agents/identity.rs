//! Worker identities and pipeline agent names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// One of the fixed research roles.
///
/// Declaration order is the canonical order used when merging and
/// synthesizing worker results.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum WorkerIdentity {
    Who,
    What,
    When,
    Where,
    How,
    Why,
    /// Single worker used by the sequential research mode.
    Researcher,
}

impl WorkerIdentity {
    /// The six aspect workers, in canonical order.
    pub const ASPECTS: [WorkerIdentity; 6] = [
        WorkerIdentity::Who,
        WorkerIdentity::What,
        WorkerIdentity::When,
        WorkerIdentity::Where,
        WorkerIdentity::How,
        WorkerIdentity::Why,
    ];

    pub const ALL: [WorkerIdentity; 7] = [
        WorkerIdentity::Who,
        WorkerIdentity::What,
        WorkerIdentity::When,
        WorkerIdentity::Where,
        WorkerIdentity::How,
        WorkerIdentity::Why,
        WorkerIdentity::Researcher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerIdentity::Who => "who",
            WorkerIdentity::What => "what",
            WorkerIdentity::When => "when",
            WorkerIdentity::Where => "where",
            WorkerIdentity::How => "how",
            WorkerIdentity::Why => "why",
            WorkerIdentity::Researcher => "researcher",
        }
    }

    /// Agent name used to look up this worker's prompt, model and tools.
    pub fn agent_name(&self) -> &'static str {
        self.as_str()
    }

    /// Path of the remote worker endpoint, e.g. `/run_who`.
    pub fn endpoint_path(&self) -> String {
        format!("/run_{}", self.as_str())
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let normalized = normalized
            .strip_suffix("agent")
            .unwrap_or(&normalized)
            .trim_end_matches(['_', '-', ' ']);
        WorkerIdentity::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| format!("unknown worker identity '{}'", s))
    }
}

/// Names of the single-call pipeline agents.
pub mod stage_agents {
    pub const PLANNER: &str = "planner";
    pub const WRITER: &str = "writer";
    pub const REVIEWER: &str = "reviewer";
}
