//! Agent hierarchy types for sub-agent and fleet tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Value;

/// Lifecycle status of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Created but not yet planning/executing.
    Initializing,
    /// Actively executing.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Terminated before completion.
    Cancelled,
}

impl AgentStatus {
    /// True while the agent still occupies a slot in the tree.
    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Initializing | AgentStatus::Running)
    }
}

/// One node in the agent tree.
///
/// Invariant: `depth` equals the parent's depth plus one; root agents have
/// depth 0 and no parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Short unique identifier.
    pub agent_id: String,
    /// Parent agent, if any.
    pub parent_id: Option<String>,
    /// Distance from the root agent.
    pub depth: u32,
    /// The task this agent was delegated.
    pub task: String,
    /// Current status.
    pub status: AgentStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time, once terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Result payload, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message, once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ids of direct children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_active() {
        assert!(AgentStatus::Running.is_active());
        assert!(AgentStatus::Initializing.is_active());
        assert!(!AgentStatus::Completed.is_active());
        assert!(!AgentStatus::Failed.is_active());
    }
}
