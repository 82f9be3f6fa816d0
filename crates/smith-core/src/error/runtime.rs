//! Runtime errors.
//!
//! Errors that occur while executing a validated plan: tool failures,
//! timeouts, scheduling problems, resource locking, and agent-tree limits.

use std::time::Duration;

use thiserror::Error;

use crate::types::NodeId;

/// Errors that occur during plan execution.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A node references a tool that is not in the registry.
    #[error("Tool '{tool}' not found in registry")]
    ToolNotFound {
        /// The missing tool name.
        tool: String,
    },

    /// A descriptor's callable handle has no binding.
    #[error("No callable bound for function '{function_id}'")]
    UnresolvedFunction {
        /// The unresolved handle.
        function_id: String,
    },

    /// A tool call failed. Retryable failures are retried by the invoker.
    #[error("Tool '{tool}' failed: {message}")]
    Tool {
        /// The failing tool name.
        tool: String,
        /// Error message from the tool.
        message: String,
    },

    /// A node's inputs were invalid at dispatch time.
    #[error("Node {node_id}: invalid input: {message}")]
    InvalidInput {
        /// The offending node.
        node_id: NodeId,
        /// What was wrong.
        message: String,
    },

    /// A node's whole-node deadline expired.
    #[error("Node {node_id} timed out after {timeout:?}")]
    Timeout {
        /// The node that timed out.
        node_id: NodeId,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// A node consumed a dependency that ended non-success.
    #[error("Node {node_id}: dependency {dependency} did not succeed")]
    DependencyUnmet {
        /// The consuming node.
        node_id: NodeId,
        /// The failed dependency.
        dependency: NodeId,
    },

    /// No node was runnable but pending nodes remained.
    #[error("Execution blocked with {remaining} pending node(s) and no runnable work")]
    Blocked {
        /// Count of nodes still pending.
        remaining: usize,
    },

    /// A halt-policy node failed and terminated the run.
    #[error("Execution halted by node {node_id}")]
    Halted {
        /// The node whose failure halted the run.
        node_id: NodeId,
    },

    /// Execution was cancelled.
    #[error("Execution cancelled")]
    Cancelled,

    /// A sub-agent spawn exceeded the depth bound.
    #[error("Sub-agent depth {depth} exceeds maximum {max}")]
    DepthExceeded {
        /// Depth the spawn would have had.
        depth: u32,
        /// Configured maximum.
        max: u32,
    },

    /// The external approver rejected a dangerous tool.
    #[error("Approval denied for dangerous tool '{tool}'")]
    ApprovalDenied {
        /// The rejected tool.
        tool: String,
    },

    /// Resource lock acquisition failed.
    #[error("Lock error on resource '{resource}': {message}")]
    Lock {
        /// The contended resource.
        resource: String,
        /// Failure detail.
        message: String,
    },

    /// Fleet coordination failed.
    #[error("Fleet error: {message}")]
    Fleet {
        /// Failure detail.
        message: String,
    },

    /// Internal state error.
    #[error("State error: {0}")]
    State(String),
}

impl RuntimeError {
    /// True when the invoker may retry the failed attempt.
    ///
    /// Only plain tool failures are recoverable; everything else is
    /// surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RuntimeError::Tool { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        let tool = RuntimeError::Tool {
            tool: "weather_fetcher".to_string(),
            message: "upstream 503".to_string(),
        };
        assert!(tool.is_retryable());

        let denied = RuntimeError::ApprovalDenied {
            tool: "db_tools".to_string(),
        };
        assert!(!denied.is_retryable());

        let timeout = RuntimeError::Timeout {
            node_id: 3,
            timeout: Duration::from_secs(5),
        };
        assert!(!timeout.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RuntimeError::Blocked { remaining: 2 };
        assert!(format!("{err}").contains("2 pending node(s)"));
    }
}
