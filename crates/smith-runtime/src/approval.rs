//! External approval gate for dangerous tools.

use async_trait::async_trait;

use smith_core::types::DagNode;
use smith_tools::ToolDescriptor;

/// Callback consulted before any `dangerous` tool runs (when
/// `require_approval` is set). Approval is requested per node: a plan with
/// three dangerous nodes asks three times.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Returns true to allow the invocation.
    async fn approve(&self, descriptor: &ToolDescriptor, node: &DagNode) -> bool;
}

/// Approves every request. Used by sub-agents (which run autonomously)
/// and by non-interactive runs that opted out of gating.
pub struct AutoApprove;

#[async_trait]
impl ApprovalHandler for AutoApprove {
    async fn approve(&self, _descriptor: &ToolDescriptor, _node: &DagNode) -> bool {
        true
    }
}

/// Denies every request. The safe default for headless runs.
pub struct DenyAll;

#[async_trait]
impl ApprovalHandler for DenyAll {
    async fn approve(&self, _descriptor: &ToolDescriptor, _node: &DagNode) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_handlers() {
        let descriptor = ToolDescriptor::new("db_tools", "run_db").with_dangerous(true);
        let node = DagNode::new(0, "db_tools", "run_db");

        assert!(AutoApprove.approve(&descriptor, &node).await);
        assert!(!DenyAll.approve(&descriptor, &node).await);
    }
}
