//! Execution plan graph: the wire form produced by the planner and
//! consumed by the orchestrator.
//!
//! Serialization is tuned for compact, readable JSON:
//! - Empty collections and default metadata are omitted.
//! - Optional `retry`/`timeout` fall back to configuration defaults at
//!   execution time when a node omits them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Value;

/// Type alias for node identifiers.
pub type NodeId = u64;

/// Failure policy for a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFail {
    /// Terminate the whole run when this node fails.
    #[default]
    Halt,
    /// Record the failure and let dependents proceed with a null slot.
    Continue,
}

/// Free-text metadata attached to a node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Why the planner scheduled this node.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purpose: String,
}

fn is_default_metadata(m: &NodeMetadata) -> bool {
    *m == NodeMetadata::default()
}

fn is_empty_map<K, V>(m: &HashMap<K, V>) -> bool {
    m.is_empty()
}

fn is_empty_vec<T>(v: &[T]) -> bool {
    v.is_empty()
}

/// One scheduled tool invocation within a plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    /// Unique identifier, densely numbered from 0.
    pub id: NodeId,
    /// Tool name; must exist in the registry.
    pub tool: String,
    /// Callable handle declared by the tool's descriptor.
    pub function: String,
    /// Tool arguments, validated against the descriptor's parameter schema.
    #[serde(default, skip_serializing_if = "is_empty_map")]
    pub inputs: HashMap<String, Value>,
    /// Ids of nodes whose terminal status gates this node.
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub depends_on: Vec<NodeId>,
    /// Additional attempts after the first failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    /// Whole-node deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Failure policy.
    #[serde(default)]
    pub on_fail: OnFail,
    /// Scheduling metadata.
    #[serde(default, skip_serializing_if = "is_default_metadata")]
    pub metadata: NodeMetadata,
}

impl DagNode {
    /// Creates a minimal node for the given tool.
    pub fn new(id: NodeId, tool: impl Into<String>, function: impl Into<String>) -> Self {
        DagNode {
            id,
            tool: tool.into(),
            function: function.into(),
            inputs: HashMap::new(),
            depends_on: Vec::new(),
            retry: None,
            timeout: None,
            on_fail: OnFail::default(),
            metadata: NodeMetadata::default(),
        }
    }

    /// Sets an input argument.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// Declares dependencies.
    pub fn with_depends_on(mut self, deps: Vec<NodeId>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Sets the retry budget.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the node deadline in seconds.
    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the failure policy.
    pub fn with_on_fail(mut self, on_fail: OnFail) -> Self {
        self.on_fail = on_fail;
        self
    }
}

/// A validated-or-candidate execution graph.
///
/// Structural invariants (unique dense ids, dependencies strictly below the
/// dependent id, known tools, reachable `final_output_node`) are enforced by
/// the planner's validation gate before any execution happens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    /// Ordered node list.
    pub nodes: Vec<DagNode>,
    /// Node whose output is surfaced as the run result.
    pub final_output_node: NodeId,
}

impl Dag {
    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&DagNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// True when a node with this id exists.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of nodes that directly depend on `id`.
    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.contains(&id))
            .map(|n| n.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialization_with_missing_fields() {
        // Minimal JSON should deserialize, filling defaults for omitted fields.
        let json = r#"{"nodes":[{"id":0,"tool":"echo","function":"run_echo"}],"final_output_node":0}"#;
        let dag: Dag = serde_json::from_str(json).expect("deserialize minimal dag");

        let node = &dag.nodes[0];
        assert_eq!(node.id, 0);
        assert!(node.inputs.is_empty());
        assert!(node.depends_on.is_empty());
        assert_eq!(node.retry, None);
        assert_eq!(node.on_fail, OnFail::Halt);
        assert_eq!(node.metadata, NodeMetadata::default());
    }

    #[test]
    fn test_round_trip_with_all_fields() {
        let node = DagNode::new(1, "echo", "run_echo")
            .with_input("message", "hello")
            .with_depends_on(vec![0])
            .with_retry(2)
            .with_timeout(30.0)
            .with_on_fail(OnFail::Continue);
        let dag = Dag {
            nodes: vec![DagNode::new(0, "echo", "run_echo"), node],
            final_output_node: 1,
        };

        let json = serde_json::to_string(&dag).expect("serialize");
        let restored: Dag = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(dag, restored);
    }

    #[test]
    fn test_on_fail_wire_names() {
        let json = serde_json::to_string(&OnFail::Continue).expect("serialize");
        assert_eq!(json, "\"continue\"");
        let parsed: OnFail = serde_json::from_str("\"halt\"").expect("deserialize");
        assert_eq!(parsed, OnFail::Halt);
    }

    #[test]
    fn test_dependents_of() {
        let dag = Dag {
            nodes: vec![
                DagNode::new(0, "a", "fa"),
                DagNode::new(1, "b", "fb").with_depends_on(vec![0]),
                DagNode::new(2, "c", "fc").with_depends_on(vec![0, 1]),
            ],
            final_output_node: 2,
        };
        assert_eq!(dag.dependents_of(0), vec![1, 2]);
        assert_eq!(dag.dependents_of(2), Vec::<NodeId>::new());
    }
}
