//! Internal per-run scheduler state.
//!
//! Mutated only by the scheduler loop (single-writer); workers report
//! outcomes back through the commit channel. The ready queue is an ordered
//! set so dispatch always picks the smallest eligible node id, which makes
//! commit order reproducible given identical invoker latencies.

use std::collections::{BTreeSet, HashMap, HashSet};

use smith_core::types::{Dag, ExecutionRecord, NodeId, NodeOutcome, Trace, Value};

/// Node lifecycle within one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Pending,
    Ready,
    Running,
    Done(NodeOutcome),
}

pub(crate) struct RunState {
    phases: HashMap<NodeId, Phase>,
    deps_remaining: HashMap<NodeId, usize>,
    outputs: HashMap<NodeId, Value>,
    ready: BTreeSet<NodeId>,
    pub(crate) running: usize,
    pub(crate) trace: Trace,
}

impl RunState {
    /// Seeds phases and the ready queue from the graph.
    pub(crate) fn new(dag: &Dag) -> Self {
        let mut phases = HashMap::with_capacity(dag.len());
        let mut deps_remaining = HashMap::with_capacity(dag.len());
        let mut ready = BTreeSet::new();

        for node in &dag.nodes {
            let unique_deps: HashSet<NodeId> = node.depends_on.iter().copied().collect();
            if unique_deps.is_empty() {
                phases.insert(node.id, Phase::Ready);
                ready.insert(node.id);
            } else {
                phases.insert(node.id, Phase::Pending);
            }
            deps_remaining.insert(node.id, unique_deps.len());
        }

        RunState {
            phases,
            deps_remaining,
            outputs: HashMap::new(),
            ready,
            running: 0,
            trace: Trace::new(),
        }
    }

    /// Removes and returns the smallest ready node id.
    pub(crate) fn pop_ready(&mut self) -> Option<NodeId> {
        let id = *self.ready.iter().next()?;
        self.ready.remove(&id);
        Some(id)
    }

    pub(crate) fn mark_running(&mut self, id: NodeId) {
        self.phases.insert(id, Phase::Running);
        self.running += 1;
    }

    /// Published output of a terminal node; null when absent or failed.
    pub(crate) fn output_of(&self, id: NodeId) -> Value {
        self.outputs.get(&id).cloned().unwrap_or(Value::Null)
    }

    /// Commits a terminal record: publishes the output slot, appends the
    /// trace, and promotes dependents whose last dependency just resolved.
    pub(crate) fn commit(&mut self, dag: &Dag, record: ExecutionRecord) {
        let id = record.node_id;
        let output = if record.status.is_success() {
            record.output.clone()
        } else {
            Value::Null
        };

        self.phases.insert(id, Phase::Done(record.status));
        self.outputs.insert(id, output);
        self.trace.push(record);

        for dependent in dag.dependents_of(id) {
            if self.phases.get(&dependent) != Some(&Phase::Pending) {
                continue;
            }
            let remaining = self
                .deps_remaining
                .get_mut(&dependent)
                .map(|r| {
                    *r = r.saturating_sub(1);
                    *r
                })
                .unwrap_or(0);
            if remaining == 0 {
                self.phases.insert(dependent, Phase::Ready);
                self.ready.insert(dependent);
            }
        }
    }

    /// Commits a skip record for a node that never executed.
    pub(crate) fn commit_skipped(&mut self, dag: &Dag, id: NodeId, reason: &str) {
        let (tool, function) = dag
            .node(id)
            .map(|n| (n.tool.as_str(), n.function.as_str()))
            .unwrap_or(("", ""));
        self.commit(dag, ExecutionRecord::skipped(id, tool, function, reason));
    }

    pub(crate) fn is_terminal(&self, id: NodeId) -> bool {
        matches!(self.phases.get(&id), Some(Phase::Done(_)))
    }

    pub(crate) fn all_terminal(&self) -> bool {
        self.phases
            .values()
            .all(|phase| matches!(phase, Phase::Done(_)))
    }

    /// Nodes not yet terminal, in id order.
    pub(crate) fn non_terminal_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .phases
            .iter()
            .filter(|(_, phase)| !matches!(phase, Phase::Done(_)))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use smith_core::types::DagNode;

    fn dag() -> Dag {
        Dag {
            nodes: vec![
                DagNode::new(0, "a", "fa"),
                DagNode::new(1, "b", "fb"),
                DagNode::new(2, "c", "fc").with_depends_on(vec![0, 1]),
            ],
            final_output_node: 2,
        }
    }

    fn success(id: NodeId, output: Value) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord {
            node_id: id,
            tool: "t".to_string(),
            function: "f".to_string(),
            inputs_resolved: Value::Null,
            output,
            status: NodeOutcome::Success,
            attempts: 1,
            started_at: now,
            finished_at: now,
            duration_ms: 1,
            error: None,
        }
    }

    #[test]
    fn test_ready_seeding_and_ordering() {
        let dag = dag();
        let mut state = RunState::new(&dag);
        // Sources in id order; the join node is pending.
        assert_eq!(state.pop_ready(), Some(0));
        assert_eq!(state.pop_ready(), Some(1));
        assert_eq!(state.pop_ready(), None);
    }

    #[test]
    fn test_commit_promotes_dependents() {
        let dag = dag();
        let mut state = RunState::new(&dag);
        state.pop_ready();
        state.pop_ready();

        state.commit(&dag, success(0, Value::from("a")));
        assert_eq!(state.pop_ready(), None);

        state.commit(&dag, success(1, Value::from("b")));
        assert_eq!(state.pop_ready(), Some(2));

        assert_eq!(state.output_of(0), Value::from("a"));
        assert!(state.is_terminal(0));
        assert!(!state.all_terminal());
    }

    #[test]
    fn test_failed_node_publishes_null_slot() {
        let dag = dag();
        let mut state = RunState::new(&dag);
        let mut record = success(0, Value::from("ignored"));
        record.status = NodeOutcome::Error;
        state.commit(&dag, record);
        assert_eq!(state.output_of(0), Value::Null);
    }

    #[test]
    fn test_duplicate_dependencies_counted_once() {
        let dag = Dag {
            nodes: vec![
                DagNode::new(0, "a", "fa"),
                DagNode::new(1, "b", "fb").with_depends_on(vec![0, 0]),
            ],
            final_output_node: 1,
        };
        let mut state = RunState::new(&dag);
        state.pop_ready();
        state.commit(&dag, success(0, Value::Null));
        assert_eq!(state.pop_ready(), Some(1));
    }

    #[test]
    fn test_non_terminal_ids_sorted() {
        let dag = dag();
        let mut state = RunState::new(&dag);
        state.commit(&dag, success(1, Value::Null));
        assert_eq!(state.non_terminal_ids(), vec![0, 2]);
    }
}
