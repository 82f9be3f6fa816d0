//! Agent hierarchy tracking.
//!
//! The manager owns the tree of agents spawned during a process lifetime:
//! root runs, sub-agents, and fleet peers. Depth is assigned at creation
//! (parent depth + 1) and is the basis of the sub-agent depth bound.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use smith_core::smith_agent;
use smith_core::types::{AgentInfo, AgentStatus, Value};

/// Recursive snapshot of an agent and its descendants.
#[derive(Clone, Debug)]
pub struct AgentTree {
    /// The agent itself.
    pub info: AgentInfo,
    /// Subtrees of its children.
    pub children: Vec<AgentTree>,
}

/// Aggregate counters over the tree.
#[derive(Clone, Debug, Default)]
pub struct AgentStats {
    /// Total agents tracked.
    pub total: usize,
    /// Agents still initializing or running.
    pub active: usize,
    /// Agents with no parent.
    pub roots: usize,
}

/// Thread-safe registry of all agents.
#[derive(Default)]
pub struct AgentStateManager {
    agents: Mutex<HashMap<String, AgentInfo>>,
}

impl AgentStateManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        AgentStateManager::default()
    }

    /// Creates a new agent and returns its id.
    ///
    /// Depth is the parent's depth plus one; unknown or absent parents
    /// produce a root at depth 0.
    pub fn create(&self, task: impl Into<String>, parent_id: Option<&str>) -> String {
        // Short id for log readability.
        let agent_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let task = task.into();

        let mut agents = self.agents.lock();
        let (parent, depth) = match parent_id.and_then(|p| agents.get_mut(p)) {
            Some(parent) => {
                parent.children.push(agent_id.clone());
                (Some(parent.agent_id.clone()), parent.depth + 1)
            }
            None => (None, 0),
        };

        smith_agent!(
            debug,
            agent = %agent_id,
            parent = parent.as_deref().unwrap_or("-"),
            depth = depth,
            "Agent created"
        );

        agents.insert(
            agent_id.clone(),
            AgentInfo {
                agent_id: agent_id.clone(),
                parent_id: parent,
                depth,
                task,
                status: AgentStatus::Initializing,
                created_at: Utc::now(),
                completed_at: None,
                result: None,
                error: None,
                children: Vec::new(),
            },
        );
        agent_id
    }

    /// Updates an agent's status, stamping completion on terminal states.
    pub fn update(
        &self,
        agent_id: &str,
        status: AgentStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        let mut agents = self.agents.lock();
        let Some(agent) = agents.get_mut(agent_id) else {
            return;
        };
        agent.status = status;
        if !status.is_active() {
            agent.completed_at = Some(Utc::now());
        }
        if result.is_some() {
            agent.result = result;
        }
        if error.is_some() {
            agent.error = error;
        }
        smith_agent!(debug, agent = %agent_id, status = ?status, "Agent status updated");
    }

    /// Snapshot of one agent.
    pub fn get(&self, agent_id: &str) -> Option<AgentInfo> {
        self.agents.lock().get(agent_id).cloned()
    }

    /// Snapshots of an agent's direct children.
    pub fn children(&self, agent_id: &str) -> Vec<AgentInfo> {
        let agents = self.agents.lock();
        agents
            .get(agent_id)
            .map(|agent| {
                agent
                    .children
                    .iter()
                    .filter_map(|child| agents.get(child).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recursive snapshot of an agent and all descendants.
    pub fn tree(&self, agent_id: &str) -> Option<AgentTree> {
        let agents = self.agents.lock();
        build_tree(&agents, agent_id)
    }

    /// Agents still initializing or running.
    pub fn active(&self) -> Vec<AgentInfo> {
        self.agents
            .lock()
            .values()
            .filter(|agent| agent.status.is_active())
            .cloned()
            .collect()
    }

    /// Aggregate counters.
    pub fn stats(&self) -> AgentStats {
        let agents = self.agents.lock();
        AgentStats {
            total: agents.len(),
            active: agents.values().filter(|a| a.status.is_active()).count(),
            roots: agents.values().filter(|a| a.parent_id.is_none()).count(),
        }
    }

    /// Removes an agent and its whole subtree from tracking.
    pub fn cleanup(&self, agent_id: &str) {
        let mut agents = self.agents.lock();
        let mut queue = vec![agent_id.to_string()];
        while let Some(current) = queue.pop() {
            if let Some(agent) = agents.remove(&current) {
                queue.extend(agent.children);
            }
        }
    }
}

fn build_tree(agents: &HashMap<String, AgentInfo>, agent_id: &str) -> Option<AgentTree> {
    let info = agents.get(agent_id)?.clone();
    let children = info
        .children
        .iter()
        .filter_map(|child| build_tree(agents, child))
        .collect();
    Some(AgentTree { info, children })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_assignment() {
        let manager = AgentStateManager::new();
        let root = manager.create("root task", None);
        let child = manager.create("child task", Some(&root));
        let grandchild = manager.create("grandchild task", Some(&child));

        assert_eq!(manager.get(&root).unwrap().depth, 0);
        assert_eq!(manager.get(&child).unwrap().depth, 1);
        assert_eq!(manager.get(&grandchild).unwrap().depth, 2);
        assert_eq!(
            manager.get(&root).unwrap().children,
            vec![child.clone()]
        );
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let manager = AgentStateManager::new();
        let orphan = manager.create("task", Some("missing"));
        let info = manager.get(&orphan).unwrap();
        assert_eq!(info.depth, 0);
        assert!(info.parent_id.is_none());
    }

    #[test]
    fn test_update_stamps_completion() {
        let manager = AgentStateManager::new();
        let id = manager.create("task", None);

        manager.update(&id, AgentStatus::Running, None, None);
        assert!(manager.get(&id).unwrap().completed_at.is_none());

        manager.update(&id, AgentStatus::Completed, Some(Value::from("answer")), None);
        let info = manager.get(&id).unwrap();
        assert!(info.completed_at.is_some());
        assert_eq!(info.result, Some(Value::from("answer")));
    }

    #[test]
    fn test_tree_and_cleanup() {
        let manager = AgentStateManager::new();
        let root = manager.create("root", None);
        let a = manager.create("a", Some(&root));
        let _b = manager.create("b", Some(&root));
        let _a1 = manager.create("a1", Some(&a));

        let tree = manager.tree(&root).expect("tree");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(manager.stats().total, 4);

        manager.cleanup(&root);
        assert_eq!(manager.stats().total, 0);
    }

    #[test]
    fn test_active_tracking() {
        let manager = AgentStateManager::new();
        let id = manager.create("task", None);
        assert_eq!(manager.active().len(), 1);

        manager.update(&id, AgentStatus::Failed, None, Some("boom".to_string()));
        assert!(manager.active().is_empty());
        assert_eq!(manager.stats().roots, 1);
    }
}
