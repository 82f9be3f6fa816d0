//! Fleet coordination: parallel peer agents over one decomposed goal.
//!
//! A fleet is a one-shot pattern driven from outside any plan: the model
//! decomposes the goal into independent sub-tasks, each sub-task runs as a
//! full peer agent concurrently, failures stay isolated to their slot, and
//! the model synthesizes the surviving results. Peers run concurrently
//! with respect to one another; only their internal `sub_agent` calls pass
//! through the global serialization gate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tokio::task::JoinSet;

use smith_core::error::RuntimeError;
use smith_core::smith_agent;
use smith_core::traits::{LlmClient, LlmRequest};
use smith_core::types::{AgentStatus, Value};

use crate::engine::Engine;

/// One peer's slot in the fleet result vector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerResult {
    /// Position in the decomposition.
    pub index: usize,
    /// The sub-task this peer worked on.
    pub task: String,
    /// Synthesized answer, when the peer succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure message, when it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PeerResult {
    /// True when this peer produced an answer.
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Aggregated outcome of a fleet run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FleetReport {
    /// Agent id of the fleet root.
    pub fleet_id: String,
    /// The original goal.
    pub goal: String,
    /// The decomposed sub-tasks, in peer order.
    pub sub_tasks: Vec<String>,
    /// Per-peer outcomes, in peer order.
    pub peers: Vec<PeerResult>,
    /// The synthesized final answer.
    pub final_result: String,
}

/// Runs fleets over an engine.
pub struct FleetCoordinator {
    engine: Engine,
    llm: Arc<dyn LlmClient>,
}

impl FleetCoordinator {
    /// Creates a coordinator. The engine's registry, locks, limiter, and
    /// agent tree are shared with the peers.
    pub fn new(engine: Engine, llm: Arc<dyn LlmClient>) -> Self {
        FleetCoordinator { engine, llm }
    }

    /// Decomposes `goal` into `num_agents` sub-tasks, runs them as
    /// concurrent peers, and aggregates the results.
    pub async fn run(&self, goal: &str, num_agents: usize) -> Result<FleetReport, RuntimeError> {
        let max = self.engine.config().max_fleet_size;
        if num_agents == 0 {
            return Err(RuntimeError::Fleet {
                message: "must have at least 1 agent".to_string(),
            });
        }
        if num_agents > max {
            return Err(RuntimeError::Fleet {
                message: format!("requested {num_agents} agents, but max is {max}"),
            });
        }

        let sub_tasks = self.decompose(goal, num_agents).await;
        let agents = Arc::clone(self.engine.agents());
        let fleet_id = agents.create(format!("Fleet: {goal}"), None);
        agents.update(&fleet_id, AgentStatus::Running, None, None);
        smith_agent!(
            info,
            fleet = %fleet_id,
            peers = num_agents,
            "Fleet started"
        );

        let mut join_set = JoinSet::new();
        for (index, task) in sub_tasks.iter().enumerate() {
            let peer_id = agents.create(task.clone(), Some(&fleet_id));
            agents.update(&peer_id, AgentStatus::Running, None, None);

            let engine = self.engine.autonomous_clone();
            let task = task.clone();
            join_set.spawn(async move {
                let outcome = engine.run_for_agent(&peer_id, &task).await;
                (index, task, peer_id, outcome)
            });
        }

        let mut peers: Vec<PeerResult> = Vec::with_capacity(num_agents);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, task, peer_id, outcome)) => match outcome {
                    Ok(engine_outcome) => {
                        let answer = engine_outcome
                            .final_answer
                            .or_else(|| {
                                engine_outcome.report.final_output.as_ref().map(Value::render)
                            })
                            .unwrap_or_default();
                        agents.update(
                            &peer_id,
                            AgentStatus::Completed,
                            Some(Value::from(answer.clone())),
                            None,
                        );
                        peers.push(PeerResult {
                            index,
                            task,
                            result: Some(answer),
                            error: None,
                        });
                    }
                    Err(err) => {
                        agents.update(&peer_id, AgentStatus::Failed, None, Some(err.to_string()));
                        peers.push(PeerResult {
                            index,
                            task,
                            result: None,
                            error: Some(err.to_string()),
                        });
                    }
                },
                Err(join_err) => {
                    // A panicked peer occupies its slot as an error.
                    peers.push(PeerResult {
                        index: peers.len(),
                        task: String::new(),
                        result: None,
                        error: Some(format!("peer task failed: {join_err}")),
                    });
                }
            }
        }
        peers.sort_by_key(|p| p.index);

        if peers.iter().all(|p| !p.is_success()) {
            agents.update(
                &fleet_id,
                AgentStatus::Failed,
                None,
                Some("all peers failed".to_string()),
            );
            return Err(RuntimeError::Fleet {
                message: format!("all {num_agents} peers failed"),
            });
        }

        let final_result = self.aggregate(goal, &peers).await?;
        agents.update(
            &fleet_id,
            AgentStatus::Completed,
            Some(Value::from(final_result.clone())),
            None,
        );
        smith_agent!(
            info,
            fleet = %fleet_id,
            succeeded = peers.iter().filter(|p| p.is_success()).count(),
            "Fleet completed"
        );

        Ok(FleetReport {
            fleet_id,
            goal: goal.to_string(),
            sub_tasks,
            peers,
            final_result,
        })
    }

    /// Asks the model for `n` independent sub-tasks; falls back to a plain
    /// split when the response is unusable.
    async fn decompose(&self, goal: &str, n: usize) -> Vec<String> {
        let prompt = format!(
            "You are a task decomposition expert. Break down the following goal into {n} \
             independent, parallel sub-tasks that can be worked on simultaneously by different \
             agents.\n\nGoal: {goal}\n\nRequirements:\n\
             1. Each sub-task should be self-contained and independent\n\
             2. Sub-tasks should not depend on each other's results\n\
             3. Together, the sub-tasks should fully accomplish the goal\n\n\
             Return ONLY a JSON array of {n} sub-task strings, nothing else."
        );

        if let Ok(response) = self.llm.complete(LlmRequest::new(prompt)).await {
            if let Some(tasks) = parse_task_array(&response.text, n) {
                return tasks;
            }
        }
        smith_agent!(debug, "Goal decomposition fell back to a plain split");
        (1..=n).map(|i| format!("{goal} - part {i}/{n}")).collect()
    }

    /// Asks the model to synthesize peer results into one answer.
    async fn aggregate(&self, goal: &str, peers: &[PeerResult]) -> Result<String, RuntimeError> {
        let results_text = peers
            .iter()
            .map(|p| {
                let body = p
                    .result
                    .as_deref()
                    .or(p.error.as_deref())
                    .unwrap_or("No result");
                format!("Agent {} (Task: {}):\n{}", p.index, p.task, body)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "You are a result aggregation expert. Multiple agents worked on different parts of a \
             goal. Synthesize their results into a comprehensive final answer.\n\n\
             Original Goal: {goal}\n\nAgent Results:\n{results_text}\n\n\
             Provide a comprehensive, well-structured final answer that combines all agent \
             results to fully address the original goal."
        );

        self.llm
            .complete(LlmRequest::new(prompt))
            .await
            .map(|response| response.text)
            .map_err(|e| RuntimeError::Fleet {
                message: format!("aggregation failed: {e}"),
            })
    }
}

/// Extracts a JSON array of exactly `n` strings from model output.
fn parse_task_array(text: &str, n: usize) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')? + 1;
    let tasks: Vec<String> = serde_json::from_str(&text[start..end]).ok()?;
    (tasks.len() == n).then_some(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_array() {
        let text = "Here you go:\n[\"research A\", \"research B\"]\nDone.";
        assert_eq!(
            parse_task_array(text, 2),
            Some(vec!["research A".to_string(), "research B".to_string()])
        );
        // Wrong arity is rejected.
        assert_eq!(parse_task_array(text, 3), None);
        assert_eq!(parse_task_array("no array here", 1), None);
    }

    #[test]
    fn test_peer_result_success() {
        let ok = PeerResult {
            index: 0,
            task: "t".to_string(),
            result: Some("answer".to_string()),
            error: None,
        };
        let failed = PeerResult {
            index: 1,
            task: "t".to_string(),
            result: None,
            error: Some("boom".to_string()),
        };
        assert!(ok.is_success());
        assert!(!failed.is_success());
    }
}
