//! Named resource locks, reentrant per agent.
//!
//! Tools declare the resources they mutate; the lock manager is the sole
//! arbiter of those names. Multi-resource requests acquire in a stable
//! global order (lexicographic) so two agents can never deadlock on
//! overlapping sets. An agent already holding a resource may re-acquire it;
//! holds are counted and released pairwise.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use smith_core::error::RuntimeError;
use smith_core::smith_lock;

use crate::cancel::CancelToken;

struct LockEntry {
    owner: String,
    holds: u32,
    acquired_at: Instant,
}

/// Snapshot of one held lock, for diagnostics.
#[derive(Clone, Debug)]
pub struct LockInfo {
    /// Resource name.
    pub resource: String,
    /// Agent currently holding it.
    pub owner: String,
    /// How long it has been held.
    pub held_for: Duration,
}

/// Registry of named mutual-exclusion locks.
pub struct ResourceLockManager {
    locks: Mutex<HashMap<String, LockEntry>>,
    released: Notify,
    wait_timeout: Duration,
}

impl ResourceLockManager {
    /// Creates a manager whose waiters give up after `wait_timeout`.
    pub fn new(wait_timeout: Duration) -> Self {
        ResourceLockManager {
            locks: Mutex::new(HashMap::new()),
            released: Notify::new(),
            wait_timeout,
        }
    }

    /// Acquires every resource in `resources` for `agent_id`, returning a
    /// claim that releases them all on drop.
    ///
    /// Resources are deduplicated and sorted before acquisition. On
    /// timeout or cancellation, partially acquired resources are released
    /// before the error is returned.
    pub async fn acquire_all(
        self: &Arc<Self>,
        agent_id: &str,
        resources: &[String],
        cancel: &CancelToken,
    ) -> Result<ResourceClaim, RuntimeError> {
        let mut ordered: Vec<String> = resources.to_vec();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now() + self.wait_timeout;
        let mut held: Vec<String> = Vec::with_capacity(ordered.len());

        for resource in &ordered {
            match self.acquire_one(agent_id, resource, deadline, cancel).await {
                Ok(()) => held.push(resource.clone()),
                Err(err) => {
                    for r in &held {
                        self.release_one(agent_id, r);
                    }
                    return Err(err);
                }
            }
        }

        Ok(ResourceClaim {
            manager: Arc::clone(self),
            agent_id: agent_id.to_string(),
            resources: ordered,
        })
    }

    async fn acquire_one(
        &self,
        agent_id: &str,
        resource: &str,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<(), RuntimeError> {
        loop {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            {
                let mut locks = self.locks.lock();
                match locks.get_mut(resource) {
                    None => {
                        locks.insert(
                            resource.to_string(),
                            LockEntry {
                                owner: agent_id.to_string(),
                                holds: 1,
                                acquired_at: Instant::now(),
                            },
                        );
                        smith_lock!(debug, resource = resource, agent = agent_id, "Lock acquired");
                        return Ok(());
                    }
                    Some(entry) if entry.owner == agent_id => {
                        entry.holds += 1;
                        smith_lock!(
                            trace,
                            resource = resource,
                            agent = agent_id,
                            holds = entry.holds,
                            "Lock re-entered"
                        );
                        return Ok(());
                    }
                    Some(_) => {}
                }
            }

            let notified = self.released.notified();
            let now = Instant::now();
            if now >= deadline {
                return Err(RuntimeError::Lock {
                    resource: resource.to_string(),
                    message: format!("wait timed out after {:?}", self.wait_timeout),
                });
            }

            // The periodic tick re-checks the table even if a release
            // slipped between the table inspection and waiter registration.
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(RuntimeError::Lock {
                        resource: resource.to_string(),
                        message: format!("wait timed out after {:?}", self.wait_timeout),
                    });
                }
                _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            }
        }
    }

    fn release_one(&self, agent_id: &str, resource: &str) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get_mut(resource) {
            if entry.owner != agent_id {
                smith_lock!(
                    warn,
                    resource = resource,
                    agent = agent_id,
                    owner = %entry.owner,
                    "Release by non-owner ignored"
                );
                return;
            }
            entry.holds -= 1;
            if entry.holds == 0 {
                locks.remove(resource);
                smith_lock!(debug, resource = resource, agent = agent_id, "Lock released");
            }
        }
        drop(locks);
        self.released.notify_waiters();
    }

    /// Releases every hold owned by `agent_id`, including per-invocation
    /// owners derived from it (`agent#node`). Returns the number of
    /// resources freed. Used on agent teardown to sweep leaks.
    pub fn release_agent(&self, agent_id: &str) -> usize {
        let derived_prefix = format!("{agent_id}#");
        let mut locks = self.locks.lock();
        let owned: Vec<String> = locks
            .iter()
            .filter(|(_, entry)| {
                entry.owner == agent_id || entry.owner.starts_with(&derived_prefix)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in &owned {
            locks.remove(name);
        }
        drop(locks);
        if !owned.is_empty() {
            smith_lock!(debug, agent = agent_id, count = owned.len(), "Agent locks swept");
            self.released.notify_waiters();
        }
        owned.len()
    }

    /// True when the resource is currently held.
    pub fn is_locked(&self, resource: &str) -> bool {
        self.locks.lock().contains_key(resource)
    }

    /// Snapshot of all currently held locks.
    pub fn all_locks(&self) -> Vec<LockInfo> {
        let locks = self.locks.lock();
        locks
            .iter()
            .map(|(name, entry)| LockInfo {
                resource: name.clone(),
                owner: entry.owner.clone(),
                held_for: entry.acquired_at.elapsed(),
            })
            .collect()
    }
}

/// RAII claim over a set of resources.
///
/// Dropping the claim releases one hold on each resource, on every exit
/// path of the invoker.
pub struct ResourceClaim {
    manager: Arc<ResourceLockManager>,
    agent_id: String,
    resources: Vec<String>,
}

impl ResourceClaim {
    /// Resources covered by this claim (sorted, deduplicated).
    pub fn resources(&self) -> &[String] {
        &self.resources
    }
}

impl Drop for ResourceClaim {
    fn drop(&mut self) {
        for resource in &self.resources {
            self.manager.release_one(&self.agent_id, resource);
        }
    }
}
