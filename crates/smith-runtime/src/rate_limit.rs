//! Per-tool rate limiting.
//!
//! Each gated tool has a minimum interval between invocations. `acquire`
//! blocks the caller until the next permitted instant, then advances it.
//! FIFO ordering among concurrent waiters is not guaranteed; the only
//! invariant is that two consecutive grants for the same tool are separated
//! by at least the tool's interval.
//!
//! The table is built once at startup from descriptor defaults plus
//! configuration overrides; retries of a single invocation share one grant.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use smith_core::error::RuntimeError;
use smith_core::smith_op;
use smith_core::SmithConfig;
use smith_tools::ToolRegistry;

use crate::cancel::CancelToken;

struct ToolSlot {
    interval: Duration,
    next_allowed: Option<Instant>,
}

/// Minimum-interval gate, one slot per configured tool.
pub struct RateLimiter {
    slots: HashMap<String, Mutex<ToolSlot>>,
}

impl RateLimiter {
    /// Builds the limiter table from the registry's per-tool defaults and
    /// the configuration's overrides. Disabled limiting (or a non-positive
    /// interval) leaves a tool ungated.
    pub fn new(config: &SmithConfig, registry: &ToolRegistry) -> Self {
        let mut slots = HashMap::new();
        if !config.enable_rate_limiting {
            return RateLimiter { slots };
        }

        for descriptor in registry.list_all() {
            let interval = config
                .rate_intervals
                .get(&descriptor.name)
                .copied()
                .or(descriptor.default_rate_interval)
                .unwrap_or(0.0);
            if interval > 0.0 {
                slots.insert(
                    descriptor.name.clone(),
                    Mutex::new(ToolSlot {
                        interval: Duration::from_secs_f64(interval),
                        next_allowed: None,
                    }),
                );
            }
        }
        RateLimiter { slots }
    }

    /// An empty limiter that gates nothing (tests, sequential demos).
    pub fn disabled() -> Self {
        RateLimiter {
            slots: HashMap::new(),
        }
    }

    /// True when the tool has a configured interval.
    pub fn is_gated(&self, tool: &str) -> bool {
        self.slots.contains_key(tool)
    }

    /// Blocks until the tool's next permitted instant, then claims it.
    ///
    /// Observes `cancel` while waiting and returns promptly once
    /// cancellation is signalled.
    pub async fn acquire(&self, tool: &str, cancel: &CancelToken) -> Result<(), RuntimeError> {
        let Some(slot) = self.slots.get(tool) else {
            return Ok(());
        };

        loop {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let wait = {
                let mut guard = slot.lock();
                let now = Instant::now();
                match guard.next_allowed {
                    Some(next) if next > now => next - now,
                    _ => {
                        guard.next_allowed = Some(now + guard.interval);
                        return Ok(());
                    }
                }
            };

            smith_op!(
                trace,
                tool = tool,
                wait_ms = wait.as_millis() as u64,
                "Rate limit wait"
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smith_tools::ToolDescriptor;

    fn registry_with_interval(seconds: f64) -> ToolRegistry {
        ToolRegistry::from_descriptors(vec![
            ToolDescriptor::new("gated", "run_gated").with_rate_interval(seconds),
            ToolDescriptor::new("free", "run_free"),
        ])
        .expect("registry")
    }

    #[tokio::test]
    async fn test_ungated_tool_passes_immediately() {
        let limiter = RateLimiter::new(&SmithConfig::default(), &registry_with_interval(1.0));
        assert!(!limiter.is_gated("free"));
        limiter
            .acquire("free", &CancelToken::new())
            .await
            .expect("ungated acquire");
    }

    #[tokio::test]
    async fn test_consecutive_acquisitions_respect_interval() {
        let limiter = RateLimiter::new(&SmithConfig::default(), &registry_with_interval(0.05));
        let cancel = CancelToken::new();

        let start = Instant::now();
        limiter.acquire("gated", &cancel).await.expect("first");
        limiter.acquire("gated", &cancel).await.expect("second");
        limiter.acquire("gated", &cancel).await.expect("third");

        // Two full intervals must separate three grants.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_config_override_wins_over_descriptor() {
        let config = SmithConfig::default().with_rate_interval("gated", 0.0);
        let limiter = RateLimiter::new(&config, &registry_with_interval(10.0));
        // Override of zero removes the gate entirely.
        assert!(!limiter.is_gated("gated"));
    }

    #[tokio::test]
    async fn test_master_switch_disables_everything() {
        let config = SmithConfig::default().with_rate_limiting(false);
        let limiter = RateLimiter::new(&config, &registry_with_interval(10.0));
        assert!(!limiter.is_gated("gated"));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let limiter = RateLimiter::new(&SmithConfig::default(), &registry_with_interval(30.0));
        let cancel = CancelToken::new();
        limiter.acquire("gated", &cancel).await.expect("first");

        let waiter_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waiter_cancel.cancel();
        });

        let start = Instant::now();
        let result = limiter.acquire("gated", &cancel).await;
        assert!(matches!(result, Err(RuntimeError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
