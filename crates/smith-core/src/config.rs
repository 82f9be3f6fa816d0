//! Runtime configuration.
//!
//! Controls approval gating, retry behavior, timeouts, concurrency, and
//! rate limiting. Every field has a serde default so partial configuration
//! files deserialize cleanly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for a Smith engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmithConfig {
    /// Gate tools flagged `dangerous` on an external approval callback.
    ///
    /// Default: true
    #[serde(default = "default_require_approval")]
    pub require_approval: bool,

    /// Default retry budget when a node omits `retry`.
    ///
    /// Default: 2
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Default node deadline in seconds when a node omits `timeout`.
    ///
    /// Default: 45.0
    #[serde(default = "default_timeout_secs")]
    pub default_timeout: f64,

    /// Maximum depth of the sub-agent tree.
    ///
    /// Default: 3
    #[serde(default = "default_max_subagent_depth")]
    pub max_subagent_depth: u32,

    /// Maximum number of peers in a fleet.
    ///
    /// Default: 5
    #[serde(default = "default_max_fleet_size")]
    pub max_fleet_size: usize,

    /// Worker-pool bound; 1 selects the sequential fallback.
    ///
    /// Default: number of logical CPUs
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,

    /// Master switch for the rate limiter.
    ///
    /// Default: true
    #[serde(default = "default_enable_rate_limiting")]
    pub enable_rate_limiting: bool,

    /// Per-tool overrides of the descriptor's rate interval, in seconds.
    #[serde(default)]
    pub rate_intervals: HashMap<String, f64>,

    /// Initial retry backoff in milliseconds.
    ///
    /// The actual delay grows exponentially: initial * 2^(attempt-1).
    ///
    /// Default: 500ms
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Cap on the exponential retry backoff, in milliseconds.
    ///
    /// Default: 30000ms
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Character budget for the trace context handed to final synthesis.
    ///
    /// Default: 50000
    #[serde(default = "default_trace_limit_chars")]
    pub trace_limit_chars: usize,

    /// Maximum time to wait on a contended resource lock, in seconds.
    ///
    /// Default: 30.0
    #[serde(default = "default_lock_wait_timeout_secs")]
    pub lock_wait_timeout_secs: f64,
}

impl Default for SmithConfig {
    fn default() -> Self {
        Self {
            require_approval: default_require_approval(),
            max_retries: default_max_retries(),
            default_timeout: default_timeout_secs(),
            max_subagent_depth: default_max_subagent_depth(),
            max_fleet_size: default_max_fleet_size(),
            max_concurrent_tools: default_max_concurrent_tools(),
            enable_rate_limiting: default_enable_rate_limiting(),
            rate_intervals: HashMap::new(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            trace_limit_chars: default_trace_limit_chars(),
            lock_wait_timeout_secs: default_lock_wait_timeout_secs(),
        }
    }
}

impl SmithConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker-pool bound.
    pub fn with_max_concurrent_tools(mut self, n: usize) -> Self {
        self.max_concurrent_tools = n;
        self
    }

    /// Sets the default retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the default node timeout in seconds.
    pub fn with_default_timeout(mut self, seconds: f64) -> Self {
        self.default_timeout = seconds;
        self
    }

    /// Sets the retry backoff parameters.
    pub fn with_retry_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.retry_backoff_ms = initial_ms;
        self.retry_backoff_max_ms = max_ms;
        self
    }

    /// Toggles approval gating of dangerous tools.
    pub fn with_require_approval(mut self, require: bool) -> Self {
        self.require_approval = require;
        self
    }

    /// Toggles the rate limiter.
    pub fn with_rate_limiting(mut self, enabled: bool) -> Self {
        self.enable_rate_limiting = enabled;
        self
    }

    /// Overrides the rate interval for one tool.
    pub fn with_rate_interval(mut self, tool: impl Into<String>, seconds: f64) -> Self {
        self.rate_intervals.insert(tool.into(), seconds);
        self
    }

    /// Sets the sub-agent depth bound.
    pub fn with_max_subagent_depth(mut self, depth: u32) -> Self {
        self.max_subagent_depth = depth;
        self
    }

    /// Sets the fleet size bound.
    pub fn with_max_fleet_size(mut self, size: usize) -> Self {
        self.max_fleet_size = size;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_tools == 0 {
            return Err("max_concurrent_tools must be > 0".to_string());
        }
        if self.default_timeout <= 0.0 {
            return Err("default_timeout must be > 0".to_string());
        }
        if self.retry_backoff_ms == 0 {
            return Err("retry_backoff_ms must be > 0".to_string());
        }
        if self.retry_backoff_max_ms < self.retry_backoff_ms {
            return Err("retry_backoff_max_ms must be >= retry_backoff_ms".to_string());
        }
        if self.max_fleet_size == 0 {
            return Err("max_fleet_size must be > 0".to_string());
        }
        if self.lock_wait_timeout_secs <= 0.0 {
            return Err("lock_wait_timeout_secs must be > 0".to_string());
        }
        for (tool, interval) in &self.rate_intervals {
            if *interval < 0.0 {
                return Err(format!("rate interval for '{tool}' must be >= 0"));
            }
        }
        Ok(())
    }
}

// Default functions for serde

fn default_require_approval() -> bool {
    true
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_secs() -> f64 {
    45.0
}

fn default_max_subagent_depth() -> u32 {
    3
}

fn default_max_fleet_size() -> usize {
    5
}

fn default_max_concurrent_tools() -> usize {
    num_cpus::get().max(1)
}

fn default_enable_rate_limiting() -> bool {
    true
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_retry_backoff_max_ms() -> u64 {
    30_000
}

fn default_trace_limit_chars() -> usize {
    50_000
}

fn default_lock_wait_timeout_secs() -> f64 {
    30.0
}
