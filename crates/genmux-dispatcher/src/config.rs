use genmux_common::protocol::error::{DispatchError, Result};
use std::time::Duration;

use crate::health_checker::HealthCheckConfig;
use crate::retry::RetryConfig;

/// Static configuration supplied to a [`Dispatcher`](crate::Dispatcher) at
/// construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Requests allowed to execute at once; the rest wait in FIFO order
    ///
    /// Default: 10
    pub max_concurrent_requests: usize,
    pub retry: RetryConfig,
    pub health: HealthCheckConfig,
    /// A node is eligible for selection only while its in-flight load is
    /// strictly below this ceiling
    ///
    /// Default: 1
    pub node_load_ceiling: u32,
    /// Per-call timeout for nodes registered without one
    ///
    /// Default: 30s
    pub default_node_timeout: Duration,
    /// Token budget for nodes registered without one
    ///
    /// Default: 1024
    pub default_max_tokens: u32,
    /// Buffer size of the lifecycle event channel
    ///
    /// Default: 256
    pub event_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            retry: RetryConfig::default(),
            health: HealthCheckConfig::default(),
            node_load_ceiling: 1,
            default_node_timeout: Duration::from_secs(30),
            default_max_tokens: 1024,
            event_capacity: 256,
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_health(mut self, health: HealthCheckConfig) -> Self {
        self.health = health;
        self
    }

    pub fn with_node_load_ceiling(mut self, ceiling: u32) -> Self {
        self.node_load_ceiling = ceiling;
        self
    }

    pub fn with_default_node_timeout(mut self, timeout: Duration) -> Self {
        self.default_node_timeout = timeout;
        self
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Disables the background prober.
    pub fn without_health_checks(mut self) -> Self {
        self.health.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(invalid("max_concurrent_requests must be at least 1"));
        }
        if self.retry.retry_limit == 0 {
            return Err(invalid("retry_limit must be at least 1"));
        }
        if self.node_load_ceiling == 0 {
            return Err(invalid("node_load_ceiling must be at least 1"));
        }
        if self.default_node_timeout.is_zero() {
            return Err(invalid("default_node_timeout must be greater than zero"));
        }
        if self.default_max_tokens == 0 {
            return Err(invalid("default_max_tokens must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity must be at least 1"));
        }
        if self.health.enabled && (self.health.interval.is_zero() || self.health.timeout.is_zero()) {
            return Err(invalid("health check interval and timeout must be greater than zero"));
        }
        Ok(())
    }

    pub(crate) fn node_defaults(&self) -> NodeDefaults {
        NodeDefaults {
            max_tokens: self.default_max_tokens,
            timeout: self.default_node_timeout,
        }
    }
}

/// Fallbacks applied to node specs that omit optional fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDefaults {
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        DispatcherConfig::default().node_defaults()
    }
}

fn invalid(msg: &str) -> DispatchError {
    DispatchError::InvalidConfig(msg.to_string())
}
