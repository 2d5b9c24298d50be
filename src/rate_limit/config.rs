//! Rate limiter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when the backing store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the request (inbound API traffic).
    #[default]
    Open,
    /// Reject the request (outbound identities).
    Closed,
}

/// Configuration for a fixed-window rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Key namespace, so independent limiters never share windows.
    pub namespace: String,
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Lockout length in milliseconds once `max_requests * 2` is reached.
    pub block_duration_ms: u64,
    /// Behavior when the store is unavailable.
    pub failure_policy: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            namespace: "api".to_string(),
            max_requests: 20,
            window_ms: 60_000,
            block_duration_ms: 300_000,
            failure_policy: FailurePolicy::Open,
        }
    }
}

impl RateLimitConfig {
    /// Limiter settings for outbound proxies: fail closed, own namespace.
    pub fn for_proxies() -> Self {
        Self {
            namespace: "proxy".to_string(),
            max_requests: 30,
            window_ms: 60_000,
            block_duration_ms: 600_000,
            failure_policy: FailurePolicy::Closed,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_millis(self.block_duration_ms)
    }
}
