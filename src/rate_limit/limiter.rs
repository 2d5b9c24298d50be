//! Fixed-window rate limiter with escalating block.
//!
//! Moderate overuse only rejects for the rest of the current window. Reaching
//! twice the limit writes a `blocked` marker whose TTL outlives the window;
//! while it exists every request for that identifier is rejected.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::{FailurePolicy, RateLimitConfig};
use crate::store::{get_json, set_json, SharedStore, StoreError, StoreResult};

/// Rejection details for callers that propagate errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Rate limit exceeded for {identifier} (retry after {retry_after:?}, blocked: {blocked})")]
pub struct RateLimitError {
    pub identifier: String,
    pub retry_after: Duration,
    pub blocked: bool,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// True when the identifier is under a hard lockout.
    pub blocked: bool,
    /// Time until a request could succeed again (zero when allowed).
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Window {
    count: u32,
    window_start: i64,
}

/// Fixed-window limiter over the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: SharedStore,
    config: RateLimitConfig,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl RateLimiter {
    pub fn new(store: SharedStore) -> Self {
        Self::with_config(store, RateLimitConfig::default())
    }

    pub fn with_config(store: SharedStore, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window_key(&self, identifier: &str) -> String {
        format!("ratelimit:{}:window:{}", self.config.namespace, identifier)
    }

    fn blocked_key(&self, identifier: &str) -> String {
        format!("ratelimit:{}:blocked:{}", self.config.namespace, identifier)
    }

    /// Check and count a request. Returns true if it may proceed.
    pub async fn is_allowed(&self, identifier: &str) -> bool {
        self.check(identifier).await.allowed
    }

    /// Check and count a request, returning an error when rejected.
    pub async fn enforce(&self, identifier: &str) -> Result<RateLimitDecision, RateLimitError> {
        let decision = self.check(identifier).await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(RateLimitError {
                identifier: identifier.to_string(),
                retry_after: decision.retry_after,
                blocked: decision.blocked,
            })
        }
    }

    /// Check and count a request, applying the failure policy on store errors.
    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        match self.try_check(identifier).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    "Rate limit store unavailable for {} ({}), failing {:?}",
                    identifier, e, self.config.failure_policy
                );
                match self.config.failure_policy {
                    FailurePolicy::Open => RateLimitDecision {
                        allowed: true,
                        remaining: self.config.max_requests,
                        blocked: false,
                        retry_after: Duration::ZERO,
                    },
                    FailurePolicy::Closed => RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        blocked: false,
                        retry_after: self.config.window(),
                    },
                }
            }
        }
    }

    async fn try_check(&self, identifier: &str) -> StoreResult<RateLimitDecision> {
        let blocked_key = self.blocked_key(identifier);
        if self.store.exists(&blocked_key).await? {
            let retry_after = self
                .store
                .ttl(&blocked_key)
                .await?
                .unwrap_or_else(|| self.config.block_duration());
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                blocked: true,
                retry_after,
            });
        }

        let now = now_ms();
        let mut window = self.current_window(identifier, now).await?;
        let max = self.config.max_requests;

        if window.count >= max {
            window.count = window.count.saturating_add(1);
            self.save_window(identifier, &window, now).await?;

            if window.count >= max.saturating_mul(2) {
                self.store
                    .set_ex(&blocked_key, "1", self.config.block_duration())
                    .await?;
                warn!(
                    "Blocking {} for {:?} after {} requests in window",
                    identifier,
                    self.config.block_duration(),
                    window.count
                );
                return Ok(RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    blocked: true,
                    retry_after: self.config.block_duration(),
                });
            }

            let elapsed = (now - window.window_start).max(0) as u64;
            let retry_after =
                Duration::from_millis(self.config.window_ms.saturating_sub(elapsed));
            debug!(
                "Rate limited {}: {} requests, retry in {:?}",
                identifier, window.count, retry_after
            );
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                blocked: false,
                retry_after,
            });
        }

        window.count += 1;
        self.save_window(identifier, &window, now).await?;

        Ok(RateLimitDecision {
            allowed: true,
            remaining: max - window.count,
            blocked: false,
            retry_after: Duration::ZERO,
        })
    }

    /// Load the live window, treating a stale one as fresh.
    async fn current_window(&self, identifier: &str, now: i64) -> StoreResult<Window> {
        let stored: Option<Window> = match get_json(&*self.store, &self.window_key(identifier)).await
        {
            Ok(w) => w,
            Err(StoreError::Serialization(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(stored
            .filter(|w| now - w.window_start < self.config.window_ms as i64)
            .unwrap_or(Window {
                count: 0,
                window_start: now,
            }))
    }

    async fn save_window(&self, identifier: &str, window: &Window, now: i64) -> StoreResult<()> {
        let elapsed = (now - window.window_start).max(0) as u64;
        let ttl = Duration::from_millis(self.config.window_ms.saturating_sub(elapsed).max(1));
        set_json(&*self.store, &self.window_key(identifier), window, Some(ttl)).await
    }

    /// Requests left in the current window without counting a request.
    pub async fn remaining_requests(&self, identifier: &str) -> u32 {
        let result: StoreResult<u32> = async {
            if self.store.exists(&self.blocked_key(identifier)).await? {
                return Ok(0);
            }
            let window = self.current_window(identifier, now_ms()).await?;
            Ok(self.config.max_requests.saturating_sub(window.count))
        }
        .await;

        result.unwrap_or_else(|e| {
            warn!("Failed to read rate limit state for {}: {}", identifier, e);
            match self.config.failure_policy {
                FailurePolicy::Open => self.config.max_requests,
                FailurePolicy::Closed => 0,
            }
        })
    }

    /// Clear window and block state for an identifier.
    pub async fn reset_limits(&self, identifier: &str) {
        for key in [self.window_key(identifier), self.blocked_key(identifier)] {
            if let Err(e) = self.store.del(&key).await {
                warn!("Failed to reset rate limit key {}: {}", key, e);
            }
        }
    }
}
