//! Rate limiting for inbound API traffic and outbound scraper identities.
//!
//! A fixed-window counter with an escalating block, keyed by arbitrary
//! identifier (proxy host, client IP, category). State lives in the shared
//! key-value store so every process sees the same windows.

mod config;
mod limiter;

pub use config::{FailurePolicy, RateLimitConfig};
pub use limiter::{RateLimitDecision, RateLimitError, RateLimiter};

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<std::time::Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| std::time::Duration::from_secs(secs.min(60)))
}

/// Calculate exponential backoff delay for a given attempt.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> std::time::Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    std::time::Duration::from_millis(delay_ms.min(60_000))
}
