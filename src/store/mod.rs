//! Key-value storage for rotation state, rate-limit windows and caches.
//!
//! Provides a pluggable store with the operations the scraping pipeline needs:
//! - Plain strings with optional expiry (caches, rate-limit windows)
//! - Counters and hashes (cache statistics, per-proxy stats)
//! - Sorted sets (price history time series)
//! - Lists (bounded recent history)
//!
//! Backends:
//! - In-memory (default, single process)
//! - Redis (shared across processes, `redis-backend` feature)

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use memory::InMemoryStore;
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shared store handle.
pub type SharedStore = Arc<dyn KvStore>;

/// Errors from store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Wrong type for key {0}")]
    WrongType(String),
}

/// Async key-value store.
///
/// Implementations must be thread-safe. Read-modify-write sequences built on
/// top of these calls are not atomic across processes.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value with no expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Set a string value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete a key of any type. Returns the number of keys removed.
    async fn del(&self, key: &str) -> StoreResult<u64>;

    /// Check whether a live key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Increment an integer value, creating it at 0 first if absent.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Set an expiry on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining time to live, or None if the key is absent or persistent.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// List keys matching a glob pattern (only `*` wildcards are supported).
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Add or update a sorted-set member.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()>;

    /// Members with `min <= score <= max`, ascending by score.
    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>>;

    /// Remove members with `min <= score <= max`. Returns the count removed.
    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64>;

    /// Set a hash field.
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Increment a hash field by `delta`, returning the new value.
    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// All fields of a hash (empty if absent).
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Push to the head of a list, returning the new length.
    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Trim a list to the inclusive range `[start, stop]` (negative = from end).
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()>;

    /// Read the inclusive range `[start, stop]` of a list.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;
}

/// Read a JSON-encoded value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}

/// Write a JSON-encoded value, with expiry when `ttl` is given.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> StoreResult<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| StoreError::Serialization(format!("{}: {}", key, e)))?;
    match ttl {
        Some(ttl) => store.set_ex(key, &raw, ttl).await,
        None => store.set(key, &raw).await,
    }
}

/// Match a key against a glob pattern containing only `*` wildcards.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("scraper:*", "scraper:product:abc"));
        assert!(glob_match("scraper:*:abc", "scraper:product:abc"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("scraper:*", "price:history:abc"));
        assert!(!glob_match("scraper:*:abc", "scraper:product:abd"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_json_helpers_round_trip_through_store() {
        let store = InMemoryStore::new();
        set_json(&store, "k", &vec![1, 2, 3], None).await.unwrap();
        let loaded: Option<Vec<i32>> = get_json(&store, "k").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        let missing: Option<Vec<i32>> = get_json(&store, "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_json_reports_bad_payload() {
        let store = InMemoryStore::new();
        store.set("k", "not json").await.unwrap();
        let result: StoreResult<Option<Vec<i32>>> = get_json(&store, "k").await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
