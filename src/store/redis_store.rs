//! Redis-backed store for multi-process coordination.
//!
//! Proxy and user-agent rotation state, rate-limit windows and caches are
//! shared between every process pointed at the same Redis instance.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{KvStore, StoreError, StoreResult};

/// Redis-backed key-value store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self { conn })
    }
}

fn backend_err(e: redis::RedisError) -> StoreError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(count > 0)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let set: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(set == 1)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        // -2 = missing, -1 = no expiry
        let ms: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok((ms >= 0).then(|| Duration::from_millis(ms as u64)))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        keys.sort();
        Ok(keys)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        let members: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(members)
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(removed)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(fields)
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(len)
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(items)
    }
}
