//! In-memory store for single-process operation.
//!
//! Fast, lock-based backend. State is not persisted across restarts and
//! expiry is evaluated lazily on access.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{glob_match, KvStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    /// member -> score
    ZSet(BTreeMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

/// In-memory key-value store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    /// Check if the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drop the entry at `key` if it has expired, then return a mutable handle.
fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| e.is_expired()) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType(key.to_string())
}

/// Resolve Redis-style inclusive list bounds into a half-open range.
fn list_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(e) if !e.is_expired() => Ok(1),
            _ => Ok(0),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        Ok(live_entry(&mut entries, key).is_some())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            Some(entry) => match &mut entry.value {
                Value::Str(s) => {
                    let current: i64 = s
                        .parse()
                        .map_err(|_| StoreError::Backend(format!("{} is not an integer", key)))?;
                    let next = current + 1;
                    *s = next.to_string();
                    Ok(next)
                }
                _ => Err(wrong_type(key)),
            },
            None => {
                entries.insert(key.to_string(), Entry::new(Value::Str("1".to_string())));
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut entries = self.entries.write().await;
        Ok(live_entry(&mut entries, key)
            .and_then(|e| e.expires_at)
            .map(|t| t.saturating_duration_since(Instant::now())))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| !e.is_expired() && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if live_entry(&mut entries, key).is_none() {
            entries.insert(key.to_string(), Entry::new(Value::ZSet(BTreeMap::new())));
        }
        match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::ZSet(set)) => {
                set.insert(member.to_string(), score);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key).map(|e| &e.value) {
            Some(Value::ZSet(set)) => {
                let mut members: Vec<(String, f64)> = set
                    .iter()
                    .filter(|(_, s)| **s >= min && **s <= max)
                    .map(|(m, s)| (m.clone(), *s))
                    .collect();
                members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                Ok(members)
            }
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key).map(|e| &mut e.value) {
            Some(Value::ZSet(set)) => {
                let before = set.len();
                set.retain(|_, s| *s < min || *s > max);
                Ok((before - set.len()) as u64)
            }
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if live_entry(&mut entries, key).is_none() {
            entries.insert(key.to_string(), Entry::new(Value::Hash(HashMap::new())));
        }
        match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Hash(hash)) => {
                hash.insert(field.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut entries = self.entries.write().await;
        if live_entry(&mut entries, key).is_none() {
            entries.insert(key.to_string(), Entry::new(Value::Hash(HashMap::new())));
        }
        match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Hash(hash)) => {
                let current: i64 = match hash.get(field) {
                    Some(v) => v.parse().map_err(|_| {
                        StoreError::Backend(format!("{}.{} is not an integer", key, field))
                    })?,
                    None => 0,
                };
                let next = current + delta;
                hash.insert(field.to_string(), next.to_string());
                Ok(next)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key).map(|e| &e.value) {
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        if live_entry(&mut entries, key).is_none() {
            entries.insert(key.to_string(), Entry::new(Value::List(VecDeque::new())));
        }
        match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::List(list)) => {
                list.push_front(value.to_string());
                Ok(list.len() as u64)
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key).map(|e| &mut e.value) {
            Some(Value::List(list)) => {
                match list_bounds(list.len(), start, stop) {
                    Some((from, to)) => {
                        let kept: VecDeque<String> = list.drain(from..to).collect();
                        *list = kept;
                    }
                    None => list.clear(),
                }
                Ok(())
            }
            Some(_) => Err(wrong_type(key)),
            None => Ok(()),
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key).map(|e| &e.value) {
            Some(Value::List(list)) => Ok(match list_bounds(list.len(), start, stop) {
                Some((from, to)) => list.range(from..to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_ex_expires() {
        let store = InMemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_creates_and_counts() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        store.set("bad", "x").await.unwrap();
        assert!(store.incr("bad").await.is_err());
    }

    #[tokio::test]
    async fn test_ttl_reports_remaining_time() {
        let store = InMemoryStore::new();
        store.set("persistent", "v").await.unwrap();
        assert_eq!(store.ttl("persistent").await.unwrap(), None);

        store
            .set_ex("temp", "v", Duration::from_secs(10))
            .await
            .unwrap();
        let ttl = store.ttl("temp").await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_sorted_set_range_and_removal() {
        let store = InMemoryStore::new();
        store.zadd("z", 3.0, "c").await.unwrap();
        store.zadd("z", 1.0, "a").await.unwrap();
        store.zadd("z", 2.0, "b").await.unwrap();

        let all = store.zrange_by_score("z", f64::MIN, f64::MAX).await.unwrap();
        let members: Vec<&str> = all.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["a", "b", "c"]);

        let removed = store.zrem_range_by_score("z", 0.0, 1.5).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.zrange_by_score("z", 0.0, 10.0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hash_counters() {
        let store = InMemoryStore::new();
        assert_eq!(store.hincr_by("h", "hits", 1).await.unwrap(), 1);
        assert_eq!(store.hincr_by("h", "hits", 4).await.unwrap(), 5);
        store.hset("h", "name", "proxy").await.unwrap();

        let all = store.hgetall("h").await.unwrap();
        assert_eq!(all.get("hits").map(String::as_str), Some("5"));
        assert_eq!(all.get("name").map(String::as_str), Some("proxy"));
    }

    #[tokio::test]
    async fn test_list_push_and_trim() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.lpush("l", &i.to_string()).await.unwrap();
        }
        store.ltrim("l", 0, 2).await.unwrap();
        assert_eq!(
            store.lrange("l", 0, -1).await.unwrap(),
            vec!["4".to_string(), "3".to_string(), "2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_keys_and_wrong_type() {
        let store = InMemoryStore::new();
        store.set("scraper:product:1", "a").await.unwrap();
        store.set("scraper:search:1", "b").await.unwrap();
        store.set("price:history:1", "c").await.unwrap();
        store.lpush("list", "x").await.unwrap();

        let keys = store.keys("scraper:*").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(matches!(
            store.get("list").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_del_counts_live_keys() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.del("k").await.unwrap(), 1);
        assert_eq!(store.del("k").await.unwrap(), 0);
        assert!(store.is_empty().await);
    }
}
