//! User-agent rotation.
//!
//! The pool is seeded once from static config into the store and every
//! process hands out the least recently used entry. A background task
//! refreshes the in-process copy from the store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::UserAgent;
use crate::store::{get_json, set_json, SharedStore, StoreResult};

const STORE_KEY: &str = "scraper:useragents";

/// How often the in-process pool is refreshed from the store.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Current desktop browser agents, used when no list file is configured.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Hands out user agents in least-recently-used order.
pub struct UserAgentManager {
    store: SharedStore,
    seed: Vec<String>,
    agents: RwLock<Vec<UserAgent>>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl UserAgentManager {
    /// Create a manager seeded with `agents`, or the built-in list if empty.
    pub fn new(store: SharedStore, agents: Vec<String>) -> Self {
        let seed = if agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            agents
        };
        Self {
            store,
            seed,
            agents: RwLock::new(Vec::new()),
            sync_task: Mutex::new(None),
        }
    }

    /// Load the pool from the store, seeding it from static config if absent.
    pub async fn init(&self) -> StoreResult<()> {
        let stored: Option<Vec<UserAgent>> = get_json(&*self.store, STORE_KEY).await?;
        let pool = match stored {
            Some(pool) if !pool.is_empty() => {
                debug!("Loaded {} user agents from store", pool.len());
                pool
            }
            _ => {
                let pool: Vec<UserAgent> = self.seed.iter().map(UserAgent::new).collect();
                set_json(&*self.store, STORE_KEY, &pool, None).await?;
                info!("Seeded {} user agents", pool.len());
                pool
            }
        };
        *self.agents.write().await = pool;
        Ok(())
    }

    /// Next user agent: the entry with the oldest `last_used`.
    pub async fn next(&self) -> String {
        let mut agents = self.agents.write().await;
        if agents.is_empty() {
            *agents = self.seed.iter().map(UserAgent::new).collect();
        }

        // Seed is never empty, so neither is the pool.
        let Some(index) = agents
            .iter()
            .enumerate()
            .min_by_key(|(_, ua)| ua.last_used)
            .map(|(i, _)| i)
        else {
            return DEFAULT_USER_AGENTS[0].to_string();
        };

        agents[index].last_used = chrono::Utc::now().timestamp_millis();
        let value = agents[index].value.clone();

        if let Err(e) = set_json(&*self.store, STORE_KEY, &*agents, None).await {
            warn!("Failed to persist user agent rotation: {}", e);
        }
        value
    }

    /// Replace the in-process pool with the stored one.
    pub async fn sync(&self) -> StoreResult<()> {
        if let Some(pool) = get_json::<Vec<UserAgent>>(&*self.store, STORE_KEY).await? {
            if !pool.is_empty() {
                *self.agents.write().await = pool;
            }
        }
        Ok(())
    }

    /// Snapshot of the current pool.
    pub async fn agents(&self) -> Vec<UserAgent> {
        self.agents.read().await.clone()
    }

    /// Start periodic store sync.
    pub async fn start_sync(self: &Arc<Self>, interval: Duration) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.sync().await {
                    warn!("User agent sync failed: {}", e);
                }
            }
        });
        if let Some(old) = self.sync_task.lock().await.replace(handle) {
            old.abort();
        }
    }

    /// Stop the background sync task.
    pub async fn stop(&self) {
        if let Some(handle) = self.sync_task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, KvStore};

    fn agents(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_rotates_least_recently_used() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let manager = UserAgentManager::new(store, agents(&["a", "b", "c"]));
        manager.init().await.unwrap();

        let picks = vec![
            manager.next().await,
            manager.next().await,
            manager.next().await,
            manager.next().await,
        ];
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_init_prefers_stored_pool() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let first = UserAgentManager::new(store.clone(), agents(&["stored"]));
        first.init().await.unwrap();

        let second = UserAgentManager::new(store.clone(), agents(&["other"]));
        second.init().await.unwrap();
        assert_eq!(second.next().await, "stored");
    }

    #[tokio::test]
    async fn test_empty_list_uses_builtin_agents() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let manager = UserAgentManager::new(store, Vec::new());
        manager.init().await.unwrap();
        assert_eq!(manager.agents().await.len(), DEFAULT_USER_AGENTS.len());
        assert!(manager.next().await.starts_with("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_rotation_persists_and_syncs_across_managers() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let a = UserAgentManager::new(store.clone(), agents(&["x", "y"]));
        let b = UserAgentManager::new(store.clone(), agents(&["x", "y"]));
        a.init().await.unwrap();
        b.init().await.unwrap();

        assert_eq!(a.next().await, "x");
        b.sync().await.unwrap();
        assert_eq!(b.next().await, "y");
        assert!(store.exists(STORE_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_background_sync_can_stop() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let manager = Arc::new(UserAgentManager::new(store, agents(&["x"])));
        manager.init().await.unwrap();
        manager.start_sync(Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.stop().await;
        assert!(manager.sync_task.lock().await.is_none());
    }
}
