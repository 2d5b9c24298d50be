//! Namespaced caching of scrape results.
//!
//! Keys are `scraper:{type}:{identifier}` where the identifier is a hex
//! SHA-256 prefix of the normalized input.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::models::ScrapedProduct;
use crate::store::{get_json, set_json, SharedStore, StoreResult};

const STATS_KEY: &str = "scraper:cache_stats";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    #[default]
    Lru,
    Fifo,
}

/// Cache TTLs per entry type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub product_ttl_secs: u64,
    pub search_ttl_secs: u64,
    pub price_ttl_secs: u64,
    /// Recorded for operators; eviction is left to the store's TTLs.
    pub strategy: CacheStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            product_ttl_secs: 24 * 3600,
            search_ttl_secs: 3600,
            price_ttl_secs: 6 * 3600,
            strategy: CacheStrategy::Lru,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    Search,
    Product,
    Price,
}

impl CacheType {
    pub const ALL: [CacheType; 3] = [Self::Search, Self::Product, Self::Price];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Product => "product",
            Self::Price => "price",
        }
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: i64,
    pub misses: i64,
    pub hit_rate: f64,
}

fn normalize(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache key for an entry type and raw identifier.
pub fn cache_key(kind: CacheType, input: &str) -> String {
    let digest = Sha256::digest(normalize(input).as_bytes());
    format!("scraper:{}:{}", kind.as_str(), &hex::encode(digest)[..16])
}

/// Cache over the shared store. Failures are logged and treated as misses.
#[derive(Clone)]
pub struct CacheManager {
    store: SharedStore,
    config: CacheConfig,
}

impl CacheManager {
    pub fn new(store: SharedStore, config: CacheConfig) -> Self {
        Self { store, config }
    }

    fn ttl(&self, kind: CacheType) -> Duration {
        Duration::from_secs(match kind {
            CacheType::Search => self.config.search_ttl_secs,
            CacheType::Product => self.config.product_ttl_secs,
            CacheType::Price => self.config.price_ttl_secs,
        })
    }

    async fn get<T: DeserializeOwned>(&self, kind: CacheType, input: &str) -> Option<T> {
        let key = cache_key(kind, input);
        let value = match get_json::<T>(&*self.store, &key).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        };
        self.increment_stats(value.is_some()).await;
        debug!(
            "Cache {} for {}",
            if value.is_some() { "hit" } else { "miss" },
            key
        );
        value
    }

    async fn set<T: Serialize + ?Sized>(&self, kind: CacheType, input: &str, value: &T) {
        let key = cache_key(kind, input);
        if let Err(e) = set_json(&*self.store, &key, value, Some(self.ttl(kind))).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    pub async fn get_search_results(&self, query: &str) -> Option<Vec<ScrapedProduct>> {
        self.get(CacheType::Search, query).await
    }

    pub async fn set_search_results(&self, query: &str, products: &[ScrapedProduct]) {
        self.set(CacheType::Search, query, products).await
    }

    pub async fn get_product(&self, url: &str) -> Option<ScrapedProduct> {
        self.get(CacheType::Product, url).await
    }

    pub async fn set_product(&self, url: &str, product: &ScrapedProduct) {
        self.set(CacheType::Product, url, product).await
    }

    pub async fn get_price_data<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(CacheType::Price, key).await
    }

    pub async fn set_price_data<T: Serialize>(&self, key: &str, data: &T) {
        self.set(CacheType::Price, key, data).await
    }

    /// Remove every cached entry. Rotation state and stats are kept.
    pub async fn clear_cache(&self) -> StoreResult<u64> {
        let mut removed = 0;
        for kind in CacheType::ALL {
            for key in self.store.keys(&format!("scraper:{}:*", kind.as_str())).await? {
                removed += self.store.del(&key).await?;
            }
        }
        debug!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    pub async fn increment_stats(&self, hit: bool) {
        let field = if hit { "hits" } else { "misses" };
        if let Err(e) = self.store.hincr_by(STATS_KEY, field, 1).await {
            warn!("Failed to update cache stats: {}", e);
        }
    }

    pub async fn stats(&self) -> StoreResult<CacheStats> {
        let fields = self.store.hgetall(STATS_KEY).await?;
        let hits: i64 = fields.get("hits").and_then(|v| v.parse().ok()).unwrap_or(0);
        let misses: i64 = fields.get("misses").and_then(|v| v.parse().ok()).unwrap_or(0);
        let total = hits + misses;
        Ok(CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, KvStore};
    use std::sync::Arc;

    fn cache() -> (CacheManager, SharedStore) {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        (CacheManager::new(store.clone(), CacheConfig::default()), store)
    }

    #[test]
    fn test_key_normalizes_input() {
        let a = cache_key(CacheType::Search, "  Lego   Space ");
        let b = cache_key(CacheType::Search, "lego space");
        assert_eq!(a, b);
        assert!(a.starts_with("scraper:search:"));
        assert_eq!(a.len(), "scraper:search:".len() + 16);
        assert_ne!(a, cache_key(CacheType::Product, "lego space"));
    }

    #[tokio::test]
    async fn test_search_results_round_trip_and_stats() {
        let (cache, _) = cache();
        assert!(cache.get_search_results("kites").await.is_none());

        let products = vec![ScrapedProduct::new("Kite", "https://shop.example/kite").with_price(15.0)];
        cache.set_search_results("kites", &products).await;
        assert_eq!(cache.get_search_results("Kites").await, Some(products));

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_entries_expire_with_type_ttl() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let cache = CacheManager::new(
            store,
            CacheConfig {
                product_ttl_secs: 0,
                ..CacheConfig::default()
            },
        );
        let product = ScrapedProduct::new("Yo-yo", "https://shop.example/yoyo");
        cache.set_product(&product.url, &product).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get_product(&product.url).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_cache_keeps_rotation_state() {
        let (cache, store) = cache();
        cache.set_price_data("toys", &vec![1.0, 2.0]).await;
        cache
            .set_product("https://shop.example/a", &ScrapedProduct::new("A", "https://shop.example/a"))
            .await;
        store.set("scraper:proxies", "[]").await.unwrap();

        assert_eq!(cache.clear_cache().await.unwrap(), 2);
        assert!(store.exists("scraper:proxies").await.unwrap());
        assert!(cache.get_price_data::<Vec<f64>>("toys").await.is_none());
    }
}
