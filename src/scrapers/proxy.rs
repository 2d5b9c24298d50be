//! Proxy pool rotation with scoring and health checks.
//!
//! Selection prefers proxies that have rested longest, respond fastest and
//! fail least. Proxies are never removed: once `fail_count` reaches
//! `max_failures` they are skipped until a success resets the count.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::ScrapingError;
use crate::models::Proxy;
use crate::rate_limit::RateLimiter;
use crate::store::{get_json, set_json, SharedStore, StoreResult};

const STORE_KEY: &str = "scraper:proxies";

/// Proxy pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Minimum rest between uses of the same proxy, in milliseconds.
    pub rotation_interval_ms: u64,
    /// Failures after which a proxy is skipped.
    pub max_failures: u32,
    pub health_check_interval_secs: u64,
    pub health_check_timeout_secs: u64,
    pub health_check_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            rotation_interval_ms: 5_000,
            max_failures: 3,
            health_check_interval_secs: 300,
            health_check_timeout_secs: 10,
            health_check_url: "https://httpbin.org/ip".to_string(),
        }
    }
}

/// Cumulative counters for one proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProxyStats {
    pub successes: i64,
    pub failures: i64,
    pub total_time: i64,
    pub average_time: f64,
}

/// Pool overview for status output.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub enabled: usize,
    pub healthy: usize,
    pub proxies: Vec<(Proxy, ProxyStats)>,
}

/// Result of checking a single proxy.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub proxy_id: String,
    pub healthy: bool,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

/// Selection score; higher is better. First maximum wins on ties.
pub fn proxy_score(proxy: &Proxy, now: i64, rotation_interval_ms: u64) -> f64 {
    let rested = (now - proxy.last_used).max(0) as f64;
    let interval = rotation_interval_ms.max(1) as f64;
    let latency = proxy.response_time.max(1) as f64;
    rested / interval + 1000.0 / latency - proxy.fail_count as f64 * 0.2
}

fn stats_key(proxy_id: &str) -> String {
    format!("scraper:proxy_stats:{}", proxy_id)
}

/// Manages the proxy pool.
pub struct ProxyManager {
    store: SharedStore,
    config: ProxyConfig,
    seed: Vec<Proxy>,
    proxies: RwLock<Vec<Proxy>>,
    limiter: RateLimiter,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyManager {
    pub fn new(
        store: SharedStore,
        config: ProxyConfig,
        seed: Vec<Proxy>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            store,
            config,
            seed,
            proxies: RwLock::new(Vec::new()),
            limiter,
            health_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Load the pool from the store, seeding it from static config if absent.
    pub async fn init(&self) -> StoreResult<()> {
        let stored: Option<Vec<Proxy>> = get_json(&*self.store, STORE_KEY).await?;
        let pool = match stored {
            Some(pool) if !pool.is_empty() => pool,
            _ => {
                set_json(&*self.store, STORE_KEY, &self.seed, None).await?;
                info!("Seeded {} proxies", self.seed.len());
                self.seed.clone()
            }
        };
        *self.proxies.write().await = pool;
        Ok(())
    }

    /// Reload the pool from the store.
    pub async fn refresh(&self) -> StoreResult<()> {
        if let Some(pool) = get_json::<Vec<Proxy>>(&*self.store, STORE_KEY).await? {
            *self.proxies.write().await = pool;
        }
        Ok(())
    }

    pub async fn proxies(&self) -> Vec<Proxy> {
        self.proxies.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.proxies.read().await.is_empty()
    }

    async fn persist(&self, proxies: &[Proxy]) {
        if let Err(e) = set_json(&*self.store, STORE_KEY, proxies, None).await {
            warn!("Failed to persist proxy pool: {}", e);
        }
    }

    /// Pick the best available proxy and mark it used.
    pub async fn next(&self) -> Result<Proxy, ScrapingError> {
        let now = chrono::Utc::now().timestamp_millis();
        let snapshot = self.proxies().await;

        let mut best: Option<(String, String, f64)> = None;
        for proxy in &snapshot {
            if !proxy.enabled || proxy.fail_count >= self.config.max_failures {
                continue;
            }
            if ((now - proxy.last_used).max(0) as u64) < self.config.rotation_interval_ms {
                continue;
            }
            if self.limiter.remaining_requests(&proxy.host).await == 0 {
                debug!("Proxy {} is rate limited, skipping", proxy.id());
                continue;
            }
            let score = proxy_score(proxy, now, self.config.rotation_interval_ms);
            if best.as_ref().map_or(true, |(_, _, s)| score > *s) {
                best = Some((proxy.id(), proxy.host.clone(), score));
            }
        }

        let (id, host, score) = best.ok_or(ScrapingError::NoAvailableProxies)?;
        self.limiter.enforce(&host).await?;

        let mut proxies = self.proxies.write().await;
        let proxy = proxies
            .iter_mut()
            .find(|p| p.id() == id)
            .ok_or(ScrapingError::NoAvailableProxies)?;
        proxy.last_used = now;
        let selected = proxy.clone();
        self.persist(&proxies).await;

        debug!("Selected proxy {} (score {:.2})", id, score);
        Ok(selected)
    }

    /// Record a successful request through `proxy`.
    pub async fn report_success(&self, proxy: &Proxy, response_time_ms: u64) {
        let id = proxy.id();
        {
            let mut proxies = self.proxies.write().await;
            if let Some(p) = proxies.iter_mut().find(|p| p.id() == id) {
                p.fail_count = 0;
                p.response_time = response_time_ms;
            }
            self.persist(&proxies).await;
        }

        let key = stats_key(&id);
        let result: StoreResult<()> = async {
            let successes = self.store.hincr_by(&key, "successes", 1).await?;
            let total = self
                .store
                .hincr_by(&key, "total_time", response_time_ms as i64)
                .await?;
            let average = total as f64 / successes.max(1) as f64;
            self.store
                .hset(&key, "average_time", &format!("{:.1}", average))
                .await
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to record stats for proxy {}: {}", id, e);
        }
    }

    /// Record a failed request through `proxy`.
    pub async fn report_failure(&self, proxy: &Proxy) {
        let id = proxy.id();
        {
            let mut proxies = self.proxies.write().await;
            if let Some(p) = proxies.iter_mut().find(|p| p.id() == id) {
                p.fail_count += 1;
                if p.fail_count == self.config.max_failures {
                    warn!("Proxy {} reached {} failures, excluding", id, p.fail_count);
                }
            }
            self.persist(&proxies).await;
        }

        if let Err(e) = self.store.hincr_by(&stats_key(&id), "failures", 1).await {
            warn!("Failed to record stats for proxy {}: {}", id, e);
        }
    }

    /// Cumulative stats for one proxy.
    pub async fn proxy_stats(&self, proxy: &Proxy) -> StoreResult<ProxyStats> {
        let fields: HashMap<String, String> = self.store.hgetall(&stats_key(&proxy.id())).await?;
        let int = |name: &str| fields.get(name).and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok(ProxyStats {
            successes: int("successes"),
            failures: int("failures"),
            total_time: int("total_time"),
            average_time: fields
                .get("average_time")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
        })
    }

    /// Pool overview.
    pub async fn stats(&self) -> StoreResult<PoolStats> {
        let proxies = self.proxies().await;
        let mut rows = Vec::with_capacity(proxies.len());
        for proxy in &proxies {
            rows.push((proxy.clone(), self.proxy_stats(proxy).await?));
        }
        Ok(PoolStats {
            total: proxies.len(),
            enabled: proxies.iter().filter(|p| p.enabled).count(),
            healthy: proxies
                .iter()
                .filter(|p| p.enabled && p.fail_count < self.config.max_failures)
                .count(),
            proxies: rows,
        })
    }

    async fn check_one(&self, proxy: &Proxy) -> HealthCheckResult {
        let timeout = Duration::from_secs(self.config.health_check_timeout_secs);
        let outcome: Result<u64, String> = async {
            let client = reqwest::Client::builder()
                .proxy(reqwest::Proxy::all(proxy.url()).map_err(|e| e.to_string())?)
                .timeout(timeout)
                .build()
                .map_err(|e| e.to_string())?;
            let start = Instant::now();
            let resp = client
                .get(&self.config.health_check_url)
                .send()
                .await
                .map_err(|e| ScrapingError::from_reqwest(e, timeout).to_string())?;
            if let Some(err) = ScrapingError::from_status(resp.status()) {
                return Err(err.to_string());
            }
            Ok(start.elapsed().as_millis() as u64)
        }
        .await;

        match outcome {
            Ok(ms) => {
                self.report_success(proxy, ms).await;
                HealthCheckResult {
                    proxy_id: proxy.id(),
                    healthy: true,
                    response_time_ms: Some(ms),
                    error: None,
                }
            }
            Err(e) => {
                debug!("Health check failed for {}: {}", proxy.id(), e);
                self.report_failure(proxy).await;
                HealthCheckResult {
                    proxy_id: proxy.id(),
                    healthy: false,
                    response_time_ms: None,
                    error: Some(e),
                }
            }
        }
    }

    /// Check every enabled proxy concurrently.
    pub async fn check_health(&self) -> Vec<HealthCheckResult> {
        if let Err(e) = self.refresh().await {
            warn!("Failed to refresh proxies before health check: {}", e);
        }
        let proxies: Vec<Proxy> = self
            .proxies()
            .await
            .into_iter()
            .filter(|p| p.enabled)
            .collect();

        let results = join_all(proxies.iter().map(|p| self.check_one(p))).await;
        let healthy = results.iter().filter(|r| r.healthy).count();
        info!("Proxy health check: {}/{} healthy", healthy, results.len());
        results
    }

    /// Start periodic health checks.
    pub async fn start_health_checks(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(self.config.health_check_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.check_health().await;
            }
        });
        if let Some(old) = self.health_task.lock().await.replace(handle) {
            old.abort();
        }
    }

    /// Stop background work.
    pub async fn destroy(&self) {
        if let Some(handle) = self.health_task.lock().await.take() {
            handle.abort();
        }
    }
}
