//! HTTP client binding proxy rotation, user-agent rotation and retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Client};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::ScraperConfig;
use super::error::ScrapingError;
use super::extract::parse_reviews;
use super::proxy::ProxyManager;
use super::user_agent::UserAgentManager;
use crate::analysis::ReviewSource;
use crate::models::{Proxy, Review};
use crate::rate_limit::{backoff_delay, parse_retry_after};

const DIRECT: &str = "direct";

/// Fetches pages through the rotating proxy pool.
///
/// With no proxy manager (or an empty pool) requests go out directly.
pub struct HttpClient {
    proxies: Option<Arc<ProxyManager>>,
    user_agents: Arc<UserAgentManager>,
    timeout: Duration,
    max_retries: u32,
    retry_base_ms: u64,
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpClient {
    pub fn new(
        config: &ScraperConfig,
        proxies: Option<Arc<ProxyManager>>,
        user_agents: Arc<UserAgentManager>,
    ) -> Self {
        Self {
            proxies,
            user_agents,
            timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Build (or reuse) the reqwest client bound to `proxy`.
    async fn client_for(&self, proxy: Option<&Proxy>) -> Result<Client, ScrapingError> {
        let key = proxy.map(Proxy::id).unwrap_or_else(|| DIRECT.to_string());
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true);
        if let Some(proxy) = proxy {
            let rp = reqwest::Proxy::all(proxy.url()).map_err(|e| {
                ScrapingError::Validation(format!("Invalid proxy {}: {}", proxy.id(), e))
            })?;
            builder = builder.proxy(rp);
        }
        let client = builder
            .build()
            .map_err(|e| ScrapingError::Validation(format!("Failed to create HTTP client: {}", e)))?;

        clients.insert(key, client.clone());
        Ok(client)
    }

    async fn pick_proxy(&self) -> Result<Option<Proxy>, ScrapingError> {
        match &self.proxies {
            Some(manager) if !manager.is_empty().await => manager.next().await.map(Some),
            _ => Ok(None),
        }
    }

    /// Single attempt. Returns the body, or the classified error plus any
    /// Retry-After hint.
    async fn attempt(
        &self,
        url: &str,
        proxy: Option<&Proxy>,
    ) -> Result<String, (ScrapingError, Option<Duration>)> {
        let client = self.client_for(proxy).await.map_err(|e| (e, None))?;
        let user_agent = self.user_agents.next().await;

        let start = Instant::now();
        let response = client
            .get(url)
            .header(header::USER_AGENT, user_agent)
            .header(header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| (ScrapingError::from_reqwest(e, self.timeout), None))?;

        if let Some(err) = ScrapingError::from_status(response.status()) {
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            return Err((err, retry_after));
        }

        let body = response
            .text()
            .await
            .map_err(|e| (ScrapingError::from_reqwest(e, self.timeout), None))?;

        if let (Some(manager), Some(proxy)) = (&self.proxies, proxy) {
            manager
                .report_success(proxy, start.elapsed().as_millis() as u64)
                .await;
        }
        Ok(body)
    }

    /// Fetch a page as text, retrying retryable failures with backoff.
    pub async fn fetch(&self, url: &str) -> Result<String, ScrapingError> {
        let mut attempt = 0;
        loop {
            let proxy = self.pick_proxy().await?;
            let via = proxy.as_ref().map(Proxy::id).unwrap_or_else(|| DIRECT.to_string());
            debug!("Fetching {} via {} (attempt {})", url, via, attempt + 1);

            match self.attempt(url, proxy.as_ref()).await {
                Ok(body) => return Ok(body),
                Err((err, retry_after)) => {
                    if let (Some(manager), Some(proxy)) = (&self.proxies, proxy.as_ref()) {
                        if err.counts_against_proxy() {
                            manager.report_failure(proxy).await;
                        }
                    }

                    if !err.retryable() || attempt >= self.max_retries {
                        warn!("Fetch failed for {} via {}: {}", url, via, err);
                        return Err(err);
                    }

                    let wait = retry_after.unwrap_or_else(|| backoff_delay(attempt, self.retry_base_ms));
                    debug!(
                        "Retryable {} error for {}, waiting {:?}",
                        err.kind(),
                        url,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl ReviewSource for HttpClient {
    async fn fetch_reviews(&self, url: &str) -> Result<Vec<Review>, ScrapingError> {
        let html = self.fetch(url).await?;
        parse_reviews(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyProtocol;
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::scrapers::proxy::ProxyConfig;
    use crate::store::{InMemoryStore, SharedStore};

    fn config() -> ScraperConfig {
        ScraperConfig {
            timeout_secs: 2,
            max_retries: 1,
            retry_base_ms: 1,
            ..ScraperConfig::default()
        }
    }

    #[tokio::test]
    async fn test_direct_fetch_connection_refused_is_network_error() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let agents = Arc::new(UserAgentManager::new(store, Vec::new()));
        let client = HttpClient::new(&config(), None, agents);

        let err = client.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert_eq!(err.kind(), "network");
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn test_failed_proxy_is_reported_and_pool_exhausts() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let agents = Arc::new(UserAgentManager::new(store.clone(), Vec::new()));
        let limiter = RateLimiter::with_config(store.clone(), RateLimitConfig::for_proxies());
        let manager = Arc::new(ProxyManager::new(
            store,
            ProxyConfig {
                rotation_interval_ms: 0,
                max_failures: 2,
                ..ProxyConfig::default()
            },
            vec![Proxy::new("127.0.0.1", 9, ProxyProtocol::Http)],
            limiter,
        ));
        manager.init().await.unwrap();

        let client = HttpClient::new(&config(), Some(manager.clone()), agents);
        let err = client.fetch("http://example.invalid/").await.unwrap_err();
        assert_eq!(err.kind(), "network");
        assert_eq!(manager.proxies().await[0].fail_count, 2);

        let err = client.fetch("http://example.invalid/").await.unwrap_err();
        assert!(matches!(err, ScrapingError::NoAvailableProxies));
    }
}
