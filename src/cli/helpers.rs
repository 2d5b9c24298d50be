//! Shared wiring and output helpers for CLI commands.

use std::sync::Arc;

use anyhow::Context;
use console::style;
use tracing::debug;

use crate::analysis::{
    CategoryAnalyzer, PriceAnalyzer, PriceSummary, PriceTracker, ProductAnalyzer, SentimentAnalyzer,
};
use crate::config::Config;
use crate::llm::{LlmClient, SharedGenerator};
use crate::models::{Proxy, ScrapedProduct};
use crate::rate_limit::RateLimiter;
use crate::scrapers::{
    parse_proxy_list, read_list_file, CacheManager, HtmlSearchScraper, HttpClient,
    ProductSearchService, ProxyManager, UserAgentManager,
};
use crate::services::{BackupProductService, GiftEnrichmentService};
#[cfg(feature = "redis-backend")]
use crate::store::RedisStore;
use crate::store::{InMemoryStore, SharedStore};

/// Everything a command might need, built once from config.
pub struct AppContext {
    pub config: Config,
    pub store: SharedStore,
    pub generator: SharedGenerator,
    pub user_agents: Arc<UserAgentManager>,
    pub proxies: Arc<ProxyManager>,
    pub http: Arc<HttpClient>,
    pub backup: Arc<BackupProductService>,
}

impl AppContext {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let store = open_store(&config).await?;
        let generator: SharedGenerator = Arc::new(LlmClient::new(config.llm.clone())?);

        let agents = match &config.scraper.user_agent_list {
            Some(path) => read_list_file(path)
                .with_context(|| format!("Failed to read user agent list {}", path.display()))?,
            None => Vec::new(),
        };
        let user_agents = Arc::new(UserAgentManager::new(store.clone(), agents));
        user_agents.init().await?;

        let seed: Vec<Proxy> = match &config.scraper.proxy_list {
            Some(path) => parse_proxy_list(
                &read_list_file(path)
                    .with_context(|| format!("Failed to read proxy list {}", path.display()))?,
            ),
            None => Vec::new(),
        };
        let limiter =
            RateLimiter::with_config(store.clone(), config.scraper.proxy_rate_limit.clone());
        let proxies = Arc::new(ProxyManager::new(
            store.clone(),
            config.scraper.proxy.clone(),
            seed,
            limiter,
        ));
        proxies.init().await?;

        let http = Arc::new(HttpClient::new(
            &config.scraper,
            Some(proxies.clone()),
            user_agents.clone(),
        ));
        let backup = Arc::new(BackupProductService::from_config(
            generator.clone(),
            &config.backup,
        ));

        Ok(Self {
            config,
            store,
            generator,
            user_agents,
            proxies,
            http,
            backup,
        })
    }

    pub fn cache(&self) -> CacheManager {
        CacheManager::new(self.store.clone(), self.config.scraper.cache.clone())
    }

    pub fn search_service(&self) -> ProductSearchService {
        let scraper = Arc::new(HtmlSearchScraper::new(
            self.http.clone(),
            self.config.scraper.clone(),
        ));
        ProductSearchService::new(
            self.cache(),
            scraper,
            self.backup.clone(),
            self.config.scraper.quality,
        )
    }

    pub fn price_analyzer(&self) -> PriceAnalyzer {
        PriceAnalyzer::new(
            self.store.clone(),
            self.generator.clone(),
            self.config.price.clone(),
        )
    }

    pub fn product_analyzer(&self) -> ProductAnalyzer {
        ProductAnalyzer::new(
            Arc::new(CategoryAnalyzer::new(self.store.clone(), self.generator.clone())),
            Arc::new(self.price_analyzer()),
            Arc::new(SentimentAnalyzer::new(
                self.store.clone(),
                self.generator.clone(),
                self.http.clone(),
            )),
        )
    }

    pub fn enrichment_service(&self) -> GiftEnrichmentService {
        GiftEnrichmentService::new(
            self.store.clone(),
            self.generator.clone(),
            self.backup.clone(),
            Arc::new(CategoryAnalyzer::new(self.store.clone(), self.generator.clone())),
            Arc::new(PriceTracker::new(self.store.clone())),
        )
    }
}

async fn open_store(config: &Config) -> anyhow::Result<SharedStore> {
    #[cfg(feature = "redis-backend")]
    if let Some(url) = &config.redis_url {
        let store = RedisStore::new(url)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", url))?;
        debug!("Using Redis store at {}", url);
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "redis-backend"))]
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but the redis-backend feature is disabled");
    }

    debug!("Using in-memory store");
    Ok(Arc::new(InMemoryStore::new()))
}

/// Format a price for display.
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("${:.2}", p),
        None => "-".to_string(),
    }
}

/// Truncate a title to `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn print_products(products: &[ScrapedProduct]) {
    if products.is_empty() {
        println!("{} No products found", style("!").yellow());
        return;
    }
    println!(
        "{:<50} {:>10} {:>7} {:>9}",
        style("Title").bold(),
        style("Price").bold(),
        style("Rating").bold(),
        style("Reviews").bold()
    );
    for product in products {
        println!(
            "{:<50} {:>10} {:>7.1} {:>9}",
            truncate(&product.title, 50),
            format_price(product.price),
            product.rating,
            product.review_count
        );
    }
}

pub fn print_price_summary(summary: &PriceSummary) {
    println!(
        "{:<20} {} - {} (avg {}, median {})",
        "Prices:",
        format_price(Some(summary.min)),
        format_price(Some(summary.max)),
        format_price(Some(summary.average)),
        format_price(Some(summary.median))
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_titles() {
        assert_eq!(truncate("LEGO Classic", 50), "LEGO Classic");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(Some(19.5)), "$19.50");
        assert_eq!(format_price(None), "-");
    }

    #[tokio::test]
    async fn test_context_builds_without_lists() {
        let mut config = Config::default();
        config.redis_url = None;
        config.scraper.proxy_list = None;
        config.scraper.user_agent_list = None;

        let ctx = AppContext::build(config).await.unwrap();
        assert!(ctx.proxies.is_empty().await);
        assert!(!ctx.user_agents.agents().await.is_empty());
        assert_eq!(ctx.backup.source_names()[0], "ai");
    }
}
