//! Product search: cache, live scrape, quality filter, backup fallback.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::cache::CacheManager;
use super::config::ScraperConfig;
use super::error::ScrapingError;
use super::extract::parse_search_results;
use super::http_client::HttpClient;
use super::quality::{filter_products, QualityThresholds};
use crate::analysis::PriceSummary;
use crate::models::{ErrorCode, GiftProcessingError, ProcessingResult, ScrapedProduct};
use crate::services::BackupProductService;

/// Live source of search results.
#[async_trait]
pub trait ProductScraper: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<ScrapedProduct>, ScrapingError>;
}

/// Scrapes a marketplace search page.
pub struct HtmlSearchScraper {
    http: Arc<HttpClient>,
    config: ScraperConfig,
}

impl HtmlSearchScraper {
    pub fn new(http: Arc<HttpClient>, config: ScraperConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl ProductScraper for HtmlSearchScraper {
    async fn search(&self, query: &str) -> Result<Vec<ScrapedProduct>, ScrapingError> {
        let html = self.http.fetch(&self.config.search_url_for(query)).await?;
        parse_search_results(&html, &self.config.base_url)
    }
}

/// Search output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearch {
    pub query: String,
    pub products: Vec<ScrapedProduct>,
    /// `cache`, `live`, or the backup source that answered.
    pub source: String,
    pub price_analysis: PriceSummary,
}

pub type ProductSearchResult = ProcessingResult<ProductSearch>;

/// Search orchestrator.
pub struct ProductSearchService {
    cache: CacheManager,
    scraper: Arc<dyn ProductScraper>,
    backup: Arc<BackupProductService>,
    thresholds: QualityThresholds,
}

impl ProductSearchService {
    pub fn new(
        cache: CacheManager,
        scraper: Arc<dyn ProductScraper>,
        backup: Arc<BackupProductService>,
        thresholds: QualityThresholds,
    ) -> Self {
        Self {
            cache,
            scraper,
            backup,
            thresholds,
        }
    }

    pub async fn search(&self, query: &str) -> ProductSearchResult {
        let query = query.trim();
        if query.is_empty() {
            let mut err = GiftProcessingError::new(ErrorCode::SearchFailed, "Search query is empty");
            err.recoverable = false;
            return ProcessingResult::err(err);
        }

        if let Some(products) = self.cache.get_search_results(query).await {
            return ProcessingResult::ok(self.result(query, products, "cache"));
        }

        match self.scraper.search(query).await {
            Ok(products) => {
                let filtered = self
                    .thresholds
                    .presets()
                    .iter()
                    .map(|preset| filter_products(&products, preset))
                    .find(|kept| !kept.is_empty())
                    .unwrap_or_default();
                if !filtered.is_empty() {
                    info!(
                        "Live search for '{}': {} of {} products passed quality filter",
                        query,
                        filtered.len(),
                        products.len()
                    );
                    self.cache.set_search_results(query, &filtered).await;
                    return ProcessingResult::ok(self.result(query, filtered, "live"));
                }
                warn!("Live search for '{}' found no quality products", query);
            }
            Err(e) => {
                warn!("Live search for '{}' failed ({}): {}", query, e.kind(), e);
            }
        }

        let backup = self.backup.get_backup_products(query).await;
        ProcessingResult::ok(ProductSearch {
            query: query.to_string(),
            products: backup.products,
            source: backup.source,
            price_analysis: backup.price_analysis,
        })
    }

    fn result(&self, query: &str, products: Vec<ScrapedProduct>, source: &str) -> ProductSearch {
        ProductSearch {
            query: query.to_string(),
            price_analysis: PriceSummary::from_products(&products),
            products,
            source: source.to_string(),
        }
    }
}
