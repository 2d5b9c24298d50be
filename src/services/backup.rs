//! Backup product acquisition for when live scraping comes up empty.
//!
//! Sources are tried by ascending priority; the first to return at least one
//! product wins. If every source fails, placeholders are synthesized, first
//! through the generative service and finally from a fixed template, so a
//! caller always gets three products and a price summary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::PriceSummary;
use crate::llm::{complete_json, prompts, CompletionRequest, LlmError, SharedGenerator};
use crate::models::ScrapedProduct;

/// Products requested from each source.
const SOURCE_LIMIT: usize = 5;
const PLACEHOLDER_COUNT: usize = 3;

/// Errors from a backup product source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Http(e.to_string())
    }
}

/// A source of product listings other than the live scraper.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Name recorded in [`BackupProductResult::source`].
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> u8;

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<ScrapedProduct>, SourceError>;
}

/// API keys and limits for the external sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub serpapi_key: Option<String>,
    pub walmart_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            serpapi_key: None,
            walmart_api_key: None,
            timeout_secs: 10,
        }
        .with_env_overrides()
    }
}

impl BackupConfig {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("SERPAPI_KEY") {
            if !key.is_empty() {
                self.serpapi_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("WALMART_API_KEY") {
            if !key.is_empty() {
                self.walmart_api_key = Some(key);
            }
        }
        self
    }
}

/// Outcome of a backup lookup. Always carries products.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProductResult {
    pub products: Vec<ScrapedProduct>,
    pub price_analysis: PriceSummary,
    pub timestamp: DateTime<Utc>,
    /// Source name, `placeholder:generated` or `placeholder:static`.
    pub source: String,
}

fn search_link(query: &str) -> String {
    format!("https://www.amazon.com/s?k={}", urlencoding::encode(query))
}

#[derive(Debug, Deserialize)]
struct GeneratedProducts {
    #[serde(default)]
    products: Vec<ScrapedProduct>,
}

fn tidy_generated(products: Vec<ScrapedProduct>) -> Vec<ScrapedProduct> {
    products
        .into_iter()
        .filter(|p| !p.title.trim().is_empty())
        .map(|mut p| {
            if p.url.is_empty() {
                p.url = search_link(&p.title);
            }
            p.rating = p.rating.clamp(0.0, 5.0);
            p
        })
        .collect()
}

/// Product ideas from the generative service.
pub struct GenerativeSource {
    generator: SharedGenerator,
}

impl GenerativeSource {
    pub fn new(generator: SharedGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl ProductSource for GenerativeSource {
    fn name(&self) -> &str {
        "ai"
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<ScrapedProduct>, SourceError> {
        let count = limit.to_string();
        let request = CompletionRequest::new(
            prompts::JSON_SYSTEM,
            prompts::render(
                prompts::BACKUP_PRODUCTS_PROMPT,
                &[("count", &count), ("query", query)],
            ),
        )
        .with_temperature(0.4);
        let reply: GeneratedProducts = complete_json(&*self.generator, request).await?;
        let mut products = tidy_generated(reply.products);
        products.truncate(limit);
        Ok(products)
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    shopping_results: Vec<SerpApiItem>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpApiItem {
    title: String,
    #[serde(default)]
    product_link: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    extracted_price: Option<f64>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    reviews: Option<u32>,
    #[serde(default)]
    thumbnail: Option<String>,
}

impl From<SerpApiItem> for ScrapedProduct {
    fn from(item: SerpApiItem) -> Self {
        let url = item.product_link.or(item.link).unwrap_or_default();
        let mut product = ScrapedProduct::new(item.title, url)
            .with_rating(item.rating.unwrap_or(0.0), item.reviews.unwrap_or(0));
        product.price = item.extracted_price;
        product.image_url = item.thumbnail;
        product
    }
}

/// Google Shopping results through SerpAPI.
pub struct SerpApiSource {
    client: Client,
    api_key: String,
}

impl SerpApiSource {
    const ENDPOINT: &'static str = "https://serpapi.com/search.json";

    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ProductSource for SerpApiSource {
    fn name(&self) -> &str {
        "google_shopping"
    }

    fn priority(&self) -> u8 {
        2
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<ScrapedProduct>, SourceError> {
        let response = self
            .client
            .get(Self::ENDPOINT)
            .query(&[
                ("engine", "google_shopping"),
                ("q", query),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: SerpApiResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: error,
            });
        }
        Ok(body
            .shopping_results
            .into_iter()
            .take(limit)
            .map(ScrapedProduct::from)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct WalmartResponse {
    #[serde(default)]
    items: Vec<WalmartItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalmartItem {
    name: String,
    #[serde(default)]
    sale_price: Option<f64>,
    /// Sent as a string, e.g. "4.6".
    #[serde(default)]
    customer_rating: Option<String>,
    #[serde(default)]
    num_reviews: Option<u32>,
    #[serde(default)]
    product_url: Option<String>,
    #[serde(default)]
    thumbnail_image: Option<String>,
    #[serde(default)]
    category_path: Option<String>,
}

impl From<WalmartItem> for ScrapedProduct {
    fn from(item: WalmartItem) -> Self {
        let rating = item
            .customer_rating
            .and_then(|r| r.parse::<f64>().ok())
            .unwrap_or(0.0);
        let mut product = ScrapedProduct::new(item.name, item.product_url.unwrap_or_default())
            .with_rating(rating, item.num_reviews.unwrap_or(0));
        product.price = item.sale_price;
        product.image_url = item.thumbnail_image;
        product.category = item
            .category_path
            .and_then(|path| path.split('/').next().map(|c| c.trim().to_lowercase()));
        product
    }
}

/// Walmart affiliate product search.
pub struct WalmartSource {
    client: Client,
    api_key: String,
}

impl WalmartSource {
    const ENDPOINT: &'static str =
        "https://developer.api.walmart.com/api-proxy/service/affil/product/v2/search";

    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ProductSource for WalmartSource {
    fn name(&self) -> &str {
        "walmart"
    }

    fn priority(&self) -> u8 {
        3
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<ScrapedProduct>, SourceError> {
        let num_items = limit.to_string();
        let response = self
            .client
            .get(Self::ENDPOINT)
            .header("WM_CONSUMER.ID", &self.api_key)
            .query(&[("query", query), ("numItems", num_items.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: WalmartResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(body.items.into_iter().take(limit).map(ScrapedProduct::from).collect())
    }
}

/// Ordered fallback over product sources.
pub struct BackupProductService {
    generator: SharedGenerator,
    sources: Vec<Arc<dyn ProductSource>>,
}

impl BackupProductService {
    /// The generative source plus `extra_sources`, ordered by priority.
    pub fn new(generator: SharedGenerator, extra_sources: Vec<Arc<dyn ProductSource>>) -> Self {
        let mut sources: Vec<Arc<dyn ProductSource>> =
            vec![Arc::new(GenerativeSource::new(generator.clone()))];
        sources.extend(extra_sources);
        sources.sort_by_key(|s| s.priority());
        Self { generator, sources }
    }

    /// Enable the external sources whose API keys are configured.
    pub fn from_config(generator: SharedGenerator, config: &BackupConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut extra: Vec<Arc<dyn ProductSource>> = Vec::new();

        if let Some(key) = &config.serpapi_key {
            match SerpApiSource::new(key.clone(), timeout) {
                Ok(source) => extra.push(Arc::new(source)),
                Err(e) => warn!("Google Shopping source disabled: {}", e),
            }
        }
        if let Some(key) = &config.walmart_api_key {
            match WalmartSource::new(key.clone(), timeout) {
                Ok(source) => extra.push(Arc::new(source)),
                Err(e) => warn!("Walmart source disabled: {}", e),
            }
        }
        Self::new(generator, extra)
    }

    /// Names of the configured sources in the order they are tried.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn get_backup_products(&self, query: &str) -> BackupProductResult {
        for source in &self.sources {
            match source.fetch(query, SOURCE_LIMIT).await {
                Ok(products) if !products.is_empty() => {
                    info!(
                        "Backup source {} returned {} products for '{}'",
                        source.name(),
                        products.len(),
                        query
                    );
                    return Self::result(products, source.name());
                }
                Ok(_) => debug!("Backup source {} had no results for '{}'", source.name(), query),
                Err(e) => warn!("Backup source {} failed for '{}': {}", source.name(), query, e),
            }
        }

        match self.generated_placeholders(query).await {
            Ok(products) => Self::result(products, "placeholder:generated"),
            Err(e) => {
                debug!("Generated placeholders unavailable for '{}': {}", query, e);
                Self::result(static_placeholders(query), "placeholder:static")
            }
        }
    }

    async fn generated_placeholders(&self, query: &str) -> Result<Vec<ScrapedProduct>, SourceError> {
        let request = CompletionRequest::new(
            prompts::JSON_SYSTEM,
            prompts::render(prompts::PLACEHOLDER_PRODUCTS_PROMPT, &[("query", query)]),
        )
        .with_temperature(0.7);
        let reply: GeneratedProducts = complete_json(&*self.generator, request).await?;

        let mut products: Vec<ScrapedProduct> = tidy_generated(reply.products)
            .into_iter()
            .filter(|p| p.valid_price().is_some())
            .collect();
        if products.len() < PLACEHOLDER_COUNT {
            return Err(SourceError::Parse(format!(
                "expected {} priced placeholders, got {}",
                PLACEHOLDER_COUNT,
                products.len()
            )));
        }
        products.truncate(PLACEHOLDER_COUNT);
        Ok(products)
    }

    fn result(products: Vec<ScrapedProduct>, source: &str) -> BackupProductResult {
        BackupProductResult {
            price_analysis: PriceSummary::from_products(&products),
            products,
            timestamp: Utc::now(),
            source: source.to_string(),
        }
    }
}

/// Three fixed budget, mid-range and premium placeholders.
fn static_placeholders(query: &str) -> Vec<ScrapedProduct> {
    let name = query.trim();
    [("Budget pick", 15.0), ("Popular pick", 35.0), ("Premium pick", 75.0)]
        .into_iter()
        .map(|(label, price)| {
            let mut product = ScrapedProduct::new(format!("{}: {}", label, name), search_link(name))
                .with_price(price)
                .with_rating(4.0, 0);
            product.features = vec![format!("Example {} option", label.to_lowercase())];
            product
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedGenerator;

    struct FixedSource {
        name: &'static str,
        priority: u8,
        products: Vec<ScrapedProduct>,
    }

    #[async_trait]
    impl ProductSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        async fn fetch(&self, _query: &str, _limit: usize) -> Result<Vec<ScrapedProduct>, SourceError> {
            if self.products.is_empty() {
                Err(SourceError::Http("connection refused".to_string()))
            } else {
                Ok(self.products.clone())
            }
        }
    }

    fn fixed(name: &'static str, priority: u8, titles: &[&str]) -> Arc<dyn ProductSource> {
        Arc::new(FixedSource {
            name,
            priority,
            products: titles
                .iter()
                .map(|t| ScrapedProduct::new(*t, "https://shop.example").with_price(10.0))
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_all_sources_fail_yields_three_static_placeholders() {
        let service = BackupProductService::new(
            ScriptedGenerator::failing(),
            vec![fixed("google_shopping", 2, &[]), fixed("walmart", 3, &[])],
        );
        let result = service.get_backup_products("dinosaur puzzle").await;

        assert_eq!(result.source, "placeholder:static");
        assert_eq!(result.products.len(), 3);
        assert_eq!(result.price_analysis.min, 15.0);
        assert_eq!(result.price_analysis.max, 75.0);
        assert_eq!(result.price_analysis.median, 35.0);
        assert!(result.products[0].url.contains("dinosaur%20puzzle"));
    }

    #[tokio::test]
    async fn test_sources_tried_by_priority() {
        let service = BackupProductService::new(
            ScriptedGenerator::failing(),
            vec![fixed("walmart", 3, &["W"]), fixed("google_shopping", 2, &["G"])],
        );
        assert_eq!(service.source_names(), vec!["ai", "google_shopping", "walmart"]);

        let result = service.get_backup_products("kite").await;
        assert_eq!(result.source, "google_shopping");
        assert_eq!(result.products[0].title, "G");
    }

    #[tokio::test]
    async fn test_generative_source_wins_first() {
        let generator = Arc::new(ScriptedGenerator::new().on(
            "real, widely available products",
            r#"{"products": [{"title": "LEGO Classic 10696", "price": 34.99, "rating": 4.8, "reviewCount": 20000}, {"title": ""}]}"#,
        ));
        let service = BackupProductService::new(generator, vec![fixed("walmart", 3, &["W"])]);
        let result = service.get_backup_products("lego").await;

        assert_eq!(result.source, "ai");
        assert_eq!(result.products.len(), 1);
        assert_eq!(result.products[0].review_count, 20_000);
        assert!(result.products[0].url.starts_with("https://www.amazon.com/s?k="));
        assert_eq!(result.price_analysis.average, 34.99);
    }

    #[tokio::test]
    async fn test_generated_placeholders() {
        let generator = Arc::new(ScriptedGenerator::new().on(
            "Invent 3 representative",
            r#"{"products": [{"title": "A", "price": 9}, {"title": "B", "price": 29}, {"title": "C", "price": 99}]}"#,
        ));
        let service = BackupProductService::new(generator, Vec::new());
        let result = service.get_backup_products("telescope").await;
        assert_eq!(result.source, "placeholder:generated");
        assert_eq!(result.products.len(), 3);
        assert_eq!(result.price_analysis.max, 99.0);
    }

    #[test]
    fn test_walmart_item_mapping() {
        let item: WalmartItem = serde_json::from_str(
            r#"{"name": "Kite", "salePrice": 12.5, "customerRating": "4.4", "numReviews": 88, "categoryPath": "Toys/Outdoor Play"}"#,
        )
        .unwrap();
        let product = ScrapedProduct::from(item);
        assert_eq!(product.rating, 4.4);
        assert_eq!(product.review_count, 88);
        assert_eq!(product.category.as_deref(), Some("toys"));
    }
}
