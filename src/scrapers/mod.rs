//! Anonymous fetching layer: identity rotation, caching and extraction.

pub mod cache;
pub mod config;
mod error;
pub mod extract;
mod http_client;
pub mod proxy;
pub mod quality;
pub mod search;
pub mod user_agent;

use std::path::Path;

use tracing::warn;

pub use cache::{CacheConfig, CacheManager, CacheStats};
pub use config::ScraperConfig;
pub use error::ScrapingError;
pub use http_client::HttpClient;
pub use proxy::{HealthCheckResult, PoolStats, ProxyConfig, ProxyManager};
pub use quality::{filter_products, find_best_in_price_tier, quality_score, QualityThresholds};
pub use search::{
    HtmlSearchScraper, ProductScraper, ProductSearch, ProductSearchResult, ProductSearchService,
};
pub use user_agent::UserAgentManager;

use crate::models::Proxy;

/// Read a one-entry-per-line list, skipping blanks and `#` comments.
pub fn read_list_file(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Parse proxy list lines, logging and skipping malformed ones.
pub fn parse_proxy_list(lines: &[String]) -> Vec<Proxy> {
    lines
        .iter()
        .filter_map(|line| match Proxy::parse_line(line) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                warn!("Skipping proxy line '{}': {}", line, e);
                None
            }
        })
        .collect()
}
