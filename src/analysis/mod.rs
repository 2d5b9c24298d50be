//! Product intelligence: prices, sentiment, category quality.
//!
//! Each analyzer degrades to cached or default data rather than failing the
//! caller; [`ProductAnalyzer`] fans out to all of them and combines their
//! confidences.

pub mod category;
pub mod price;
pub mod price_tracker;
pub mod product;
pub mod sentiment;

pub use category::{
    market_position, CategoryAnalysis, CategoryAnalyzer, CategoryBenchmarks, CategoryInsights,
    MarketPosition,
};
pub use price::{
    category_factors, default_analysis, percentile, volatility, AnalysisSource, CategoryFactors,
    GiftPriceAnalysis, PriceAnalyzer, PriceAnalyzerConfig, PriceDistribution, PriceRange,
    PriceSummary, PriceTier, PriceTiers,
};
pub use price_tracker::{
    classify_price, merge_histories, PricePoint, PriceStatus, PriceTracker, PriceTrend,
    TrackedPrice,
};
pub use product::{
    AiAnalysisResult, AnalysisOptions, DurabilityPrediction, ProductAnalysis, ProductAnalyzer,
    SignalConfidence,
};
pub use sentiment::{
    lexicon_sentiment, sentiment_confidence, AspectSentiment, ReviewSentiment, ReviewSource,
    SentimentAnalyzer, SentimentKeywords,
};

use crate::llm::LlmError;
use crate::scrapers::ScrapingError;
use crate::store::StoreError;

/// Errors from the analyzers.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("Scraping error: {0}")]
    Scraping(#[from] ScrapingError),
}

/// Short stable hash used in store keys. Case is significant: URL paths
/// and queries are case-sensitive.
pub(crate) fn key_hash(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(input.trim().as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Lowercased category used in keys and factor lookups.
pub(crate) fn normalize_category(category: &str) -> String {
    let trimmed = category.trim().to_lowercase();
    if trimmed.is_empty() {
        "general".to_string()
    } else {
        trimmed
    }
}
