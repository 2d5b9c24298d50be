//! Category benchmarks and quality scoring.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{normalize_category, AnalysisError};
use crate::llm::{complete_json, prompts, CompletionRequest, SharedGenerator};
use crate::models::ScrapedProduct;
use crate::store::{get_json, set_json, SharedStore};

const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);
const TOP_KEYWORDS: usize = 10;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "your", "you", "are", "set", "pack",
    "pcs", "piece", "pieces", "kids", "boys", "girls", "old", "year", "years", "ages", "age",
    "gift", "gifts", "new", "inch", "inches", "black", "white", "includes", "perfect", "great",
    "best", "more", "all", "its", "into", "over", "not", "has", "have", "can", "will", "our",
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBenchmarks {
    pub avg_rating: f64,
    pub avg_reviews: f64,
    /// Mean over priced products only.
    pub avg_price: f64,
    pub prime_ratio: f64,
    pub best_seller_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInsights {
    #[serde(default)]
    pub quality_indicators: Vec<String>,
    #[serde(default)]
    pub common_complaints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAnalysis {
    pub category: String,
    pub product_count: usize,
    pub benchmarks: CategoryBenchmarks,
    pub top_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<CategoryInsights>,
    /// 0 to 10.
    pub quality_score: f64,
    pub confidence: f64,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPosition {
    Budget,
    Value,
    Mainstream,
    Premium,
    Luxury,
}

impl std::fmt::Display for MarketPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Budget => "budget",
            Self::Value => "value",
            Self::Mainstream => "mainstream",
            Self::Premium => "premium",
            Self::Luxury => "luxury",
        };
        f.write_str(s)
    }
}

/// Position a product by price and rating against its category.
pub fn market_position(product: &ScrapedProduct, analysis: &CategoryAnalysis) -> MarketPosition {
    let avg_price = analysis.benchmarks.avg_price;
    let Some(price) = product.valid_price().filter(|_| avg_price > 0.0) else {
        return MarketPosition::Mainstream;
    };
    let price_ratio = price / avg_price;
    let quality_ratio = if analysis.benchmarks.avg_rating > 0.0 {
        product.rating / analysis.benchmarks.avg_rating
    } else {
        1.0
    };

    if price_ratio < 0.7 {
        if quality_ratio >= 1.0 {
            MarketPosition::Value
        } else {
            MarketPosition::Budget
        }
    } else if price_ratio <= 1.3 {
        if quality_ratio >= 1.05 {
            MarketPosition::Value
        } else {
            MarketPosition::Mainstream
        }
    } else if price_ratio <= 2.0 {
        MarketPosition::Premium
    } else {
        MarketPosition::Luxury
    }
}

fn benchmarks(products: &[ScrapedProduct]) -> CategoryBenchmarks {
    let n = products.len() as f64;
    let prices: Vec<f64> = products.iter().filter_map(|p| p.valid_price()).collect();
    CategoryBenchmarks {
        avg_rating: products.iter().map(|p| p.rating).sum::<f64>() / n,
        avg_reviews: products.iter().map(|p| p.review_count as f64).sum::<f64>() / n,
        avg_price: if prices.is_empty() {
            0.0
        } else {
            prices.iter().sum::<f64>() / prices.len() as f64
        },
        prime_ratio: products.iter().filter(|p| p.prime).count() as f64 / n,
        best_seller_ratio: products.iter().filter(|p| p.best_seller).count() as f64 / n,
    }
}

/// 0-10 score: rating up to 5, review depth up to 2, prime up to 1,
/// best sellers up to 2.
fn quality_score(b: &CategoryBenchmarks) -> f64 {
    let rating = (b.avg_rating / 5.0).clamp(0.0, 1.0) * 5.0;
    let depth = ((b.avg_reviews + 1.0).log10() / 4.0).min(1.0) * 2.0;
    (rating + depth + b.prime_ratio + b.best_seller_ratio * 2.0).min(10.0)
}

/// Most frequent unigrams and bigrams across titles and features.
fn top_keywords(products: &[ScrapedProduct], limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    let texts = products
        .iter()
        .flat_map(|p| std::iter::once(&p.title).chain(p.features.iter()));

    for text in texts {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2 && !w.chars().all(|c| c.is_ascii_digit()))
            .filter(|w| !STOPWORDS.contains(w))
            .map(str::to_string)
            .collect();
        for word in &words {
            *counts.entry(word.clone()).or_default() += 1;
        }
        for pair in words.windows(2) {
            *counts.entry(format!("{} {}", pair[0], pair[1])).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(k, _)| k).collect()
}

fn category_key(category: &str) -> String {
    format!("category:analysis:{}", category)
}

/// Benchmarks a category from a sample of its products.
pub struct CategoryAnalyzer {
    store: SharedStore,
    generator: SharedGenerator,
}

impl CategoryAnalyzer {
    pub fn new(store: SharedStore, generator: SharedGenerator) -> Self {
        Self { store, generator }
    }

    pub async fn analyze_category(
        &self,
        category: &str,
        products: &[ScrapedProduct],
    ) -> Result<CategoryAnalysis, AnalysisError> {
        let category = normalize_category(category);
        let key = category_key(&category);

        match get_json::<CategoryAnalysis>(&*self.store, &key).await {
            Ok(Some(cached)) => {
                debug!("Category analysis cache hit for {}", category);
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read category cache for {}: {}", category, e),
        }

        if products.iter().all(|p| p.title.trim().is_empty()) {
            return Err(AnalysisError::Validation(format!(
                "No products to analyze for category {}",
                category
            )));
        }

        let benchmarks = benchmarks(products);
        let insights = self.insights(&category, products).await;
        let n = products.len() as f64;
        let analysis = CategoryAnalysis {
            product_count: products.len(),
            top_keywords: top_keywords(products, TOP_KEYWORDS),
            quality_score: quality_score(&benchmarks),
            confidence: (0.4 + (n / 20.0).min(1.0) * 0.4 + if insights.is_some() { 0.2 } else { 0.0 })
                .min(1.0),
            benchmarks,
            insights,
            category: category.clone(),
            analyzed_at: Utc::now(),
        };

        if let Err(e) = set_json(&*self.store, &key, &analysis, Some(CACHE_TTL)).await {
            warn!("Failed to cache category analysis for {}: {}", category, e);
        }
        info!(
            "Category {}: quality {:.1}/10 from {} products",
            category, analysis.quality_score, analysis.product_count
        );
        Ok(analysis)
    }

    async fn insights(&self, category: &str, products: &[ScrapedProduct]) -> Option<CategoryInsights> {
        let titles = products
            .iter()
            .take(15)
            .map(|p| format!("- {}", p.title))
            .collect::<Vec<_>>()
            .join("\n");
        let request = CompletionRequest::new(
            prompts::JSON_SYSTEM,
            prompts::render(
                prompts::CATEGORY_INSIGHTS_PROMPT,
                &[("category", category), ("titles", &titles)],
            ),
        )
        .with_temperature(0.3);

        match complete_json::<CategoryInsights>(&*self.generator, request).await {
            Ok(insights) => Some(insights),
            Err(e) => {
                debug!("Category insights unavailable for {}: {}", category, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedGenerator;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    fn product(title: &str, price: f64, rating: f64, reviews: u32) -> ScrapedProduct {
        ScrapedProduct::new(title, format!("https://shop.example/{}", title.len()))
            .with_price(price)
            .with_rating(rating, reviews)
    }

    fn sample() -> Vec<ScrapedProduct> {
        let mut items = vec![
            product("Wooden Train Set for Toddlers", 30.0, 4.8, 2_000),
            product("Magnetic Building Blocks 100 Pieces", 40.0, 4.6, 9_999),
            product("Wooden Train Tracks Expansion", 20.0, 4.4, 500),
            product("Plush Dinosaur", 10.0, 4.2, 100),
        ];
        items[0].prime = true;
        items[1].prime = true;
        items[1].best_seller = true;
        items
    }

    #[test]
    fn test_benchmarks_and_score() {
        let b = benchmarks(&sample());
        assert!((b.avg_rating - 4.5).abs() < 1e-9);
        assert_eq!(b.avg_price, 25.0);
        assert_eq!(b.prime_ratio, 0.5);
        assert_eq!(b.best_seller_ratio, 0.25);

        let score = quality_score(&b);
        assert!(score > 6.0 && score <= 10.0);
    }

    #[test]
    fn test_top_keywords_prefer_repeated_phrases() {
        let keywords = top_keywords(&sample(), 10);
        assert_eq!(keywords[0], "train");
        assert!(keywords.contains(&"wooden train".to_string()));
        assert!(!keywords.iter().any(|k| k == "for" || k == "100"));
    }

    #[tokio::test]
    async fn test_analysis_cached_per_category() {
        let generator = Arc::new(ScriptedGenerator::new().on(
            "separates good products",
            r#"{"qualityIndicators": ["solid wood"], "commonComplaints": ["paint chips"]}"#,
        ));
        let analyzer = CategoryAnalyzer::new(Arc::new(InMemoryStore::new()), generator.clone());

        let first = analyzer.analyze_category("Toys", &sample()).await.unwrap();
        assert_eq!(first.category, "toys");
        assert_eq!(first.product_count, 4);
        assert_eq!(
            first.insights.as_ref().unwrap().quality_indicators,
            vec!["solid wood".to_string()]
        );

        let second = analyzer.analyze_category("toys", &[]).await.unwrap();
        assert_eq!(second.product_count, 4);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_category_is_validation_error() {
        let analyzer =
            CategoryAnalyzer::new(Arc::new(InMemoryStore::new()), ScriptedGenerator::failing());
        let err = analyzer.analyze_category("books", &[]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[tokio::test]
    async fn test_market_position() {
        let analyzer =
            CategoryAnalyzer::new(Arc::new(InMemoryStore::new()), ScriptedGenerator::failing());
        let analysis = analyzer.analyze_category("toys", &sample()).await.unwrap();
        assert!(analysis.insights.is_none());

        let cheap_good = product("a", 12.0, 4.9, 10);
        let cheap_bad = product("b", 12.0, 3.0, 10);
        let typical = product("c", 25.0, 4.5, 10);
        let typical_great = product("d", 25.0, 4.9, 10);
        let pricey = product("e", 45.0, 4.5, 10);
        let lavish = product("f", 80.0, 4.5, 10);

        assert_eq!(market_position(&cheap_good, &analysis), MarketPosition::Value);
        assert_eq!(market_position(&cheap_bad, &analysis), MarketPosition::Budget);
        assert_eq!(market_position(&typical, &analysis), MarketPosition::Mainstream);
        assert_eq!(market_position(&typical_great, &analysis), MarketPosition::Value);
        assert_eq!(market_position(&pricey, &analysis), MarketPosition::Premium);
        assert_eq!(market_position(&lavish, &analysis), MarketPosition::Luxury);
        assert_eq!(
            market_position(&ScrapedProduct::new("g", "u"), &analysis),
            MarketPosition::Mainstream
        );
    }
}
