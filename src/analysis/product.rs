//! Per-product analysis combining every analyzer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::category::{market_position, CategoryAnalysis, CategoryAnalyzer, MarketPosition};
use super::price::{GiftPriceAnalysis, PriceAnalyzer};
use super::sentiment::{ReviewSentiment, SentimentAnalyzer};
use super::normalize_category;
use crate::models::{ErrorCode, GiftProcessingError, ProcessingResult, ScrapedProduct};
use crate::scrapers::quality_score;

/// Fixed confidence weights. Skipped signals contribute 0 and the
/// remaining weights are not scaled up.
const CATEGORY_WEIGHT: f64 = 0.4;
const PRICE_WEIGHT: f64 = 0.2;
const QUALITY_WEIGHT: f64 = 0.2;
const SENTIMENT_WEIGHT: f64 = 0.2;

pub type AiAnalysisResult = ProcessingResult<ProductAnalysis>;

/// What to run for one product.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Other products from the same category, used for benchmarks and prices.
    pub comparables: Vec<ScrapedProduct>,
    /// Overrides the product's own category.
    pub category: Option<String>,
    pub include_price: bool,
    pub include_sentiment: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            comparables: Vec::new(),
            category: None,
            include_price: true,
            include_sentiment: true,
        }
    }
}

/// Per-signal confidences and their weighted combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalConfidence {
    pub category: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub quality: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
    pub overall: f64,
}

impl SignalConfidence {
    fn combine(category: f64, price: Option<f64>, quality: f64, sentiment: Option<f64>) -> Self {
        let overall = category * CATEGORY_WEIGHT
            + price.unwrap_or(0.0) * PRICE_WEIGHT
            + quality * QUALITY_WEIGHT
            + sentiment.unwrap_or(0.0) * SENTIMENT_WEIGHT;
        Self {
            category,
            price,
            quality,
            sentiment,
            overall: overall.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurabilityPrediction {
    pub years: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAnalysis {
    pub title: String,
    pub category: String,
    pub market_position: MarketPosition,
    pub quality_score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub badges: Vec<String>,
    pub flags: Vec<String>,
    /// 0 to 1.
    pub reliability: f64,
    pub durability_prediction: DurabilityPrediction,
    pub category_analysis: CategoryAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_analysis: Option<GiftPriceAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<ReviewSentiment>,
    pub confidence: SignalConfidence,
}

fn quality_confidence(product: &ScrapedProduct) -> f64 {
    0.5 + (product.review_count as f64 / 500.0).min(1.0) * 0.5
}

fn base_durability_years(category: &str) -> f64 {
    match category {
        "electronics" => 3.0,
        "toys" => 2.0,
        "books" => 5.0,
        "clothing" => 1.5,
        _ => 2.0,
    }
}

fn predict_durability(
    product: &ScrapedProduct,
    category: &str,
    sentiment: Option<&ReviewSentiment>,
) -> DurabilityPrediction {
    let base = base_durability_years(category);
    let mut years = base;
    let mut reasons = vec![format!("{} typically last about {} years", category, base)];

    if let Some(aspect) = sentiment.and_then(|s| s.aspects.get("durability")) {
        years *= 1.0 + 0.3 * aspect.score.clamp(-1.0, 1.0);
        if aspect.score >= 0.3 {
            reasons.push("reviewers say it holds up well".to_string());
        } else if aspect.score <= -0.3 {
            reasons.push("reviewers report it breaking early".to_string());
        }
    }
    if product.rating >= 4.5 {
        years *= 1.1;
        reasons.push("high ratings suggest solid construction".to_string());
    } else if product.rating > 0.0 && product.rating < 3.5 {
        years *= 0.8;
        reasons.push("low ratings suggest quality problems".to_string());
    }

    DurabilityPrediction {
        years: ((years * 2.0).round() / 2.0).max(0.5),
        explanation: format!("{}.", reasons.join("; ")),
    }
}

fn reliability(product: &ScrapedProduct, sentiment: Option<&ReviewSentiment>) -> f64 {
    let rating = (product.rating / 5.0).clamp(0.0, 1.0) * 0.5;
    let depth = ((product.review_count as f64 + 1.0).log10() / 4.0).min(1.0) * 0.3;
    let mood = sentiment.map_or(0.1, |s| (s.overall + 1.0) / 2.0 * 0.2);
    (rating + depth + mood).clamp(0.0, 1.0)
}

struct Findings {
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    badges: Vec<String>,
    flags: Vec<String>,
}

fn findings(
    product: &ScrapedProduct,
    category: &CategoryAnalysis,
    position: MarketPosition,
    sentiment: Option<&ReviewSentiment>,
) -> Findings {
    let mut f = Findings {
        strengths: Vec::new(),
        weaknesses: Vec::new(),
        badges: Vec::new(),
        flags: Vec::new(),
    };
    let avg_rating = category.benchmarks.avg_rating;

    if product.rating >= avg_rating + 0.2 {
        f.strengths.push("Rated above the category average".to_string());
    } else if product.rating < avg_rating - 0.3 {
        f.weaknesses.push("Rated below the category average".to_string());
    }
    if product.review_count >= 1000 {
        f.strengths.push("Large number of customer reviews".to_string());
    } else if product.review_count < 50 {
        f.weaknesses.push("Few customer reviews".to_string());
    }
    if product.best_seller {
        f.strengths.push("Best seller in its category".to_string());
        f.badges.push("Best Seller".to_string());
    }
    if product.prime {
        f.strengths.push("Fast shipping available".to_string());
        f.badges.push("Prime".to_string());
    }
    if product.rating >= 4.7 && product.review_count >= 100 {
        f.badges.push("Top Rated".to_string());
    }
    match position {
        MarketPosition::Value => {
            f.strengths.push("Good value for the price".to_string());
            f.badges.push("Great Value".to_string());
        }
        MarketPosition::Luxury => {
            f.weaknesses.push("Priced well above similar products".to_string());
        }
        _ => {}
    }

    if let Some(sentiment) = sentiment {
        for (aspect, detail) in &sentiment.aspects {
            if detail.score >= 0.5 {
                f.strengths.push(format!("Praised for {}", aspect));
            } else if detail.score <= -0.3 {
                f.weaknesses.push(format!("Complaints about {}", aspect));
            }
        }
        if sentiment.review_count > 0 && sentiment.overall < -0.2 {
            f.flags.push("Mostly negative reviews".to_string());
        }
    }

    if product.sponsored {
        f.flags.push("Sponsored listing".to_string());
    }
    if product.valid_price().is_none() {
        f.flags.push("Price unavailable".to_string());
    }
    if product.rating >= 4.8 && product.review_count < 20 {
        f.flags.push("High rating from very few reviews".to_string());
    }
    f
}

/// Fans out to the category, price and sentiment analyzers.
pub struct ProductAnalyzer {
    category: Arc<CategoryAnalyzer>,
    price: Arc<PriceAnalyzer>,
    sentiment: Arc<SentimentAnalyzer>,
}

impl ProductAnalyzer {
    pub fn new(
        category: Arc<CategoryAnalyzer>,
        price: Arc<PriceAnalyzer>,
        sentiment: Arc<SentimentAnalyzer>,
    ) -> Self {
        Self {
            category,
            price,
            sentiment,
        }
    }

    pub async fn analyze_product(
        &self,
        product: &ScrapedProduct,
        options: &AnalysisOptions,
    ) -> AiAnalysisResult {
        let category = normalize_category(
            options
                .category
                .as_deref()
                .or(product.category.as_deref())
                .unwrap_or_default(),
        );
        let mut sample = options.comparables.clone();
        if !sample.iter().any(|p| p.url == product.url && p.title == product.title) {
            sample.push(product.clone());
        }

        let category_fut = self.category.analyze_category(&category, &sample);
        let price_fut = async {
            if options.include_price {
                Some(self.price.analyze_prices(&sample, &category).await)
            } else {
                None
            }
        };
        let sentiment_fut = async {
            if !options.include_sentiment {
                return None;
            }
            if !product.reviews.is_empty() {
                return Some(self.sentiment.analyze_reviews(&product.reviews).await);
            }
            if product.url.trim().is_empty() {
                return None;
            }
            match self.sentiment.analyze_product_sentiment(&product.url).await {
                Ok(sentiment) => Some(sentiment),
                Err(e) => {
                    warn!("Sentiment skipped for {}: {}", product.title, e);
                    None
                }
            }
        };

        let (category_result, price_analysis, sentiment) =
            tokio::join!(category_fut, price_fut, sentiment_fut);

        let category_analysis = match category_result {
            Ok(analysis) => analysis,
            Err(e) => {
                return ProcessingResult::err(
                    GiftProcessingError::new(
                        ErrorCode::AnalysisFailed,
                        format!("Category analysis failed: {}", e),
                    )
                    .with_context(serde_json::json!({
                        "product": product.title,
                        "category": category,
                    })),
                );
            }
        };

        let position = market_position(product, &category_analysis);
        let f = findings(product, &category_analysis, position, sentiment.as_ref());
        let confidence = SignalConfidence::combine(
            category_analysis.confidence,
            price_analysis.as_ref().map(|p| p.confidence),
            quality_confidence(product),
            sentiment.as_ref().map(|s| s.confidence),
        );

        info!(
            "Analyzed '{}': {} position, confidence {:.2}",
            product.title, position, confidence.overall
        );

        ProcessingResult::ok(ProductAnalysis {
            title: product.title.clone(),
            market_position: position,
            quality_score: quality_score(product),
            strengths: f.strengths,
            weaknesses: f.weaknesses,
            badges: f.badges,
            flags: f.flags,
            reliability: reliability(product, sentiment.as_ref()),
            durability_prediction: predict_durability(product, &category, sentiment.as_ref()),
            category,
            category_analysis,
            price_analysis,
            sentiment,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::price::PriceAnalyzerConfig;
    use crate::analysis::sentiment::ReviewSource;
    use crate::llm::testing::ScriptedGenerator;
    use crate::models::Review;
    use crate::scrapers::ScrapingError;
    use crate::store::{InMemoryStore, SharedStore};
    use async_trait::async_trait;

    struct NoReviews;

    #[async_trait]
    impl ReviewSource for NoReviews {
        async fn fetch_reviews(&self, _url: &str) -> Result<Vec<Review>, ScrapingError> {
            Err(ScrapingError::Blocked { status: 503 })
        }
    }

    fn analyzer() -> ProductAnalyzer {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let generator = ScriptedGenerator::failing();
        ProductAnalyzer::new(
            Arc::new(CategoryAnalyzer::new(store.clone(), generator.clone())),
            Arc::new(PriceAnalyzer::new(
                store.clone(),
                generator.clone(),
                PriceAnalyzerConfig::default(),
            )),
            Arc::new(SentimentAnalyzer::new(store, generator, Arc::new(NoReviews))),
        )
    }

    fn comparables() -> Vec<ScrapedProduct> {
        (0..10)
            .map(|i| {
                ScrapedProduct::new(format!("Puzzle {}", i), format!("https://shop.example/p{}", i))
                    .with_price(15.0 + i as f64 * 3.0)
                    .with_rating(4.3, 200)
            })
            .collect()
    }

    #[test]
    fn test_confidence_weights_not_renormalized() {
        let full = SignalConfidence::combine(1.0, Some(1.0), 1.0, Some(1.0));
        assert!((full.overall - 1.0).abs() < 1e-9);

        let partial = SignalConfidence::combine(1.0, None, 1.0, None);
        assert!((partial.overall - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_durability_uses_category_and_reviews() {
        let mut sentiment = ReviewSentiment::default();
        sentiment.aspects.insert(
            "durability".to_string(),
            crate::analysis::AspectSentiment {
                score: -1.0,
                mentions: 3,
                examples: Vec::new(),
            },
        );
        let product = ScrapedProduct::new("Tablet", "u").with_rating(3.0, 40);
        let prediction = predict_durability(&product, "electronics", Some(&sentiment));
        // 3 * 0.7 * 0.8 = 1.68
        assert_eq!(prediction.years, 1.5);
        assert!(prediction.explanation.contains("breaking early"));

        let book = ScrapedProduct::new("Atlas", "u").with_rating(4.8, 400);
        assert_eq!(predict_durability(&book, "books", None).years, 5.5);
    }

    #[tokio::test]
    async fn test_analyze_product_with_inline_reviews() {
        let mut product = ScrapedProduct::new("Puzzle Deluxe", "https://shop.example/deluxe")
            .with_price(20.0)
            .with_rating(4.9, 1500);
        product.best_seller = true;
        product.reviews = vec![
            Review {
                rating: Some(5.0),
                ..Review::new("So much fun, great quality")
            },
            Review {
                rating: Some(5.0),
                ..Review::new("Love it, excellent")
            },
        ];

        let options = AnalysisOptions {
            comparables: comparables(),
            category: Some("Toys".to_string()),
            ..AnalysisOptions::default()
        };
        let analysis = analyzer()
            .analyze_product(&product, &options)
            .await
            .into_result()
            .unwrap();

        assert_eq!(analysis.category, "toys");
        assert_eq!(analysis.market_position, MarketPosition::Value);
        assert!(analysis.badges.contains(&"Best Seller".to_string()));
        assert!(analysis.badges.contains(&"Top Rated".to_string()));
        assert!(analysis.strengths.iter().any(|s| s == "Praised for fun"));
        assert!(analysis.confidence.price.is_some());
        assert!(analysis.confidence.sentiment.is_some());
        assert!(analysis.reliability > 0.8);
    }

    #[tokio::test]
    async fn test_failed_sentiment_fetch_is_skipped() {
        let product = ScrapedProduct::new("Puzzle X", "https://shop.example/x")
            .with_price(22.0)
            .with_rating(4.3, 200);
        let options = AnalysisOptions {
            comparables: comparables(),
            include_price: false,
            ..AnalysisOptions::default()
        };
        let analysis = analyzer()
            .analyze_product(&product, &options)
            .await
            .into_result()
            .unwrap();

        assert_eq!(analysis.category, "general");
        assert!(analysis.sentiment.is_none());
        assert!(analysis.price_analysis.is_none());
        let c = analysis.confidence;
        let expected = c.category * 0.4 + c.quality * 0.2;
        assert!((c.overall - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_category_failure_is_analysis_failed() {
        let options = AnalysisOptions {
            include_price: false,
            include_sentiment: false,
            ..AnalysisOptions::default()
        };
        let result = analyzer()
            .analyze_product(&ScrapedProduct::new("  ", ""), &options)
            .await;

        assert!(!result.success);
        let err = result.error.unwrap();
        assert_eq!(err.code, ErrorCode::AnalysisFailed);
        assert!(err.recoverable);
        assert_eq!(err.context.unwrap()["category"], "general");
    }
}
