//! Price statistics and tier classification.
//!
//! With enough valid prices, tiers come from quartiles after IQR outlier
//! removal. Below the sample-size gate the analyzer falls back, in order, to
//! the category's cached baseline, a generative estimate, and a hardcoded
//! default. Every fallback reports `sample_size = 0`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::normalize_category;
use crate::llm::{complete_json, prompts, CompletionRequest, SharedGenerator};
use crate::models::ScrapedProduct;
use crate::store::{get_json, set_json, SharedStore};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    pub min: f64,
    pub max: f64,
    pub typical: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTiers {
    pub budget: PriceTier,
    pub mid_range: PriceTier,
    pub premium: PriceTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceDistribution {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Where a price analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Computed,
    CachedBaseline,
    Estimated,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftPriceAnalysis {
    pub range: PriceRange,
    pub tiers: PriceTiers,
    pub distribution: PriceDistribution,
    pub volatility: f64,
    pub confidence: f64,
    pub sample_size: usize,
    pub category: String,
    pub source: AnalysisSource,
}

/// Simple min/max/average/median over whatever prices are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub median: f64,
}

impl PriceSummary {
    /// Summary of valid prices; all zeros when there are none.
    pub fn from_products(products: &[ScrapedProduct]) -> Self {
        let prices = sorted_prices(products);
        if prices.is_empty() {
            return Self::default();
        }
        Self {
            min: prices[0],
            max: prices[prices.len() - 1],
            average: mean(&prices),
            median: percentile(&prices, 0.5),
        }
    }
}

/// Per-category multipliers for tier typicals and base confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryFactors {
    pub budget: f64,
    pub mid: f64,
    pub premium: f64,
    pub confidence: f64,
}

pub fn category_factors(category: &str) -> CategoryFactors {
    let (budget, mid, premium, confidence) = match category.trim().to_lowercase().as_str() {
        "electronics" => (1.2, 1.1, 1.0, 0.8),
        "toys" => (0.9, 1.0, 1.1, 0.75),
        "books" => (0.8, 0.9, 1.0, 0.85),
        "clothing" => (1.0, 1.1, 1.2, 0.7),
        _ => (1.0, 1.0, 1.0, 0.7),
    };
    CategoryFactors {
        budget,
        mid,
        premium,
        confidence,
    }
}

/// Percentile of ascending `sorted` with linear interpolation, `p` in [0, 1].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let idx = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = idx.floor() as usize;
            let hi = idx.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (idx - lo as f64)
        }
    }
}

/// Mean absolute relative change between consecutive points.
pub fn volatility(series: &[f64]) -> f64 {
    let changes: Vec<f64> = series
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| ((w[1] - w[0]) / w[0]).abs())
        .collect();
    if changes.is_empty() {
        0.0
    } else {
        mean(&changes)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn sorted_prices(products: &[ScrapedProduct]) -> Vec<f64> {
    let mut prices: Vec<f64> = products.iter().filter_map(|p| p.valid_price()).collect();
    prices.sort_by(f64::total_cmp);
    prices
}

fn tier(band: &[f64], fallback: f64, factor: f64) -> PriceTier {
    if band.is_empty() {
        return PriceTier {
            min: fallback,
            max: fallback,
            typical: fallback * factor,
        };
    }
    PriceTier {
        min: band[0],
        max: band[band.len() - 1],
        typical: percentile(band, 0.5) * factor,
    }
}

fn midpoint(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceEstimate {
    min: f64,
    max: f64,
    budget: f64,
    mid_range: f64,
    premium: f64,
}

impl PriceEstimate {
    fn is_plausible(&self) -> bool {
        let values = [self.min, self.max, self.budget, self.mid_range, self.premium];
        values.iter().all(|v| v.is_finite() && *v > 0.0)
            && self.min <= self.budget
            && self.budget <= self.mid_range
            && self.mid_range <= self.premium
            && self.premium <= self.max
    }

    /// Analysis built from point estimates rather than observed prices.
    fn into_analysis(self, category: &str, source: AnalysisSource, confidence: f64) -> GiftPriceAnalysis {
        let low_cut = midpoint(self.budget, self.mid_range);
        let high_cut = midpoint(self.mid_range, self.premium);
        GiftPriceAnalysis {
            range: PriceRange {
                min: self.min,
                max: self.max,
                mean: self.mid_range,
                median: self.mid_range,
            },
            tiers: PriceTiers {
                budget: PriceTier {
                    min: self.min,
                    max: low_cut,
                    typical: self.budget,
                },
                mid_range: PriceTier {
                    min: low_cut,
                    max: high_cut,
                    typical: self.mid_range,
                },
                premium: PriceTier {
                    min: high_cut,
                    max: self.max,
                    typical: self.premium,
                },
            },
            distribution: PriceDistribution {
                p10: self.budget,
                p25: low_cut,
                p50: self.mid_range,
                p75: high_cut,
                p90: self.premium,
            },
            volatility: 0.0,
            confidence,
            sample_size: 0,
            category: category.to_string(),
            source,
        }
    }
}

/// Hardcoded last-resort analysis.
pub fn default_analysis(category: &str) -> GiftPriceAnalysis {
    let f = category_factors(category);
    PriceEstimate {
        min: 5.0,
        max: 150.0,
        budget: 15.0 * f.budget,
        mid_range: 35.0 * f.mid,
        premium: 75.0 * f.premium,
    }
    .into_analysis(category, AnalysisSource::Default, 0.2)
}

/// Price analyzer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceAnalyzerConfig {
    /// Valid prices required before statistics are trusted.
    pub min_sample_size: usize,
    /// IQR multiplier for outlier bounds.
    pub iqr_multiplier: f64,
    pub cache_ttl_secs: u64,
    /// Mean prices kept per category for volatility.
    pub history_len: usize,
}

impl Default for PriceAnalyzerConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 5,
            iqr_multiplier: 1.5,
            cache_ttl_secs: 6 * 3600,
            history_len: 30,
        }
    }
}

fn analysis_key(category: &str) -> String {
    format!("price:analysis:{}", category)
}

fn means_key(category: &str) -> String {
    format!("price:means:{}", category)
}

/// Computes [`GiftPriceAnalysis`] for a category.
pub struct PriceAnalyzer {
    store: SharedStore,
    generator: SharedGenerator,
    config: PriceAnalyzerConfig,
}

impl PriceAnalyzer {
    pub fn new(store: SharedStore, generator: SharedGenerator, config: PriceAnalyzerConfig) -> Self {
        Self {
            store,
            generator,
            config,
        }
    }

    /// Analyze prices. Never fails: falls back to baseline, estimate, default.
    pub async fn analyze_prices(
        &self,
        products: &[ScrapedProduct],
        category: &str,
    ) -> GiftPriceAnalysis {
        let category = normalize_category(category);
        let prices = sorted_prices(products);

        if prices.len() < self.config.min_sample_size {
            debug!(
                "Only {} valid prices for {}, using fallback",
                prices.len(),
                category
            );
            return self.fallback(&category).await;
        }

        let volatility = self.record_mean(&category, mean(&prices)).await;
        let analysis = self.compute(&prices, &category, volatility);

        if let Err(e) = set_json(
            &*self.store,
            &analysis_key(&category),
            &analysis,
            Some(Duration::from_secs(self.config.cache_ttl_secs)),
        )
        .await
        {
            warn!("Failed to cache price analysis for {}: {}", category, e);
        }

        info!(
            "Price analysis for {}: {} samples, confidence {:.2}",
            category, analysis.sample_size, analysis.confidence
        );
        analysis
    }

    fn compute(&self, prices: &[f64], category: &str, volatility: f64) -> GiftPriceAnalysis {
        let factors = category_factors(category);
        let q1 = percentile(prices, 0.25);
        let median = percentile(prices, 0.5);
        let q3 = percentile(prices, 0.75);
        let iqr = q3 - q1;
        let lower = q1 - self.config.iqr_multiplier * iqr;
        let upper = q3 + self.config.iqr_multiplier * iqr;

        let filtered: Vec<f64> = prices
            .iter()
            .copied()
            .filter(|p| *p >= lower && *p <= upper)
            .collect();
        let budget: Vec<f64> = filtered.iter().copied().filter(|p| *p <= q1).collect();
        let mid: Vec<f64> = filtered
            .iter()
            .copied()
            .filter(|p| *p > q1 && *p <= q3)
            .collect();
        let premium: Vec<f64> = filtered.iter().copied().filter(|p| *p > q3).collect();

        let n = prices.len();
        GiftPriceAnalysis {
            range: PriceRange {
                min: prices[0],
                max: prices[n - 1],
                mean: mean(prices),
                median,
            },
            tiers: PriceTiers {
                budget: tier(&budget, q1, factors.budget),
                mid_range: tier(&mid, median, factors.mid),
                premium: tier(&premium, q3, factors.premium),
            },
            distribution: PriceDistribution {
                p10: percentile(prices, 0.10),
                p25: q1,
                p50: median,
                p75: q3,
                p90: percentile(prices, 0.90),
            },
            volatility,
            confidence: (factors.confidence + (n as f64 / 50.0).min(1.0) * 0.3).min(1.0),
            sample_size: n,
            category: category.to_string(),
            source: AnalysisSource::Computed,
        }
    }

    /// Append the mean to the category history and return its volatility.
    async fn record_mean(&self, category: &str, value: f64) -> f64 {
        let key = means_key(category);
        let limit = self.config.history_len.max(2) as i64;
        let result = async {
            self.store.lpush(&key, &value.to_string()).await?;
            self.store.ltrim(&key, 0, limit - 1).await?;
            self.store.lrange(&key, 0, limit - 1).await
        }
        .await;

        match result {
            Ok(raw) => {
                let mut series: Vec<f64> = raw.iter().filter_map(|v| v.parse().ok()).collect();
                series.reverse();
                volatility(&series)
            }
            Err(e) => {
                warn!("Failed to record price history for {}: {}", category, e);
                0.0
            }
        }
    }

    async fn fallback(&self, category: &str) -> GiftPriceAnalysis {
        match get_json::<GiftPriceAnalysis>(&*self.store, &analysis_key(category)).await {
            Ok(Some(mut baseline)) => {
                debug!("Using cached price baseline for {}", category);
                baseline.source = AnalysisSource::CachedBaseline;
                baseline.sample_size = 0;
                return baseline;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read price baseline for {}: {}", category, e),
        }

        let request = CompletionRequest::new(
            prompts::JSON_SYSTEM,
            prompts::render(prompts::PRICE_ESTIMATE_PROMPT, &[("category", category)]),
        )
        .with_temperature(0.2);
        match complete_json::<PriceEstimate>(&*self.generator, request).await {
            Ok(est) if est.is_plausible() => {
                debug!("Using generated price estimate for {}", category);
                return est.into_analysis(category, AnalysisSource::Estimated, 0.4);
            }
            Ok(_) => warn!("Discarding implausible price estimate for {}", category),
            Err(e) => debug!("Price estimate unavailable for {}: {}", category, e),
        }

        default_analysis(category)
    }
}
