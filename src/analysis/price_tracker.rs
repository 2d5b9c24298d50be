//! Per-product price history and deal classification.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::price::volatility;
use super::{key_hash, AnalysisError};
use crate::models::ScrapedProduct;
use crate::store::SharedStore;

/// Points older than this are trimmed on every write.
pub const HISTORY_RETENTION_DAYS: i64 = 180;

const DAY_MS: i64 = 86_400_000;

/// Change against the prior average that counts as a trend.
const TREND_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    LowestPrice,
    GoodPrice,
    RegularPrice,
    InflatedPrice,
    HighlyInflated,
}

impl PriceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::LowestPrice => "Lowest price",
            Self::GoodPrice => "Good price",
            Self::RegularPrice => "Regular price",
            Self::InflatedPrice => "Inflated price",
            Self::HighlyInflated => "Highly inflated",
        }
    }
}

/// Classify `current` against the observed lowest and average.
pub fn classify_price(current: f64, lowest: f64, average: f64) -> PriceStatus {
    if current <= lowest * 1.02 {
        PriceStatus::LowestPrice
    } else if current <= lowest * 1.10 {
        PriceStatus::GoodPrice
    } else if current <= average * 1.05 {
        PriceStatus::RegularPrice
    } else if current <= average * 1.20 {
        PriceStatus::InflatedPrice
    } else {
        PriceStatus::HighlyInflated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTrend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPrice {
    pub current: f64,
    pub lowest: f64,
    pub highest: f64,
    pub average: f64,
    pub status: PriceStatus,
    pub volatility: f64,
    pub history_len: usize,
    pub trend: PriceTrend,
}

/// Merge series from several sources into one daily series.
///
/// Points on the same UTC day are averaged and stamped with the day start.
pub fn merge_histories(series: &[Vec<PricePoint>]) -> Vec<PricePoint> {
    let mut days: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
    for point in series.iter().flatten() {
        if !point.price.is_finite() || point.price <= 0.0 {
            continue;
        }
        let day = point.timestamp.div_euclid(DAY_MS);
        let slot = days.entry(day).or_insert((0.0, 0));
        slot.0 += point.price;
        slot.1 += 1;
    }
    days.into_iter()
        .map(|(day, (sum, count))| PricePoint {
            timestamp: day * DAY_MS,
            price: sum / count as f64,
        })
        .collect()
}

fn history_key(url: &str) -> String {
    format!("price:history:{}", key_hash(url))
}

fn trend(current: f64, earlier: &[PricePoint]) -> PriceTrend {
    if earlier.is_empty() {
        return PriceTrend::Stable;
    }
    let prior = earlier.iter().map(|p| p.price).sum::<f64>() / earlier.len() as f64;
    let change = (current - prior) / prior;
    if change > TREND_THRESHOLD {
        PriceTrend::Rising
    } else if change < -TREND_THRESHOLD {
        PriceTrend::Falling
    } else {
        PriceTrend::Stable
    }
}

/// Records prices per product URL in a sorted set.
pub struct PriceTracker {
    store: SharedStore,
}

impl PriceTracker {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Record the product's current price and classify it.
    pub async fn track_price(&self, product: &ScrapedProduct) -> Result<TrackedPrice, AnalysisError> {
        self.track_price_at(product, Utc::now()).await
    }

    /// [`Self::track_price`] with an explicit observation time.
    pub async fn track_price_at(
        &self,
        product: &ScrapedProduct,
        now: DateTime<Utc>,
    ) -> Result<TrackedPrice, AnalysisError> {
        let current = product.valid_price().ok_or_else(|| {
            AnalysisError::Validation(format!("No valid price for {}", product.url))
        })?;
        if product.url.trim().is_empty() {
            return Err(AnalysisError::Validation(
                "Product URL is required for price tracking".to_string(),
            ));
        }

        let key = history_key(&product.url);
        let ts = now.timestamp_millis();
        self.store
            .zadd(&key, ts as f64, &format!("{}:{}", ts, current))
            .await?;

        let cutoff = (now - ChronoDuration::days(HISTORY_RETENTION_DAYS)).timestamp_millis();
        let trimmed = self
            .store
            .zrem_range_by_score(&key, 0.0, (cutoff - 1) as f64)
            .await?;
        if trimmed > 0 {
            debug!("Trimmed {} old price points for {}", trimmed, product.url);
        }

        let history = self.read(&key).await?;
        let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
        let lowest = prices.iter().copied().fold(current, f64::min);
        let highest = prices.iter().copied().fold(current, f64::max);
        let average = if prices.is_empty() {
            current
        } else {
            prices.iter().sum::<f64>() / prices.len() as f64
        };
        let earlier: Vec<PricePoint> = history
            .iter()
            .copied()
            .filter(|p| p.timestamp < ts)
            .collect();

        Ok(TrackedPrice {
            current,
            lowest,
            highest,
            average,
            status: classify_price(current, lowest, average),
            volatility: volatility(&prices),
            history_len: history.len(),
            trend: trend(current, &earlier),
        })
    }

    /// Stored series for a product URL, oldest first.
    pub async fn history(&self, url: &str) -> Result<Vec<PricePoint>, AnalysisError> {
        self.read(&history_key(url)).await
    }

    async fn read(&self, key: &str) -> Result<Vec<PricePoint>, AnalysisError> {
        let members = self.store.zrange_by_score(key, 0.0, i64::MAX as f64).await?;
        Ok(members
            .into_iter()
            .filter_map(|(member, score)| {
                let price = member.split_once(':')?.1.parse::<f64>().ok()?;
                Some(PricePoint {
                    timestamp: score as i64,
                    price,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn product(price: f64) -> ScrapedProduct {
        ScrapedProduct::new("Kite", "https://shop.example/kite?ref=abc").with_price(price)
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + ChronoDuration::days(n)
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(classify_price(20.3, 20.0, 25.0), PriceStatus::LowestPrice);
        assert_eq!(classify_price(21.5, 20.0, 25.0), PriceStatus::GoodPrice);
        assert_eq!(classify_price(26.0, 20.0, 25.0), PriceStatus::RegularPrice);
        assert_eq!(classify_price(29.0, 20.0, 25.0), PriceStatus::InflatedPrice);
        assert_eq!(classify_price(31.0, 20.0, 25.0), PriceStatus::HighlyInflated);
    }

    #[test]
    fn test_classification_is_monotonic_in_price() {
        let mut previous = PriceStatus::LowestPrice;
        for cents in 1000..6000 {
            let status = classify_price(cents as f64 / 100.0, 10.0, 30.0);
            assert!(status >= previous, "status regressed at {}", cents);
            previous = status;
        }
        assert_eq!(previous, PriceStatus::HighlyInflated);
    }

    #[tokio::test]
    async fn test_first_observation_is_lowest() {
        let tracker = PriceTracker::new(Arc::new(InMemoryStore::new()));
        let tracked = tracker.track_price_at(&product(25.0), day(0)).await.unwrap();
        assert_eq!(tracked.status, PriceStatus::LowestPrice);
        assert_eq!(tracked.history_len, 1);
        assert_eq!(tracked.trend, PriceTrend::Stable);
    }

    #[tokio::test]
    async fn test_history_drives_status_and_trend() {
        let tracker = PriceTracker::new(Arc::new(InMemoryStore::new()));
        for (i, price) in [20.0, 22.0, 24.0].iter().enumerate() {
            tracker.track_price_at(&product(*price), day(i as i64)).await.unwrap();
        }
        let tracked = tracker.track_price_at(&product(40.0), day(3)).await.unwrap();
        assert_eq!(tracked.lowest, 20.0);
        assert_eq!(tracked.highest, 40.0);
        assert_eq!(tracked.history_len, 4);
        assert_eq!(tracked.status, PriceStatus::HighlyInflated);
        assert_eq!(tracked.trend, PriceTrend::Rising);
        assert!(tracked.volatility > 0.0);
    }

    #[tokio::test]
    async fn test_old_points_are_trimmed() {
        let tracker = PriceTracker::new(Arc::new(InMemoryStore::new()));
        tracker.track_price_at(&product(10.0), day(0)).await.unwrap();
        let tracked = tracker.track_price_at(&product(30.0), day(200)).await.unwrap();
        assert_eq!(tracked.history_len, 1);
        assert_eq!(tracked.lowest, 30.0);

        let history = tracker.history("https://shop.example/kite?ref=abc").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_history_separates_case_distinct_urls() {
        let tracker = PriceTracker::new(Arc::new(InMemoryStore::new()));
        let upper = ScrapedProduct::new("Kite", "https://shop.example/item/AbC").with_price(10.0);
        let lower = ScrapedProduct::new("Kite", "https://shop.example/item/abc").with_price(50.0);
        tracker.track_price_at(&upper, day(0)).await.unwrap();
        let tracked = tracker.track_price_at(&lower, day(1)).await.unwrap();
        assert_eq!(tracked.history_len, 1);
        assert_eq!(tracked.lowest, 50.0);
    }

    #[tokio::test]
    async fn test_unpriced_product_rejected() {
        let tracker = PriceTracker::new(Arc::new(InMemoryStore::new()));
        let err = tracker
            .track_price(&ScrapedProduct::new("Kite", "https://shop.example/kite"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Validation(_)));
    }

    #[test]
    fn test_merge_histories_averages_same_day() {
        let a = vec![
            PricePoint { timestamp: 1_000, price: 10.0 },
            PricePoint { timestamp: DAY_MS + 5, price: 12.0 },
        ];
        let b = vec![
            PricePoint { timestamp: 50_000, price: 20.0 },
            PricePoint { timestamp: 2 * DAY_MS, price: f64::NAN },
        ];
        let merged = merge_histories(&[a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], PricePoint { timestamp: 0, price: 15.0 });
        assert_eq!(merged[1].timestamp, DAY_MS);
    }
}
