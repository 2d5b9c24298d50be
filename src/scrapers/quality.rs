//! Product quality scoring and filtering.

use serde::{Deserialize, Serialize};

use crate::models::ScrapedProduct;

/// Minimum bar a product must clear.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_rating: f64,
    pub min_reviews: u32,
    pub require_prime: bool,
    pub exclude_sponsored: bool,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_rating: 4.5,
            min_reviews: 100,
            require_prime: false,
            exclude_sponsored: true,
        }
    }
}

impl QualityThresholds {
    /// Relaxed variant used when the configured bar leaves too few products.
    pub fn relaxed(&self) -> Self {
        Self {
            min_rating: 4.3,
            min_reviews: 50,
            ..*self
        }
    }

    /// Presets tried in order, strictest first.
    pub fn presets(&self) -> [QualityThresholds; 2] {
        [*self, self.relaxed()]
    }

    pub fn accepts(&self, product: &ScrapedProduct) -> bool {
        product.rating >= self.min_rating
            && product.review_count >= self.min_reviews
            && (!self.require_prime || product.prime)
            && !(self.exclude_sponsored && product.sponsored)
    }
}

/// Ranking score used to order filtered products.
pub fn quality_score(product: &ScrapedProduct) -> f64 {
    let reviews = if product.review_count > 0 {
        (product.review_count as f64).log10()
    } else {
        0.0
    };
    let mut score = product.rating * 2.0 + reviews / 2.0;
    if product.prime {
        score += 0.5;
    }
    if product.best_seller {
        score += 1.0;
    }
    if product.sponsored {
        score -= 1.0;
    }
    score
}

/// Keep products meeting `thresholds`, best first. Stable and idempotent.
pub fn filter_products(
    products: &[ScrapedProduct],
    thresholds: &QualityThresholds,
) -> Vec<ScrapedProduct> {
    let mut kept: Vec<ScrapedProduct> = products
        .iter()
        .filter(|p| thresholds.accepts(p))
        .cloned()
        .collect();
    kept.sort_by(|a, b| quality_score(b).total_cmp(&quality_score(a)));
    kept
}

/// Up to three best products priced within `[min_price, max_price]`.
///
/// Tries the given thresholds, then the relaxed preset, returning the first
/// preset that yields at least three products, else the last attempt.
pub fn find_best_in_price_tier(
    products: &[ScrapedProduct],
    min_price: f64,
    max_price: f64,
    thresholds: &QualityThresholds,
) -> Vec<ScrapedProduct> {
    let in_range: Vec<ScrapedProduct> = products
        .iter()
        .filter(|p| {
            p.valid_price()
                .is_some_and(|price| price >= min_price && price <= max_price)
        })
        .cloned()
        .collect();

    let mut attempt = Vec::new();
    for preset in thresholds.presets() {
        attempt = filter_products(&in_range, &preset);
        if attempt.len() >= 3 {
            break;
        }
    }
    attempt.truncate(3);
    attempt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(title: &str, price: f64, rating: f64, reviews: u32) -> ScrapedProduct {
        ScrapedProduct::new(title, format!("https://shop.example/{}", title))
            .with_price(price)
            .with_rating(rating, reviews)
    }

    #[test]
    fn test_quality_score_components() {
        let mut p = product("a", 10.0, 4.0, 100);
        assert!((quality_score(&p) - 9.0).abs() < 1e-9);
        p.prime = true;
        p.best_seller = true;
        assert!((quality_score(&p) - 10.5).abs() < 1e-9);
        p.sponsored = true;
        assert!((quality_score(&p) - 9.5).abs() < 1e-9);

        // No reviews contributes nothing rather than -inf.
        assert!((quality_score(&product("b", 1.0, 5.0, 0)) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_applies_thresholds_and_orders() {
        let mut sponsored = product("sponsored", 20.0, 4.9, 5000);
        sponsored.sponsored = true;
        let products = vec![
            product("ok", 20.0, 4.6, 150),
            product("low", 20.0, 3.9, 10_000),
            product("best", 20.0, 4.9, 3000),
            sponsored,
        ];

        let filtered = filter_products(&products, &QualityThresholds::default());
        let titles: Vec<&str> = filtered.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["best", "ok"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let products = vec![
            product("a", 20.0, 4.6, 150),
            product("b", 20.0, 4.9, 3000),
            product("c", 20.0, 4.7, 150),
            product("d", 20.0, 4.7, 150),
        ];
        let t = QualityThresholds::default();
        let once = filter_products(&products, &t);
        let twice = filter_products(&once, &t);
        assert_eq!(once, twice);
        // Equal scores keep input order.
        let pos_c = once.iter().position(|p| p.title == "c").unwrap();
        let pos_d = once.iter().position(|p| p.title == "d").unwrap();
        assert!(pos_c < pos_d);
    }

    #[test]
    fn test_require_prime() {
        let mut prime = product("prime", 10.0, 4.8, 500);
        prime.prime = true;
        let products = vec![prime, product("plain", 10.0, 4.8, 500)];
        let t = QualityThresholds {
            require_prime: true,
            ..QualityThresholds::default()
        };
        assert_eq!(filter_products(&products, &t).len(), 1);
    }

    #[test]
    fn test_price_tier_relaxes_when_too_few() {
        let products = vec![
            product("strict", 30.0, 4.8, 500),
            product("relaxed1", 35.0, 4.4, 60),
            product("relaxed2", 40.0, 4.35, 80),
            product("too-expensive", 90.0, 4.9, 900),
        ];
        let best = find_best_in_price_tier(&products, 25.0, 50.0, &QualityThresholds::default());
        assert_eq!(best.len(), 3);
        assert_eq!(best[0].title, "strict");
        assert!(best.iter().all(|p| p.title != "too-expensive"));
    }

    #[test]
    fn test_price_tier_nonempty_when_any_passes_relaxed() {
        let products = vec![product("only", 30.0, 4.31, 51), product("bad", 30.0, 3.0, 5)];
        let best = find_best_in_price_tier(&products, 0.0, 100.0, &QualityThresholds::default());
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].title, "only");
    }

    #[test]
    fn test_price_tier_caps_at_three() {
        let products: Vec<ScrapedProduct> = (0..6)
            .map(|i| product(&format!("p{}", i), 20.0, 4.8, 200 + i))
            .collect();
        let best = find_best_in_price_tier(&products, 10.0, 30.0, &QualityThresholds::default());
        assert_eq!(best.len(), 3);
    }
}
