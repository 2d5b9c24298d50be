//! Scraped product listings and their reviews.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single customer review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub helpful_votes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl Review {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rating: None,
            verified: false,
            helpful_votes: 0,
            date: None,
        }
    }
}

/// Snapshot of a product listing as scraped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedProduct {
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Unpriced listings are legal; price statistics ignore them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub prime: bool,
    #[serde(default)]
    pub sponsored: bool,
    #[serde(default)]
    pub best_seller: bool,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviews: Vec<Review>,
}

impl ScrapedProduct {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            price: None,
            rating: 0.0,
            review_count: 0,
            prime: false,
            sponsored: false,
            best_seller: false,
            features: Vec::new(),
            category: None,
            image_url: None,
            reviews: Vec::new(),
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_rating(mut self, rating: f64, review_count: u32) -> Self {
        self.rating = rating;
        self.review_count = review_count;
        self
    }

    /// Price if present, positive and finite.
    pub fn valid_price(&self) -> Option<f64> {
        self.price.filter(|p| p.is_finite() && *p > 0.0)
    }
}
