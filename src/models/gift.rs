//! Gifts detected in conversation and their enrichment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::PriceRange;

/// A gift mentioned in conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Product page, when the gift is tied to a concrete listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Gift {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            price: None,
            url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

/// A related gift idea, grounded with a price band when one is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftSuggestion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    Limited,
    Unknown,
}

/// Signals attached to an enriched gift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftAnalysis {
    /// Conversation sentiment toward the gift, -1 to 1.
    pub sentiment: f64,
    /// 0 to 1, from the category quality score.
    pub popularity: f64,
    /// 0 to 1, relevance of the gift's category this month.
    pub seasonality: f64,
    pub availability: Availability,
    pub price_volatility: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
}

/// A gift plus everything enrichment learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedGift {
    #[serde(flatten)]
    pub gift: Gift,
    pub details: String,
    #[serde(default)]
    pub suggestions: Vec<GiftSuggestion>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<AgeRange>,
    pub analysis: GiftAnalysis,
    pub enriched_at: DateTime<Utc>,
}

/// Caller controls for enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentOptions {
    pub include_suggestions: bool,
    pub suggestion_count: usize,
    /// Ignore any cached enrichment.
    pub force_refresh: bool,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            include_suggestions: false,
            suggestion_count: 3,
            force_refresh: false,
        }
    }
}
