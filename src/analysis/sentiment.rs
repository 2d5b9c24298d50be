//! Review sentiment, per aspect, with a lexicon fallback.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{key_hash, AnalysisError};
use crate::llm::{complete_json, prompts, CompletionRequest, SharedGenerator};
use crate::models::Review;
use crate::scrapers::ScrapingError;
use crate::store::{get_json, set_json, SharedStore};

const CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
const MAX_PROMPT_REVIEWS: usize = 50;
const MAX_REVIEW_CHARS: usize = 500;
const RECENT_DAYS: i64 = 90;

/// Fetches the reviews shown on a product page.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch_reviews(&self, url: &str) -> Result<Vec<Review>, ScrapingError>;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AspectSentiment {
    pub score: f64,
    #[serde(default)]
    pub mentions: u32,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentKeywords {
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSentiment {
    /// -1 (negative) to 1 (positive).
    pub overall: f64,
    pub aspects: BTreeMap<String, AspectSentiment>,
    pub keywords: SentimentKeywords,
    pub confidence: f64,
    pub review_count: usize,
}

impl ReviewSentiment {
    fn neutral() -> Self {
        Self::default()
    }
}

/// Confidence from volume, verification and recency of the reviews.
pub fn sentiment_confidence(reviews: &[Review], now: DateTime<Utc>) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let n = reviews.len() as f64;
    let verified = reviews.iter().filter(|r| r.verified).count() as f64 / n;
    let cutoff = now - ChronoDuration::days(RECENT_DAYS);
    let recent = reviews
        .iter()
        .filter(|r| r.date.is_some_and(|d| d >= cutoff))
        .count() as f64
        / n;
    (0.5 + (n / 100.0).min(1.0) * 0.3 + verified * 0.1 + recent * 0.1).min(1.0)
}

const POSITIVE_WORDS: &[&str] = &[
    "love", "loves", "loved", "great", "excellent", "amazing", "awesome", "perfect", "fun",
    "sturdy", "durable", "beautiful", "favorite", "happy", "recommend", "worth", "best", "good",
    "nice", "well", "quality", "safe", "easy", "enjoy", "enjoys", "fits",
];

const NEGATIVE_WORDS: &[&str] = &[
    "broke", "broken", "break", "cheap", "flimsy", "terrible", "awful", "disappointed",
    "disappointing", "waste", "poor", "bad", "worst", "return", "returned", "defective",
    "boring", "dangerous", "sharp", "small", "tiny", "overpriced", "missing", "hard",
];

const ASPECTS: &[(&str, &[&str])] = &[
    ("quality", &["quality", "well made", "cheap", "flimsy", "sturdy", "material"]),
    ("value", &["price", "value", "worth", "money", "overpriced", "expensive"]),
    ("durability", &["broke", "broken", "durable", "lasted", "lasting", "fell apart"]),
    ("fun", &["fun", "boring", "enjoy", "play", "loves", "entertained"]),
    ("safety", &["safe", "safety", "sharp", "choking", "dangerous", "toxic"]),
    ("size", &["size", "small", "tiny", "big", "large", "fits"]),
];

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Score one review from its words, blended with its star rating.
fn review_score(review: &Review, counts: &mut (HashMap<String, u32>, HashMap<String, u32>)) -> Option<f64> {
    let mut pos = 0u32;
    let mut neg = 0u32;
    for token in tokens(&review.text) {
        if POSITIVE_WORDS.contains(&token.as_str()) {
            pos += 1;
            *counts.0.entry(token).or_default() += 1;
        } else if NEGATIVE_WORDS.contains(&token.as_str()) {
            neg += 1;
            *counts.1.entry(token).or_default() += 1;
        }
    }
    let lexical = (pos + neg > 0).then(|| (pos as f64 - neg as f64) / (pos + neg) as f64);
    let stars = review.rating.map(|r| ((r - 3.0) / 2.0).clamp(-1.0, 1.0));
    match (lexical, stars) {
        (Some(l), Some(s)) => Some((l + s) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

fn top_words(counts: HashMap<String, u32>, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

/// Word-list sentiment used when the generative service is unavailable.
///
/// Confidence is left at 0; callers fill it in.
pub fn lexicon_sentiment(reviews: &[Review]) -> ReviewSentiment {
    let mut counts = (HashMap::new(), HashMap::new());
    let mut scored = Vec::new();
    let mut aspects: BTreeMap<String, (f64, AspectSentiment)> = BTreeMap::new();

    for review in reviews {
        let Some(score) = review_score(review, &mut counts) else {
            continue;
        };
        scored.push(score);

        let lowered = review.text.to_lowercase();
        for (aspect, triggers) in ASPECTS {
            if triggers.iter().any(|t| lowered.contains(t)) {
                let entry = aspects.entry(aspect.to_string()).or_default();
                entry.0 += score;
                entry.1.mentions += 1;
                if entry.1.examples.len() < 2 {
                    entry.1.examples.push(excerpt(&review.text, 120));
                }
            }
        }
    }

    let overall = if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    };

    ReviewSentiment {
        overall,
        aspects: aspects
            .into_iter()
            .map(|(name, (sum, mut aspect))| {
                aspect.score = sum / aspect.mentions as f64;
                (name, aspect)
            })
            .collect(),
        keywords: SentimentKeywords {
            positive: top_words(counts.0, 5),
            negative: top_words(counts.1, 5),
        },
        confidence: 0.0,
        review_count: reviews.len(),
    }
}

#[derive(Debug, Deserialize)]
struct ModelSentiment {
    overall: f64,
    #[serde(default)]
    aspects: BTreeMap<String, AspectSentiment>,
    #[serde(default)]
    keywords: SentimentKeywords,
}

/// Strip query string and fragment so tracking parameters share a cache entry.
fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw
            .trim()
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Analyzes product reviews, caching per product page.
pub struct SentimentAnalyzer {
    store: SharedStore,
    generator: SharedGenerator,
    source: Arc<dyn ReviewSource>,
}

impl SentimentAnalyzer {
    pub fn new(store: SharedStore, generator: SharedGenerator, source: Arc<dyn ReviewSource>) -> Self {
        Self {
            store,
            generator,
            source,
        }
    }

    pub async fn analyze_product_sentiment(&self, url: &str) -> Result<ReviewSentiment, AnalysisError> {
        let normalized = normalize_url(url);
        if normalized.is_empty() {
            return Err(AnalysisError::Validation("Product URL is empty".to_string()));
        }
        let key = format!("sentiment:{}", key_hash(&normalized));

        match get_json::<ReviewSentiment>(&*self.store, &key).await {
            Ok(Some(cached)) => {
                debug!("Sentiment cache hit for {}", normalized);
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read sentiment cache for {}: {}", normalized, e),
        }

        let reviews = self.source.fetch_reviews(url).await?;
        let sentiment = self.analyze_reviews(&reviews).await;

        if sentiment.review_count > 0 {
            if let Err(e) = set_json(&*self.store, &key, &sentiment, Some(CACHE_TTL)).await {
                warn!("Failed to cache sentiment for {}: {}", normalized, e);
            }
        }
        info!(
            "Sentiment for {}: {:.2} over {} reviews",
            normalized, sentiment.overall, sentiment.review_count
        );
        Ok(sentiment)
    }

    /// Analyze an already-fetched batch of reviews.
    pub async fn analyze_reviews(&self, reviews: &[Review]) -> ReviewSentiment {
        if reviews.is_empty() {
            return ReviewSentiment::neutral();
        }

        let lines = reviews
            .iter()
            .take(MAX_PROMPT_REVIEWS)
            .map(|r| match r.rating {
                Some(rating) => format!("[{:.1}] {}", rating, excerpt(&r.text, MAX_REVIEW_CHARS)),
                None => excerpt(&r.text, MAX_REVIEW_CHARS),
            })
            .collect::<Vec<_>>()
            .join("\n");
        let request = CompletionRequest::new(
            prompts::JSON_SYSTEM,
            prompts::render(prompts::SENTIMENT_PROMPT, &[("reviews", &lines)]),
        )
        .with_temperature(0.1);

        let mut sentiment = match complete_json::<ModelSentiment>(&*self.generator, request).await {
            Ok(model) => ReviewSentiment {
                overall: model.overall.clamp(-1.0, 1.0),
                aspects: model
                    .aspects
                    .into_iter()
                    .map(|(name, mut a)| {
                        a.score = a.score.clamp(-1.0, 1.0);
                        (name.to_lowercase(), a)
                    })
                    .collect(),
                keywords: model.keywords,
                confidence: 0.0,
                review_count: reviews.len(),
            },
            Err(e) => {
                debug!("Model sentiment unavailable, using lexicon: {}", e);
                lexicon_sentiment(reviews)
            }
        };
        sentiment.confidence = sentiment_confidence(reviews, Utc::now());
        sentiment
    }
}
