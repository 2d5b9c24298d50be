//! Gift enrichment: details, suggestions, classification and market signals
//! for a gift mentioned in conversation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::backup::{BackupProductResult, BackupProductService};
use crate::analysis::{CategoryAnalyzer, PriceRange, PriceStatus, PriceSummary, PriceTracker};
use crate::llm::{complete_json, prompts, CompletionRequest, SharedGenerator};
use crate::models::{
    AgeRange, Availability, EnrichedGift, EnrichmentOptions, ErrorCode, Gift, GiftAnalysis,
    GiftProcessingError, GiftSuggestion, ProcessingResult, ScrapedProduct,
};
use crate::store::{get_json, set_json, SharedStore, StoreResult};

const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

pub type GiftProcessingResult = ProcessingResult<EnrichedGift>;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("games", &["board game", "card game", "video game", "game"]),
    ("books", &["book", "novel", "comic", "story", "magazine"]),
    ("electronics", &["tablet", "headphones", "camera", "console", "speaker", "watch", "phone"]),
    ("music", &["guitar", "piano", "keyboard", "drum", "ukulele", "violin"]),
    ("arts", &["paint", "craft", "drawing", "crayon", "marker", "clay", "sketch"]),
    ("sports", &["ball", "bike", "bicycle", "scooter", "skateboard", "skates", "racket"]),
    ("outdoor", &["tent", "kite", "telescope", "binoculars", "swing", "sled"]),
    ("clothing", &["shirt", "shoes", "hoodie", "dress", "jacket", "hat", "socks"]),
    ("toys", &["toy", "lego", "doll", "puzzle", "blocks", "plush", "figure", "robot", "car"]),
];

const LIKES: &[&str] = &[
    "love", "want", "like", "favorite", "favourite", "wish", "excited", "cool", "awesome",
    "amazing", "dream", "really",
];

const DISLIKES: &[&str] = &[
    "hate", "don't like", "dont like", "boring", "scary", "already have", "don't want", "dont want",
    "broken", "not interested",
];

/// Negated forms of LIKES entries; their "like"/"want" must not count twice.
const NEGATED_LIKES: &[&str] = &["don't like", "dont like", "don't want", "dont want"];

/// True if `keyword` appears as whole words in `tokens`, allowing a plural "s".
fn has_keyword(tokens: &[&str], keyword: &str) -> bool {
    let words: Vec<&str> = keyword.split_whitespace().collect();
    tokens.windows(words.len()).any(|window| {
        window.iter().zip(&words).all(|(token, word)| {
            *token == *word || token.strip_suffix('s') == Some(*word)
        })
    })
}

fn keyword_category(text: &str) -> String {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| has_keyword(&tokens, w)))
        .map(|(category, _)| category.to_string())
        .unwrap_or_else(|| "other".to_string())
}

/// Keyword sentiment of the conversation toward the gift, -1 to 1.
fn conversation_sentiment(context: &str, gift_name: &str) -> f64 {
    let lowered = context.to_lowercase();
    let name = gift_name.to_lowercase();
    let relevant: Vec<&str> = lowered
        .split(['.', '!', '?', '\n'])
        .filter(|s| s.contains(&name))
        .collect();
    let text = if relevant.is_empty() {
        lowered.clone()
    } else {
        relevant.join(" ")
    };

    let count = |words: &[&str]| words.iter().map(|w| text.matches(w).count()).sum::<usize>();
    let dislikes = count(DISLIKES);
    let likes = count(LIKES).saturating_sub(count(NEGATED_LIKES));
    if likes + dislikes == 0 {
        0.0
    } else {
        (likes as f64 - dislikes as f64) / (likes + dislikes) as f64
    }
}

/// Relevance of a category in a calendar month (1-12), 0 to 1.
fn seasonality(category: &str, month: u32) -> f64 {
    let base: f64 = match (category, month) {
        ("toys" | "games" | "electronics", 11 | 12) => 1.0,
        ("toys" | "games", _) => 0.5,
        ("electronics", _) => 0.6,
        ("outdoor" | "sports", 5..=8) => 0.9,
        ("outdoor" | "sports", _) => 0.4,
        ("books", 8 | 9) => 0.9,
        ("books", _) => 0.6,
        ("clothing", 9 | 10) => 0.7,
        _ => 0.5,
    };
    if matches!(month, 11 | 12) {
        base.max(0.9)
    } else {
        base
    }
}

fn price_range(summary: &PriceSummary) -> Option<PriceRange> {
    (summary.max > 0.0).then_some(PriceRange {
        min: summary.min,
        max: summary.max,
        mean: summary.average,
        median: summary.median,
    })
}

#[derive(Debug, Deserialize)]
struct Suggestions {
    #[serde(default)]
    suggestions: Vec<GiftSuggestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Classification {
    category: String,
    #[serde(default)]
    age_range: Option<AgeRange>,
}

fn failure(gift: &Gift, stage: &str, message: impl std::fmt::Display) -> GiftProcessingError {
    GiftProcessingError::new(
        ErrorCode::EnrichmentFailed,
        format!("Failed to enrich gift '{}': {}", gift.name, message),
    )
    .with_context(serde_json::json!({
        "giftId": gift.id,
        "stage": stage,
    }))
}

/// Top-level orchestrator for detected gifts.
pub struct GiftEnrichmentService {
    store: SharedStore,
    generator: SharedGenerator,
    backup: Arc<BackupProductService>,
    category: Arc<CategoryAnalyzer>,
    tracker: Arc<PriceTracker>,
}

impl GiftEnrichmentService {
    pub fn new(
        store: SharedStore,
        generator: SharedGenerator,
        backup: Arc<BackupProductService>,
        category: Arc<CategoryAnalyzer>,
        tracker: Arc<PriceTracker>,
    ) -> Self {
        Self {
            store,
            generator,
            backup,
            category,
            tracker,
        }
    }

    fn cache_key(gift_id: &str) -> String {
        format!("gift:enriched:{}", gift_id)
    }

    pub async fn enrich_gift(
        &self,
        gift: &Gift,
        context: &str,
        options: &EnrichmentOptions,
    ) -> GiftProcessingResult {
        if gift.id.trim().is_empty() || gift.name.trim().is_empty() {
            return ProcessingResult::err(failure(gift, "validate", "gift id and name are required"));
        }

        let key = Self::cache_key(&gift.id);
        if !options.force_refresh && !options.include_suggestions {
            match get_json::<EnrichedGift>(&*self.store, &key).await {
                Ok(Some(cached)) => {
                    debug!("Enrichment cache hit for gift {}", gift.id);
                    return ProcessingResult::ok(cached);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to read enrichment cache for {}: {}", gift.id, e),
            }
        }

        let (details, suggestions, classified) = tokio::join!(
            self.details(gift, context),
            self.suggestions(gift, context, options),
            self.classify_and_analyze(gift, context),
        );

        let enriched = match (details, suggestions) {
            (Ok(details), Ok(suggestions)) => {
                let (category, age_range, analysis) = classified;
                EnrichedGift {
                    gift: gift.clone(),
                    details,
                    suggestions,
                    category,
                    age_range,
                    analysis,
                    enriched_at: Utc::now(),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("{}", e);
                return ProcessingResult::err(e);
            }
        };

        if let Err(e) = set_json(&*self.store, &key, &enriched, Some(CACHE_TTL)).await {
            warn!("Failed to cache enrichment for {}: {}", gift.id, e);
        }
        info!(
            "Enriched gift '{}' as {} with {} suggestions",
            gift.name,
            enriched.category,
            enriched.suggestions.len()
        );
        ProcessingResult::ok(enriched)
    }

    /// Drop the cached enrichment. Returns whether an entry existed.
    pub async fn invalidate(&self, gift_id: &str) -> StoreResult<bool> {
        Ok(self.store.del(&Self::cache_key(gift_id)).await? > 0)
    }

    async fn details(&self, gift: &Gift, context: &str) -> Result<String, GiftProcessingError> {
        let request = CompletionRequest::new(
            prompts::FRIENDLY_SYSTEM,
            prompts::render(
                prompts::GIFT_DETAILS_PROMPT,
                &[("name", &gift.name), ("context", context)],
            ),
        );
        match self.generator.complete(request).await {
            Ok(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            result => {
                if let Some(description) = gift.description.as_ref().filter(|d| !d.trim().is_empty()) {
                    debug!("Using stored description for gift {}", gift.id);
                    return Ok(description.clone());
                }
                let reason = match result {
                    Err(e) => e.to_string(),
                    Ok(_) => "empty description".to_string(),
                };
                Err(failure(gift, "details", reason))
            }
        }
    }

    async fn suggestions(
        &self,
        gift: &Gift,
        context: &str,
        options: &EnrichmentOptions,
    ) -> Result<Vec<GiftSuggestion>, GiftProcessingError> {
        if !options.include_suggestions || options.suggestion_count == 0 {
            return Ok(Vec::new());
        }
        let count = options.suggestion_count.to_string();
        let request = CompletionRequest::new(
            prompts::JSON_SYSTEM,
            prompts::render(
                prompts::GIFT_SUGGESTIONS_PROMPT,
                &[("name", &gift.name), ("count", &count), ("context", context)],
            ),
        )
        .with_temperature(0.8);

        let reply: Suggestions = complete_json(&*self.generator, request)
            .await
            .map_err(|e| failure(gift, "suggestions", e))?;
        let mut suggestions: Vec<GiftSuggestion> = reply
            .suggestions
            .into_iter()
            .filter(|s| !s.name.trim().is_empty())
            .take(options.suggestion_count)
            .collect();

        let grounding = join_all(
            suggestions
                .iter()
                .map(|s| self.backup.get_backup_products(&s.name)),
        )
        .await;
        for (suggestion, backup) in suggestions.iter_mut().zip(grounding) {
            suggestion.price_range = price_range(&backup.price_analysis);
        }
        Ok(suggestions)
    }

    async fn classify(&self, gift: &Gift, context: &str) -> (String, Option<AgeRange>) {
        let request = CompletionRequest::new(
            prompts::JSON_SYSTEM,
            prompts::render(
                prompts::GIFT_CLASSIFY_PROMPT,
                &[("name", &gift.name), ("context", context)],
            ),
        )
        .with_temperature(0.1);

        match complete_json::<Classification>(&*self.generator, request).await {
            Ok(c) if !c.category.trim().is_empty() => {
                let age_range = c.age_range.filter(|r| r.min <= r.max);
                (c.category.trim().to_lowercase(), age_range)
            }
            Ok(_) => (self.fallback_category(gift), None),
            Err(e) => {
                debug!("Classification unavailable for {}, using keywords: {}", gift.name, e);
                (self.fallback_category(gift), None)
            }
        }
    }

    fn fallback_category(&self, gift: &Gift) -> String {
        let text = match &gift.description {
            Some(description) => format!("{} {}", gift.name, description),
            None => gift.name.clone(),
        };
        keyword_category(&text)
    }

    async fn classify_and_analyze(
        &self,
        gift: &Gift,
        context: &str,
    ) -> (String, Option<AgeRange>, GiftAnalysis) {
        let ((category, age_range), market) =
            tokio::join!(self.classify(gift, context), self.backup.get_backup_products(&gift.name));
        let analysis = self.analyze(gift, context, &category, &market).await;
        (category, age_range, analysis)
    }

    async fn analyze(
        &self,
        gift: &Gift,
        context: &str,
        category: &str,
        market: &BackupProductResult,
    ) -> GiftAnalysis {
        // Placeholder listings would poison the cached category benchmark.
        let popularity = if market.source.starts_with("placeholder") {
            debug!("No market data for {}, skipping category analysis", category);
            0.5
        } else {
            match self.category.analyze_category(category, &market.products).await {
                Ok(analysis) => (analysis.quality_score / 10.0).clamp(0.0, 1.0),
                Err(e) => {
                    debug!("No category signal for {}: {}", category, e);
                    0.5
                }
            }
        };

        let tracked = match (&gift.url, gift.price) {
            (Some(url), Some(price)) => {
                let product = ScrapedProduct::new(gift.name.clone(), url.clone()).with_price(price);
                match self.tracker.track_price(&product).await {
                    Ok(tracked) => Some(tracked),
                    Err(e) => {
                        warn!("Price tracking failed for gift {}: {}", gift.id, e);
                        None
                    }
                }
            }
            _ => None,
        };

        let availability = match &tracked {
            Some(t) if t.status == PriceStatus::HighlyInflated => Availability::Limited,
            Some(_) => Availability::InStock,
            None if !market.source.starts_with("placeholder") => Availability::InStock,
            None => Availability::Unknown,
        };

        GiftAnalysis {
            sentiment: conversation_sentiment(context, &gift.name),
            popularity,
            seasonality: seasonality(category, Utc::now().month()),
            availability,
            price_volatility: tracked.as_ref().map_or(0.0, |t| t.volatility),
            price_range: price_range(&market.price_analysis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedGenerator;
    use crate::store::{InMemoryStore, KvStore};

    fn service(generator: Arc<ScriptedGenerator>) -> GiftEnrichmentService {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        GiftEnrichmentService::new(
            store.clone(),
            generator.clone(),
            Arc::new(BackupProductService::new(generator.clone(), Vec::new())),
            Arc::new(CategoryAnalyzer::new(store.clone(), generator)),
            Arc::new(PriceTracker::new(store)),
        )
    }

    fn scripted() -> Arc<ScriptedGenerator> {
        Arc::new(
            ScriptedGenerator::new()
                .on("Describe the gift", "A colorful kite that flies in light wind.")
                .on(
                    "Classify the gift",
                    r#"{"category": "Outdoor", "ageRange": {"min": 5, "max": 12}}"#,
                )
                .on(
                    "related gift ideas",
                    r#"{"suggestions": [{"name": "Kite reel", "description": "Winds string", "reason": "Pairs with a kite"}, {"name": "Windsock", "description": "", "reason": ""}, {"name": "Extra", "description": "", "reason": ""}]}"#,
                )
                .on(
                    "widely available",
                    r#"{"products": [{"title": "Delta Kite", "price": 18.0, "rating": 4.6, "reviewCount": 900}, {"title": "Box Kite", "price": 30.0, "rating": 4.4, "reviewCount": 300}]}"#,
                ),
        )
    }

    #[test]
    fn test_keyword_category() {
        assert_eq!(keyword_category("Catan board game"), "games");
        assert_eq!(keyword_category("LEGO castle"), "toys");
        assert_eq!(keyword_category("something unusual"), "other");
    }

    #[test]
    fn test_keyword_category_matches_whole_words() {
        assert_eq!(keyword_category("Wool scarf"), "other");
        assert_eq!(keyword_category("Chunky cardigan"), "other");
        assert_eq!(keyword_category("Play carpet"), "other");
        assert_eq!(keyword_category("Remote control toy car"), "toys");
        assert_eq!(keyword_category("Board games night"), "games");
    }

    #[test]
    fn test_conversation_sentiment_mixed_sentence() {
        let mixed = "I love the kite but the box is boring";
        assert_eq!(conversation_sentiment(mixed, "kite"), 0.0);
        assert_eq!(conversation_sentiment("I don't like the kite", "kite"), -1.0);
        assert_eq!(conversation_sentiment("I love the kite", "kite"), 1.0);
    }

    #[test]
    fn test_conversation_sentiment() {
        let context = "I really want a kite! My brother has a robot. I don't like robots.";
        assert!(conversation_sentiment(context, "kite") > 0.5);
        assert!(conversation_sentiment(context, "robot") < 0.0);
        assert_eq!(conversation_sentiment("We went to the park", "kite"), 0.0);
    }

    #[test]
    fn test_seasonality() {
        assert_eq!(seasonality("toys", 12), 1.0);
        assert_eq!(seasonality("outdoor", 7), 0.9);
        assert_eq!(seasonality("outdoor", 1), 0.4);
        assert_eq!(seasonality("other", 11), 0.9);
        assert_eq!(seasonality("books", 11), 0.9);
        assert_eq!(seasonality("electronics", 12), 1.0);
        assert_eq!(seasonality("clothing", 10), 0.7);
    }

    #[tokio::test]
    async fn test_enrich_gift() {
        let service = service(scripted());
        let mut gift = Gift::new("g1", "Kite");
        gift.url = Some("https://shop.example/kite".to_string());
        gift.price = Some(20.0);
        let options = EnrichmentOptions {
            include_suggestions: true,
            suggestion_count: 2,
            ..EnrichmentOptions::default()
        };

        let enriched = service
            .enrich_gift(&gift, "I love my kite so much", &options)
            .await
            .into_result()
            .unwrap();

        assert_eq!(enriched.details, "A colorful kite that flies in light wind.");
        assert_eq!(enriched.category, "outdoor");
        assert_eq!(enriched.age_range, Some(AgeRange { min: 5, max: 12 }));
        assert_eq!(enriched.suggestions.len(), 2);
        let grounded = enriched.suggestions[0].price_range.unwrap();
        assert_eq!((grounded.min, grounded.max), (18.0, 30.0));
        assert!(enriched.analysis.sentiment > 0.0);
        assert_eq!(enriched.analysis.availability, Availability::InStock);
        assert!(enriched.analysis.popularity > 0.0);
    }

    #[tokio::test]
    async fn test_cached_unless_suggestions_or_refresh() {
        let generator = scripted();
        let service = service(generator.clone());
        let gift = Gift::new("g2", "Kite");
        let options = EnrichmentOptions::default();

        service.enrich_gift(&gift, "", &options).await.into_result().unwrap();
        let calls = generator.calls();

        service.enrich_gift(&gift, "", &options).await.into_result().unwrap();
        assert_eq!(generator.calls(), calls);

        let refresh = EnrichmentOptions {
            force_refresh: true,
            ..EnrichmentOptions::default()
        };
        service.enrich_gift(&gift, "", &refresh).await.into_result().unwrap();
        assert!(generator.calls() > calls);

        assert!(service.invalidate("g2").await.unwrap());
        assert!(!service.invalidate("g2").await.unwrap());
    }

    #[tokio::test]
    async fn test_keyword_fallback_classification() {
        let generator = Arc::new(
            ScriptedGenerator::new().on("Describe the gift", "Snap-together bricks."),
        );
        let enriched = service(generator)
            .enrich_gift(&Gift::new("g3", "LEGO starter set"), "", &EnrichmentOptions::default())
            .await
            .into_result()
            .unwrap();
        assert_eq!(enriched.category, "toys");
        assert!(enriched.age_range.is_none());
        assert_eq!(enriched.analysis.availability, Availability::Unknown);
        assert!(enriched.analysis.price_range.is_some());
    }

    #[tokio::test]
    async fn test_failure_is_recoverable_enrichment_error() {
        let result = service(ScriptedGenerator::failing())
            .enrich_gift(&Gift::new("g4", "Kite"), "", &EnrichmentOptions::default())
            .await;
        assert!(!result.success);
        let err = result.error.unwrap();
        assert_eq!(err.code, ErrorCode::EnrichmentFailed);
        assert!(err.recoverable);
        assert_eq!(err.context.unwrap()["giftId"], "g4");
    }

    #[tokio::test]
    async fn test_placeholder_market_leaves_category_uncached() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let generator = ScriptedGenerator::failing();
        let category = Arc::new(CategoryAnalyzer::new(store.clone(), generator.clone()));
        let service = GiftEnrichmentService::new(
            store.clone(),
            generator.clone(),
            Arc::new(BackupProductService::new(generator, Vec::new())),
            category.clone(),
            Arc::new(PriceTracker::new(store.clone())),
        );
        let mut gift = Gift::new("g6", "Kite");
        gift.description = Some("A kite.".to_string());

        let enriched = service
            .enrich_gift(&gift, "", &EnrichmentOptions::default())
            .await
            .into_result()
            .unwrap();
        assert_eq!(enriched.analysis.popularity, 0.5);
        assert!(!store.exists("category:analysis:outdoor").await.unwrap());

        let real = vec![
            ScrapedProduct::new("Delta Kite", "https://shop.example/delta")
                .with_price(18.0)
                .with_rating(4.6, 900),
            ScrapedProduct::new("Box Kite", "https://shop.example/box")
                .with_price(30.0)
                .with_rating(4.4, 300),
        ];
        let analysis = category.analyze_category("outdoor", &real).await.unwrap();
        assert_eq!(analysis.product_count, 2);
    }

    #[tokio::test]
    async fn test_stored_description_covers_missing_details() {
        let mut gift = Gift::new("g5", "Kite");
        gift.description = Some("A kite.".to_string());
        let enriched = service(ScriptedGenerator::failing())
            .enrich_gift(&gift, "", &EnrichmentOptions::default())
            .await
            .into_result()
            .unwrap();
        assert_eq!(enriched.details, "A kite.");
        assert_eq!(enriched.category, "outdoor");
    }
}
