//! Prompt templates.
//!
//! Templates use `{name}` placeholders filled with `str::replace`.

/// System instruction for every structured request.
pub const JSON_SYSTEM: &str = "You are a careful shopping research assistant for a family gift-finding app. \
Answer with a single valid JSON object and nothing else. Never include markdown or commentary.";

/// System instruction for free-text replies shown to children and parents.
pub const FRIENDLY_SYSTEM: &str = "You help children and their parents pick thoughtful gifts. \
Write in a warm, simple, age-appropriate voice. Never mention prices you are unsure of.";

pub const SENTIMENT_PROMPT: &str = r#"Analyze the sentiment of these product reviews.

Reviews (one per line, rating in brackets when known):
{reviews}

Return JSON with this shape:
{"overall": <number from -1 to 1>,
 "aspects": {"<aspect>": {"score": <-1..1>, "mentions": <int>, "examples": ["<short quote>"]}},
 "keywords": {"positive": ["<word>"], "negative": ["<word>"]},
 "confidence": <0..1>}

Use aspects such as quality, value, durability, fun, safety and size when the reviews discuss them."#;

pub const CATEGORY_INSIGHTS_PROMPT: &str = r#"Category: {category}

Example products in this category:
{titles}

List what separates good products from bad ones in this category.
Return JSON: {"qualityIndicators": ["<indicator>"], "commonComplaints": ["<complaint>"]}
Give at most 5 of each."#;

pub const PRICE_ESTIMATE_PROMPT: &str = r#"Estimate typical retail prices in US dollars for gifts in the category "{category}".

Return JSON: {"min": <number>, "max": <number>, "budget": <number>, "midRange": <number>, "premium": <number>}
where budget, midRange and premium are typical prices for each tier."#;

pub const BACKUP_PRODUCTS_PROMPT: &str = r#"Suggest {count} real, widely available products matching the search "{query}".

Return JSON: {"products": [{"title": "<name>", "price": <usd number>, "rating": <0-5>, "reviewCount": <int>, "features": ["<feature>"], "category": "<category>"}]}
Only include products you are confident exist."#;

pub const PLACEHOLDER_PRODUCTS_PROMPT: &str = r#"Invent 3 representative example products for the search "{query}" at clearly different price points: one budget, one mid-range, one premium.

Return JSON: {"products": [{"title": "<name>", "price": <usd number>, "rating": <0-5>, "reviewCount": <int>, "features": ["<feature>"]}]}"#;

pub const GIFT_DETAILS_PROMPT: &str = r#"Describe the gift "{name}" in 2-3 sentences: what it is and why a child might enjoy it.

Conversation so far:
{context}"#;

pub const GIFT_SUGGESTIONS_PROMPT: &str = r#"The child is interested in "{name}". Suggest {count} related gift ideas.

Conversation so far:
{context}

Return JSON: {"suggestions": [{"name": "<gift>", "description": "<one sentence>", "reason": "<why it fits>"}]}"#;

pub const GIFT_CLASSIFY_PROMPT: &str = r#"Classify the gift "{name}".

Conversation so far:
{context}

Return JSON: {"category": "<one of: toys, books, electronics, clothing, games, sports, arts, music, outdoor, other>", "ageRange": {"min": <years>, "max": <years>}}"#;

/// Fill `{key}` placeholders in a template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_placeholders() {
        let prompt = render(GIFT_SUGGESTIONS_PROMPT, &[("name", "kite"), ("count", "3"), ("context", "likes wind")]);
        assert!(prompt.contains("\"kite\""));
        assert!(prompt.contains("Suggest 3"));
        assert!(!prompt.contains("{name}"));
        assert!(!prompt.contains("{context}"));
    }
}
