//! Markup extraction for search result pages and review blocks.
//!
//! Selectors target the common marketplace layout: result cards tagged with
//! `data-component-type="s-search-result"` and reviews tagged with
//! `data-hook="review"`.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::error::ScrapingError;
use crate::models::{Review, ScrapedProduct};

fn selector(css: &str) -> Result<Selector, ScrapingError> {
    Selector::parse(css)
        .map_err(|e| ScrapingError::Parser(format!("Failed to parse selector '{}': {:?}", css, e)))
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(element: ElementRef<'_>, sel: &Selector) -> Option<String> {
    element
        .select(sel)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?").unwrap());
static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+|\d+").unwrap());
static RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)").unwrap());
static REVIEW_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z][a-z]+ \d{1,2}, \d{4})\s*$").unwrap());

/// Parse "$1,299.99" style prices.
pub fn parse_price(text: &str) -> Option<f64> {
    let caps = PRICE_RE.captures(text)?;
    let whole = caps.get(1)?.as_str().replace(',', "");
    let frac = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    format!("{}{}", whole, frac)
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// Parse "4.5 out of 5 stars" style ratings.
pub fn parse_rating(text: &str) -> Option<f64> {
    RATING_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|r| (0.0..=5.0).contains(r))
}

/// Parse counts like "1,234", "(87)" or "One person found this helpful".
pub fn parse_count(text: &str) -> Option<u32> {
    if text.trim().to_lowercase().starts_with("one ") {
        return Some(1);
    }
    COUNT_RE
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Parse "Reviewed in the United States on March 3, 2024".
pub fn parse_review_date(text: &str) -> Option<DateTime<Utc>> {
    let tail = REVIEW_DATE_RE.captures(text)?.get(1)?.as_str().to_string();
    NaiveDate::parse_from_str(&tail, "%B %d, %Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn resolve_url(base_url: &str, href: &str) -> String {
    match url::Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Extract product cards from a search results page.
pub fn parse_search_results(html: &str, base_url: &str) -> Result<Vec<ScrapedProduct>, ScrapingError> {
    let document = Html::parse_document(html);

    let card_sel = selector(r#"div[data-component-type="s-search-result"]"#)?;
    let title_sel = selector("h2")?;
    let link_sel = selector("h2 a, a.a-link-normal")?;
    let price_sel = selector(".a-price .a-offscreen")?;
    let rating_sel = selector(".a-icon-alt")?;
    let reviews_sel = selector(r#"span.s-underline-text, a[href*="customerReviews"] span"#)?;
    let prime_sel = selector("i.a-icon-prime")?;
    let sponsored_sel = selector(".puis-sponsored-label-text, .s-sponsored-label-text")?;
    let badge_sel = selector(".a-badge-text")?;
    let image_sel = selector("img.s-image")?;

    let mut products = Vec::new();
    for card in document.select(&card_sel) {
        let Some(title) = first_text(card, &title_sel) else {
            continue;
        };
        let url = card
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_url(base_url, href))
            .unwrap_or_default();

        let mut product = ScrapedProduct::new(title, url);
        product.price = first_text(card, &price_sel).and_then(|t| parse_price(&t));
        product.rating = first_text(card, &rating_sel)
            .and_then(|t| parse_rating(&t))
            .unwrap_or(0.0);
        product.review_count = first_text(card, &reviews_sel)
            .and_then(|t| parse_count(&t))
            .unwrap_or(0);
        product.prime = card.select(&prime_sel).next().is_some();
        product.sponsored = card.select(&sponsored_sel).next().is_some();
        product.best_seller = card
            .select(&badge_sel)
            .any(|b| text_of(b).to_lowercase().contains("best seller"));
        product.image_url = card
            .select(&image_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);

        products.push(product);
    }

    debug!("Parsed {} products from search page", products.len());
    Ok(products)
}

/// Extract reviews from a product or review page.
pub fn parse_reviews(html: &str) -> Result<Vec<Review>, ScrapingError> {
    let document = Html::parse_document(html);

    let review_sel = selector(r#"[data-hook="review"]"#)?;
    let body_sel = selector(r#"[data-hook="review-body"]"#)?;
    let rating_sel = selector(
        r#"[data-hook="review-star-rating"], [data-hook="cmps-review-star-rating"]"#,
    )?;
    let verified_sel = selector(r#"[data-hook="avp-badge"]"#)?;
    let helpful_sel = selector(r#"[data-hook="helpful-vote-statement"]"#)?;
    let date_sel = selector(r#"[data-hook="review-date"]"#)?;

    let mut reviews = Vec::new();
    for block in document.select(&review_sel) {
        let Some(text) = first_text(block, &body_sel) else {
            continue;
        };
        reviews.push(Review {
            text,
            rating: first_text(block, &rating_sel).and_then(|t| parse_rating(&t)),
            verified: block.select(&verified_sel).next().is_some(),
            helpful_votes: first_text(block, &helpful_sel)
                .and_then(|t| parse_count(&t))
                .unwrap_or(0),
            date: first_text(block, &date_sel).and_then(|t| parse_review_date(&t)),
        });
    }

    debug!("Parsed {} reviews", reviews.len());
    Ok(reviews)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const SEARCH_HTML: &str = r#"
<html><body>
<div data-component-type="s-search-result">
  <h2><a class="a-link-normal" href="/LEGO-Classic-Creative-Bricks/dp/B00NHQFA1I"><span>LEGO Classic Medium Creative Brick Box</span></a></h2>
  <span class="a-badge-text">Best Seller</span>
  <span class="a-price"><span class="a-offscreen">$34.99</span></span>
  <i class="a-icon-star"><span class="a-icon-alt">4.8 out of 5 stars</span></i>
  <span class="a-size-base s-underline-text">12,345</span>
  <i class="a-icon a-icon-prime"></i>
  <img class="s-image" src="https://img.example/lego.jpg">
</div>
<div data-component-type="s-search-result">
  <span class="puis-sponsored-label-text">Sponsored</span>
  <h2><a href="https://shop.example/kite"><span>Rainbow Kite</span></a></h2>
  <i><span class="a-icon-alt">4.1 out of 5 stars</span></i>
</div>
<div data-component-type="s-search-result"><p>no title here</p></div>
</body></html>"#;

    const REVIEWS_HTML: &str = r#"
<div data-hook="review">
  <i data-hook="review-star-rating"><span>5.0 out of 5 stars</span></i>
  <span data-hook="review-date">Reviewed in the United States on March 3, 2024</span>
  <span data-hook="avp-badge">Verified Purchase</span>
  <span data-hook="review-body"><span>My daughter loves it.   Great quality!</span></span>
  <span data-hook="helpful-vote-statement">12 people found this helpful</span>
</div>
<div data-hook="review">
  <span data-hook="review-body">Broke after a week.</span>
  <span data-hook="helpful-vote-statement">One person found this helpful</span>
</div>"#;

    #[test]
    fn test_parse_search_results() {
        let products = parse_search_results(SEARCH_HTML, "https://www.amazon.com").unwrap();
        assert_eq!(products.len(), 2);

        let lego = &products[0];
        assert_eq!(lego.title, "LEGO Classic Medium Creative Brick Box");
        assert_eq!(
            lego.url,
            "https://www.amazon.com/LEGO-Classic-Creative-Bricks/dp/B00NHQFA1I"
        );
        assert_eq!(lego.price, Some(34.99));
        assert_eq!(lego.rating, 4.8);
        assert_eq!(lego.review_count, 12_345);
        assert!(lego.prime);
        assert!(lego.best_seller);
        assert!(!lego.sponsored);
        assert_eq!(lego.image_url.as_deref(), Some("https://img.example/lego.jpg"));

        let kite = &products[1];
        assert!(kite.sponsored);
        assert_eq!(kite.price, None);
        assert_eq!(kite.url, "https://shop.example/kite");
    }

    #[test]
    fn test_parse_reviews() {
        let reviews = parse_reviews(REVIEWS_HTML).unwrap();
        assert_eq!(reviews.len(), 2);

        assert_eq!(reviews[0].text, "My daughter loves it. Great quality!");
        assert_eq!(reviews[0].rating, Some(5.0));
        assert!(reviews[0].verified);
        assert_eq!(reviews[0].helpful_votes, 12);
        let date = reviews[0].date.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 3));

        assert!(!reviews[1].verified);
        assert_eq!(reviews[1].helpful_votes, 1);
        assert_eq!(reviews[1].rating, None);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_price("$1,299.99"), Some(1299.99));
        assert_eq!(parse_price("Currently unavailable"), None);
        assert_eq!(parse_rating("4.5 out of 5 stars"), Some(4.5));
        assert_eq!(parse_rating("9 out of 5"), None);
        assert_eq!(parse_count("(1,024)"), Some(1024));
        assert!(parse_review_date("yesterday").is_none());
    }
}
