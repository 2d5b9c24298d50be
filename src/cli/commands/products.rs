//! Price and product analysis, backup lookup and search commands.

use std::path::Path;

use anyhow::Context;
use console::style;

use crate::analysis::{AnalysisOptions, GiftPriceAnalysis, ProductAnalysis};
use crate::cli::helpers::{format_price, print_price_summary, print_products, AppContext};
use crate::models::ScrapedProduct;

async fn read_products(path: &Path) -> anyhow::Result<Vec<ScrapedProduct>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of products", path.display()))
}

fn print_analysis(analysis: &GiftPriceAnalysis) {
    println!("{:<20} {}", "Category:", analysis.category);
    println!(
        "{:<20} {:?} ({} samples)",
        "Source:", analysis.source, analysis.sample_size
    );
    println!("{:<20} {:.0}%", "Confidence:", analysis.confidence * 100.0);
    println!(
        "{:<20} {} - {} (mean {}, median {})",
        "Range:",
        format_price(Some(analysis.range.min)),
        format_price(Some(analysis.range.max)),
        format_price(Some(analysis.range.mean)),
        format_price(Some(analysis.range.median))
    );

    println!();
    println!("{}", style("Tiers").bold());
    let tiers = &analysis.tiers;
    for (label, tier) in [
        ("Budget:", &tiers.budget),
        ("Mid-range:", &tiers.mid_range),
        ("Premium:", &tiers.premium),
    ] {
        println!(
            "  {:<18} {} - {} (typical {})",
            label,
            format_price(Some(tier.min)),
            format_price(Some(tier.max)),
            format_price(Some(tier.typical))
        );
    }

    let d = &analysis.distribution;
    println!();
    println!(
        "{:<20} p10 {} | p25 {} | p50 {} | p75 {} | p90 {}",
        "Distribution:",
        format_price(Some(d.p10)),
        format_price(Some(d.p25)),
        format_price(Some(d.p50)),
        format_price(Some(d.p75)),
        format_price(Some(d.p90))
    );
    println!("{:<20} {:.3}", "Volatility:", analysis.volatility);
}

/// Analyze prices of the products in a JSON file.
pub async fn cmd_prices(
    ctx: &AppContext,
    file: &Path,
    category: &str,
    json: bool,
) -> anyhow::Result<()> {
    let products = read_products(file).await?;
    let analysis = ctx.price_analyzer().analyze_prices(&products, category).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!(
            "{} Analyzed {} products",
            style("→").cyan(),
            products.len()
        );
        println!();
        print_analysis(&analysis);
    }
    Ok(())
}

fn print_product_analysis(analysis: &ProductAnalysis) {
    println!("{}", style(&analysis.title).bold());
    println!("{:<20} {}", "Category:", analysis.category);
    println!("{:<20} {}", "Market position:", analysis.market_position);
    println!("{:<20} {:.1}", "Quality score:", analysis.quality_score);
    println!("{:<20} {:.0}%", "Reliability:", analysis.reliability * 100.0);
    println!(
        "{:<20} {:.1} years ({})",
        "Durability:",
        analysis.durability_prediction.years,
        analysis.durability_prediction.explanation
    );
    if let Some(sentiment) = &analysis.sentiment {
        println!(
            "{:<20} {:+.2} from {} reviews",
            "Sentiment:", sentiment.overall, sentiment.review_count
        );
    }
    if let Some(price) = &analysis.price_analysis {
        println!(
            "{:<20} {} - {} ({:?})",
            "Price range:",
            format_price(Some(price.range.min)),
            format_price(Some(price.range.max)),
            price.source
        );
    }

    for (heading, items, marker) in [
        ("Strengths", &analysis.strengths, style("+").green()),
        ("Weaknesses", &analysis.weaknesses, style("-").red()),
        ("Flags", &analysis.flags, style("!").yellow()),
    ] {
        if items.is_empty() {
            continue;
        }
        println!();
        println!("{}", style(heading).bold());
        for item in items {
            println!("  {} {}", marker, item);
        }
    }

    println!();
    println!(
        "{:<20} {:.0}%",
        "Confidence:",
        analysis.confidence.overall * 100.0
    );
}

/// Analyze one product against the rest of the file.
pub async fn cmd_analyze(
    ctx: &AppContext,
    file: &Path,
    index: usize,
    category: Option<String>,
    include_sentiment: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut products = read_products(file).await?;
    if index >= products.len() {
        anyhow::bail!(
            "{} holds {} products, no product at index {}",
            file.display(),
            products.len(),
            index
        );
    }
    let product = products.remove(index);
    let options = AnalysisOptions {
        comparables: products,
        category,
        include_sentiment,
        ..Default::default()
    };

    let result = ctx.product_analyzer().analyze_product(&product, &options).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    print_product_analysis(&result.into_result()?);
    Ok(())
}

/// Query the backup sources directly.
pub async fn cmd_backup(ctx: &AppContext, query: &str, json: bool) -> anyhow::Result<()> {
    let result = ctx.backup.get_backup_products(query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.source.starts_with("placeholder") {
        println!(
            "{} All backup sources failed, showing {} results",
            style("!").yellow(),
            result.source
        );
    } else {
        println!("{:<20} {}", "Source:", style(&result.source).cyan());
    }
    print_price_summary(&result.price_analysis);
    println!();
    print_products(&result.products);
    Ok(())
}

/// Full search: cache, live scrape, then backup sources.
pub async fn cmd_search(ctx: &AppContext, query: &str, json: bool) -> anyhow::Result<()> {
    let result = ctx.search_service().search(query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let search = result.into_result()?;
    println!("{:<20} {}", "Query:", search.query);
    println!("{:<20} {}", "Source:", style(&search.source).cyan());
    print_price_summary(&search.price_analysis);
    println!();
    print_products(&search.products);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_products_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"title": "Puzzle", "price": 12.5, "rating": 4.6, "reviewCount": 210}},
               {{"title": "Kite"}}]"#
        )
        .unwrap();

        let products = read_products(file.path()).await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].price, Some(12.5));
        assert_eq!(products[0].review_count, 210);
        assert_eq!(products[1].price, None);
    }

    #[tokio::test]
    async fn test_read_products_rejects_objects() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"title": "Puzzle"}}"#).unwrap();
        assert!(read_products(file.path()).await.is_err());
    }
}
