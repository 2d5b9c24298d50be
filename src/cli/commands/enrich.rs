//! Gift enrichment command.

use console::style;

use crate::cli::helpers::{format_price, AppContext};
use crate::models::{EnrichedGift, EnrichmentOptions, Gift};

/// Derive a stable id from the gift name when none is given.
fn gift_id_for(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn print_enriched(enriched: &EnrichedGift) {
    let analysis = &enriched.analysis;
    println!("{}", style(&enriched.gift.name).bold());
    println!("{:<20} {}", "Id:", enriched.gift.id);
    println!("{:<20} {}", "Category:", enriched.category);
    if let Some(ages) = enriched.age_range {
        println!("{:<20} {}-{}", "Ages:", ages.min, ages.max);
    }
    println!("{:<20} {}", "Details:", enriched.details);
    println!();
    println!("{:<20} {:+.2}", "Sentiment:", analysis.sentiment);
    println!("{:<20} {:.2}", "Popularity:", analysis.popularity);
    println!("{:<20} {:.2}", "Seasonality:", analysis.seasonality);
    println!("{:<20} {:?}", "Availability:", analysis.availability);
    println!("{:<20} {:.3}", "Price volatility:", analysis.price_volatility);
    if let Some(range) = &analysis.price_range {
        println!(
            "{:<20} {} - {}",
            "Price range:",
            format_price(Some(range.min)),
            format_price(Some(range.max))
        );
    }

    if !enriched.suggestions.is_empty() {
        println!();
        println!("{}", style("Suggestions").bold());
        for suggestion in &enriched.suggestions {
            let price = suggestion
                .price_range
                .map(|r| {
                    format!(
                        " ({} - {})",
                        format_price(Some(r.min)),
                        format_price(Some(r.max))
                    )
                })
                .unwrap_or_default();
            println!("  {} {}{}", style("•").cyan(), suggestion.name, price);
            if !suggestion.reason.is_empty() {
                println!("    {}", style(&suggestion.reason).dim());
            }
        }
    }
}

/// Enrich one gift and print the result.
pub async fn cmd_enrich(
    ctx: &AppContext,
    name: &str,
    id: Option<String>,
    context: &str,
    suggestions: Option<usize>,
    refresh: bool,
) -> anyhow::Result<()> {
    let gift = Gift::new(id.unwrap_or_else(|| gift_id_for(name)), name);
    let mut options = EnrichmentOptions {
        force_refresh: refresh,
        ..Default::default()
    };
    if let Some(count) = suggestions {
        options.include_suggestions = true;
        options.suggestion_count = count;
    }

    let result = ctx
        .enrichment_service()
        .enrich_gift(&gift, context, &options)
        .await;
    let enriched = result.into_result()?;
    print_enriched(&enriched);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_id_for_name() {
        assert_eq!(gift_id_for("  LEGO Star Wars: X-Wing! "), "lego-star-wars-x-wing");
        assert_eq!(gift_id_for("Kite"), "kite");
    }
}
