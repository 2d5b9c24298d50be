//! Cache inspection commands.

use console::style;

use crate::cli::helpers::AppContext;

pub async fn cmd_cache_stats(ctx: &AppContext) -> anyhow::Result<()> {
    let stats = ctx.cache().stats().await?;
    println!("{:<20} {}", "Hits:", stats.hits);
    println!("{:<20} {}", "Misses:", stats.misses);
    println!("{:<20} {:.1}%", "Hit rate:", stats.hit_rate * 100.0);
    Ok(())
}

pub async fn cmd_cache_clear(ctx: &AppContext) -> anyhow::Result<()> {
    let removed = ctx.cache().clear_cache().await?;
    println!(
        "{} Removed {} cached entries",
        style("✓").green(),
        removed
    );
    Ok(())
}
