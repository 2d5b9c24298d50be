//! Proxy pool and user-agent rotation commands.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::helpers::AppContext;

fn format_last_used(ms: i64) -> String {
    if ms <= 0 {
        return "never".to_string();
    }
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "invalid".to_string())
}

/// List proxies with their counters.
pub async fn cmd_proxy_list(ctx: &AppContext) -> anyhow::Result<()> {
    let stats = ctx.proxies.stats().await?;
    if stats.total == 0 {
        println!("{} No proxies configured", style("!").yellow());
        println!("  Set scraper.proxy_list or PROXY_LIST to a proxy list file");
        return Ok(());
    }

    println!(
        "{:<28} {:<8} {:>6} {:>8} {:>9} {:>9}",
        style("Proxy").bold(),
        style("Status").bold(),
        style("Fails").bold(),
        style("Avg ms").bold(),
        style("OK").bold(),
        style("Failed").bold()
    );
    for (proxy, counters) in &stats.proxies {
        let status = if !proxy.enabled {
            style("disabled").dim()
        } else if proxy.fail_count >= ctx.proxies.config().max_failures {
            style("failing").red()
        } else {
            style("ok").green()
        };
        println!(
            "{:<28} {:<8} {:>6} {:>8.0} {:>9} {:>9}",
            format!("{}://{}", proxy.protocol.as_str(), proxy.id()),
            status,
            proxy.fail_count,
            counters.average_time,
            counters.successes,
            counters.failures
        );
    }

    println!();
    println!("{:<20} {}", "Total:", stats.total);
    println!("{:<20} {}", "Enabled:", stats.enabled);
    println!("{:<20} {}", "Healthy:", stats.healthy);
    Ok(())
}

/// Health-check every enabled proxy.
pub async fn cmd_proxy_check(ctx: &AppContext) -> anyhow::Result<()> {
    if ctx.proxies.is_empty().await {
        println!("{} No proxies configured", style("!").yellow());
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Checking proxies...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let results = ctx.proxies.check_health().await;
    spinner.finish_and_clear();

    for result in &results {
        if result.healthy {
            println!(
                "{} {:<28} {}ms",
                style("✓").green(),
                result.proxy_id,
                result.response_time_ms.unwrap_or(0)
            );
        } else {
            println!(
                "{} {:<28} {}",
                style("✗").red(),
                result.proxy_id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let healthy = results.iter().filter(|r| r.healthy).count();
    println!();
    println!("{:<20} {}/{}", "Healthy:", healthy, results.len());
    Ok(())
}

/// Rotate (or list) user agents.
pub async fn cmd_user_agent(ctx: &AppContext, count: usize, list: bool) -> anyhow::Result<()> {
    if list {
        let agents = ctx.user_agents.agents().await;
        for agent in &agents {
            println!(
                "{:<20} {}",
                style(format_last_used(agent.last_used)).dim(),
                agent.value
            );
        }
        println!();
        println!("{:<20} {}", "Agents:", agents.len());
        return Ok(());
    }

    for _ in 0..count.max(1) {
        println!("{}", ctx.user_agents.next().await);
    }
    Ok(())
}
