//! CLI parser and dispatch to command-specific modules.

mod cache;
mod enrich;
mod products;
mod proxies;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use super::helpers::AppContext;
use crate::config::Config;

#[derive(Parser)]
#[command(name = "giftscout")]
#[command(about = "Anonymous product scraping and gift intelligence pipeline")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Checked before the parser runs so logging is up first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and health-check the proxy pool
    Proxies {
        #[command(subcommand)]
        command: ProxyCommands,
    },

    /// Rotate and print user agents
    UserAgent {
        /// Number of rotations to print
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// List the pool with last-used times instead of rotating
        #[arg(long)]
        list: bool,
    },

    /// Analyze prices from a JSON array of products
    Prices {
        /// File containing scraped products
        file: PathBuf,

        /// Category used for tiers and caching
        #[arg(long, default_value = "general")]
        category: String,

        /// Print the full analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze one product from a JSON array, using the rest as comparables
    Analyze {
        /// File containing scraped products
        file: PathBuf,

        /// Position of the product to analyze
        #[arg(long, default_value = "0")]
        index: usize,

        /// Override the product's category
        #[arg(long)]
        category: Option<String>,

        /// Skip review sentiment
        #[arg(long)]
        no_sentiment: bool,

        #[arg(long)]
        json: bool,
    },

    /// Fetch products from the backup sources
    Backup {
        query: String,

        #[arg(long)]
        json: bool,
    },

    /// Search products (cache, live scrape, then backup sources)
    Search {
        query: String,

        #[arg(long)]
        json: bool,
    },

    /// Enrich a gift mentioned in conversation
    Enrich {
        /// Gift name
        name: String,

        /// Gift identifier used for caching
        #[arg(long)]
        id: Option<String>,

        /// Conversation excerpt the gift came from
        #[arg(long, default_value = "")]
        context: String,

        /// Include this many related suggestions
        #[arg(long)]
        suggestions: Option<usize>,

        /// Ignore any cached enrichment
        #[arg(long)]
        refresh: bool,
    },

    /// Cache statistics and maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// List proxies with their counters
    List,
    /// Run a health check against every enabled proxy
    Check,
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show hit/miss counters
    Stats,
    /// Remove every cached entry
    Clear,
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_path(&path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(Config::load().await),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config).await?;
    let ctx = AppContext::build(config).await?;

    match cli.command {
        Commands::Proxies { command } => match command {
            ProxyCommands::List => proxies::cmd_proxy_list(&ctx).await,
            ProxyCommands::Check => proxies::cmd_proxy_check(&ctx).await,
        },
        Commands::UserAgent { count, list } => proxies::cmd_user_agent(&ctx, count, list).await,
        Commands::Prices {
            file,
            category,
            json,
        } => products::cmd_prices(&ctx, &file, &category, json).await,
        Commands::Analyze {
            file,
            index,
            category,
            no_sentiment,
            json,
        } => products::cmd_analyze(&ctx, &file, index, category, !no_sentiment, json).await,
        Commands::Backup { query, json } => products::cmd_backup(&ctx, &query, json).await,
        Commands::Search { query, json } => products::cmd_search(&ctx, &query, json).await,
        Commands::Enrich {
            name,
            id,
            context,
            suggestions,
            refresh,
        } => enrich::cmd_enrich(&ctx, &name, id, &context, suggestions, refresh).await,
        Commands::Cache { command } => match command {
            CacheCommands::Stats => cache::cmd_cache_stats(&ctx).await,
            CacheCommands::Clear => cache::cmd_cache_clear(&ctx).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enrich_arguments() {
        let cli = Cli::try_parse_from([
            "giftscout",
            "-v",
            "enrich",
            "LEGO Star Wars set",
            "--id",
            "g1",
            "--suggestions",
            "2",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Enrich {
                name,
                id,
                suggestions,
                refresh,
                ..
            } => {
                assert_eq!(name, "LEGO Star Wars set");
                assert_eq!(id.as_deref(), Some("g1"));
                assert_eq!(suggestions, Some(2));
                assert!(!refresh);
            }
            _ => panic!("expected enrich"),
        }
    }
}
