//! Configuration management using the prefer crate for discovery.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::PriceAnalyzerConfig;
use crate::llm::LlmConfig;
use crate::rate_limit::RateLimitConfig;
use crate::scrapers::ScraperConfig;
use crate::services::BackupConfig;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// Top-level configuration. Every section is optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared store; the in-memory store is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    pub llm: LlmConfig,
    pub scraper: ScraperConfig,
    /// Limiter applied to inbound callers (fail-open).
    pub rate_limit: RateLimitConfig,
    pub backup: BackupConfig,
    pub price: PriceAnalyzerConfig,
    /// Path of the file this config came from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: None,
            llm: LlmConfig::default(),
            scraper: ScraperConfig::default(),
            rate_limit: RateLimitConfig::default(),
            backup: BackupConfig::default(),
            price: PriceAnalyzerConfig::default(),
            source_path: None,
        }
        .with_env_overrides()
    }
}

impl Config {
    /// Apply overrides for settings that live outside sub-configs.
    ///
    /// - `REDIS_URL`: shared store connection string
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("REDIS_URL") {
            if !url.is_empty() {
                self.redis_url = Some(url);
            }
        }
        self
    }

    /// Discover a `giftscout` config file in the standard locations.
    ///
    /// Falls back to defaults (with environment overrides) when no file is
    /// found or the file cannot be parsed.
    pub async fn load() -> Self {
        match prefer::load("giftscout").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Ignoring config file {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(e) => {
                debug!("No config file discovered: {}", e);
                Self::default()
            }
        }
    }

    /// Load a specific file, choosing the parser by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            })?,
            _ => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            })?,
        };

        config.source_path = Some(path.to_path_buf());
        config.backup = config.backup.with_env_overrides();
        config = config.with_env_overrides();
        if let Some(base_dir) = config.base_dir() {
            config.scraper.resolve_paths(&base_dir);
        }
        Ok(config)
    }

    /// Directory of the config file, used to resolve relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
    }
}
