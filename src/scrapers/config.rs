//! Scraper configuration types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use super::proxy::ProxyConfig;
use super::quality::QualityThresholds;
use crate::rate_limit::RateLimitConfig;

/// Scraper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Proxy list file, one `host:port:protocol[:user:pass]` per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_list: Option<PathBuf>,
    /// User-agent list file, one per line. Built-in browser agents when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_list: Option<PathBuf>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Search results page, `{query}` is replaced with the encoded query.
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Product page base used to resolve relative result links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub quality: QualityThresholds,
    /// Per-proxy-host request limits.
    #[serde(default = "RateLimitConfig::for_proxies")]
    pub proxy_rate_limit: RateLimitConfig,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_search_url() -> String {
    "https://www.amazon.com/s?k={query}".to_string()
}

fn default_base_url() -> String {
    "https://www.amazon.com".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            proxy_list: None,
            user_agent_list: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            search_url: default_search_url(),
            base_url: default_base_url(),
            proxy: ProxyConfig::default(),
            cache: CacheConfig::default(),
            quality: QualityThresholds::default(),
            proxy_rate_limit: RateLimitConfig::for_proxies(),
        }
        .with_env_overrides()
    }
}

impl ScraperConfig {
    /// Apply environment variable overrides.
    ///
    /// - `PROXY_LIST`: path to the proxy list file
    /// - `USER_AGENT_LIST`: path to the user-agent list file
    /// - `SCRAPER_TIMEOUT_SECS`: per-request timeout
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("PROXY_LIST") {
            self.proxy_list = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("USER_AGENT_LIST") {
            self.user_agent_list = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("SCRAPER_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.timeout_secs = n;
            }
        }
        self
    }

    /// Resolve relative list paths against the config file's directory.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [&mut self.proxy_list, &mut self.user_agent_list]
            .into_iter()
            .flatten()
        {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            let expanded = PathBuf::from(expanded);
            *path = if expanded.is_relative() {
                base_dir.join(expanded)
            } else {
                expanded
            };
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    /// Search URL for a query.
    pub fn search_url_for(&self, query: &str) -> String {
        self.search_url
            .replace("{query}", &urlencoding::encode(query.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_query() {
        let config = ScraperConfig {
            search_url: "https://shop.example/s?k={query}".to_string(),
            ..ScraperConfig::default()
        };
        assert_eq!(
            config.search_url_for(" lego space "),
            "https://shop.example/s?k=lego%20space"
        );
    }

    #[test]
    fn test_resolve_paths_relative_to_config_dir() {
        let mut config = ScraperConfig {
            proxy_list: Some(PathBuf::from("lists/proxies.txt")),
            user_agent_list: Some(PathBuf::from("/etc/giftscout/agents.txt")),
            ..ScraperConfig::default()
        };
        config.resolve_paths(Path::new("/srv/app"));
        assert_eq!(
            config.proxy_list,
            Some(PathBuf::from("/srv/app/lists/proxies.txt"))
        );
        assert_eq!(
            config.user_agent_list,
            Some(PathBuf::from("/etc/giftscout/agents.txt"))
        );
    }
}
