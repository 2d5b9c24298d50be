//! Scraping error taxonomy and classification.

use std::time::Duration;

use reqwest::StatusCode;

use crate::rate_limit::RateLimitError;
use crate::store::StoreError;

/// Errors from the fetching layer.
#[derive(Debug, thiserror::Error)]
pub enum ScrapingError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
    },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Blocked by target (HTTP {status})")]
    Blocked { status: u16 },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Parse error: {0}")]
    Parser(String),
    #[error("No available proxies")]
    NoAvailableProxies,
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ScrapingError {
    /// Classify a non-success HTTP status. Returns None for success codes.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        let code = status.as_u16();
        Some(match code {
            403 | 429 | 503 => Self::Blocked { status: code },
            _ => Self::Network {
                message: format!("HTTP {}", status),
                status: Some(code),
            },
        })
    }

    /// Classify a transport error.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Network {
                message: err.to_string(),
                status: err.status().map(|s| s.as_u16()),
            }
        }
    }

    /// Whether retrying (possibly through another proxy) may succeed.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Network { status: None, .. } => true,
            Self::Network {
                status: Some(code), ..
            } => *code >= 500,
            Self::Timeout(_) | Self::Blocked { .. } => true,
            Self::RateLimited(e) => !e.blocked,
            Self::Validation(_) | Self::Parser(_) | Self::NoAvailableProxies | Self::Store(_) => {
                false
            }
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            Self::Blocked { status } => Some(*status),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Short machine-readable kind for logs and error contexts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Timeout(_) => "timeout",
            Self::Blocked { .. } => "blocked",
            Self::Validation(_) => "validation",
            Self::Parser(_) => "parser",
            Self::NoAvailableProxies => "no_available_proxies",
            Self::RateLimited(_) => "rate_limited",
            Self::Store(_) => "store",
        }
    }

    /// Whether the failure says something about the proxy used.
    pub fn counts_against_proxy(&self) -> bool {
        matches!(
            self,
            Self::Network { status: None, .. } | Self::Timeout(_) | Self::Blocked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ScrapingError::from_status(StatusCode::OK).is_none());

        let blocked = ScrapingError::from_status(StatusCode::TOO_MANY_REQUESTS).unwrap();
        assert_eq!(blocked.kind(), "blocked");
        assert!(blocked.retryable());

        let server = ScrapingError::from_status(StatusCode::BAD_GATEWAY).unwrap();
        assert_eq!(server.kind(), "network");
        assert!(server.retryable());
        assert_eq!(server.status_code(), Some(502));

        let missing = ScrapingError::from_status(StatusCode::NOT_FOUND).unwrap();
        assert!(!missing.retryable());
        assert!(!missing.counts_against_proxy());
    }

    #[test]
    fn test_rate_limited_retryable_unless_blocked() {
        let soft = ScrapingError::from(RateLimitError {
            identifier: "x".into(),
            retry_after: Duration::from_secs(1),
            blocked: false,
        });
        assert!(soft.retryable());

        let hard = ScrapingError::from(RateLimitError {
            identifier: "x".into(),
            retry_after: Duration::from_secs(60),
            blocked: true,
        });
        assert!(!hard.retryable());
    }

    #[test]
    fn test_non_retryable_kinds() {
        assert!(!ScrapingError::NoAvailableProxies.retryable());
        assert!(!ScrapingError::Parser("bad".into()).retryable());
        assert!(ScrapingError::Timeout(Duration::from_secs(10)).counts_against_proxy());
    }
}
