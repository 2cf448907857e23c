//! Rate provider configuration.

use std::time::Duration;

/// Configuration for [`HttpRateProvider`](crate::HttpRateProvider).
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Base URL of the rates API (default: `http://localhost:8090`).
    pub rates_url: String,

    /// API key sent as a bearer token (optional).
    pub api_key: Option<String>,

    /// How long a fetched rate stays valid.
    pub cache_ttl: Duration,

    /// Maximum number of fetch attempts per lookup.
    pub max_attempts: u32,

    /// Backoff step; attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            rates_url: "http://localhost:8090".to_string(),
            api_key: None,
            cache_ttl: Duration::from_secs(300),
            max_attempts: 3,
            backoff: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
        }
    }
}

impl FxConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rates_url: std::env::var("FX_RATES_URL").unwrap_or(defaults.rates_url),
            api_key: std::env::var("FX_RATES_API_KEY").ok(),
            cache_ttl: env_parse("FX_CACHE_TTL_SECONDS")
                .map_or(defaults.cache_ttl, Duration::from_secs),
            max_attempts: env_parse("FX_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            backoff: env_parse("FX_BACKOFF_MS").map_or(defaults.backoff, Duration::from_millis),
            timeout: env_parse("FX_TIMEOUT_SECONDS").map_or(defaults.timeout, Duration::from_secs),
        }
    }

    /// Set the rates URL.
    #[must_use]
    pub fn with_rates_url(mut self, url: impl Into<String>) -> Self {
        self.rates_url = url.into();
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the cache TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff = backoff;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
