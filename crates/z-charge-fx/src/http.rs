//! HTTP-backed exchange rate provider.
//!
//! Expects a rates API of the form
//! `GET {rates_url}/v1/rates?base=BTC&symbols=USD` answering
//! `{"base": "BTC", "rates": {"USD": 50000.0}}`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

use z_charge_core::Currency;

use crate::config::FxConfig;
use crate::converter::RateProvider;
use crate::error::{FxError, Result};

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: HashMap<String, serde_json::Number>,
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    fetched_at: Instant,
}

/// Rate provider that fetches from an HTTP rates API.
///
/// Fetched rates are cached for `cache_ttl`, and every fetch also caches
/// the inverse direction. Failed fetches are retried with linear backoff.
#[derive(Debug)]
pub struct HttpRateProvider {
    client: Client,
    config: FxConfig,
    cache: Mutex<HashMap<(Currency, Currency), CachedRate>>,
}

impl HttpRateProvider {
    /// Create a new provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: FxConfig) -> Result<Self> {
        if config.max_attempts == 0 {
            return Err(FxError::Configuration("max_attempts must be at least 1".into()));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config: FxConfig {
                rates_url: config.rates_url.trim_end_matches('/').to_string(),
                ..config
            },
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Drop every cached rate.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        let cache = self.cache.lock().ok()?;
        let key = (from.clone(), to.clone());
        cache
            .get(&key)
            .filter(|c| c.fetched_at.elapsed() < self.config.cache_ttl)
            .map(|c| c.rate)
    }

    fn store(&self, from: &Currency, to: &Currency, rate: Decimal) {
        let now = Instant::now();
        let Ok(mut cache) = self.cache.lock() else {
            return;
        };
        cache.insert(
            (from.clone(), to.clone()),
            CachedRate {
                rate,
                fetched_at: now,
            },
        );
        if let Some(inverse) = Decimal::ONE.checked_div(rate) {
            cache.insert(
                (to.clone(), from.clone()),
                CachedRate {
                    rate: inverse,
                    fetched_at: now,
                },
            );
        }
    }

    /// Fetch `base -> symbol`, retrying transient failures.
    ///
    /// Returns `Ok(None)` when the API does not list the pair or answers 404.
    async fn fetch_with_retry(&self, base: &Currency, symbol: &Currency) -> Result<Option<Decimal>> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch(base, symbol).await {
                Ok(rate) => return Ok(rate),
                Err(e) if !e.is_transient() || attempt >= self.config.max_attempts => {
                    tracing::warn!(
                        base = %base,
                        symbol = %symbol,
                        attempt = %attempt,
                        error = %e,
                        "Rate fetch failed"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let backoff = backoff_for(self.config.backoff, attempt);
                    tracing::debug!(
                        base = %base,
                        symbol = %symbol,
                        attempt = %attempt,
                        backoff_ms = %backoff.as_millis(),
                        error = %e,
                        "Rate fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn fetch(&self, base: &Currency, symbol: &Currency) -> Result<Option<Decimal>> {
        let url = format!("{}/v1/rates", self.config.rates_url);

        let mut request = self
            .client
            .get(&url)
            .query(&[("base", base.code()), ("symbols", symbol.code())]);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(base = %base, symbol = %symbol, "Pair not quoted");
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FxError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: RatesResponse = response.json().await?;
        body.rates
            .get(symbol.code())
            .map(parse_rate)
            .transpose()
    }
}

fn parse_rate(n: &serde_json::Number) -> Result<Decimal> {
    let text = n.to_string();
    let rate = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| FxError::InvalidRate(text.clone()))?;
    if rate <= Decimal::ZERO {
        return Err(FxError::InvalidRate(text));
    }
    Ok(rate)
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn get_rate(&self, from: &Currency, to: &Currency) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        if let Some(rate) = self.cached(from, to) {
            return Ok(rate);
        }

        if let Some(rate) = self.fetch_with_retry(from, to).await? {
            tracing::debug!(from = %from, to = %to, rate = %rate, "Fetched exchange rate");
            self.store(from, to, rate);
            return Ok(rate);
        }

        // Only the reverse direction is quoted; derive ours from it.
        if let Some(reverse) = self.fetch_with_retry(to, from).await? {
            self.store(to, from, reverse);
            if let Some(rate) = Decimal::ONE.checked_div(reverse) {
                tracing::debug!(from = %from, to = %to, rate = %rate, "Derived inverse exchange rate");
                return Ok(rate);
            }
        }

        Err(FxError::NoRateAvailable {
            from: from.clone(),
            to: to.clone(),
        })
    }
}

/// Retry delay before attempt `attempt + 1`.
#[must_use]
pub fn backoff_for(step: Duration, attempt: u32) -> Duration {
    step * attempt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_scientific_rates() {
        let plain: serde_json::Number = serde_json::from_str("50000.5").unwrap();
        assert_eq!(parse_rate(&plain).unwrap(), Decimal::new(500_005, 1));

        let tiny: serde_json::Number = serde_json::from_str("2e-5").unwrap();
        assert_eq!(parse_rate(&tiny).unwrap(), Decimal::new(2, 5));
    }

    #[test]
    fn rejects_non_positive_rates() {
        let zero: serde_json::Number = serde_json::from_str("0").unwrap();
        assert!(matches!(parse_rate(&zero), Err(FxError::InvalidRate(_))));
    }

    #[test]
    fn backoff_is_linear() {
        let step = Duration::from_millis(100);
        assert_eq!(backoff_for(step, 1), Duration::from_millis(100));
        assert_eq!(backoff_for(step, 3), Duration::from_millis(300));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = FxConfig::default().with_retries(0, Duration::ZERO);
        assert!(matches!(
            HttpRateProvider::new(config),
            Err(FxError::Configuration(_))
        ));
    }
}
