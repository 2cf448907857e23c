//! Metering configuration.

use std::time::Duration;

/// Default time an idempotency key is remembered (24 hours).
const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 86_400;

/// Configuration for [`UsageMeter`](crate::UsageMeter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteringConfig {
    /// How long a recorded idempotency key suppresses repeats.
    pub idempotency_ttl: Duration,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::from_secs(DEFAULT_IDEMPOTENCY_TTL_SECS),
        }
    }
}

impl MeteringConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `USAGE_IDEMPOTENCY_TTL_SECONDS`; unset or unparseable values
    /// fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let idempotency_ttl = std::env::var("USAGE_IDEMPOTENCY_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map_or(Self::default().idempotency_ttl, Duration::from_secs);

        Self { idempotency_ttl }
    }

    /// Set the idempotency TTL.
    #[must_use]
    pub fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_one_day() {
        assert_eq!(
            MeteringConfig::default().idempotency_ttl,
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn builder_overrides_ttl() {
        let config = MeteringConfig::default().with_idempotency_ttl(Duration::from_secs(5));
        assert_eq!(config.idempotency_ttl, Duration::from_secs(5));
    }
}
