//! Services the usage gate consults but does not own.
//!
//! Hosts implement these against their flag service, entitlement source
//! and payment provider. Payment providers expose optional capabilities
//! through accessor methods that default to `None`, so the manager asks
//! "can you report usage?" instead of inspecting concrete types.

use async_trait::async_trait;

use z_charge_core::UsageRecord;

/// Feature flag lookups.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    /// Check if `key` is enabled for the evaluation `context`.
    async fn is_enabled(&self, key: &str, context: &serde_json::Value) -> bool;
}

/// Result of an entitlement lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Entitlement {
    /// Whether the customer holds the entitlement.
    pub granted: bool,

    /// Optional per-period quantity attached to the entitlement.
    pub limit: Option<i64>,
}

impl Entitlement {
    /// A granted entitlement without a limit.
    #[must_use]
    pub fn granted() -> Self {
        Self {
            granted: true,
            limit: None,
        }
    }

    /// A granted entitlement capped at `limit`.
    #[must_use]
    pub fn limited(limit: i64) -> Self {
        Self {
            granted: true,
            limit: Some(limit),
        }
    }

    /// An entitlement the customer does not hold.
    #[must_use]
    pub fn denied() -> Self {
        Self::default()
    }
}

/// Entitlement lookups.
#[async_trait]
pub trait EntitlementChecker: Send + Sync {
    /// Look up entitlement `key` for a customer.
    async fn has_entitlement(&self, customer_id: &str, key: &str) -> Entitlement;
}

/// Error returned by a payment provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    /// Provider name.
    pub provider: String,
    /// Error message.
    pub message: String,
}

impl ProviderError {
    /// Create a new provider error.
    #[must_use]
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Optional capability: receive usage records for provider-side billing.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    /// Forward one persisted usage record.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects or cannot receive the
    /// record.
    async fn record_usage(&self, record: &UsageRecord) -> Result<(), ProviderError>;
}

/// A payment provider integration.
pub trait PaymentProvider: Send + Sync {
    /// Provider name used in logs (e.g., `stripe`).
    fn name(&self) -> &str;

    /// Usage reporting capability, if the provider supports it.
    fn usage_reporter(&self) -> Option<&dyn UsageReporter> {
        None
    }
}
