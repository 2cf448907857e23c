//! Gated usage recording.
//!
//! [`BillingUsageManager`] runs each usage record through three gates
//! (feature flag, entitlement, quantity ceilings), persists it, and then
//! forwards it to the payment provider. Local persistence is authoritative:
//! a forwarding failure is logged and never undoes the write.
//!
//! Ceilings are read-then-decide. Two concurrent submissions can both pass
//! before either is persisted, so enforcement under concurrency is
//! approximate.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use z_charge_core::{UsageRecord, UsageWindow};
use z_charge_store::Store;

use crate::collaborators::{EntitlementChecker, FeatureFlags, PaymentProvider};
use crate::error::{LimitReason, Rejection, Result};

/// Ceilings on cumulative usage, including the submission being checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageLimitPolicy {
    /// Maximum quantity since `period_start`.
    pub max_per_period: Option<i64>,

    /// Maximum quantity over all time.
    pub max_total: Option<i64>,

    /// Start of the current period (default: start of the current UTC month).
    pub period_start: Option<DateTime<Utc>>,
}

impl UsageLimitPolicy {
    /// A per-period ceiling.
    #[must_use]
    pub fn per_period(max: i64) -> Self {
        Self {
            max_per_period: Some(max),
            ..Self::default()
        }
    }

    /// An all-time ceiling.
    #[must_use]
    pub fn total(max: i64) -> Self {
        Self {
            max_total: Some(max),
            ..Self::default()
        }
    }

    /// Set the period start.
    #[must_use]
    pub fn starting_at(mut self, period_start: DateTime<Utc>) -> Self {
        self.period_start = Some(period_start);
        self
    }
}

/// Which gates to run for one submission.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Feature flag that must be enabled.
    pub feature_flag: Option<String>,

    /// Context passed to the flag evaluation.
    pub flag_context: serde_json::Value,

    /// Entitlement the customer must hold.
    pub entitlement: Option<String>,

    /// Quantity ceilings.
    pub limits: Option<UsageLimitPolicy>,
}

impl RecordOptions {
    /// Require a feature flag.
    #[must_use]
    pub fn with_feature_flag(mut self, flag: impl Into<String>, context: serde_json::Value) -> Self {
        self.feature_flag = Some(flag.into());
        self.flag_context = context;
        self
    }

    /// Require an entitlement.
    #[must_use]
    pub fn with_entitlement(mut self, key: impl Into<String>) -> Self {
        self.entitlement = Some(key.into());
        self
    }

    /// Enforce quantity ceilings.
    #[must_use]
    pub fn with_limits(mut self, limits: UsageLimitPolicy) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Records usage behind flag, entitlement and ceiling checks.
///
/// Collaborators are optional. A gate whose collaborator is not configured
/// is skipped.
pub struct BillingUsageManager {
    store: Arc<dyn Store>,
    flags: Option<Arc<dyn FeatureFlags>>,
    entitlements: Option<Arc<dyn EntitlementChecker>>,
    provider: Option<Arc<dyn PaymentProvider>>,
}

impl BillingUsageManager {
    /// Create a manager over `store` with no collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            flags: None,
            entitlements: None,
            provider: None,
        }
    }

    /// Set the feature flag service.
    #[must_use]
    pub fn with_feature_flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Set the entitlement checker.
    #[must_use]
    pub fn with_entitlements(mut self, entitlements: Arc<dyn EntitlementChecker>) -> Self {
        self.entitlements = Some(entitlements);
        self
    }

    /// Set the payment provider usage is forwarded to.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Gate, persist and forward a usage record.
    ///
    /// Returns the persisted record.
    ///
    /// # Errors
    ///
    /// Returns `MeteringError::Rejected` if a gate refuses the record, or
    /// `MeteringError::Storage` if it cannot be read or persisted.
    /// Forwarding failures are not errors.
    pub async fn record_usage(
        &self,
        record: UsageRecord,
        options: &RecordOptions,
    ) -> Result<UsageRecord> {
        self.check_feature_flag(options).await?;
        let entitlement_limit = self.check_entitlement(&record, options).await?;

        let limits = options.limits.unwrap_or_default();
        let limits = UsageLimitPolicy {
            max_per_period: limits.max_per_period.or(entitlement_limit),
            ..limits
        };
        self.check_limits(&record, &limits).await?;

        self.store.put_usage_record(&record).await?;
        tracing::info!(
            record_id = %record.id,
            customer_id = %record.customer_id,
            metric = %record.metric,
            quantity = %record.quantity,
            "Usage record persisted"
        );

        self.forward(&record).await;
        Ok(record)
    }

    async fn check_feature_flag(&self, options: &RecordOptions) -> Result<()> {
        let (Some(flag), Some(flags)) = (&options.feature_flag, &self.flags) else {
            return Ok(());
        };
        if flags.is_enabled(flag, &options.flag_context).await {
            return Ok(());
        }
        tracing::debug!(flag = %flag, "Usage rejected: feature flag disabled");
        Err(Rejection::FeatureFlagDisabled { flag: flag.clone() }.into())
    }

    /// Returns the entitlement's limit, if it carries one.
    async fn check_entitlement(
        &self,
        record: &UsageRecord,
        options: &RecordOptions,
    ) -> Result<Option<i64>> {
        let (Some(key), Some(entitlements)) = (&options.entitlement, &self.entitlements) else {
            return Ok(None);
        };
        let entitlement = entitlements.has_entitlement(&record.customer_id, key).await;
        if !entitlement.granted {
            tracing::debug!(
                customer_id = %record.customer_id,
                entitlement = %key,
                "Usage rejected: entitlement missing"
            );
            return Err(Rejection::EntitlementMissing { key: key.clone() }.into());
        }
        Ok(entitlement.limit)
    }

    async fn check_limits(&self, record: &UsageRecord, limits: &UsageLimitPolicy) -> Result<()> {
        if let Some(max) = limits.max_per_period {
            let since = limits
                .period_start
                .unwrap_or_else(|| UsageWindow::Month.start_at(Utc::now()));
            let current = self.total_since(record, Some(since)).await?;
            ensure_within(LimitReason::MaxPerPeriod, current, record.quantity, max)?;
        }

        if let Some(max) = limits.max_total {
            let current = self.total_since(record, None).await?;
            ensure_within(LimitReason::MaxTotal, current, record.quantity, max)?;
        }

        Ok(())
    }

    async fn total_since(&self, record: &UsageRecord, since: Option<DateTime<Utc>>) -> Result<i64> {
        let records = self
            .store
            .list_usage_records(&record.customer_id, &record.metric, since)
            .await?;
        Ok(records
            .iter()
            .fold(0_i64, |acc, r| acc.saturating_add(r.quantity)))
    }

    async fn forward(&self, record: &UsageRecord) {
        let Some(provider) = &self.provider else {
            return;
        };
        let Some(reporter) = provider.usage_reporter() else {
            tracing::debug!(provider = %provider.name(), "Provider does not accept usage");
            return;
        };

        match reporter.record_usage(record).await {
            Ok(()) => {
                tracing::debug!(
                    provider = %provider.name(),
                    record_id = %record.id,
                    "Usage forwarded to provider"
                );
            }
            Err(e) => {
                tracing::warn!(
                    provider = %provider.name(),
                    record_id = %record.id,
                    error = %e,
                    "Failed to forward usage to provider"
                );
            }
        }
    }
}

fn ensure_within(reason: LimitReason, current: i64, attempted: i64, limit: i64) -> Result<()> {
    if current.saturating_add(attempted) <= limit {
        return Ok(());
    }
    tracing::debug!(
        reason = %reason,
        current = %current,
        attempted = %attempted,
        limit = %limit,
        "Usage rejected: limit exceeded"
    );
    Err(Rejection::LimitExceeded {
        reason,
        current,
        attempted,
        limit,
    }
    .into())
}
