//! Error types for usage metering.
//!
//! Policy rejections are expected outcomes that callers branch on, so they
//! live in their own [`Rejection`] type instead of sharing a flat enum with
//! storage failures.

use z_charge_store::StoreError;

/// Result type for metering operations.
pub type Result<T> = std::result::Result<T, MeteringError>;

/// Errors that can occur while metering usage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeteringError {
    /// Usage was refused by a gate. Nothing was persisted.
    #[error("usage rejected: {0}")]
    Rejected(Rejection),

    /// The store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl MeteringError {
    /// Check if this is a policy rejection rather than a system failure.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The rejection, if this is one.
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            Self::Storage(_) => None,
        }
    }
}

impl From<Rejection> for MeteringError {
    fn from(r: Rejection) -> Self {
        Self::Rejected(r)
    }
}

/// Which ceiling a usage submission would have crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    /// The per-period ceiling.
    MaxPerPeriod,
    /// The all-time ceiling.
    MaxTotal,
}

impl LimitReason {
    /// Reason tag reported to callers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaxPerPeriod => "maxPerPeriod_exceeded",
            Self::MaxTotal => "maxTotal_exceeded",
        }
    }
}

impl std::fmt::Display for LimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a usage submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The gating feature flag is off.
    #[error("feature flag {flag} is disabled")]
    FeatureFlagDisabled {
        /// The flag that was checked.
        flag: String,
    },

    /// The customer lacks the required entitlement.
    #[error("entitlement {key} is missing")]
    EntitlementMissing {
        /// The entitlement that was checked.
        key: String,
    },

    /// Accepting the usage would cross a ceiling.
    #[error("{reason}: {current} + {attempted} > {limit}")]
    LimitExceeded {
        /// The ceiling that would be crossed.
        reason: LimitReason,
        /// Usage already counted against the ceiling.
        current: i64,
        /// Quantity being submitted.
        attempted: i64,
        /// The ceiling.
        limit: i64,
    },
}

impl Rejection {
    /// Reason tag: `feature_flag_disabled`, `entitlement_missing`,
    /// `maxPerPeriod_exceeded` or `maxTotal_exceeded`.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FeatureFlagDisabled { .. } => "feature_flag_disabled",
            Self::EntitlementMissing { .. } => "entitlement_missing",
            Self::LimitExceeded { reason, .. } => reason.as_str(),
        }
    }
}
