//! Error types for z-charge.

use crate::currency::Currency;
use crate::plan::PriceKind;

/// Result type for z-charge computations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur while computing charges.
///
/// Every variant is a configuration or input failure. Computations that
/// return one of these produce no partial output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    /// The plan lacks a price component the strategy requires.
    #[error("plan {plan_id} has no {kind} price")]
    MissingPrice {
        /// The plan that was evaluated.
        plan_id: String,
        /// The kind of price that was required.
        kind: PriceKind,
    },

    /// Two amounts that must share a currency do not.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// The first currency.
        left: Currency,
        /// The second currency.
        right: Currency,
    },

    /// The plan declares several prices of a kind it must have exactly one of.
    #[error("plan {plan_id} has {count} {kind} prices, expected one")]
    AmbiguousPrice {
        /// The plan that was evaluated.
        plan_id: String,
        /// The kind of price that was required.
        kind: PriceKind,
        /// How many prices of that kind the plan declares.
        count: usize,
    },

    /// Arithmetic left the representable range of minor units.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}

impl BillingError {
    /// Check if this error comes from how a plan is configured.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingPrice { .. } | Self::AmbiguousPrice { .. } | Self::CurrencyMismatch { .. }
        )
    }
}
