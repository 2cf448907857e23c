//! Error types for currency conversion.

use z_charge_core::{BillingError, Currency};

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, FxError>;

/// Errors that can occur while converting between currencies.
///
/// A missing or unreachable rate is always an error; the converter never
/// falls back to a 1:1 rate.
#[derive(Debug, thiserror::Error)]
pub enum FxError {
    /// Neither the cache nor a provider could supply the rate.
    #[error("no rate available for {from} -> {to}")]
    NoRateAvailable {
        /// Source currency.
        from: Currency,
        /// Target currency.
        to: Currency,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The rate provider returned an error response.
    #[error("rate provider error: {status} - {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// A rate was zero, negative, or unparseable.
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    /// The converted amount does not fit in minor units.
    #[error("conversion overflow: {0}")]
    Overflow(String),

    /// Plan evaluation failed before conversion.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FxError {
    /// Check if a retry might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Provider { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
