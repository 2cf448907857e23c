//! Usage metering for z-charge.
//!
//! - [`UsageMeter`]: idempotent event ingestion, range queries,
//!   aggregation and per-window usage limits
//! - [`BillingUsageManager`]: gated recording of billable usage records
//!   with best-effort forwarding to a payment provider
//!
//! Both services hold their state as instance fields. Construct them once
//! per process (or per tenant) and share them behind an `Arc`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use z_charge_metering::{MeteringConfig, UsageMeter};
//! use z_charge_store::MemoryStore;
//!
//! # async fn example() -> z_charge_metering::Result<()> {
//! let meter = UsageMeter::new(Arc::new(MemoryStore::new()), MeteringConfig::from_env());
//!
//! let first = meter.record_usage("cus_1", "api_calls", 5, Some("req_1")).await?;
//! let retry = meter.record_usage("cus_1", "api_calls", 5, Some("req_1")).await?;
//! assert!(retry.duplicate);
//! assert_eq!(retry.id, first.id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collaborators;
mod config;
mod error;
mod manager;
mod meter;

pub use collaborators::{
    Entitlement, EntitlementChecker, FeatureFlags, PaymentProvider, ProviderError, UsageReporter,
};
pub use config::MeteringConfig;
pub use error::{LimitReason, MeteringError, Rejection, Result};
pub use manager::{BillingUsageManager, RecordOptions, UsageLimitPolicy};
pub use meter::{LimitStatus, RecordOutcome, UsageMeter};
