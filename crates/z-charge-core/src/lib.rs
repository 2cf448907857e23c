//! Core types and charge computations for z-charge.
//!
//! This crate provides the pure, synchronous half of the billing engine:
//!
//! - **Money**: `Currency`, `Money`, `MinorUnits`
//! - **Plans**: `Plan`, `Price`, `Tier`, `Strategy`
//! - **Usage**: `UsageRecord`, `UsageEvent`, `UsagePolicy`, `UsageWindow`
//! - **Pricing**: tiered allocation and the per-strategy evaluators
//! - **Proration**: credits and debits for mid-cycle changes
//!
//! # Minor units
//!
//! Every amount is an integer number of minor units: cents for fiat,
//! satoshi for BTC, wei for ETH. Fractional minor units never appear in
//! output; rounding happens once, at the point an amount is produced.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod currency;
pub mod error;
pub mod ids;
pub mod plan;
pub mod pricing;
pub mod proration;
pub mod tiered;
pub mod usage;

pub use currency::{Currency, MinorUnits, Money};
pub use error::{BillingError, Result};
pub use ids::{EventId, IdError};
pub use plan::{BillingInterval, Plan, Price, PriceKind, Strategy, Tier};
pub use pricing::{
    compute_charge, Charge, FlatPricing, HybridPricing, InvoiceItem, PrepaidPricing,
    PricingStrategy, SeatPricing, UsagePricing,
};
pub use proration::{ProrationInput, ProrationResult};
pub use tiered::allocate;
pub use usage::{Aggregation, UsageEvent, UsagePolicy, UsageRecord, UsageWindow};
