//! Currency conversion for z-charge.
//!
//! This crate converts minor-unit amounts between fiat and crypto
//! currencies without losing precision across their different scales
//! (cents, satoshi, wei).
//!
//! - [`CurrencyConverter`]: rate cache plus an optional [`RateProvider`]
//! - [`HttpRateProvider`]: reference provider with TTL cache, linear-backoff
//!   retries and inverse-rate derivation
//! - [`HybridWithConversion`]: hybrid pricing whose components may be in
//!   different currencies
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use z_charge_core::Currency;
//! use z_charge_fx::{CurrencyConverter, FxConfig, HttpRateProvider};
//!
//! # async fn example() -> Result<(), z_charge_fx::FxError> {
//! let provider = HttpRateProvider::new(FxConfig::from_env())?;
//! let converter = CurrencyConverter::with_provider(Arc::new(provider));
//!
//! converter.set_rate(Currency::btc(), Currency::usd(), Decimal::from(50_000))?;
//! let cents = converter.convert(25_000_000, &Currency::btc(), &Currency::usd()).await?;
//! assert_eq!(cents, 1_250_000);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod converter;
mod error;
mod http;
mod hybrid;

pub use config::FxConfig;
pub use converter::{convert_with_rate, CurrencyConverter, RateProvider};
pub use error::{FxError, Result};
pub use http::{backoff_for, HttpRateProvider};
pub use hybrid::HybridWithConversion;
