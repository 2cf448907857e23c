//! Currencies and minor-unit money amounts.
//!
//! All amounts are stored as integer minor units (cents, satoshi, wei).
//! `i128` is used because an amount of a few ETH in wei already exceeds
//! `i64::MAX`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BillingError, Result};
use crate::ids::IdError;

/// An amount in minor units of some currency.
pub type MinorUnits = i128;

/// A currency code, normalized to upper case (`USD`, `BTC`, `USDT`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse and normalize a currency code.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidCurrency` unless the code is 2-10 ASCII
    /// alphanumeric characters.
    pub fn new(code: impl AsRef<str>) -> std::result::Result<Self, IdError> {
        let code = code.as_ref().trim();
        if !(2..=10).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// US dollar.
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// Euro.
    #[must_use]
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    /// Bitcoin (satoshi minor units).
    #[must_use]
    pub fn btc() -> Self {
        Self("BTC".to_string())
    }

    /// Ether (wei minor units).
    #[must_use]
    pub fn eth() -> Self {
        Self("ETH".to_string())
    }

    /// The currency code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal places between a major and a minor unit.
    #[must_use]
    pub fn decimals(&self) -> u32 {
        match self.0.as_str() {
            "BTC" => 8,
            "ETH" => 18,
            _ => 2,
        }
    }

    /// Minor units per major unit (100 for fiat, 1e8 for BTC, 1e18 for ETH).
    #[must_use]
    pub fn scale(&self) -> Decimal {
        Decimal::from(10_u64.pow(self.decimals()))
    }
}

impl FromStr for Currency {
    type Err = IdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = IdError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.0)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An integer amount of minor units in a given currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units.
    pub amount: MinorUnits,
    /// Currency of the amount.
    pub currency: Currency,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub fn new(amount: MinorUnits, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Add two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if the currencies differ, or `Overflow`
    /// if the sum does not fit.
    pub fn checked_add(&self, other: &Self) -> Result<Self> {
        if self.currency != other.currency {
            return Err(BillingError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| BillingError::Overflow(format!("{} + {}", self.amount, other.amount)))?;
        Ok(Self::new(amount, self.currency.clone()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
