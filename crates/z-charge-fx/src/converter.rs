//! The currency conversion service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use z_charge_core::{Currency, MinorUnits, Money};

use crate::error::{FxError, Result};

/// Source of exchange rates.
///
/// A rate is the number of target major units one source major unit buys.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Look up the rate for `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns `NoRateAvailable` if the provider does not know the pair,
    /// or a transport error if it could not be reached.
    async fn get_rate(&self, from: &Currency, to: &Currency) -> Result<Decimal>;
}

/// Converts minor-unit amounts between currencies.
///
/// Rates set with [`set_rate`](Self::set_rate) or obtained from the
/// provider are cached for the lifetime of the converter. Construct one per
/// process (or per tenant) and share it behind an `Arc`.
pub struct CurrencyConverter {
    rates: RwLock<HashMap<(Currency, Currency), Decimal>>,
    provider: Option<Arc<dyn RateProvider>>,
}

impl Default for CurrencyConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrencyConverter {
    /// Create a converter that only knows rates set explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
            provider: None,
        }
    }

    /// Create a converter that asks `provider` for uncached rates.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn RateProvider>) -> Self {
        Self {
            rates: RwLock::new(HashMap::new()),
            provider: Some(provider),
        }
    }

    /// Check if a rate provider is configured.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Store a direct rate for `from -> to`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRate` if the rate is not positive.
    pub fn set_rate(&self, from: Currency, to: Currency, rate: Decimal) -> Result<()> {
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate(format!("{from} -> {to}: {rate}")));
        }
        tracing::debug!(from = %from, to = %to, rate = %rate, "Set exchange rate");
        self.write_rates()?.insert((from, to), rate);
        Ok(())
    }

    /// Drop every cached rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn clear_rates(&self) -> Result<()> {
        self.write_rates()?.clear();
        Ok(())
    }

    /// Get the rate for `from -> to`, asking the provider on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns `NoRateAvailable` if the rate is not cached and there is no
    /// provider, or the provider's error if it fails.
    pub async fn get_rate(&self, from: &Currency, to: &Currency) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        let cached = self.read_rates()?.get(&(from.clone(), to.clone())).copied();
        if let Some(rate) = cached {
            return Ok(rate);
        }

        let Some(provider) = &self.provider else {
            return Err(FxError::NoRateAvailable {
                from: from.clone(),
                to: to.clone(),
            });
        };

        let rate = provider.get_rate(from, to).await?;
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate(format!("{from} -> {to}: {rate}")));
        }

        tracing::debug!(from = %from, to = %to, rate = %rate, "Cached provider rate");
        self.write_rates()?.insert((from.clone(), to.clone()), rate);
        Ok(rate)
    }

    /// Convert an amount of `from` minor units into `to` minor units.
    ///
    /// The amount is scaled by each currency's decimals and the rate, and
    /// rounded once to the nearest minor unit (halves away from zero).
    ///
    /// # Errors
    ///
    /// Returns a rate lookup error, or `Overflow` if the result does not
    /// fit.
    pub async fn convert(
        &self,
        amount: MinorUnits,
        from: &Currency,
        to: &Currency,
    ) -> Result<MinorUnits> {
        if from == to {
            return Ok(amount);
        }
        let rate = self.get_rate(from, to).await?;
        convert_with_rate(amount, from, to, rate)
    }

    /// Convert a [`Money`] value into another currency.
    ///
    /// # Errors
    ///
    /// See [`convert`](Self::convert).
    pub async fn convert_money(&self, money: &Money, to: &Currency) -> Result<Money> {
        let amount = self.convert(money.amount, &money.currency, to).await?;
        Ok(Money::new(amount, to.clone()))
    }

    fn read_rates(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<(Currency, Currency), Decimal>>> {
        self.rates
            .read()
            .map_err(|_| FxError::Configuration("rate cache lock poisoned".into()))
    }

    fn write_rates(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<(Currency, Currency), Decimal>>> {
        self.rates
            .write()
            .map_err(|_| FxError::Configuration("rate cache lock poisoned".into()))
    }
}

/// Convert with a known rate.
///
/// # Errors
///
/// Returns `Overflow` if an intermediate or the result does not fit.
pub fn convert_with_rate(
    amount: MinorUnits,
    from: &Currency,
    to: &Currency,
    rate: Decimal,
) -> Result<MinorUnits> {
    let overflow = || FxError::Overflow(format!("{amount} {from} -> {to}"));

    let minor = Decimal::from_i128(amount).ok_or_else(overflow)?;
    let scale = to.scale().checked_div(from.scale()).ok_or_else(overflow)?;

    minor
        .checked_mul(rate)
        .and_then(|major| major.checked_mul(scale))
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i128())
        .ok_or_else(overflow)
}
