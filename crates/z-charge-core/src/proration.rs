//! Proration for mid-cycle plan changes.
//!
//! The unused share of the period is credited at the old amount and
//! charged at the new amount:
//!
//! ```text
//! fraction = clamp01((period_end - change_date) / (period_end - period_start))
//! credit   = round(old_amount * fraction)
//! debit    = round(new_amount * fraction)
//! net      = debit - credit
//! ```
//!
//! Rounding is to the nearest minor unit, halves away from zero. It is done
//! in integer arithmetic so wei-scale amounts keep full precision.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, MinorUnits};
use crate::error::{BillingError, Result};
use crate::plan::{Plan, PriceKind};
use crate::pricing::{billable_seats, Charge, InvoiceItem};
use crate::tiered;

/// Inputs to a proration calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationInput {
    /// Full-period amount of the old plan, in minor units.
    pub old_amount: MinorUnits,
    /// Full-period amount of the new plan, in minor units.
    pub new_amount: MinorUnits,
    /// Currency of both amounts.
    pub currency: Currency,
    /// Start of the current billing period.
    pub period_start: DateTime<Utc>,
    /// End of the current billing period.
    pub period_end: DateTime<Utc>,
    /// When the change takes effect.
    pub change_date: DateTime<Utc>,
}

/// Result of a proration calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationResult {
    /// Credit for the unused share of the old amount.
    pub credit: MinorUnits,
    /// Charge for the remaining share of the new amount.
    pub debit: MinorUnits,
    /// `debit - credit` (negative means the customer is owed money).
    pub net: MinorUnits,
    /// Remaining share of the period, in `[0, 1]`.
    pub fraction: Decimal,
}

impl ProrationResult {
    const ZERO: Self = Self {
        credit: 0,
        debit: 0,
        net: 0,
        fraction: Decimal::ZERO,
    };

    /// Check if the customer is owed money.
    #[must_use]
    pub fn is_refund(&self) -> bool {
        self.net < 0
    }
}

/// Compute the credit, debit and net for a change.
///
/// A period whose length is zero or negative yields all zeros.
///
/// # Errors
///
/// Returns `Overflow` if an amount is too large to prorate.
pub fn calculate(input: &ProrationInput) -> Result<ProrationResult> {
    let period = (input.period_end - input.period_start).num_milliseconds();
    if period <= 0 {
        return Ok(ProrationResult::ZERO);
    }
    let remaining = (input.period_end - input.change_date)
        .num_milliseconds()
        .clamp(0, period);

    let credit = prorate(input.old_amount, remaining, period)?;
    let debit = prorate(input.new_amount, remaining, period)?;

    let net = debit
        .checked_sub(credit)
        .ok_or_else(|| BillingError::Overflow(format!("{debit} - {credit}")))?;

    Ok(ProrationResult {
        credit,
        debit,
        net,
        fraction: Decimal::from(remaining) / Decimal::from(period),
    })
}

/// Proration as invoice lines: a negative credit line and a positive
/// debit line whose total is the net.
///
/// # Errors
///
/// Returns `Overflow` if an amount is too large to prorate.
pub fn generate_invoice(input: &ProrationInput) -> Result<Charge> {
    let result = calculate(input)?;
    let items = vec![
        InvoiceItem::new("Proration credit", -result.credit, input.currency.clone()),
        InvoiceItem::new("Proration debit", result.debit, input.currency.clone()),
    ];
    Charge::from_items(input.currency.clone(), items)
}

/// Prorate between the base prices of two plans.
///
/// Each plan's base (flat) price is multiplied by `max(1, seats)`.
///
/// # Errors
///
/// Returns `MissingPrice` if either plan has no flat price, and
/// `CurrencyMismatch` if the two base prices differ in currency.
pub fn generate_invoice_from_plans(
    old_plan: &Plan,
    new_plan: &Plan,
    seats: Option<i64>,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    change_date: DateTime<Utc>,
) -> Result<Charge> {
    let old_price = old_plan.require(PriceKind::Flat)?;
    let new_price = new_plan.require(PriceKind::Flat)?;

    if old_price.currency != new_price.currency {
        return Err(BillingError::CurrencyMismatch {
            left: old_price.currency.clone(),
            right: new_price.currency.clone(),
        });
    }

    let old_amount = tiered::extend(billable_seats(old_plan, seats), old_price.unit_amount)?;
    let new_amount = tiered::extend(billable_seats(new_plan, seats), new_price.unit_amount)?;

    generate_invoice(&ProrationInput {
        old_amount,
        new_amount,
        currency: old_price.currency.clone(),
        period_start,
        period_end,
        change_date,
    })
}

fn prorate(amount: MinorUnits, remaining: i64, period: i64) -> Result<MinorUnits> {
    let numerator = amount
        .checked_mul(MinorUnits::from(remaining))
        .ok_or_else(|| BillingError::Overflow(format!("prorating {amount}")))?;
    Ok(div_round(numerator, MinorUnits::from(period)))
}

/// Integer division rounding to nearest, halves away from zero. `d > 0`.
fn div_round(n: MinorUnits, d: MinorUnits) -> MinorUnits {
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d {
        q + n.signum()
    } else {
        q
    }
}
