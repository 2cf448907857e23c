//! Pricing strategy evaluators.
//!
//! Each [`Strategy`] maps to a [`PricingStrategy`] that turns a plan plus
//! a billing period's usage (or seat count) into a [`Charge`]. Evaluators
//! are pure: they fail fast on a misconfigured plan and never substitute a
//! price the plan does not declare.

use serde::{Deserialize, Serialize};

use crate::currency::{Currency, MinorUnits, Money};
use crate::error::{BillingError, Result};
use crate::plan::{Plan, Price, PriceKind, Strategy};
use crate::tiered;
use crate::usage::UsageRecord;

/// A single line of a computed charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// Human-readable description.
    pub description: String,

    /// Amount in minor units. Negative for credits.
    pub amount: MinorUnits,

    /// Currency of `amount`.
    pub currency: Currency,

    /// Billed quantity, where one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
}

impl InvoiceItem {
    /// Create a line item without a quantity.
    #[must_use]
    pub fn new(description: impl Into<String>, amount: MinorUnits, currency: Currency) -> Self {
        Self {
            description: description.into(),
            amount,
            currency,
            quantity: None,
        }
    }

    /// Set the billed quantity.
    #[must_use]
    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }
}

/// The result of evaluating a plan: line items and their total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Sum of all line items.
    pub total: Money,

    /// Line items in presentation order.
    pub items: Vec<InvoiceItem>,
}

impl Charge {
    /// Build a charge, totalling the items in `currency`.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if an item is in another currency.
    pub fn from_items(currency: Currency, items: Vec<InvoiceItem>) -> Result<Self> {
        let mut total = Money::zero(currency);
        for item in &items {
            total = total.checked_add(&Money::new(item.amount, item.currency.clone()))?;
        }
        Ok(Self { total, items })
    }
}

/// Computes a charge for a plan.
pub trait PricingStrategy: Send + Sync {
    /// Evaluate `plan` against a period's usage and an optional seat count.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the plan lacks a required price,
    /// declares several where one is required, or its components disagree
    /// on currency. Returns `Overflow` if an amount does not fit.
    fn compute_charge(
        &self,
        plan: &Plan,
        usage: &[UsageRecord],
        seats: Option<i64>,
    ) -> Result<Charge>;
}

impl Strategy {
    /// The evaluator for this strategy.
    ///
    /// `Tiered` plans are evaluated by the usage evaluator, which applies
    /// the usage price's tiers.
    #[must_use]
    pub fn evaluator(self) -> &'static dyn PricingStrategy {
        match self {
            Self::Flat => &FlatPricing,
            Self::Usage | Self::Tiered => &UsagePricing,
            Self::Hybrid => &HybridPricing,
            Self::Seat => &SeatPricing,
            Self::Prepaid => &PrepaidPricing,
        }
    }
}

/// Evaluate a plan with the evaluator selected by `plan.strategy`.
///
/// # Errors
///
/// See [`PricingStrategy::compute_charge`].
pub fn compute_charge(plan: &Plan, usage: &[UsageRecord], seats: Option<i64>) -> Result<Charge> {
    plan.strategy.evaluator().compute_charge(plan, usage, seats)
}

/// Total billable quantity for a usage price.
///
/// Only records for the price's metric count (all records when the price
/// has no metric). Each negative record clamps to zero before summing.
#[must_use]
pub fn usage_quantity(price: &Price, usage: &[UsageRecord]) -> u64 {
    usage
        .iter()
        .filter(|r| price.metric.as_deref().map_or(true, |m| m == r.metric))
        .fold(0_u64, |acc, r| acc.saturating_add(r.billable_quantity()))
}

/// Amount for `quantity` units of a usage price, through tiers when present.
///
/// # Errors
///
/// Returns `Overflow` if the amount does not fit in minor units.
pub fn usage_amount(price: &Price, quantity: u64) -> Result<MinorUnits> {
    match price.active_tiers() {
        Some(tiers) => tiered::allocate(quantity, tiers),
        None => tiered::extend(quantity, price.unit_amount),
    }
}

/// Line item for a plan's usage component.
///
/// # Errors
///
/// Returns `Overflow` if the amount does not fit in minor units.
pub fn usage_item(price: &Price, usage: &[UsageRecord]) -> Result<InvoiceItem> {
    let quantity = usage_quantity(price, usage);
    let metric = price.metric.as_deref().unwrap_or("usage");
    Ok(InvoiceItem::new(
        format!("Usage: {metric}"),
        usage_amount(price, quantity)?,
        price.currency.clone(),
    )
    .with_quantity(quantity))
}

/// Line item for a plan's base fee.
#[must_use]
pub fn base_item(price: &Price) -> InvoiceItem {
    InvoiceItem::new(
        format!("Base fee ({})", price.id),
        price.unit_amount,
        price.currency.clone(),
    )
}

/// Seat count billed for a plan: `max(1, seats)`.
#[must_use]
pub fn billable_seats(plan: &Plan, seats: Option<i64>) -> u64 {
    let seats = seats.or(plan.seats_included).unwrap_or(1);
    u64::try_from(seats.max(1)).unwrap_or(1)
}

/// One recurring flat fee.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatPricing;

impl PricingStrategy for FlatPricing {
    fn compute_charge(
        &self,
        plan: &Plan,
        _usage: &[UsageRecord],
        _seats: Option<i64>,
    ) -> Result<Charge> {
        let price = plan.require(PriceKind::Flat)?;
        Charge::from_items(price.currency.clone(), vec![base_item(price)])
    }
}

/// Metered usage, optionally tiered.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsagePricing;

impl PricingStrategy for UsagePricing {
    fn compute_charge(
        &self,
        plan: &Plan,
        usage: &[UsageRecord],
        _seats: Option<i64>,
    ) -> Result<Charge> {
        let price = plan.require(PriceKind::Usage)?;
        Charge::from_items(price.currency.clone(), vec![usage_item(price, usage)?])
    }
}

/// Flat base fee plus metered usage, both in the same currency.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridPricing;

impl PricingStrategy for HybridPricing {
    fn compute_charge(
        &self,
        plan: &Plan,
        usage: &[UsageRecord],
        _seats: Option<i64>,
    ) -> Result<Charge> {
        let base = plan.require(PriceKind::Flat)?;
        let metered = plan.require(PriceKind::Usage)?;

        if base.currency != metered.currency {
            return Err(BillingError::CurrencyMismatch {
                left: base.currency.clone(),
                right: metered.currency.clone(),
            });
        }

        Charge::from_items(
            base.currency.clone(),
            vec![base_item(base), usage_item(metered, usage)?],
        )
    }
}

/// Flat fee multiplied by the seat count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeatPricing;

impl PricingStrategy for SeatPricing {
    fn compute_charge(
        &self,
        plan: &Plan,
        _usage: &[UsageRecord],
        seats: Option<i64>,
    ) -> Result<Charge> {
        let price = plan.require(PriceKind::Flat)?;
        let seats = billable_seats(plan, seats);
        let item = InvoiceItem::new(
            format!("Seats ({})", price.id),
            tiered::extend(seats, price.unit_amount)?,
            price.currency.clone(),
        )
        .with_quantity(seats);
        Charge::from_items(price.currency.clone(), vec![item])
    }
}

/// One-time prepaid top-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepaidPricing;

impl PricingStrategy for PrepaidPricing {
    fn compute_charge(
        &self,
        plan: &Plan,
        _usage: &[UsageRecord],
        _seats: Option<i64>,
    ) -> Result<Charge> {
        let price = plan.require(PriceKind::Flat)?;
        let item = InvoiceItem::new(
            format!("Prepaid top-up ({})", price.id),
            price.unit_amount,
            price.currency.clone(),
        );
        Charge::from_items(price.currency.clone(), vec![item])
    }
}
