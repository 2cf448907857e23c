//! Plan and price definitions.
//!
//! A [`Plan`] bundles one or more [`Price`] components with the
//! [`Strategy`] used to turn them into a charge.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::currency::{Currency, MinorUnits};
use crate::error::{BillingError, Result};

/// Whether a price is a fixed recurring amount or metered per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceKind {
    /// Fixed amount per billing interval (or one-time).
    Flat,
    /// Amount per unit of a metered quantity.
    Usage,
}

impl PriceKind {
    /// Get the kind name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Usage => "usage",
        }
    }
}

impl fmt::Display for PriceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a recurring price is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    /// Daily.
    Day,
    /// Weekly.
    Week,
    /// Monthly.
    Month,
    /// Yearly.
    Year,
}

/// One band of a tiered price.
///
/// `up_to` is the capacity of this band, not a cumulative threshold: the
/// second tier covers the next `up_to` units after the first tier is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Number of units this tier can absorb.
    pub up_to: u64,
    /// Price per unit inside this tier, in minor units.
    pub unit_amount: MinorUnits,
}

impl Tier {
    /// Create a new tier.
    #[must_use]
    pub const fn new(up_to: u64, unit_amount: MinorUnits) -> Self {
        Self { up_to, unit_amount }
    }
}

/// A single price component of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Price identifier.
    pub id: String,

    /// Flat or usage.
    #[serde(rename = "type")]
    pub kind: PriceKind,

    /// Currency of `unit_amount` and tier amounts.
    pub currency: Currency,

    /// Amount in minor units (per interval for flat, per unit for usage).
    pub unit_amount: MinorUnits,

    /// Billing interval for recurring prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_interval: Option<BillingInterval>,

    /// Metric a usage price meters. `None` meters every record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    /// Ordered tiers. When present they replace `unit_amount` for usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<Vec<Tier>>,
}

impl Price {
    /// Create a flat price.
    #[must_use]
    pub fn flat(id: impl Into<String>, currency: Currency, unit_amount: MinorUnits) -> Self {
        Self {
            id: id.into(),
            kind: PriceKind::Flat,
            currency,
            unit_amount,
            billing_interval: Some(BillingInterval::Month),
            metric: None,
            tiers: None,
        }
    }

    /// Create a usage price for a metric.
    #[must_use]
    pub fn usage(
        id: impl Into<String>,
        currency: Currency,
        metric: impl Into<String>,
        unit_amount: MinorUnits,
    ) -> Self {
        Self {
            id: id.into(),
            kind: PriceKind::Usage,
            currency,
            unit_amount,
            billing_interval: Some(BillingInterval::Month),
            metric: Some(metric.into()),
            tiers: None,
        }
    }

    /// Set tiers on the price.
    #[must_use]
    pub fn with_tiers(mut self, tiers: Vec<Tier>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Set the billing interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Option<BillingInterval>) -> Self {
        self.billing_interval = interval;
        self
    }

    /// Tiers, if any are configured.
    #[must_use]
    pub fn active_tiers(&self) -> Option<&[Tier]> {
        self.tiers.as_deref().filter(|tiers| !tiers.is_empty())
    }
}

/// How a plan's prices are combined into a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One recurring flat fee.
    Flat,
    /// Metered usage only.
    Usage,
    /// Flat base fee plus metered usage.
    Hybrid,
    /// Metered usage billed through tiers.
    Tiered,
    /// Flat fee per seat.
    Seat,
    /// One-time prepaid top-up.
    Prepaid,
}

/// A pricing plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub id: String,

    /// Plan currency.
    pub currency: Currency,

    /// Price components.
    pub pricing: Vec<Price>,

    /// Strategy that evaluates this plan.
    pub strategy: Strategy,

    /// Seats billed when the caller does not pass a seat count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats_included: Option<i64>,

    /// Id of the flat price used as the base fee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_price_id: Option<String>,

    /// Free-form metadata (`usageLimits` is read by the metering layer).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Plan {
    /// Create a plan with no metadata.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        currency: Currency,
        strategy: Strategy,
        pricing: Vec<Price>,
    ) -> Self {
        Self {
            id: id.into(),
            currency,
            pricing,
            strategy,
            seats_included: None,
            base_price_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set metadata on the plan.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The first price of the given kind.
    #[must_use]
    pub fn price_of(&self, kind: PriceKind) -> Option<&Price> {
        self.pricing.iter().find(|p| p.kind == kind)
    }

    /// The flat price used as the base fee.
    ///
    /// When `base_price_id` is set only that price qualifies.
    #[must_use]
    pub fn base_price(&self) -> Option<&Price> {
        match &self.base_price_id {
            Some(id) => self
                .pricing
                .iter()
                .find(|p| p.kind == PriceKind::Flat && &p.id == id),
            None => self.price_of(PriceKind::Flat),
        }
    }

    /// Resolve a required price component.
    ///
    /// The plan must declare exactly one price of `kind`. A flat component
    /// named by `base_price_id` is unambiguous even alongside other flat
    /// prices.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrice` if the plan has no such component, or
    /// `AmbiguousPrice` if it has several and none is designated.
    pub fn require(&self, kind: PriceKind) -> Result<&Price> {
        let designated = kind == PriceKind::Flat && self.base_price_id.is_some();
        let price = if designated {
            self.base_price()
        } else {
            let count = self.pricing.iter().filter(|p| p.kind == kind).count();
            if count > 1 {
                return Err(BillingError::AmbiguousPrice {
                    plan_id: self.id.clone(),
                    kind,
                    count,
                });
            }
            self.price_of(kind)
        };
        price.ok_or_else(|| BillingError::MissingPrice {
            plan_id: self.id.clone(),
            kind,
        })
    }

    /// Usage limit declared in `metadata.usageLimits[metric]`.
    #[must_use]
    pub fn usage_limit(&self, metric: &str) -> Option<i64> {
        let limits = self
            .metadata
            .get("usageLimits")
            .or_else(|| self.metadata.get("usage_limits"))?;
        limits.get(metric)?.as_i64()
    }

    /// Every metric with a declared usage limit.
    #[must_use]
    pub fn usage_limits(&self) -> Vec<(String, i64)> {
        self.metadata
            .get("usageLimits")
            .or_else(|| self.metadata.get("usage_limits"))
            .and_then(serde_json::Value::as_object)
            .map(|limits| {
                limits
                    .iter()
                    .filter_map(|(metric, v)| v.as_i64().map(|limit| (metric.clone(), limit)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
