//! Hybrid pricing across currencies.

use std::sync::Arc;

use z_charge_core::pricing::{base_item, usage_item};
use z_charge_core::{Charge, Currency, InvoiceItem, Plan, PriceKind, UsageRecord};

use crate::converter::CurrencyConverter;
use crate::error::Result;

/// Hybrid evaluator that converts each component into one target currency.
///
/// Unlike [`HybridPricing`](z_charge_core::HybridPricing), the base and
/// usage prices may be in different currencies. Each component is computed
/// in its own currency (tiers included) and converted only when it differs
/// from the target.
#[derive(Clone)]
pub struct HybridWithConversion {
    converter: Arc<CurrencyConverter>,
}

impl HybridWithConversion {
    /// Create an evaluator backed by `converter`.
    #[must_use]
    pub fn new(converter: Arc<CurrencyConverter>) -> Self {
        Self { converter }
    }

    /// Compute the charge for `plan` in `target` currency.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrice` if the plan lacks a flat or usage price,
    /// `AmbiguousPrice` if it declares more than one of either, or a
    /// conversion error if a rate is unavailable.
    pub async fn compute_charge(
        &self,
        plan: &Plan,
        usage: &[UsageRecord],
        target: &Currency,
    ) -> Result<Charge> {
        let base = plan.require(PriceKind::Flat)?;
        let metered = plan.require(PriceKind::Usage)?;

        let mut items = Vec::with_capacity(2);
        for item in [base_item(base), usage_item(metered, usage)?] {
            items.push(self.convert_item(item, target).await?);
        }

        tracing::debug!(
            plan_id = %plan.id,
            target = %target,
            base_currency = %base.currency,
            usage_currency = %metered.currency,
            "Computed hybrid charge with conversion"
        );

        Ok(Charge::from_items(target.clone(), items)?)
    }

    async fn convert_item(&self, item: InvoiceItem, target: &Currency) -> Result<InvoiceItem> {
        if &item.currency == target {
            return Ok(item);
        }
        let amount = self
            .converter
            .convert(item.amount, &item.currency, target)
            .await?;
        Ok(InvoiceItem {
            description: format!("{} (converted from {})", item.description, item.currency),
            amount,
            currency: target.clone(),
            quantity: item.quantity,
        })
    }
}
