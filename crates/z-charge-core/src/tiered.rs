//! Tiered quantity allocation.

use crate::currency::MinorUnits;
use crate::error::{BillingError, Result};
use crate::plan::Tier;

/// Charge `quantity` units across ordered tiers.
///
/// Each tier absorbs up to `up_to` units at its own rate, in order. Units
/// left over once every tier is full are charged at the last tier's rate.
/// With no tiers the amount is zero.
///
/// # Errors
///
/// Returns `Overflow` if the amount does not fit in minor units.
pub fn allocate(quantity: u64, tiers: &[Tier]) -> Result<MinorUnits> {
    let Some(last) = tiers.last() else {
        return Ok(0);
    };

    let mut remaining = quantity;
    let mut amount: MinorUnits = 0;

    for tier in tiers {
        if remaining == 0 {
            break;
        }
        let used = remaining.min(tier.up_to);
        amount = add_units(amount, used, tier.unit_amount)?;
        remaining -= used;
    }

    if remaining > 0 {
        amount = add_units(amount, remaining, last.unit_amount)?;
    }

    Ok(amount)
}

/// `quantity * unit_amount`, checked.
///
/// # Errors
///
/// Returns `Overflow` if the product does not fit in minor units.
pub fn extend(quantity: u64, unit_amount: MinorUnits) -> Result<MinorUnits> {
    MinorUnits::from(quantity)
        .checked_mul(unit_amount)
        .ok_or_else(|| BillingError::Overflow(format!("{quantity} x {unit_amount}")))
}

fn add_units(amount: MinorUnits, quantity: u64, unit_amount: MinorUnits) -> Result<MinorUnits> {
    amount
        .checked_add(extend(quantity, unit_amount)?)
        .ok_or_else(|| BillingError::Overflow(format!("{amount} + {quantity} x {unit_amount}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> Vec<Tier> {
        vec![Tier::new(100, 100), Tier::new(900, 75)]
    }

    #[test]
    fn overflow_is_charged_at_last_tier_rate() {
        // 100 * 100 + 900 * 75 + 200 * 75
        assert_eq!(allocate(1200, &tiers()).unwrap(), 92_500);
    }

    #[test]
    fn quantity_inside_first_tier() {
        assert_eq!(allocate(40, &tiers()).unwrap(), 4_000);
    }

    #[test]
    fn tiers_are_capacities_not_thresholds() {
        // The second tier holds the next 900 units, so 1000 fills both exactly.
        assert_eq!(allocate(1000, &tiers()).unwrap(), 10_000 + 67_500);
    }

    #[test]
    fn zero_quantity_and_no_tiers() {
        assert_eq!(allocate(0, &tiers()).unwrap(), 0);
        assert_eq!(allocate(500, &[]).unwrap(), 0);
    }

    #[test]
    fn zero_capacity_tier_is_skipped() {
        let tiers = [Tier::new(0, 999), Tier::new(10, 5)];
        assert_eq!(allocate(12, &tiers).unwrap(), 10 * 5 + 2 * 5);
    }

    #[test]
    fn oversized_amount_is_an_overflow_error() {
        let wei = 100_000_000_000_000_000_000;
        let tiers = [Tier::new(10, 1), Tier::new(10, MinorUnits::MAX / 4)];
        assert!(matches!(
            allocate(u64::MAX, &tiers),
            Err(BillingError::Overflow(_))
        ));
        assert!(matches!(extend(u64::MAX, wei), Err(BillingError::Overflow(_))));
    }
}
