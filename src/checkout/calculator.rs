use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::checkout::types::{
    AppliedSet, CartLine, DiscountKind, OrderSummary, ShippingPolicy, StockAdjustment,
};

/// Service for calculating order subtotals, shipping and discount totals
pub struct PricingCalculator;

impl PricingCalculator {
    /// Calculate the total for a single cart line
    ///
    /// # Arguments
    /// * `quantity` - Number of units in the line
    /// * `unit_price` - Live price per unit
    ///
    /// # Returns
    /// Line total as Decimal (quantity * unit_price)
    pub fn calculate_line_total(quantity: u32, unit_price: Decimal) -> Decimal {
        Decimal::from(quantity) * unit_price
    }

    /// Calculate the cart subtotal (sum of line totals)
    pub fn calculate_subtotal(lines: &[CartLine]) -> Decimal {
        lines
            .iter()
            .map(|line| {
                debug_assert!(line.quantity >= 1, "cart line {} has zero quantity", line.product_id);
                Self::calculate_line_total(line.quantity, line.unit_price)
            })
            .sum()
    }

    /// Product-price contribution of one discount
    ///
    /// Percentages are always taken from the original subtotal, so applied
    /// codes are independent and their order does not matter.
    pub fn discount_contribution(kind: &DiscountKind, subtotal: Decimal) -> Decimal {
        match kind {
            DiscountKind::Percentage(value) => subtotal * *value / Decimal::ONE_HUNDRED,
            DiscountKind::FixedAmount(value) => *value,
            DiscountKind::FreeShipping => Decimal::ZERO,
        }
    }

    /// Compute the full order summary
    ///
    /// Pure: identical inputs always produce an identical summary. No rounding
    /// is applied here; that happens when the total is displayed or charged.
    /// Time windows were resolved when the codes were admitted, so `_now`
    /// does not change the result.
    pub fn compute_summary(
        lines: &[CartLine],
        shipping: &ShippingPolicy,
        applied: &AppliedSet,
        _now: DateTime<Utc>,
    ) -> OrderSummary {
        let subtotal = Self::calculate_subtotal(lines);
        let base_shipping = shipping.base_shipping(subtotal);

        let raw_discount: Decimal = applied
            .iter()
            .map(|discount| Self::discount_contribution(&discount.kind, subtotal))
            .sum();
        // Stacked codes never discount more than the goods are worth
        let product_discount_amount = raw_discount.min(subtotal).max(Decimal::ZERO);

        let shipping_discount_amount = if applied.has_free_shipping() {
            base_shipping
        } else {
            Decimal::ZERO
        };
        let final_shipping = (base_shipping - shipping_discount_amount).max(Decimal::ZERO);

        let total = (subtotal - product_discount_amount + final_shipping).max(Decimal::ZERO);

        OrderSummary {
            subtotal,
            product_discount_amount,
            base_shipping,
            shipping_discount_amount,
            final_shipping,
            total,
        }
    }

    /// Clamp a requested quantity to live stock
    ///
    /// # Returns
    /// The quantity to keep (zero means drop the line) and, if it changed,
    /// the adjustment to surface to the user
    pub fn clamp_to_stock(
        product_id: &str,
        requested: u32,
        stock: u32,
    ) -> (u32, Option<StockAdjustment>) {
        if requested <= stock {
            return (requested, None);
        }

        let adjustment = StockAdjustment {
            product_id: product_id.to_string(),
            requested,
            available: stock,
        };
        (stock, Some(adjustment))
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::checkout::types::{round_money, AppliedDiscount};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        "2026-10-19T12:00:00Z".parse().unwrap()
    }

    fn cents(value: u32) -> Decimal {
        Decimal::from(value) / Decimal::from(100)
    }

    fn policy() -> ShippingPolicy {
        ShippingPolicy {
            flat_rate: Decimal::new(499, 2),
            free_shipping_threshold: Some(Decimal::from(50)),
        }
    }

    fn lines_strategy() -> impl Strategy<Value = Vec<CartLine>> {
        prop::collection::vec((1u32..=20, 1u32..=20000u32), 0..=8).prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (quantity, price_cents))| CartLine {
                    product_id: format!("product-{}", i),
                    unit_price: cents(price_cents),
                    quantity,
                })
                .collect()
        })
    }

    fn kind_strategy() -> impl Strategy<Value = DiscountKind> {
        prop_oneof![
            (0u32..=100).prop_map(|p| DiscountKind::Percentage(Decimal::from(p))),
            (0u32..=50000u32).prop_map(|c| DiscountKind::FixedAmount(cents(c))),
            Just(DiscountKind::FreeShipping),
        ]
    }

    fn applied_set(kinds: &[DiscountKind]) -> AppliedSet {
        let mut set = AppliedSet::new();
        let mut seen_free_shipping = false;
        for (i, kind) in kinds.iter().enumerate() {
            if kind.is_free_shipping() {
                if seen_free_shipping {
                    continue;
                }
                seen_free_shipping = true;
            }
            set.insert(AppliedDiscount {
                code: format!("CODE{}", i),
                kind: *kind,
                is_stackable: true,
                minimum_order: Decimal::ZERO,
                savings: Decimal::ZERO,
            });
        }
        set
    }

    /// Total is never negative and always equals subtotal - discount + shipping
    #[test]
    fn prop_total_identity_and_non_negative() {
        proptest!(|(lines in lines_strategy(), kind in kind_strategy())| {
            let set = applied_set(&[kind]);
            let summary = PricingCalculator::compute_summary(&lines, &policy(), &set, now());

            prop_assert!(summary.total >= Decimal::ZERO, "Total must be non-negative, got: {}", summary.total);
            prop_assert_eq!(
                summary.total,
                summary.subtotal - summary.product_discount_amount + summary.final_shipping
            );
        });
    }

    /// The displayed figures satisfy the same identity as the raw ones
    #[test]
    fn prop_rounded_total_identity() {
        proptest!(|(lines in lines_strategy(), kinds in prop::collection::vec(kind_strategy(), 0..=4))| {
            let set = applied_set(&kinds);
            let raw = PricingCalculator::compute_summary(&lines, &policy(), &set, now());
            let rounded = raw.rounded();

            prop_assert_eq!(rounded.total, round_money(raw.total));
            prop_assert_eq!(
                rounded.total,
                rounded.subtotal - rounded.product_discount_amount + rounded.final_shipping
            );
            prop_assert!(rounded.product_discount_amount >= Decimal::ZERO);
        });
    }

    /// Applying stackable codes in either order yields the same summary
    #[test]
    fn prop_discount_order_is_commutative() {
        proptest!(|(lines in lines_strategy(), a in kind_strategy(), b in kind_strategy())| {
            let forward = applied_set(&[a, b]);
            let backward = applied_set(&[b, a]);

            let first = PricingCalculator::compute_summary(&lines, &policy(), &forward, now());
            let second = PricingCalculator::compute_summary(&lines, &policy(), &backward, now());

            prop_assert_eq!(first, second);
        });
    }

    /// Product discount never exceeds the subtotal however many codes stack
    #[test]
    fn prop_product_discount_is_capped() {
        proptest!(|(lines in lines_strategy(), kinds in prop::collection::vec(kind_strategy(), 0..=10))| {
            let set = applied_set(&kinds);
            let summary = PricingCalculator::compute_summary(&lines, &policy(), &set, now());

            prop_assert!(summary.product_discount_amount <= summary.subtotal);
            prop_assert!(summary.product_discount_amount >= Decimal::ZERO);
        });
    }

    /// Free shipping zeroes shipping and leaves the product discount untouched
    #[test]
    fn prop_free_shipping_only_affects_shipping() {
        proptest!(|(lines in lines_strategy(), kind in kind_strategy())| {
            let without = applied_set(&[kind]);
            let with = applied_set(&[kind, DiscountKind::FreeShipping]);

            let before = PricingCalculator::compute_summary(&lines, &policy(), &without, now());
            let after = PricingCalculator::compute_summary(&lines, &policy(), &with, now());

            prop_assert_eq!(after.final_shipping, Decimal::ZERO);
            prop_assert_eq!(after.product_discount_amount, before.product_discount_amount);
        });
    }

    /// Computing twice gives bit-identical output
    #[test]
    fn prop_compute_summary_is_idempotent() {
        proptest!(|(lines in lines_strategy(), kinds in prop::collection::vec(kind_strategy(), 0..=4))| {
            let set = applied_set(&kinds);
            let first = PricingCalculator::compute_summary(&lines, &policy(), &set, now());
            let second = PricingCalculator::compute_summary(&lines, &policy(), &set, now());

            prop_assert_eq!(first.total.serialize(), second.total.serialize());
            prop_assert_eq!(first.subtotal.serialize(), second.subtotal.serialize());
            prop_assert_eq!(
                first.product_discount_amount.serialize(),
                second.product_discount_amount.serialize()
            );
            prop_assert_eq!(first.final_shipping.serialize(), second.final_shipping.serialize());
        });
    }
}
