// Discount Evaluator
//
// Decides whether a submitted code may join the applied set and computes its isolated effect.
// Pure and synchronous: the registry lookup happens before the call.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::checkout::{
    error::DiscountError,
    types::{normalize_code, AppliedDiscount, AppliedSet, DiscountCode, DiscountKind, RemovedDiscount},
};

/// Discount Evaluator
///
/// Runs the admission checks in a fixed order; the first failure wins.
pub struct DiscountEvaluator;

impl DiscountEvaluator {
    /// Evaluate a candidate code against the current applied set and subtotal
    ///
    /// # Arguments
    /// * `requested` - Code as typed by the user (any case)
    /// * `definition` - Registry entry for the code, if one exists
    /// * `applied` - Codes already applied to the cart
    /// * `subtotal` - Current cart subtotal before any discount
    /// * `now` - Instant the code is evaluated at
    ///
    /// # Returns
    /// The discount as it would be applied, or the first failed check
    pub fn evaluate_discount(
        requested: &str,
        definition: Option<&DiscountCode>,
        applied: &AppliedSet,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AppliedDiscount, DiscountError> {
        let code = normalize_code(requested);

        // 1. Must exist (lookup is case-insensitive)
        let definition = match definition {
            Some(definition) if normalize_code(&definition.code) == code => definition,
            _ => return Err(DiscountError::NotFound { code }),
        };

        // 2. Must not already be applied
        if applied.contains(&code) {
            return Err(DiscountError::AlreadyApplied { code });
        }

        // 3. Stacking: both the newcomer and everything already applied must allow it
        if !applied.is_empty() && (!definition.is_stackable || applied.has_non_stackable()) {
            return Err(DiscountError::NotStackable { code });
        }

        // 4. At most one free-shipping code
        if definition.kind.is_free_shipping() && applied.has_free_shipping() {
            return Err(DiscountError::DuplicateFreeShipping { code });
        }

        // 5. Kill switch
        if !definition.is_active {
            return Err(DiscountError::Inactive { code });
        }

        // 6-7. Active window, open ends allowed
        if let Some(start) = definition.active_window.start {
            if now < start {
                return Err(DiscountError::NotYetValid { code });
            }
        }
        if let Some(end) = definition.active_window.end {
            if now > end {
                return Err(DiscountError::Expired { code });
            }
        }

        // 8. Minimum order, against the undiscounted subtotal
        if subtotal < definition.minimum_order {
            return Err(DiscountError::BelowMinimumOrder {
                code,
                minimum: definition.minimum_order,
            });
        }

        // 9. Usage limit
        if definition.is_exhausted() {
            return Err(DiscountError::UsageLimitReached { code });
        }

        Ok(AppliedDiscount {
            savings: Self::isolated_savings(&definition.kind, subtotal),
            code,
            kind: definition.kind,
            is_stackable: definition.is_stackable,
            minimum_order: definition.minimum_order,
        })
    }

    /// Evaluate a code and, if admitted, add it to the applied set
    pub fn admit(
        requested: &str,
        definition: Option<&DiscountCode>,
        applied: &mut AppliedSet,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AppliedDiscount, DiscountError> {
        let discount = Self::evaluate_discount(requested, definition, applied, subtotal, now)?;
        applied.insert(discount.clone());
        Ok(discount)
    }

    /// Savings of a single code on its own
    ///
    /// Free shipping reports zero; the shipping base rate is the calculator's concern.
    pub fn isolated_savings(kind: &DiscountKind, subtotal: Decimal) -> Decimal {
        match kind {
            DiscountKind::Percentage(value) => subtotal * *value / Decimal::ONE_HUNDRED,
            DiscountKind::FixedAmount(value) => (*value).min(subtotal),
            DiscountKind::FreeShipping => Decimal::ZERO,
        }
    }

    /// Rebuild an applied set from stored codes against fresh definitions
    ///
    /// Codes are re-admitted in their original order. Codes that now fail a check
    /// are dropped and reported with the check they failed.
    pub fn revalidate(
        codes: &[String],
        definitions: &HashMap<String, DiscountCode>,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> (AppliedSet, Vec<RemovedDiscount>) {
        let mut applied = AppliedSet::new();
        let mut removed = Vec::new();

        for code in codes {
            let key = normalize_code(code);
            match Self::admit(&key, definitions.get(&key), &mut applied, subtotal, now) {
                Ok(_) => {}
                // A duplicate in storage is not a reason to report anything
                Err(DiscountError::AlreadyApplied { .. }) => {}
                Err(reason) => removed.push(RemovedDiscount { code: key, reason }),
            }
        }

        (applied, removed)
    }
}
