// Domain type definitions for the checkout engine
// Shared by the evaluator, the calculator, the reconciler and the stores

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::checkout::error::DiscountError;

/// Number of fraction digits money is rounded to at display/charge time
pub const MONEY_SCALE: u32 = 2;

/// Round a money amount to two fraction digits, half-up.
///
/// Only ever applied to final figures, never to intermediate steps. The result
/// always carries exactly two fraction digits, so `32` renders as `32.00`.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Normalise a discount code for case-insensitive lookup and comparison
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Type tag of a discount code
///
/// Used by the admin API and by storage, where the value lives in its own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Discount is a percentage of the subtotal (e.g., 10 = 10% off)
    Percentage,

    /// Discount is a fixed amount subtracted from the subtotal (e.g., 5.00 = 5 off)
    FixedAmount,

    /// Discount waives the shipping charge
    FreeShipping,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "percentage"),
            DiscountType::FixedAmount => write!(f, "fixed_amount"),
            DiscountType::FreeShipping => write!(f, "free_shipping"),
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed_amount" => Ok(DiscountType::FixedAmount),
            "free_shipping" => Ok(DiscountType::FreeShipping),
            _ => Err(format!("Invalid discount type: {}", s)),
        }
    }
}

/// What a discount code does to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percentage off the original subtotal, 0 to 100
    Percentage(Decimal),

    /// Fixed amount off the subtotal, never negative
    FixedAmount(Decimal),

    /// Waives the shipping charge; never touches product prices
    FreeShipping,
}

impl DiscountKind {
    /// Build a kind from its stored tag and value.
    ///
    /// The value of a free-shipping code is ignored.
    pub fn from_parts(discount_type: DiscountType, value: Decimal) -> Result<Self, String> {
        match discount_type {
            DiscountType::Percentage => {
                if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                    return Err(format!("Percentage must be between 0 and 100, got {}", value));
                }
                Ok(DiscountKind::Percentage(value))
            }
            DiscountType::FixedAmount => {
                if value < Decimal::ZERO {
                    return Err(format!("Fixed amount must not be negative, got {}", value));
                }
                Ok(DiscountKind::FixedAmount(value))
            }
            DiscountType::FreeShipping => Ok(DiscountKind::FreeShipping),
        }
    }

    pub fn discount_type(&self) -> DiscountType {
        match self {
            DiscountKind::Percentage(_) => DiscountType::Percentage,
            DiscountKind::FixedAmount(_) => DiscountType::FixedAmount,
            DiscountKind::FreeShipping => DiscountType::FreeShipping,
        }
    }

    /// Configured value; always zero for free shipping
    pub fn value(&self) -> Decimal {
        match self {
            DiscountKind::Percentage(value) | DiscountKind::FixedAmount(value) => *value,
            DiscountKind::FreeShipping => Decimal::ZERO,
        }
    }

    pub fn is_free_shipping(&self) -> bool {
        matches!(self, DiscountKind::FreeShipping)
    }
}

/// Period during which a code may be admitted; either end may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Discount code definition as held by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    /// Normalised (trimmed, upper-case) code
    pub code: String,
    pub kind: DiscountKind,
    /// Minimum pre-discount subtotal; zero means no minimum
    pub minimum_order: Decimal,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub active_window: ActiveWindow,
    /// Kill switch, independent of the window
    pub is_active: bool,
    pub is_stackable: bool,
}

impl DiscountCode {
    /// Whether the usage limit, if any, has been reached
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .map(|limit| self.usage_count >= limit)
            .unwrap_or(false)
    }
}

/// A discount that passed admission, with its effect at admission time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub code: String,
    pub kind: DiscountKind,
    pub is_stackable: bool,
    pub minimum_order: Decimal,
    /// Isolated savings against the subtotal; zero for free shipping
    pub savings: Decimal,
}

/// Ordered set of applied discounts, keyed by normalised code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppliedSet {
    discounts: Vec<AppliedDiscount>,
}

impl AppliedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, code: &str) -> bool {
        let code = normalize_code(code);
        self.discounts.iter().any(|d| d.code == code)
    }

    pub fn has_non_stackable(&self) -> bool {
        self.discounts.iter().any(|d| !d.is_stackable)
    }

    pub fn has_free_shipping(&self) -> bool {
        self.discounts.iter().any(|d| d.kind.is_free_shipping())
    }

    /// Add an admitted discount. Returns false if the code is already present.
    pub fn insert(&mut self, discount: AppliedDiscount) -> bool {
        if self.contains(&discount.code) {
            return false;
        }
        self.discounts.push(discount);
        true
    }

    /// Remove a code. Returns whether anything was removed.
    pub fn remove(&mut self, code: &str) -> bool {
        let code = normalize_code(code);
        let before = self.discounts.len();
        self.discounts.retain(|d| d.code != code);
        self.discounts.len() != before
    }

    pub fn clear(&mut self) {
        self.discounts.clear();
    }

    pub fn codes(&self) -> Vec<String> {
        self.discounts.iter().map(|d| d.code.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AppliedDiscount> {
        self.discounts.iter()
    }

    pub fn len(&self) -> usize {
        self.discounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discounts.is_empty()
    }
}

impl<'a> IntoIterator for &'a AppliedSet {
    type Item = &'a AppliedDiscount;
    type IntoIter = std::slice::Iter<'a, AppliedDiscount>;

    fn into_iter(self) -> Self::IntoIter {
        self.discounts.iter()
    }
}

/// Cart line priced at the product's live price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// Flat-rate shipping with an optional free-shipping threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    pub flat_rate: Decimal,
    /// Subtotal at or above which shipping is free; `None` means never free
    pub free_shipping_threshold: Option<Decimal>,
}

impl ShippingPolicy {
    /// Shipping charged before any free-shipping discount
    pub fn base_shipping(&self, subtotal: Decimal) -> Decimal {
        match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Decimal::ZERO,
            _ => self.flat_rate,
        }
    }
}

/// Computed price breakdown of a cart; recomputed from scratch on every change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub subtotal: Decimal,
    pub product_discount_amount: Decimal,
    pub base_shipping: Decimal,
    pub shipping_discount_amount: Decimal,
    pub final_shipping: Decimal,
    pub total: Decimal,
}

impl OrderSummary {
    /// Copy of the summary with every figure rounded for display
    ///
    /// The total is rounded once and the product discount is derived from the
    /// rounded figures, so `total == subtotal - product_discount + final_shipping`
    /// holds exactly on the displayed values.
    pub fn rounded(&self) -> Self {
        let subtotal = round_money(self.subtotal);
        let base_shipping = round_money(self.base_shipping);
        let final_shipping = round_money(self.final_shipping);
        let total = round_money(self.total);
        Self {
            subtotal,
            product_discount_amount: subtotal + final_shipping - total,
            base_shipping,
            shipping_discount_amount: base_shipping - final_shipping,
            final_shipping,
            total,
        }
    }
}

/// A cart line whose quantity had to change to match live stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: String,
    pub requested: u32,
    /// Quantity kept in the cart; zero when the line was removed
    pub available: u32,
}

/// An applied code dropped because it no longer passes admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedDiscount {
    pub code: String,
    pub reason: DiscountError,
}

/// Immutable order snapshot, written once payment is confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: String,
    pub subtotal: Decimal,
    pub product_discount_amount: Decimal,
    pub final_shipping: Decimal,
    pub total: Decimal,
    /// Total in minor units; equals the captured amount
    pub charge_amount: i64,
    pub currency: String,
    /// Applied codes by string, not by live reference
    pub discount_codes: Vec<String>,
    pub payment_reference: String,
    pub lines: Vec<CartLine>,
    pub created_at: DateTime<Utc>,
}

/// Captured payment that could not be turned into an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationException {
    pub id: Uuid,
    pub user_id: String,
    pub payment_reference: String,
    pub quoted_amount: i64,
    pub captured_amount: i64,
    pub recomputed_amount: Option<i64>,
    pub discount_codes: Vec<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn applied(code: &str, kind: DiscountKind, stackable: bool) -> AppliedDiscount {
        AppliedDiscount {
            code: code.to_string(),
            kind,
            is_stackable: stackable,
            minimum_order: Decimal::ZERO,
            savings: Decimal::ZERO,
        }
    }

    #[test]
    fn test_discount_type_display() {
        assert_eq!(DiscountType::Percentage.to_string(), "percentage");
        assert_eq!(DiscountType::FixedAmount.to_string(), "fixed_amount");
        assert_eq!(DiscountType::FreeShipping.to_string(), "free_shipping");
    }

    #[test]
    fn test_discount_type_from_str() {
        use std::str::FromStr;

        assert_eq!(
            DiscountType::from_str("free_shipping").unwrap(),
            DiscountType::FreeShipping
        );
        assert!(DiscountType::from_str("bogus").is_err());
    }

    #[test]
    fn test_kind_from_parts_validates_ranges() {
        assert!(DiscountKind::from_parts(DiscountType::Percentage, dec!(101)).is_err());
        assert!(DiscountKind::from_parts(DiscountType::Percentage, dec!(-1)).is_err());
        assert!(DiscountKind::from_parts(DiscountType::FixedAmount, dec!(-0.01)).is_err());
        assert_eq!(
            DiscountKind::from_parts(DiscountType::Percentage, dec!(100)).unwrap(),
            DiscountKind::Percentage(dec!(100))
        );
    }

    #[test]
    fn test_free_shipping_value_is_always_zero() {
        let kind = DiscountKind::from_parts(DiscountType::FreeShipping, dec!(25)).unwrap();
        assert_eq!(kind, DiscountKind::FreeShipping);
        assert_eq!(kind.value(), Decimal::ZERO);
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_value(DiscountKind::Percentage(dec!(20))).unwrap();
        assert_eq!(json["type"], "percentage");

        let json = serde_json::to_value(DiscountKind::FreeShipping).unwrap();
        assert_eq!(json["type"], "free_shipping");
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  save20 "), "SAVE20");
        assert_eq!(normalize_code("FreeShip"), "FREESHIP");
    }

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(36.99)), dec!(36.99));
        assert_eq!(round_money(dec!(32)).to_string(), "32.00");
    }

    #[test]
    fn test_applied_set_is_case_insensitive() {
        let mut set = AppliedSet::new();
        assert!(set.insert(applied("SAVE20", DiscountKind::Percentage(dec!(20)), true)));
        assert!(set.contains("save20"));
        assert!(!set.insert(applied("SAVE20", DiscountKind::Percentage(dec!(20)), true)));
        assert!(set.remove("Save20"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_applied_set_flags() {
        let mut set = AppliedSet::new();
        set.insert(applied("FREESHIP", DiscountKind::FreeShipping, true));
        assert!(set.has_free_shipping());
        assert!(!set.has_non_stackable());

        set.insert(applied("VIP50", DiscountKind::Percentage(dec!(50)), false));
        assert!(set.has_non_stackable());
        assert_eq!(set.codes(), vec!["FREESHIP".to_string(), "VIP50".to_string()]);
    }

    #[test]
    fn test_shipping_policy_threshold() {
        let policy = ShippingPolicy {
            flat_rate: dec!(4.99),
            free_shipping_threshold: Some(dec!(50)),
        };
        assert_eq!(policy.base_shipping(dec!(49.99)), dec!(4.99));
        assert_eq!(policy.base_shipping(dec!(50)), Decimal::ZERO);

        let never_free = ShippingPolicy {
            flat_rate: dec!(4.99),
            free_shipping_threshold: None,
        };
        assert_eq!(never_free.base_shipping(dec!(1000)), dec!(4.99));
    }

    #[test]
    fn test_exhausted_code() {
        let mut code = DiscountCode {
            code: "ONCE".to_string(),
            kind: DiscountKind::FixedAmount(dec!(5)),
            minimum_order: Decimal::ZERO,
            usage_limit: Some(1),
            usage_count: 0,
            active_window: ActiveWindow::default(),
            is_active: true,
            is_stackable: true,
        };
        assert!(!code.is_exhausted());
        code.usage_count = 1;
        assert!(code.is_exhausted());
        code.usage_limit = None;
        assert!(!code.is_exhausted());
    }
}
