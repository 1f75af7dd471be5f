// Order Total Reconciler
//
// Turns a summary into a charge amount and, after capture, proves that the amount taken
// matches a fresh recomputation before an order is written.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::checkout::error::ReconcileError;
use crate::checkout::types::{round_money, AppliedSet, CartLine, OrderRecord, OrderSummary};
use crate::payments::PaymentIntent;

/// Amount and currency a payment intent is created for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeQuote {
    pub amount: i64,
    pub currency: String,
    pub discount_codes: Vec<String>,
}

/// Order Total Reconciler
pub struct OrderTotalReconciler {
    minimum_charge_amount: i64,
    currency: String,
}

impl OrderTotalReconciler {
    /// Create a new reconciler
    ///
    /// # Arguments
    /// * `minimum_charge_amount` - Smallest charge the gateway accepts, in minor units
    /// * `currency` - ISO currency code charges are made in
    pub fn new(minimum_charge_amount: i64, currency: impl Into<String>) -> Self {
        Self {
            minimum_charge_amount,
            currency: currency.into().to_lowercase(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Convert a total to integer minor units
    ///
    /// Rounds half-up to two places first, so this is the single point where the
    /// displayed total and the charged amount are derived. Returns `None` when the
    /// total does not fit in an `i64` of minor units.
    pub fn charge_amount(total: Decimal) -> Option<i64> {
        round_money(total)
            .checked_mul(Decimal::ONE_HUNDRED)?
            .trunc()
            .to_i64()
    }

    /// Build the charge for a summary, refusing totals the gateway would reject
    pub fn quote(
        &self,
        summary: &OrderSummary,
        applied: &AppliedSet,
    ) -> Result<ChargeQuote, ReconcileError> {
        let amount = match Self::charge_amount(summary.total) {
            Some(amount) if amount >= self.minimum_charge_amount => amount,
            _ => {
                return Err(ReconcileError::InvalidAmount {
                    total: round_money(summary.total),
                    minimum: self.minimum_charge_amount,
                })
            }
        };

        Ok(ChargeQuote {
            amount,
            currency: self.currency.clone(),
            discount_codes: applied.codes(),
        })
    }

    /// Verify a captured payment against a fresh summary and build the order
    ///
    /// # Arguments
    /// * `fresh_summary` - Summary recomputed from live prices and definitions
    /// * `applied` - Applied set the fresh summary was computed with
    /// * `lines` - Priced cart lines, snapshotted into the order
    /// * `user_id` - Owner of the cart
    /// * `intent` - Payment intent as reported by the gateway
    /// * `now` - Order creation time
    ///
    /// # Returns
    /// The order to write, or why the payment does not reconcile
    pub fn reconcile_and_charge(
        &self,
        fresh_summary: &OrderSummary,
        applied: &AppliedSet,
        lines: &[CartLine],
        user_id: &str,
        intent: &PaymentIntent,
        now: DateTime<Utc>,
    ) -> Result<OrderRecord, ReconcileError> {
        if !intent.is_succeeded() {
            return Err(ReconcileError::PaymentNotSucceeded {
                payment_reference: intent.id.clone(),
                status: intent.status.clone(),
            });
        }

        let recomputed = Self::charge_amount(fresh_summary.total);
        if recomputed != Some(intent.amount) || intent.amount_received != intent.amount {
            return Err(ReconcileError::AmountMismatch {
                payment_reference: intent.id.clone(),
                quoted: intent.amount,
                recomputed,
                captured: intent.amount_received,
            });
        }

        let rounded = fresh_summary.rounded();
        Ok(OrderRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            subtotal: rounded.subtotal,
            product_discount_amount: rounded.product_discount_amount,
            final_shipping: rounded.final_shipping,
            total: rounded.total,
            charge_amount: intent.amount,
            currency: self.currency.clone(),
            discount_codes: applied.codes(),
            payment_reference: intent.id.clone(),
            lines: lines.to_vec(),
            created_at: now,
        })
    }
}
