// Error types for the checkout engine
// Business outcomes are structured values; only store and gateway failures are infrastructure errors

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::checkout::types::StockAdjustment;
use crate::payments::{GatewayError, PaymentIntentStatus};
use crate::stores::StoreError;

/// Reasons a discount code cannot join the applied set
///
/// All of these are user-correctable and are shown next to the code entry field.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountError {
    #[error("Discount code {code} was not found")]
    NotFound { code: String },

    #[error("Discount code {code} has already been applied")]
    AlreadyApplied { code: String },

    #[error("Discount code {code} cannot be combined with other discounts")]
    NotStackable { code: String },

    #[error("A free shipping discount has already been applied")]
    DuplicateFreeShipping { code: String },

    #[error("Discount code {code} is not active")]
    Inactive { code: String },

    #[error("Discount code {code} is not valid yet")]
    NotYetValid { code: String },

    #[error("Discount code {code} has expired")]
    Expired { code: String },

    #[error("Discount code {code} requires a minimum order of {minimum:.2}")]
    BelowMinimumOrder { code: String, minimum: Decimal },

    #[error("Discount code {code} has reached its usage limit")]
    UsageLimitReached { code: String },
}

impl DiscountError {
    /// Machine-readable code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            DiscountError::NotFound { .. } => "DISCOUNT_NOT_FOUND",
            DiscountError::AlreadyApplied { .. } => "DISCOUNT_ALREADY_APPLIED",
            DiscountError::NotStackable { .. } => "DISCOUNT_NOT_STACKABLE",
            DiscountError::DuplicateFreeShipping { .. } => "DUPLICATE_FREE_SHIPPING",
            DiscountError::Inactive { .. } => "DISCOUNT_INACTIVE",
            DiscountError::NotYetValid { .. } => "DISCOUNT_NOT_YET_VALID",
            DiscountError::Expired { .. } => "DISCOUNT_EXPIRED",
            DiscountError::BelowMinimumOrder { .. } => "BELOW_MINIMUM_ORDER",
            DiscountError::UsageLimitReached { .. } => "USAGE_LIMIT_REACHED",
        }
    }

    pub fn code(&self) -> &str {
        match self {
            DiscountError::NotFound { code }
            | DiscountError::AlreadyApplied { code }
            | DiscountError::NotStackable { code }
            | DiscountError::DuplicateFreeShipping { code }
            | DiscountError::Inactive { code }
            | DiscountError::NotYetValid { code }
            | DiscountError::Expired { code }
            | DiscountError::BelowMinimumOrder { code, .. }
            | DiscountError::UsageLimitReached { code } => code,
        }
    }
}

/// Failures while turning a summary into a charge or an order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Total cannot be charged (below the gateway minimum, or too large); the cart must change
    #[error("Order total of {total} cannot be charged; the minimum charge is {minimum} minor units")]
    InvalidAmount { total: Decimal, minimum: i64 },

    /// Payment has not been captured yet
    #[error("Payment {payment_reference} has status {status}")]
    PaymentNotSucceeded {
        payment_reference: String,
        status: PaymentIntentStatus,
    },

    /// Captured payment no longer matches the order; needs an operator
    #[error(
        "Payment {payment_reference} does not reconcile: quoted {quoted}, recomputed {}, captured {captured}",
        describe_amount(.recomputed)
    )]
    AmountMismatch {
        payment_reference: String,
        quoted: i64,
        /// `None` when the fresh total does not fit in minor units
        recomputed: Option<i64>,
        captured: i64,
    },

    /// Conditional usage increment failed after capture; needs an operator
    #[error("Discount code {code} ran out of uses while payment {payment_reference} was captured")]
    UsageLimitRace {
        payment_reference: String,
        code: String,
    },

    /// An exception is already open for this payment; an operator will resolve it
    #[error("Payment {payment_reference} is awaiting manual verification")]
    AwaitingVerification { payment_reference: String },
}

fn describe_amount(amount: &Option<i64>) -> String {
    match amount {
        Some(amount) => amount.to_string(),
        None => "out of range".to_string(),
    }
}

impl ReconcileError {
    /// Whether money has already been taken, so the user must not see a payment failure
    pub fn is_post_charge(&self) -> bool {
        matches!(
            self,
            ReconcileError::AmountMismatch { .. }
                | ReconcileError::UsageLimitRace { .. }
                | ReconcileError::AwaitingVerification { .. }
        )
    }
}

/// Main error type for checkout operations
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Discount(#[from] DiscountError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Your cart is empty")]
    EmptyCart,

    /// Quantities were clamped to live stock; the user must review before paying
    #[error("Some items in your cart changed because of stock levels")]
    StockAdjusted(Vec<StockAdjustment>),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {0} is out of stock")]
    OutOfStock(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),

    #[error("Invalid discount definition: {0}")]
    InvalidDiscount(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Result type alias for checkout operations
pub type CheckoutResult<T> = Result<T, CheckoutError>;
