// Validation utilities module
// Provides custom validation functions for discount definitions and cart requests

use regex::Regex;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use validator::ValidationError;

use crate::checkout::types::normalize_code;

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("discount code pattern is valid"))
}

/// Validates a discount code after normalisation
/// Valid codes are 3 to 32 characters of A-Z, 0-9, '_' or '-'
pub fn validate_discount_code(code: &str) -> Result<(), ValidationError> {
    if code_pattern().is_match(&normalize_code(code)) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_discount_code"))
    }
}

/// Validates that a discount value is not negative
pub fn validate_non_negative_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        Err(ValidationError::new("amount_must_not_be_negative"))
    } else {
        Ok(())
    }
}

/// Validates that a percentage is between 0 and 100
pub fn validate_percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        Err(ValidationError::new("percentage_out_of_range"))
    } else {
        Ok(())
    }
}

/// Validates that a product id is non-blank
pub fn validate_product_id(product_id: &str) -> Result<(), ValidationError> {
    if product_id.trim().is_empty() {
        Err(ValidationError::new("product_id_required"))
    } else {
        Ok(())
    }
}
