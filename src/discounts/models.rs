use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::checkout::types::{normalize_code, ActiveWindow, DiscountCode, DiscountKind, DiscountType};
use crate::validation::{validate_discount_code, validate_non_negative_amount, validate_percentage};

fn default_true() -> bool {
    true
}

/// Request to create a discount code
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_create_discount", skip_on_field_errors = false))]
pub struct CreateDiscountRequest {
    #[validate(custom = "validate_discount_code")]
    pub code: String,
    pub discount_type: DiscountType,
    /// Percentage points or currency amount; ignored for free shipping
    #[serde(default)]
    #[validate(custom = "validate_non_negative_amount")]
    pub value: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_non_negative_amount")]
    pub minimum_order: Decimal,
    #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
    pub usage_limit: Option<u32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_stackable: bool,
}

/// Checks that need more than one field
fn validate_create_discount(request: &CreateDiscountRequest) -> Result<(), ValidationError> {
    if request.discount_type == DiscountType::Percentage {
        validate_percentage(&request.value)?;
    }

    if let (Some(start), Some(end)) = (request.starts_at, request.ends_at) {
        if start > end {
            return Err(ValidationError::new("window_start_after_end"));
        }
    }

    Ok(())
}

impl CreateDiscountRequest {
    /// Build the registry definition; the code is normalised and usage starts at zero
    pub fn into_discount(self) -> Result<DiscountCode, String> {
        let kind = DiscountKind::from_parts(self.discount_type, self.value)?;

        Ok(DiscountCode {
            code: normalize_code(&self.code),
            kind,
            minimum_order: self.minimum_order,
            usage_limit: self.usage_limit,
            usage_count: 0,
            active_window: ActiveWindow {
                start: self.starts_at,
                end: self.ends_at,
            },
            is_active: self.is_active,
            is_stackable: self.is_stackable,
        })
    }
}

/// Request to flip a code's kill switch
#[derive(Debug, Clone, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// Discount code as shown to back-office users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCodeResponse {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub minimum_order: Decimal,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_stackable: bool,
    pub is_exhausted: bool,
}

impl From<DiscountCode> for DiscountCodeResponse {
    fn from(discount: DiscountCode) -> Self {
        Self {
            is_exhausted: discount.is_exhausted(),
            discount_type: discount.kind.discount_type(),
            value: discount.kind.value(),
            code: discount.code,
            minimum_order: discount.minimum_order,
            usage_limit: discount.usage_limit,
            usage_count: discount.usage_count,
            starts_at: discount.active_window.start,
            ends_at: discount.active_window.end,
            is_active: discount.is_active,
            is_stackable: discount.is_stackable,
        }
    }
}
