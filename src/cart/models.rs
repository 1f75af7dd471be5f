use serde::Deserialize;
use validator::Validate;

use crate::validation::validate_product_id;

/// Request to add a product to the cart
#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(custom = "validate_product_id")]
    pub product_id: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
}

/// Request to set a line's quantity; zero removes the line
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(max = 1000, message = "Quantity must not exceed 1000"))]
    pub quantity: u32,
}
