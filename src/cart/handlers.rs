// HTTP handlers for cart endpoints
// Every mutation answers with the freshly priced checkout quote

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::cart::{AddItemRequest, UpdateQuantityRequest};
use crate::checkout::{CheckoutQuote, StockAdjustment};
use crate::error::ApiError;
use crate::AppState;

/// Quote the cart, surfacing a clamp made by the mutation itself
async fn quote_with(
    state: &AppState,
    user_id: &str,
    adjustment: Option<StockAdjustment>,
) -> Result<Json<CheckoutQuote>, ApiError> {
    let mut quote = state.engine.quote(user_id).await?;
    if let Some(adjustment) = adjustment {
        quote.adjustments.insert(0, adjustment);
    }
    Ok(Json(quote))
}

/// Handler for POST /api/cart/:user_id/items
/// Adds a product to the cart
pub async fn add_item_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CheckoutQuote>), ApiError> {
    payload.validate()?;

    let adjustment = state
        .cart
        .add_item(&user_id, payload.product_id.trim(), payload.quantity)
        .await?;

    let quote = quote_with(&state, &user_id, adjustment).await?;
    Ok((StatusCode::CREATED, quote))
}

/// Handler for PUT /api/cart/:user_id/items/:product_id
/// Sets a line's quantity
pub async fn update_item_handler(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(String, String)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<Json<CheckoutQuote>, ApiError> {
    payload.validate()?;

    let adjustment = state
        .cart
        .update_quantity(&user_id, &product_id, payload.quantity)
        .await?;

    quote_with(&state, &user_id, adjustment).await
}

/// Handler for DELETE /api/cart/:user_id/items/:product_id
/// Removes a line from the cart
pub async fn remove_item_handler(
    State(state): State<AppState>,
    Path((user_id, product_id)): Path<(String, String)>,
) -> Result<Json<CheckoutQuote>, ApiError> {
    state.cart.remove_item(&user_id, &product_id).await?;
    quote_with(&state, &user_id, None).await
}
