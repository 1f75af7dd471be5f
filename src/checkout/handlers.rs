// HTTP handlers for checkout endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::checkout::{
    CheckoutQuote, MetricsSummary, OrderRecord, PaymentIntentResponse, ReconciliationException,
};
use crate::error::ApiError;
use crate::AppState;

/// Payload for applying a discount code
#[derive(Debug, Deserialize, Validate)]
pub struct ApplyDiscountRequest {
    #[validate(length(min = 1, max = 64, message = "Discount code must be 1 to 64 characters"))]
    pub code: String,
}

/// Payload for confirming a captured payment
#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmOrderRequest {
    #[validate(length(min = 1, message = "Payment intent id is required"))]
    pub payment_intent_id: String,
}

/// Handler for GET /api/checkout/:user_id
/// Prices the user's cart
pub async fn get_quote_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CheckoutQuote>, ApiError> {
    let quote = state.engine.quote(&user_id).await?;
    Ok(Json(quote))
}

/// Handler for POST /api/checkout/:user_id/discounts
/// Applies a discount code
pub async fn apply_discount_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<ApplyDiscountRequest>,
) -> Result<Json<CheckoutQuote>, ApiError> {
    payload.validate()?;

    let quote = state.engine.apply_discount(&user_id, &payload.code).await?;
    Ok(Json(quote))
}

/// Handler for DELETE /api/checkout/:user_id/discounts/:code
/// Removes one applied code
pub async fn remove_discount_handler(
    State(state): State<AppState>,
    Path((user_id, code)): Path<(String, String)>,
) -> Result<Json<CheckoutQuote>, ApiError> {
    let quote = state.engine.remove_discount(&user_id, &code).await?;
    Ok(Json(quote))
}

/// Handler for DELETE /api/checkout/:user_id/discounts
/// Removes every applied code
pub async fn clear_discounts_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CheckoutQuote>, ApiError> {
    let quote = state.engine.clear_discounts(&user_id).await?;
    Ok(Json(quote))
}

/// Handler for POST /api/checkout/:user_id/payment-intent
/// Creates a payment intent for the quoted total
pub async fn create_payment_intent_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<(StatusCode, Json<PaymentIntentResponse>), ApiError> {
    let intent = state.engine.create_payment_intent(&user_id).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// Handler for POST /api/checkout/:user_id/confirm
/// Turns a captured payment into an order
///
/// A payment that was captured but does not reconcile answers 202 with
/// `pending_verification`, never as a payment failure.
pub async fn confirm_order_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<ConfirmOrderRequest>,
) -> Result<(StatusCode, Json<OrderRecord>), ApiError> {
    payload.validate()?;

    let order = state
        .engine
        .confirm_order(&user_id, &payload.payment_intent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Handler for GET /api/admin/metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.engine.metrics().summary())
}

/// Handler for GET /api/admin/reconciliation-exceptions
/// Lists captured payments awaiting an operator
pub async fn list_exceptions_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReconciliationException>>, ApiError> {
    let exceptions = state.engine.reconciliation_exceptions().await?;
    Ok(Json(exceptions))
}
