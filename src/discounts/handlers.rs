// HTTP handlers for back-office discount management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::checkout::types::normalize_code;
use crate::discounts::{CreateDiscountRequest, DiscountCodeResponse, SetActiveRequest};
use crate::error::ApiError;
use crate::AppState;

/// Handler for POST /api/admin/discounts
/// Creates a new discount code
pub async fn create_discount_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<DiscountCodeResponse>), ApiError> {
    tracing::debug!("Creating discount code: {}", payload.code);

    payload.validate()?;
    let discount = payload.into_discount().map_err(ApiError::BadRequest)?;

    let created = state.discounts.create(discount).await?;

    tracing::info!("Created discount code {}", created.code);
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Handler for GET /api/admin/discounts
/// Lists every discount code
pub async fn list_discounts_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<DiscountCodeResponse>>, ApiError> {
    let discounts = state.discounts.list().await?;

    tracing::debug!("Retrieved {} discount codes", discounts.len());
    Ok(Json(discounts.into_iter().map(Into::into).collect()))
}

/// Handler for PATCH /api/admin/discounts/:code
/// Activates or deactivates a code
pub async fn set_discount_active_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<DiscountCodeResponse>, ApiError> {
    let code = normalize_code(&code);

    let updated = state
        .discounts
        .set_active(&code, payload.is_active)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "Discount code".to_string(),
            id: code.clone(),
        })?;

    tracing::info!("Discount code {} is_active set to {}", code, payload.is_active);
    Ok(Json(updated.into()))
}
