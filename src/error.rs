// Error handling module for the checkout API
// Provides centralized error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::checkout::{CheckoutError, ReconcileError};
use crate::payments::GatewayError;
use crate::stores::StoreError;

/// Main error type for the API
/// All handlers should return Result<T, ApiError>
///
/// Each variant maps to a specific HTTP status code and error response format.
#[derive(Debug)]
pub enum ApiError {
    /// Validation errors from request validation
    /// Maps to HTTP 400 Bad Request
    ValidationError(validator::ValidationErrors),

    /// Malformed request that passed deserialization
    /// Maps to HTTP 400 Bad Request
    BadRequest(String),

    /// Resource not found by ID
    /// Maps to HTTP 404 Not Found
    NotFound { resource: String, id: String },

    /// Duplicate resource conflict
    /// Maps to HTTP 409 Conflict
    Conflict { message: String },

    /// Business rule the user can fix (bad discount code, cart below minimum charge)
    /// Maps to HTTP 422 Unprocessable Entity
    Unprocessable {
        error_code: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Payment captured but the order is held for manual reconciliation
    /// Maps to HTTP 202 Accepted
    PendingVerification { payment_reference: String },

    /// Payment gateway failures
    /// Maps to HTTP 502 Bad Gateway
    BadGateway(String),

    /// Storage failures
    /// Maps to HTTP 500 Internal Server Error
    /// Sensitive details are filtered from client responses
    StoreError(StoreError),
}

/// Consistent error response structure
///
/// Provides both machine-readable (error_code) and human-readable (message) information.
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR", "DISCOUNT_EXPIRED")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (e.g., field-level validation errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

/// Body returned when a captured payment could not be turned into an order
#[derive(Serialize)]
pub struct PendingVerificationResponse {
    pub status: &'static str,
    pub payment_reference: String,
    pub message: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::PendingVerification { payment_reference } = self {
            warn!("Order pending verification for payment {}", payment_reference);
            let body = PendingVerificationResponse {
                status: "pending_verification",
                payment_reference,
                message: "Your payment was received and your order is being verified. \
                          Please contact support if you do not hear from us shortly.",
            };
            return (StatusCode::ACCEPTED, Json(body)).into_response();
        }

        let (status, error_response) = self.to_error_response();
        (status, Json(error_response)).into_response()
    }
}

fn error_response(
    error_code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> ErrorResponse {
    ErrorResponse {
        error_code: error_code.to_string(),
        message: message.into(),
        details,
        timestamp: Utc::now().to_rfc3339(),
    }
}

impl ApiError {
    /// Convert ApiError to HTTP status code and ErrorResponse
    ///
    /// Logging level follows severity:
    /// - error!: storage errors (500-level)
    /// - warn!: conflicts and gateway failures
    /// - debug!: expected client errors (validation, bad codes, not found)
    fn to_error_response(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::ValidationError(errors) => {
                debug!("Validation error: {:?}", errors);
                (
                    StatusCode::BAD_REQUEST,
                    error_response(
                        "VALIDATION_ERROR",
                        "Request validation failed",
                        Some(serde_json::to_value(errors).unwrap_or(json!({}))),
                    ),
                )
            }
            ApiError::BadRequest(message) => {
                debug!("Bad request: {}", message);
                (
                    StatusCode::BAD_REQUEST,
                    error_response("BAD_REQUEST", message.clone(), None),
                )
            }
            ApiError::NotFound { resource, id } => {
                debug!("Resource not found: {} with id {}", resource, id);
                (
                    StatusCode::NOT_FOUND,
                    error_response("NOT_FOUND", format!("{} with id {} not found", resource, id), None),
                )
            }
            ApiError::Conflict { message } => {
                warn!("Conflict error: {}", message);
                (
                    StatusCode::CONFLICT,
                    error_response("CONFLICT", message.clone(), None),
                )
            }
            ApiError::Unprocessable {
                error_code,
                message,
                details,
            } => {
                debug!("Unprocessable request: {} ({})", message, error_code);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    error_response(error_code, message.clone(), details.clone()),
                )
            }
            ApiError::PendingVerification { payment_reference } => (
                StatusCode::ACCEPTED,
                error_response(
                    "PENDING_VERIFICATION",
                    format!("Payment {} is pending verification", payment_reference),
                    None,
                ),
            ),
            ApiError::BadGateway(message) => {
                warn!("Payment gateway error: {}", message);
                (
                    StatusCode::BAD_GATEWAY,
                    error_response("PAYMENT_GATEWAY_ERROR", "The payment provider could not be reached", None),
                )
            }
            ApiError::StoreError(store_error) => {
                // Full error stays in the logs, never in the response
                error!("Store error: {:?}", store_error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_response("DATABASE_ERROR", "A database error occurred", None),
                )
            }
        }
    }
}

/// Convert checkout errors to ApiError
impl From<CheckoutError> for ApiError {
    fn from(error: CheckoutError) -> Self {
        match error {
            CheckoutError::Discount(e) => ApiError::Unprocessable {
                error_code: e.error_code().to_string(),
                message: e.to_string(),
                details: serde_json::to_value(&e).ok(),
            },
            CheckoutError::Reconcile(e) => e.into(),
            CheckoutError::EmptyCart => ApiError::Unprocessable {
                error_code: "EMPTY_CART".to_string(),
                message: error.to_string(),
                details: None,
            },
            CheckoutError::StockAdjusted(ref adjustments) => ApiError::Unprocessable {
                error_code: "STOCK_ADJUSTED".to_string(),
                message: error.to_string(),
                details: Some(json!({ "adjustments": adjustments })),
            },
            CheckoutError::OutOfStock(ref product_id) => ApiError::Unprocessable {
                error_code: "OUT_OF_STOCK".to_string(),
                message: error.to_string(),
                details: Some(json!({ "product_id": product_id })),
            },
            CheckoutError::ProductNotFound(id) => ApiError::NotFound {
                resource: "Product".to_string(),
                id,
            },
            CheckoutError::IntentNotFound(id) => ApiError::NotFound {
                resource: "Payment intent".to_string(),
                id,
            },
            CheckoutError::InvalidQuantity(message) | CheckoutError::InvalidDiscount(message) => {
                ApiError::BadRequest(message)
            }
            CheckoutError::Store(e) => e.into(),
            CheckoutError::Gateway(e) => e.into(),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::AmountMismatch {
                payment_reference, ..
            }
            | ReconcileError::UsageLimitRace {
                payment_reference, ..
            }
            | ReconcileError::AwaitingVerification { payment_reference } => {
                ApiError::PendingVerification { payment_reference }
            }
            ReconcileError::InvalidAmount { total, minimum } => ApiError::Unprocessable {
                error_code: "INVALID_AMOUNT".to_string(),
                message: error.to_string(),
                details: Some(json!({ "total": total, "minimum": minimum })),
            },
            ReconcileError::PaymentNotSucceeded { ref status, .. } => ApiError::Unprocessable {
                error_code: "PAYMENT_NOT_SUCCEEDED".to_string(),
                details: Some(json!({ "status": status })),
                message: error.to_string(),
            },
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(message) => ApiError::Conflict { message },
            other => ApiError::StoreError(other),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        ApiError::BadGateway(error.to_string())
    }
}

/// Convert validator errors to ApiError
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors)
    }
}
