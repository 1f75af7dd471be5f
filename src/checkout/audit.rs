// Audit Logger
//
// Records discount and order events for support and finance.
// Failures are logged but never surface to the caller.

use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;

use crate::checkout::error::{DiscountError, ReconcileError};
use crate::checkout::types::{AppliedDiscount, OrderRecord, RemovedDiscount};

/// One audit trail entry
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub user_id: String,
    pub event_type: &'static str,
    pub discount_code: Option<String>,
    pub payment_reference: Option<String>,
    pub event_data: JsonValue,
}

impl AuditEvent {
    fn discount_applied(user_id: &str, discount: &AppliedDiscount) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_type: "discount_applied",
            discount_code: Some(discount.code.clone()),
            payment_reference: None,
            event_data: json!({
                "kind": discount.kind,
                "savings": discount.savings,
                "is_stackable": discount.is_stackable,
            }),
        }
    }

    fn discount_rejected(user_id: &str, error: &DiscountError) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_type: "discount_rejected",
            discount_code: Some(error.code().to_string()),
            payment_reference: None,
            event_data: json!({
                "error_code": error.error_code(),
                "reason": error.to_string(),
            }),
        }
    }

    fn discount_removed(user_id: &str, removed: &RemovedDiscount) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_type: "discount_auto_removed",
            discount_code: Some(removed.code.clone()),
            payment_reference: None,
            event_data: json!({
                "error_code": removed.reason.error_code(),
                "reason": removed.reason.to_string(),
            }),
        }
    }

    fn order_created(order: &OrderRecord) -> Self {
        Self {
            user_id: order.user_id.clone(),
            event_type: "order_created",
            discount_code: None,
            payment_reference: Some(order.payment_reference.clone()),
            event_data: json!({
                "order_id": order.id,
                "total": order.total,
                "charge_amount": order.charge_amount,
                "discount_codes": order.discount_codes,
            }),
        }
    }

    fn reconciliation_exception(user_id: &str, error: &ReconcileError) -> Self {
        let payment_reference = match error {
            ReconcileError::AmountMismatch {
                payment_reference, ..
            }
            | ReconcileError::UsageLimitRace {
                payment_reference, ..
            }
            | ReconcileError::PaymentNotSucceeded {
                payment_reference, ..
            }
            | ReconcileError::AwaitingVerification { payment_reference } => {
                Some(payment_reference.clone())
            }
            ReconcileError::InvalidAmount { .. } => None,
        };

        Self {
            user_id: user_id.to_string(),
            event_type: "reconciliation_exception",
            discount_code: None,
            payment_reference,
            event_data: json!({ "reason": error.to_string() }),
        }
    }
}

/// Audit Logger
///
/// Every event goes to the tracing log. When a database pool is configured the
/// event is also written to `checkout_audit_log`.
#[derive(Clone, Default)]
pub struct AuditLogger {
    pool: Option<PgPool>,
}

impl AuditLogger {
    /// Create a new AuditLogger
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn log_discount_applied(&self, user_id: &str, discount: &AppliedDiscount) {
        tracing::info!(user_id, code = %discount.code, savings = %discount.savings, "Discount applied");
        self.record(AuditEvent::discount_applied(user_id, discount)).await;
    }

    pub async fn log_discount_rejected(&self, user_id: &str, error: &DiscountError) {
        tracing::info!(user_id, code = %error.code(), reason = %error, "Discount rejected");
        self.record(AuditEvent::discount_rejected(user_id, error)).await;
    }

    /// Log a code dropped during revalidation
    pub async fn log_discount_removed(&self, user_id: &str, removed: &RemovedDiscount) {
        tracing::info!(user_id, code = %removed.code, reason = %removed.reason, "Discount removed");
        self.record(AuditEvent::discount_removed(user_id, removed)).await;
    }

    pub async fn log_order_created(&self, order: &OrderRecord) {
        tracing::info!(
            user_id = %order.user_id,
            order_id = %order.id,
            payment_reference = %order.payment_reference,
            charge_amount = order.charge_amount,
            "Order created"
        );
        self.record(AuditEvent::order_created(order)).await;
    }

    /// Log a captured payment that needs an operator
    pub async fn log_reconciliation_exception(&self, user_id: &str, error: &ReconcileError) {
        tracing::error!(user_id, error = %error, "Reconciliation exception");
        self.record(AuditEvent::reconciliation_exception(user_id, error)).await;
    }

    async fn record(&self, event: AuditEvent) {
        let Some(pool) = &self.pool else {
            return;
        };

        if let Err(e) = Self::insert_audit_record(pool, &event).await {
            // Audit failures must not block checkout
            tracing::warn!("Failed to write {} audit record: {}", event.event_type, e);
        }
    }

    async fn insert_audit_record(pool: &PgPool, event: &AuditEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO checkout_audit_log
                (user_id, event_type, discount_code, payment_reference, event_data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&event.user_id)
        .bind(event.event_type)
        .bind(&event.discount_code)
        .bind(&event.payment_reference)
        .bind(&event.event_data)
        .execute(pool)
        .await?;

        Ok(())
    }
}
