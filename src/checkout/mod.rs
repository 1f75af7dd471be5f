// Checkout Module
//
// Prices a user's cart, admits discount codes and turns a captured payment into an order.
// - Discount evaluation: which codes may be applied, in a fixed check order
// - Pricing: subtotal, product discount, shipping and total
// - Reconciliation: charge amount, post-capture verification, order snapshot
//
// The evaluator, calculator and reconciler are pure. All I/O goes through the engine below.

pub mod audit;
pub mod calculator;
pub mod error;
pub mod evaluator;
pub mod handlers;
pub mod metrics;
pub mod reconciler;
pub mod types;

pub use audit::AuditLogger;
pub use calculator::PricingCalculator;
pub use error::{CheckoutError, CheckoutResult, DiscountError, ReconcileError};
pub use evaluator::DiscountEvaluator;
pub use metrics::{CheckoutMetrics, MetricsSummary, Operation};
pub use reconciler::{ChargeQuote, OrderTotalReconciler};
pub use types::{
    AppliedDiscount, AppliedSet, CartLine, DiscountCode, DiscountKind, DiscountType,
    OrderRecord, OrderSummary, ReconciliationException, RemovedDiscount, ShippingPolicy,
    StockAdjustment,
};

// Checkout Engine - Orchestrator

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::payments::{GatewayError, PaymentGateway, PaymentIntent};
use crate::stores::{CartStore, CatalogStore, DiscountRegistry, FinalizeOutcome, OrderStore};
use types::normalize_code;

/// Storage collaborators of the engine
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub discounts: Arc<dyn DiscountRegistry>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// Use one backend for every port
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CatalogStore + DiscountRegistry + CartStore + OrderStore + 'static,
    {
        Self {
            catalog: store.clone(),
            discounts: store.clone(),
            carts: store.clone(),
            orders: store,
        }
    }
}

/// Pricing and charging settings
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub shipping: ShippingPolicy,
    pub currency: String,
    pub minimum_charge_amount: i64,
}

/// Everything a client needs to render the checkout page
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutQuote {
    pub user_id: String,
    pub lines: Vec<CartLine>,
    /// Rounded for display
    pub summary: OrderSummary,
    pub applied_discounts: AppliedSet,
    /// Quantities changed to match stock since the last quote
    pub adjustments: Vec<StockAdjustment>,
    /// Codes dropped because they no longer pass admission
    pub removed_discounts: Vec<RemovedDiscount>,
    /// Minor units; `None` when the total is too large to charge
    pub charge_amount: Option<i64>,
    pub currency: String,
}

/// Payment intent handed back to the client
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentResponse {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub quote: CheckoutQuote,
}

/// Cart state priced against live data
struct CheckoutState {
    lines: Vec<CartLine>,
    applied: AppliedSet,
    summary: OrderSummary,
    adjustments: Vec<StockAdjustment>,
    removed: Vec<RemovedDiscount>,
}

/// Checkout Engine
///
/// Loads carts and definitions from the stores, runs the pure checkout rules over them
/// and writes back the results.
pub struct CheckoutEngine {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    shipping: ShippingPolicy,
    reconciler: OrderTotalReconciler,
    audit: AuditLogger,
    metrics: CheckoutMetrics,
}

impl CheckoutEngine {
    /// Create a new CheckoutEngine
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
        audit: AuditLogger,
        metrics: CheckoutMetrics,
    ) -> Self {
        Self {
            stores,
            gateway,
            shipping: settings.shipping,
            reconciler: OrderTotalReconciler::new(
                settings.minimum_charge_amount,
                settings.currency,
            ),
            audit,
            metrics,
        }
    }

    /// Get performance metrics
    pub fn metrics(&self) -> &CheckoutMetrics {
        &self.metrics
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Price the user's cart as it stands now
    pub async fn quote(&self, user_id: &str) -> CheckoutResult<CheckoutQuote> {
        let _timer = self.metrics.start(Operation::Quote);
        let state = self.load_state(user_id, Utc::now()).await?;
        Ok(self.to_quote(user_id, state))
    }

    /// Apply a discount code to the user's cart
    ///
    /// # Returns
    /// The refreshed quote, or the first admission check the code failed
    pub async fn apply_discount(&self, user_id: &str, code: &str) -> CheckoutResult<CheckoutQuote> {
        let _timer = self.metrics.start(Operation::ApplyDiscount);
        let now = Utc::now();
        let mut state = self.load_state(user_id, now).await?;

        let key = normalize_code(code);
        let definition = self.stores.discounts.find_by_code(&key).await?;

        match DiscountEvaluator::admit(
            &key,
            definition.as_ref(),
            &mut state.applied,
            state.summary.subtotal,
            now,
        ) {
            Ok(discount) => {
                self.stores
                    .carts
                    .set_applied_codes(user_id, &state.applied.codes())
                    .await?;
                self.metrics.record_discount_applied();
                self.audit.log_discount_applied(user_id, &discount).await;
            }
            Err(e) => {
                self.metrics.record_discount_rejected();
                self.audit.log_discount_rejected(user_id, &e).await;
                return Err(e.into());
            }
        }

        state.summary =
            PricingCalculator::compute_summary(&state.lines, &self.shipping, &state.applied, now);
        Ok(self.to_quote(user_id, state))
    }

    /// Remove one applied code; removing a code that is not applied changes nothing
    pub async fn remove_discount(&self, user_id: &str, code: &str) -> CheckoutResult<CheckoutQuote> {
        let now = Utc::now();
        let mut state = self.load_state(user_id, now).await?;

        if state.applied.remove(code) {
            self.stores
                .carts
                .set_applied_codes(user_id, &state.applied.codes())
                .await?;
            tracing::info!(user_id, code = %normalize_code(code), "Discount removed by user");
            state.summary = PricingCalculator::compute_summary(
                &state.lines,
                &self.shipping,
                &state.applied,
                now,
            );
        }

        Ok(self.to_quote(user_id, state))
    }

    /// Remove every applied code
    pub async fn clear_discounts(&self, user_id: &str) -> CheckoutResult<CheckoutQuote> {
        let now = Utc::now();
        let mut state = self.load_state(user_id, now).await?;

        if !state.applied.is_empty() {
            self.stores.carts.set_applied_codes(user_id, &[]).await?;
            state.applied.clear();
            state.summary = PricingCalculator::compute_summary(
                &state.lines,
                &self.shipping,
                &state.applied,
                now,
            );
        }

        Ok(self.to_quote(user_id, state))
    }

    /// Create a payment intent for the current cart
    ///
    /// Every applied code is re-admitted against fresh definitions first. Anything that
    /// changed since the last quote (a dropped code or a stock clamp) stops the charge so
    /// the user can review the new total.
    pub async fn create_payment_intent(&self, user_id: &str) -> CheckoutResult<PaymentIntentResponse> {
        let _timer = self.metrics.start(Operation::PaymentIntent);
        let state = self.load_state(user_id, Utc::now()).await?;

        if let Some(removed) = state.removed.first() {
            return Err(removed.reason.clone().into());
        }
        if !state.adjustments.is_empty() {
            return Err(CheckoutError::StockAdjusted(state.adjustments));
        }
        if state.lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let charge = self.reconciler.quote(&state.summary, &state.applied)?;

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("discount_codes".to_string(), charge.discount_codes.join(","));
        metadata.insert("quoted_amount".to_string(), charge.amount.to_string());

        let intent = self
            .gateway
            .create_intent(charge.amount, &charge.currency, &metadata)
            .await?;

        tracing::info!(
            user_id,
            payment_intent_id = %intent.id,
            amount = charge.amount,
            "Payment intent created"
        );

        Ok(PaymentIntentResponse {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: charge.amount,
            currency: charge.currency,
            quote: self.to_quote(user_id, state),
        })
    }

    /// Turn a captured payment into an order
    ///
    /// Confirming the same payment twice returns the order created the first time.
    /// Failures after capture are recorded as reconciliation exceptions before they
    /// are returned.
    pub async fn confirm_order(
        &self,
        user_id: &str,
        payment_intent_id: &str,
    ) -> CheckoutResult<OrderRecord> {
        let _timer = self.metrics.start(Operation::ConfirmOrder);

        if let Some(order) = self
            .stores
            .orders
            .find_by_payment_reference(payment_intent_id)
            .await?
        {
            if order.user_id != user_id {
                return Err(CheckoutError::IntentNotFound(payment_intent_id.to_string()));
            }
            tracing::debug!(user_id, order_id = %order.id, "Order already confirmed");
            return Ok(order);
        }

        // A payment already escalated stays with the operator
        if let Some(exception) = self
            .stores
            .orders
            .find_exception(payment_intent_id)
            .await?
        {
            if exception.user_id != user_id {
                return Err(CheckoutError::IntentNotFound(payment_intent_id.to_string()));
            }
            tracing::debug!(user_id, payment_reference = %payment_intent_id, "Payment awaiting verification");
            return Err(ReconcileError::AwaitingVerification {
                payment_reference: exception.payment_reference,
            }
            .into());
        }

        let intent = self
            .gateway
            .get_intent(payment_intent_id)
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(id) => CheckoutError::IntentNotFound(id),
                other => other.into(),
            })?;

        if intent.metadata.get("user_id").map(String::as_str) != Some(user_id) {
            return Err(CheckoutError::IntentNotFound(payment_intent_id.to_string()));
        }

        let now = Utc::now();
        let state = self.load_state(user_id, now).await?;

        let order = match self.reconciler.reconcile_and_charge(
            &state.summary,
            &state.applied,
            &state.lines,
            user_id,
            &intent,
            now,
        ) {
            Ok(order) => order,
            Err(e) => {
                if e.is_post_charge() {
                    self.escalate(user_id, &intent, &state, &e).await;
                }
                return Err(e.into());
            }
        };

        match self.stores.orders.finalize(order).await? {
            FinalizeOutcome::Created(order) => {
                self.stores.carts.clear(user_id).await?;
                self.metrics.record_order_created();
                self.audit.log_order_created(&order).await;
                Ok(order)
            }
            FinalizeOutcome::AlreadyExists(order) => Ok(order),
            FinalizeOutcome::UsageLimitReached(code) => {
                let e = ReconcileError::UsageLimitRace {
                    payment_reference: intent.id.clone(),
                    code,
                };
                self.escalate(user_id, &intent, &state, &e).await;
                Err(e.into())
            }
        }
    }

    /// Captured payments awaiting an operator
    pub async fn reconciliation_exceptions(&self) -> CheckoutResult<Vec<ReconciliationException>> {
        Ok(self.stores.orders.list_exceptions().await?)
    }

    /// Persist a post-charge failure for manual reconciliation
    ///
    /// At most one exception is kept per payment; only the first is counted and audited.
    async fn escalate(
        &self,
        user_id: &str,
        intent: &PaymentIntent,
        state: &CheckoutState,
        error: &ReconcileError,
    ) {
        let exception = ReconciliationException {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            payment_reference: intent.id.clone(),
            quoted_amount: intent.amount,
            captured_amount: intent.amount_received,
            recomputed_amount: OrderTotalReconciler::charge_amount(state.summary.total),
            discount_codes: state.applied.codes(),
            reason: error.to_string(),
            created_at: Utc::now(),
        };

        match self.stores.orders.record_exception(exception).await {
            Ok(false) => {
                tracing::debug!(user_id, payment_reference = %intent.id, "Exception already recorded");
                return;
            }
            Ok(true) => {}
            Err(e) => {
                tracing::error!(
                    user_id,
                    payment_reference = %intent.id,
                    "Failed to record reconciliation exception: {}",
                    e
                );
            }
        }

        self.metrics.record_reconciliation_exception();
        self.audit.log_reconciliation_exception(user_id, error).await;
    }

    /// Load the cart, reconcile it with live stock and definitions, and price it
    ///
    /// Stock clamps and dropped codes are written back so the stored cart always
    /// matches what was last quoted.
    async fn load_state(&self, user_id: &str, now: DateTime<Utc>) -> CheckoutResult<CheckoutState> {
        let items = self.stores.carts.get_items(user_id).await?;

        let mut lines = Vec::with_capacity(items.len());
        let mut adjustments = Vec::new();

        for item in items {
            let product = self.stores.catalog.get_product(&item.product_id).await?;
            let (kept, adjustment, unit_price) = match product {
                Some(product) => {
                    let (kept, adjustment) = PricingCalculator::clamp_to_stock(
                        &item.product_id,
                        item.quantity,
                        product.stock,
                    );
                    (kept, adjustment, product.price)
                }
                None => {
                    let adjustment = StockAdjustment {
                        product_id: item.product_id.clone(),
                        requested: item.quantity,
                        available: 0,
                    };
                    (0, Some(adjustment), Default::default())
                }
            };

            if let Some(adjustment) = adjustment {
                self.stores
                    .carts
                    .set_quantity(user_id, &item.product_id, kept)
                    .await?;
                tracing::info!(
                    user_id,
                    product_id = %item.product_id,
                    requested = adjustment.requested,
                    available = adjustment.available,
                    "Cart line adjusted to stock"
                );
                adjustments.push(adjustment);
            }

            if kept > 0 {
                lines.push(CartLine {
                    product_id: item.product_id,
                    unit_price,
                    quantity: kept,
                });
            }
        }
        self.metrics.record_stock_adjustments(adjustments.len());

        let subtotal = PricingCalculator::calculate_subtotal(&lines);

        let codes = self.stores.carts.get_applied_codes(user_id).await?;
        let mut definitions = HashMap::new();
        for code in &codes {
            let key = normalize_code(code);
            if let Some(definition) = self.stores.discounts.find_by_code(&key).await? {
                definitions.insert(key, definition);
            }
        }

        let (applied, removed) = DiscountEvaluator::revalidate(&codes, &definitions, subtotal, now);
        if applied.codes() != codes {
            self.stores
                .carts
                .set_applied_codes(user_id, &applied.codes())
                .await?;
        }
        if !removed.is_empty() {
            self.metrics.record_discounts_auto_removed(removed.len());
            for discount in &removed {
                self.audit.log_discount_removed(user_id, discount).await;
            }
        }

        let summary = PricingCalculator::compute_summary(&lines, &self.shipping, &applied, now);

        Ok(CheckoutState {
            lines,
            applied,
            summary,
            adjustments,
            removed,
        })
    }

    fn to_quote(&self, user_id: &str, state: CheckoutState) -> CheckoutQuote {
        CheckoutQuote {
            user_id: user_id.to_string(),
            charge_amount: OrderTotalReconciler::charge_amount(state.summary.total),
            currency: self.reconciler.currency().to_string(),
            summary: state.summary.rounded(),
            lines: state.lines,
            applied_discounts: state.applied,
            adjustments: state.adjustments,
            removed_discounts: state.removed,
        }
    }
}
