pub mod cart;
pub mod checkout;
pub mod config;
pub mod db;
pub mod discounts;
pub mod error;
pub mod payments;
pub mod stores;
pub mod validation;

use axum::{
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use cart::CartService;
use checkout::{CheckoutEngine, Stores};
use stores::DiscountRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CheckoutEngine>,
    pub cart: Arc<CartService>,
    pub discounts: Arc<dyn DiscountRegistry>,
}

impl AppState {
    /// Wire the cart service and admin registry to the engine's stores
    pub fn new(engine: CheckoutEngine) -> Self {
        let stores: Stores = engine.stores().clone();
        Self {
            cart: Arc::new(CartService::new(stores.clone())),
            discounts: stores.discounts,
            engine: Arc::new(engine),
        }
    }
}

/// Handler for GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds tracing and CORS middleware
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Checkout
        .route("/api/checkout/:user_id", get(checkout::handlers::get_quote_handler))
        .route(
            "/api/checkout/:user_id/discounts",
            post(checkout::handlers::apply_discount_handler)
                .delete(checkout::handlers::clear_discounts_handler),
        )
        .route(
            "/api/checkout/:user_id/discounts/:code",
            delete(checkout::handlers::remove_discount_handler),
        )
        .route(
            "/api/checkout/:user_id/payment-intent",
            post(checkout::handlers::create_payment_intent_handler),
        )
        .route(
            "/api/checkout/:user_id/confirm",
            post(checkout::handlers::confirm_order_handler),
        )
        // Cart
        .route("/api/cart/:user_id/items", post(cart::handlers::add_item_handler))
        .route(
            "/api/cart/:user_id/items/:product_id",
            put(cart::handlers::update_item_handler).delete(cart::handlers::remove_item_handler),
        )
        // Back office
        .route(
            "/api/admin/discounts",
            post(discounts::handlers::create_discount_handler)
                .get(discounts::handlers::list_discounts_handler),
        )
        .route(
            "/api/admin/discounts/:code",
            patch(discounts::handlers::set_discount_active_handler),
        )
        .route("/api/admin/metrics", get(checkout::handlers::metrics_handler))
        .route(
            "/api/admin/reconciliation-exceptions",
            get(checkout::handlers::list_exceptions_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests;
