// Handler tests for the grading checkout API
// Drive the full router over the in-memory store and the simulated gateway

use super::*;
use axum::http::StatusCode;
use axum_test::TestServer;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::checkout::{
    types::ActiveWindow, AuditLogger, CheckoutMetrics, CheckoutSettings, DiscountCode,
    DiscountKind, ShippingPolicy,
};
use crate::payments::SimulatedGateway;
use crate::stores::{MemoryStore, Product};

// ============================================================================
// Test Helpers
// ============================================================================

struct TestApp {
    server: TestServer,
    store: Arc<MemoryStore>,
    gateway: Arc<SimulatedGateway>,
}

/// Helper function to create a test app with a seeded catalogue
async fn create_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(SimulatedGateway::new());

    for (id, name, price, stock) in [
        ("psa-slab", "PSA slab grading", dec!(15), 10),
        ("sleeves", "Card sleeves", dec!(10), 3),
        ("toploader", "Toploader pack", dec!(5), 0),
    ] {
        store
            .put_product(Product {
                id: id.to_string(),
                name: name.to_string(),
                price,
                stock,
            })
            .await;
    }

    let engine = CheckoutEngine::new(
        Stores::shared(store.clone()),
        gateway.clone(),
        CheckoutSettings {
            shipping: ShippingPolicy {
                flat_rate: dec!(4.99),
                free_shipping_threshold: Some(dec!(50)),
            },
            currency: "gbp".to_string(),
            minimum_charge_amount: 50,
        },
        AuditLogger::default(),
        CheckoutMetrics::new(),
    );

    let server = TestServer::new(create_router(AppState::new(engine))).unwrap();
    TestApp {
        server,
        store,
        gateway,
    }
}

/// Money is serialised as a string
fn money(value: &serde_json::Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected a money string, got {}", value))
        .parse()
        .unwrap()
}

fn discount(code: &str, kind: DiscountKind) -> DiscountCode {
    DiscountCode {
        code: code.to_string(),
        kind,
        minimum_order: Decimal::ZERO,
        usage_limit: None,
        usage_count: 0,
        active_window: ActiveWindow::default(),
        is_active: true,
        is_stackable: true,
    }
}

/// Two slabs and a pack of sleeves: £40 subtotal
async fn fill_forty_pound_cart(app: &TestApp, user: &str) {
    app.server
        .post(&format!("/api/cart/{}/items", user))
        .json(&json!({ "product_id": "psa-slab", "quantity": 2 }))
        .await
        .assert_status(StatusCode::CREATED);
    app.server
        .post(&format!("/api/cart/{}/items", user))
        .json(&json!({ "product_id": "sleeves", "quantity": 1 }))
        .await
        .assert_status(StatusCode::CREATED);
}

async fn apply(app: &TestApp, user: &str, code: &str) -> axum_test::TestResponse {
    app.server
        .post(&format!("/api/checkout/{}/discounts", user))
        .json(&json!({ "code": code }))
        .await
}

// ============================================================================
// Pricing and discount scenarios
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = create_test_app().await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["status"], "ok");
}

#[tokio::test]
async fn test_quote_without_discounts() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;

    let response = app.server.get("/api/checkout/collector-1").await;
    response.assert_status_ok();

    let quote: serde_json::Value = response.json();
    assert_eq!(money(&quote["summary"]["subtotal"]), dec!(40));
    assert_eq!(money(&quote["summary"]["final_shipping"]), dec!(4.99));
    assert_eq!(money(&quote["summary"]["total"]), dec!(44.99));
    assert_eq!(quote["charge_amount"], 4499);
    assert_eq!(quote["currency"], "gbp");
}

#[tokio::test]
async fn test_stacking_percentage_and_free_shipping() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;
    app.store
        .put_discount(discount("SAVE20", DiscountKind::Percentage(dec!(20))))
        .await;
    app.store
        .put_discount(discount("FREESHIP", DiscountKind::FreeShipping))
        .await;

    let response = apply(&app, "collector-1", "save20").await;
    response.assert_status_ok();
    let quote: serde_json::Value = response.json();
    assert_eq!(money(&quote["summary"]["product_discount_amount"]), dec!(8));
    assert_eq!(money(&quote["summary"]["total"]), dec!(36.99));

    let response = apply(&app, "collector-1", "FREESHIP").await;
    response.assert_status_ok();
    let quote: serde_json::Value = response.json();
    assert_eq!(money(&quote["summary"]["final_shipping"]), dec!(0));
    assert_eq!(money(&quote["summary"]["total"]), dec!(32));
    assert_eq!(quote["summary"]["total"], "32.00");
    assert_eq!(quote["applied_discounts"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_non_stackable_code_rejected_after_other_code() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;
    app.store
        .put_discount(discount("SAVE20", DiscountKind::Percentage(dec!(20))))
        .await;
    let mut vip = discount("VIP50", DiscountKind::Percentage(dec!(50)));
    vip.is_stackable = false;
    app.store.put_discount(vip).await;

    apply(&app, "collector-1", "SAVE20").await.assert_status_ok();

    let response = apply(&app, "collector-1", "VIP50").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let error: serde_json::Value = response.json();
    assert_eq!(error["error_code"], "DISCOUNT_NOT_STACKABLE");

    // The cart keeps the code it had
    let quote: serde_json::Value = app.server.get("/api/checkout/collector-1").await.json();
    assert_eq!(quote["applied_discounts"][0]["code"], "SAVE20");
    assert_eq!(money(&quote["summary"]["total"]), dec!(36.99));
}

#[tokio::test]
async fn test_minimum_order_rejection_cites_minimum() {
    let app = create_test_app().await;
    app.server
        .post("/api/cart/collector-1/items")
        .json(&json!({ "product_id": "sleeves", "quantity": 1 }))
        .await
        .assert_status(StatusCode::CREATED);
    let mut big = discount("BIGSPEND", DiscountKind::FixedAmount(dec!(5)));
    big.minimum_order = dec!(20);
    app.store.put_discount(big).await;

    let response = apply(&app, "collector-1", "BIGSPEND").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let error: serde_json::Value = response.json();
    assert_eq!(error["error_code"], "BELOW_MINIMUM_ORDER");
    assert!(error["message"].as_str().unwrap().contains("20.00"));
}

#[tokio::test]
async fn test_exhausted_code_rejected() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;
    let mut once = discount("ONCE", DiscountKind::FixedAmount(dec!(5)));
    once.usage_limit = Some(1);
    once.usage_count = 1;
    app.store.put_discount(once).await;

    let response = apply(&app, "collector-1", "ONCE").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<serde_json::Value>()["error_code"],
        "USAGE_LIMIT_REACHED"
    );
}

#[tokio::test]
async fn test_unknown_code_and_empty_code() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;

    let response = apply(&app, "collector-1", "NOPE").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<serde_json::Value>()["error_code"],
        "DISCOUNT_NOT_FOUND"
    );

    let response = apply(&app, "collector-1", "").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<serde_json::Value>()["error_code"],
        "VALIDATION_ERROR"
    );
}

#[tokio::test]
async fn test_remove_and_clear_discounts() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;
    app.store
        .put_discount(discount("SAVE20", DiscountKind::Percentage(dec!(20))))
        .await;
    app.store
        .put_discount(discount("FREESHIP", DiscountKind::FreeShipping))
        .await;
    apply(&app, "collector-1", "SAVE20").await.assert_status_ok();
    apply(&app, "collector-1", "FREESHIP").await.assert_status_ok();

    let response = app
        .server
        .delete("/api/checkout/collector-1/discounts/save20")
        .await;
    response.assert_status_ok();
    let quote: serde_json::Value = response.json();
    assert_eq!(quote["applied_discounts"][0]["code"], "FREESHIP");
    assert_eq!(money(&quote["summary"]["total"]), dec!(40));

    let response = app.server.delete("/api/checkout/collector-1/discounts").await;
    response.assert_status_ok();
    let quote: serde_json::Value = response.json();
    assert!(quote["applied_discounts"].as_array().unwrap().is_empty());
    assert_eq!(money(&quote["summary"]["total"]), dec!(44.99));
}

// ============================================================================
// Cart endpoint tests
// ============================================================================

#[tokio::test]
async fn test_add_item_clamps_to_stock() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/cart/collector-1/items")
        .json(&json!({ "product_id": "sleeves", "quantity": 5 }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let quote: serde_json::Value = response.json();
    assert_eq!(quote["lines"][0]["quantity"], 3);
    assert_eq!(quote["adjustments"][0]["requested"], 5);
    assert_eq!(quote["adjustments"][0]["available"], 3);
}

#[tokio::test]
async fn test_add_item_errors() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/cart/collector-1/items")
        .json(&json!({ "product_id": "does-not-exist", "quantity": 1 }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .post("/api/cart/collector-1/items")
        .json(&json!({ "product_id": "toploader", "quantity": 1 }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<serde_json::Value>()["error_code"], "OUT_OF_STOCK");

    let response = app
        .server
        .post("/api/cart/collector-1/items")
        .json(&json!({ "product_id": "psa-slab", "quantity": 0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_and_remove_item() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;

    let response = app
        .server
        .put("/api/cart/collector-1/items/psa-slab")
        .json(&json!({ "quantity": 4 }))
        .await;
    response.assert_status_ok();
    let quote: serde_json::Value = response.json();
    assert_eq!(money(&quote["summary"]["subtotal"]), dec!(70));
    // Over the free-shipping threshold
    assert_eq!(money(&quote["summary"]["final_shipping"]), dec!(0));

    let response = app.server.delete("/api/cart/collector-1/items/psa-slab").await;
    response.assert_status_ok();
    let quote: serde_json::Value = response.json();
    assert_eq!(quote["lines"].as_array().unwrap().len(), 1);
    assert_eq!(money(&quote["summary"]["total"]), dec!(14.99));
}

#[tokio::test]
async fn test_removing_items_drops_code_below_minimum() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;
    let mut big = discount("BIGSPEND", DiscountKind::FixedAmount(dec!(5)));
    big.minimum_order = dec!(35);
    app.store.put_discount(big).await;
    apply(&app, "collector-1", "BIGSPEND").await.assert_status_ok();

    let response = app.server.delete("/api/cart/collector-1/items/sleeves").await;
    response.assert_status_ok();

    let quote: serde_json::Value = response.json();
    assert!(quote["applied_discounts"].as_array().unwrap().is_empty());
    assert_eq!(quote["removed_discounts"][0]["code"], "BIGSPEND");
    assert_eq!(money(&quote["summary"]["total"]), dec!(34.99));
}

// ============================================================================
// Back-office discount tests
// ============================================================================

#[tokio::test]
async fn test_admin_create_list_and_deactivate() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/admin/discounts")
        .json(&json!({
            "code": "spring10",
            "discount_type": "percentage",
            "value": "10",
            "minimum_order": "25",
            "usage_limit": 100
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: serde_json::Value = response.json();
    assert_eq!(created["code"], "SPRING10");
    assert_eq!(created["usage_count"], 0);
    assert_eq!(created["is_active"], true);

    // Duplicate codes conflict
    let response = app
        .server
        .post("/api/admin/discounts")
        .json(&json!({ "code": "SPRING10", "discount_type": "free_shipping" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let listed: Vec<serde_json::Value> = app.server.get("/api/admin/discounts").await.json();
    assert_eq!(listed.len(), 1);

    let response = app
        .server
        .patch("/api/admin/discounts/spring10")
        .json(&json!({ "is_active": false }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["is_active"], false);

    fill_forty_pound_cart(&app, "collector-1").await;
    let response = apply(&app, "collector-1", "SPRING10").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<serde_json::Value>()["error_code"],
        "DISCOUNT_INACTIVE"
    );
}

#[tokio::test]
async fn test_admin_create_validation() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/admin/discounts")
        .json(&json!({ "code": "HUGE", "discount_type": "percentage", "value": "150" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/admin/discounts")
        .json(&json!({ "code": "no spaces", "discount_type": "free_shipping" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .patch("/api/admin/discounts/MISSING")
        .json(&json!({ "is_active": true }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Payment and reconciliation tests
// ============================================================================

#[tokio::test]
async fn test_checkout_to_order() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;
    let mut once = discount("ONCE", DiscountKind::FixedAmount(dec!(5)));
    once.usage_limit = Some(1);
    app.store.put_discount(once).await;
    apply(&app, "collector-1", "ONCE").await.assert_status_ok();

    let response = app.server.post("/api/checkout/collector-1/payment-intent").await;
    response.assert_status(StatusCode::CREATED);
    let intent: serde_json::Value = response.json();
    assert_eq!(intent["amount"], 3999);
    let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();

    app.gateway.capture(&intent_id).await.unwrap();

    let response = app
        .server
        .post("/api/checkout/collector-1/confirm")
        .json(&json!({ "payment_intent_id": intent_id }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let order: serde_json::Value = response.json();
    assert_eq!(money(&order["total"]), dec!(39.99));
    assert_eq!(order["charge_amount"], 3999);
    assert_eq!(order["discount_codes"], json!(["ONCE"]));

    // Confirming twice returns the same order
    let response = app
        .server
        .post("/api/checkout/collector-1/confirm")
        .json(&json!({ "payment_intent_id": intent_id }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<serde_json::Value>()["id"], order["id"]);

    // The cart is empty and the single-use code is spent
    let quote: serde_json::Value = app.server.get("/api/checkout/collector-1").await.json();
    assert!(quote["lines"].as_array().unwrap().is_empty());
    let listed: Vec<serde_json::Value> = app.server.get("/api/admin/discounts").await.json();
    assert_eq!(listed[0]["usage_count"], 1);
    assert_eq!(listed[0]["is_exhausted"], true);

    let metrics: serde_json::Value = app.server.get("/api/admin/metrics").await.json();
    assert_eq!(metrics["orders_created"], 1);
}

#[tokio::test]
async fn test_payment_intent_for_empty_cart() {
    let app = create_test_app().await;

    let response = app.server.post("/api/checkout/collector-1/payment-intent").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<serde_json::Value>()["error_code"], "EMPTY_CART");
}

#[tokio::test]
async fn test_confirm_unknown_intent() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/checkout/collector-1/confirm")
        .json(&json!({ "payment_intent_id": "pi_missing" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_price_change_after_capture_is_pending_verification() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;

    let intent: serde_json::Value = app
        .server
        .post("/api/checkout/collector-1/payment-intent")
        .await
        .json();
    let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();
    app.gateway.capture(&intent_id).await.unwrap();

    app.store
        .put_product(Product {
            id: "sleeves".to_string(),
            name: "Card sleeves".to_string(),
            price: dec!(12),
            stock: 3,
        })
        .await;

    let response = app
        .server
        .post("/api/checkout/collector-1/confirm")
        .json(&json!({ "payment_intent_id": intent_id }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "pending_verification");
    assert_eq!(body["payment_reference"], intent_id.as_str());

    let exceptions: Vec<serde_json::Value> = app
        .server
        .get("/api/admin/reconciliation-exceptions")
        .await
        .json();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0]["captured_amount"], 4499);
    assert_eq!(exceptions[0]["recomputed_amount"], 4699);
}

#[tokio::test]
async fn test_partial_capture_is_pending_verification() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;

    let intent: serde_json::Value = app
        .server
        .post("/api/checkout/collector-1/payment-intent")
        .await
        .json();
    let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();
    app.gateway.capture_amount(&intent_id, 4000).await.unwrap();

    let response = app
        .server
        .post("/api/checkout/collector-1/confirm")
        .json(&json!({ "payment_intent_id": intent_id }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);

    // Nothing was written and the cart is untouched
    let quote: serde_json::Value = app.server.get("/api/checkout/collector-1").await.json();
    assert_eq!(quote["lines"].as_array().unwrap().len(), 2);

    let metrics: serde_json::Value = app.server.get("/api/admin/metrics").await.json();
    assert_eq!(metrics["orders_created"], 0);
    assert_eq!(metrics["reconciliation_exceptions"], 1);
}

#[tokio::test]
async fn test_repeated_confirm_records_one_exception() {
    let app = create_test_app().await;
    fill_forty_pound_cart(&app, "collector-1").await;

    let intent: serde_json::Value = app
        .server
        .post("/api/checkout/collector-1/payment-intent")
        .await
        .json();
    let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();
    app.gateway.capture_amount(&intent_id, 4000).await.unwrap();

    for _ in 0..3 {
        let response = app
            .server
            .post("/api/checkout/collector-1/confirm")
            .json(&json!({ "payment_intent_id": intent_id }))
            .await;
        response.assert_status(StatusCode::ACCEPTED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "pending_verification");
        assert_eq!(body["payment_reference"], intent_id.as_str());
    }

    let exceptions: Vec<serde_json::Value> = app
        .server
        .get("/api/admin/reconciliation-exceptions")
        .await
        .json();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0]["captured_amount"], 4000);

    let metrics: serde_json::Value = app.server.get("/api/admin/metrics").await.json();
    assert_eq!(metrics["reconciliation_exceptions"], 1);
}

#[tokio::test]
async fn test_single_use_code_spent_by_another_user() {
    let app = create_test_app().await;
    let mut once = discount("ONCE", DiscountKind::FixedAmount(dec!(5)));
    once.usage_limit = Some(1);
    app.store.put_discount(once).await;

    // Both carts hold the code while it still has a use left
    for user in ["collector-1", "collector-2"] {
        fill_forty_pound_cart(&app, user).await;
        apply(&app, user, "ONCE").await.assert_status_ok();
    }

    let intent: serde_json::Value = app
        .server
        .post("/api/checkout/collector-1/payment-intent")
        .await
        .json();
    let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();
    app.gateway.capture(&intent_id).await.unwrap();
    app.server
        .post("/api/checkout/collector-1/confirm")
        .json(&json!({ "payment_intent_id": intent_id }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = app.server.post("/api/checkout/collector-2/payment-intent").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json::<serde_json::Value>()["error_code"],
        "USAGE_LIMIT_REACHED"
    );

    // The code is gone from the second cart, which now quotes full price
    let quote: serde_json::Value = app.server.get("/api/checkout/collector-2").await.json();
    assert!(quote["applied_discounts"].as_array().unwrap().is_empty());
    assert_eq!(money(&quote["summary"]["total"]), dec!(44.99));

    let listed: Vec<serde_json::Value> = app.server.get("/api/admin/discounts").await.json();
    assert_eq!(listed[0]["usage_count"], 1);
}
