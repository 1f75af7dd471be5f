// Storage ports for the checkout engine
//
// Catalog, discount registry, carts and orders sit behind traits so the engine can run
// against PostgreSQL in production and an in-memory store in tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkout::types::{DiscountCode, OrderRecord, ReconciliationException};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Catalog entry; price and stock are always read live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
}

/// Stored cart line; the price is looked up when the cart is priced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: u32,
}

/// Result of a conditional usage increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageIncrement {
    Incremented,
    LimitReached,
}

/// Result of writing an order together with its usage increments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Order written and every code's usage incremented
    Created(OrderRecord),

    /// An order for the same payment already exists; nothing was written
    AlreadyExists(OrderRecord),

    /// The named code hit its limit; nothing was written
    UsageLimitReached(String),
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError>;
}

#[async_trait]
pub trait DiscountRegistry: Send + Sync {
    /// Look up a code; `code` is already normalised
    async fn find_by_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError>;

    /// Increment usage only while `usage_count < usage_limit`
    async fn increment_usage(&self, code: &str) -> Result<UsageIncrement, StoreError>;

    /// Insert a new code; fails with `Conflict` if it already exists
    async fn create(&self, discount: DiscountCode) -> Result<DiscountCode, StoreError>;

    async fn list(&self) -> Result<Vec<DiscountCode>, StoreError>;

    /// Flip the kill switch. Returns `None` when the code does not exist.
    async fn set_active(&self, code: &str, is_active: bool)
        -> Result<Option<DiscountCode>, StoreError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreError>;

    /// Set a line's quantity; zero removes the line
    async fn set_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), StoreError>;

    /// Remove every line and every applied code
    async fn clear(&self, user_id: &str) -> Result<(), StoreError>;

    /// Applied discount codes, in the order they were applied
    async fn get_applied_codes(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    async fn set_applied_codes(&self, user_id: &str, codes: &[String]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<OrderRecord>, StoreError>;

    /// Atomically write the order and increment usage of each of its codes.
    ///
    /// Either everything is written or nothing is.
    async fn finalize(&self, order: OrderRecord) -> Result<FinalizeOutcome, StoreError>;

    /// Store an exception unless one already exists for its payment reference.
    ///
    /// Returns `false` when an earlier exception for the same payment was kept.
    async fn record_exception(&self, exception: ReconciliationException)
        -> Result<bool, StoreError>;

    async fn find_exception(
        &self,
        payment_reference: &str,
    ) -> Result<Option<ReconciliationException>, StoreError>;

    async fn list_exceptions(&self) -> Result<Vec<ReconciliationException>, StoreError>;
}
