// In-memory implementation of every storage port
// One lock guards all state, so each operation is atomic with respect to the others

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::checkout::types::{normalize_code, DiscountCode, OrderRecord, ReconciliationException};
use crate::stores::{
    CartItem, CartStore, CatalogStore, DiscountRegistry, FinalizeOutcome, OrderStore, Product,
    StoreError, UsageIncrement,
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<String, Product>,
    discounts: HashMap<String, DiscountCode>,
    /// Cart lines per user, in insertion order
    carts: HashMap<String, Vec<CartItem>>,
    applied_codes: HashMap<String, Vec<String>>,
    orders: HashMap<String, OrderRecord>,
    exceptions: Vec<ReconciliationException>,
}

impl State {
    /// Shared by `increment_usage` and `finalize`
    fn increment_usage(&mut self, code: &str) -> UsageIncrement {
        match self.discounts.get_mut(code) {
            Some(discount) if !discount.is_exhausted() => {
                discount.usage_count += 1;
                UsageIncrement::Incremented
            }
            _ => UsageIncrement::LimitReached,
        }
    }
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog product
    pub async fn put_product(&self, product: Product) {
        let mut state = self.state.write().await;
        state.products.insert(product.id.clone(), product);
    }

    /// Insert or replace a discount definition, bypassing the create checks
    pub async fn put_discount(&self, mut discount: DiscountCode) {
        discount.code = normalize_code(&discount.code);
        let mut state = self.state.write().await;
        state.discounts.insert(discount.code.clone(), discount);
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.state.read().await.products.get(id).cloned())
    }
}

#[async_trait]
impl DiscountRegistry for MemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError> {
        Ok(self.state.read().await.discounts.get(code).cloned())
    }

    async fn increment_usage(&self, code: &str) -> Result<UsageIncrement, StoreError> {
        Ok(self.state.write().await.increment_usage(code))
    }

    async fn create(&self, discount: DiscountCode) -> Result<DiscountCode, StoreError> {
        let mut state = self.state.write().await;
        if state.discounts.contains_key(&discount.code) {
            return Err(StoreError::Conflict(format!(
                "Discount code {} already exists",
                discount.code
            )));
        }
        state.discounts.insert(discount.code.clone(), discount.clone());
        Ok(discount)
    }

    async fn list(&self) -> Result<Vec<DiscountCode>, StoreError> {
        let state = self.state.read().await;
        let mut discounts: Vec<DiscountCode> = state.discounts.values().cloned().collect();
        discounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(discounts)
    }

    async fn set_active(
        &self,
        code: &str,
        is_active: bool,
    ) -> Result<Option<DiscountCode>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.discounts.get_mut(code).map(|discount| {
            discount.is_active = is_active;
            discount.clone()
        }))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get_items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let items = state.carts.entry(user_id.to_string()).or_default();

        if quantity == 0 {
            items.retain(|item| item.product_id != product_id);
            return Ok(());
        }

        match items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity = quantity,
            None => items.push(CartItem {
                product_id: product_id.to_string(),
                quantity,
            }),
        }
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.carts.remove(user_id);
        state.applied_codes.remove(user_id);
        Ok(())
    }

    async fn get_applied_codes(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .applied_codes
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_applied_codes(&self, user_id: &str, codes: &[String]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if codes.is_empty() {
            state.applied_codes.remove(user_id);
        } else {
            state
                .applied_codes
                .insert(user_id.to_string(), codes.to_vec());
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.state.read().await.orders.get(payment_reference).cloned())
    }

    async fn finalize(&self, order: OrderRecord) -> Result<FinalizeOutcome, StoreError> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.orders.get(&order.payment_reference) {
            return Ok(FinalizeOutcome::AlreadyExists(existing.clone()));
        }

        // Check every code before touching any, so a failure writes nothing
        for code in &order.discount_codes {
            let available = state
                .discounts
                .get(code)
                .map(|discount| !discount.is_exhausted())
                .unwrap_or(false);
            if !available {
                return Ok(FinalizeOutcome::UsageLimitReached(code.clone()));
            }
        }

        for code in &order.discount_codes {
            state.increment_usage(code);
        }
        state
            .orders
            .insert(order.payment_reference.clone(), order.clone());

        Ok(FinalizeOutcome::Created(order))
    }

    async fn record_exception(
        &self,
        exception: ReconciliationException,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state
            .exceptions
            .iter()
            .any(|existing| existing.payment_reference == exception.payment_reference)
        {
            return Ok(false);
        }
        state.exceptions.push(exception);
        Ok(true)
    }

    async fn find_exception(
        &self,
        payment_reference: &str,
    ) -> Result<Option<ReconciliationException>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .exceptions
            .iter()
            .find(|exception| exception.payment_reference == payment_reference)
            .cloned())
    }

    async fn list_exceptions(&self) -> Result<Vec<ReconciliationException>, StoreError> {
        Ok(self.state.read().await.exceptions.clone())
    }
}
