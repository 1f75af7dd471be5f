use crate::checkout::{CheckoutError, CheckoutResult, PricingCalculator, StockAdjustment, Stores};

/// Service for cart mutations
///
/// Every mutation checks live stock. Pricing and discount revalidation happen when the
/// engine next quotes the cart.
#[derive(Clone)]
pub struct CartService {
    stores: Stores,
}

impl CartService {
    /// Create a new CartService
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Add a product to the cart, merging with an existing line
    ///
    /// # Arguments
    /// * `user_id` - Owner of the cart
    /// * `product_id` - Product to add
    /// * `quantity` - Units to add (at least 1)
    ///
    /// # Returns
    /// The stock adjustment, if the merged quantity had to be clamped
    pub async fn add_item(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> CheckoutResult<Option<StockAdjustment>> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = self
            .stores
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| CheckoutError::ProductNotFound(product_id.to_string()))?;

        if product.stock == 0 {
            return Err(CheckoutError::OutOfStock(product_id.to_string()));
        }

        let existing = self
            .stores
            .carts
            .get_items(user_id)
            .await?
            .into_iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .unwrap_or(0);

        let requested = existing.saturating_add(quantity);
        let (kept, adjustment) =
            PricingCalculator::clamp_to_stock(product_id, requested, product.stock);

        self.stores
            .carts
            .set_quantity(user_id, product_id, kept)
            .await?;

        tracing::debug!(user_id, product_id, quantity = kept, "Cart line added");
        Ok(adjustment)
    }

    /// Set a line's quantity; zero removes the line
    pub async fn update_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> CheckoutResult<Option<StockAdjustment>> {
        if quantity == 0 {
            self.remove_item(user_id, product_id).await?;
            return Ok(None);
        }

        let product = self
            .stores
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| CheckoutError::ProductNotFound(product_id.to_string()))?;

        if product.stock == 0 {
            return Err(CheckoutError::OutOfStock(product_id.to_string()));
        }

        let (kept, adjustment) =
            PricingCalculator::clamp_to_stock(product_id, quantity, product.stock);

        self.stores
            .carts
            .set_quantity(user_id, product_id, kept)
            .await?;

        tracing::debug!(user_id, product_id, quantity = kept, "Cart line updated");
        Ok(adjustment)
    }

    /// Remove a line from the cart
    pub async fn remove_item(&self, user_id: &str, product_id: &str) -> CheckoutResult<()> {
        self.stores
            .carts
            .set_quantity(user_id, product_id, 0)
            .await?;

        tracing::debug!(user_id, product_id, "Cart line removed");
        Ok(())
    }
}
