use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::checkout::types::{
    ActiveWindow, CartLine, DiscountCode, DiscountKind, DiscountType, OrderRecord,
    ReconciliationException,
};
use crate::stores::{
    CartItem, CartStore, CatalogStore, DiscountRegistry, FinalizeOutcome, OrderStore, Product,
    StoreError, UsageIncrement,
};

const DISCOUNT_COLUMNS: &str = "code, discount_type, value, minimum_order, usage_limit, \
     usage_count, starts_at, ends_at, is_active, is_stackable";

const EXCEPTION_COLUMNS: &str = "id, user_id, payment_reference, quoted_amount, \
     captured_amount, recomputed_amount, discount_codes, reason, created_at";

const ORDER_COLUMNS: &str = "id, user_id, subtotal, product_discount_amount, final_shipping, \
     total, charge_amount, currency, discount_codes, payment_reference, lines, created_at";

/// Store backed by PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Conditional increment; affects no row once the limit is reached
///
/// Runs on the pool for a standalone increment or inside the finalize transaction.
async fn conditional_increment<'e, E>(executor: E, code: &str) -> Result<UsageIncrement, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE discount_codes SET usage_count = usage_count + 1 \
         WHERE code = $1 AND (usage_limit IS NULL OR usage_count < usage_limit)",
    )
    .bind(code)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        Ok(UsageIncrement::LimitReached)
    } else {
        Ok(UsageIncrement::Incremented)
    }
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("Value {} does not fit", value)))
}

fn to_u32(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("Negative {}: {}", field, value)))
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: Decimal,
    stock: i32,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            stock: to_u32(row.stock, "stock")?,
            id: row.id,
            name: row.name,
            price: row.price,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DiscountRow {
    code: String,
    discount_type: String,
    value: Decimal,
    minimum_order: Decimal,
    usage_limit: Option<i32>,
    usage_count: i32,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    is_active: bool,
    is_stackable: bool,
}

impl TryFrom<DiscountRow> for DiscountCode {
    type Error = StoreError;

    fn try_from(row: DiscountRow) -> Result<Self, Self::Error> {
        let discount_type: DiscountType = row.discount_type.parse().map_err(StoreError::Corrupt)?;
        let kind = DiscountKind::from_parts(discount_type, row.value).map_err(StoreError::Corrupt)?;
        let usage_limit = row
            .usage_limit
            .map(|limit| to_u32(limit, "usage_limit"))
            .transpose()?;

        Ok(DiscountCode {
            code: row.code,
            kind,
            minimum_order: row.minimum_order,
            usage_limit,
            usage_count: to_u32(row.usage_count, "usage_count")?,
            active_window: ActiveWindow {
                start: row.starts_at,
                end: row.ends_at,
            },
            is_active: row.is_active,
            is_stackable: row.is_stackable,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: String,
    quantity: i32,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    subtotal: Decimal,
    product_discount_amount: Decimal,
    final_shipping: Decimal,
    total: Decimal,
    charge_amount: i64,
    currency: String,
    discount_codes: Vec<String>,
    payment_reference: String,
    lines: Json<Vec<CartLine>>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        OrderRecord {
            id: row.id,
            user_id: row.user_id,
            subtotal: row.subtotal,
            product_discount_amount: row.product_discount_amount,
            final_shipping: row.final_shipping,
            total: row.total,
            charge_amount: row.charge_amount,
            currency: row.currency,
            discount_codes: row.discount_codes,
            payment_reference: row.payment_reference,
            lines: row.lines.0,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExceptionRow {
    id: Uuid,
    user_id: String,
    payment_reference: String,
    quoted_amount: i64,
    captured_amount: i64,
    recomputed_amount: Option<i64>,
    discount_codes: Vec<String>,
    reason: String,
    created_at: DateTime<Utc>,
}

impl From<ExceptionRow> for ReconciliationException {
    fn from(row: ExceptionRow) -> Self {
        ReconciliationException {
            id: row.id,
            user_id: row.user_id,
            payment_reference: row.payment_reference,
            quoted_amount: row.quoted_amount,
            captured_amount: row.captured_amount,
            recomputed_amount: row.recomputed_amount,
            discount_codes: row.discount_codes,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, stock FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }
}

#[async_trait]
impl DiscountRegistry for PgStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<DiscountCode>, StoreError> {
        let row = sqlx::query_as::<_, DiscountRow>(&format!(
            "SELECT {} FROM discount_codes WHERE code = $1",
            DISCOUNT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DiscountCode::try_from).transpose()
    }

    async fn increment_usage(&self, code: &str) -> Result<UsageIncrement, StoreError> {
        conditional_increment(&self.pool, code).await
    }

    async fn create(&self, discount: DiscountCode) -> Result<DiscountCode, StoreError> {
        let row = sqlx::query_as::<_, DiscountRow>(&format!(
            r#"
            INSERT INTO discount_codes
                (code, discount_type, value, minimum_order, usage_limit, usage_count,
                 starts_at, ends_at, is_active, is_stackable)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (code) DO NOTHING
            RETURNING {}
            "#,
            DISCOUNT_COLUMNS
        ))
        .bind(&discount.code)
        .bind(discount.kind.discount_type().to_string())
        .bind(discount.kind.value())
        .bind(discount.minimum_order)
        .bind(discount.usage_limit.map(to_i32).transpose()?)
        .bind(to_i32(discount.usage_count)?)
        .bind(discount.active_window.start)
        .bind(discount.active_window.end)
        .bind(discount.is_active)
        .bind(discount.is_stackable)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::Conflict(format!(
                "Discount code {} already exists",
                discount.code
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<DiscountCode>, StoreError> {
        let rows = sqlx::query_as::<_, DiscountRow>(&format!(
            "SELECT {} FROM discount_codes ORDER BY code",
            DISCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DiscountCode::try_from).collect()
    }

    async fn set_active(
        &self,
        code: &str,
        is_active: bool,
    ) -> Result<Option<DiscountCode>, StoreError> {
        let row = sqlx::query_as::<_, DiscountRow>(&format!(
            "UPDATE discount_codes SET is_active = $2 WHERE code = $1 RETURNING {}",
            DISCOUNT_COLUMNS
        ))
        .bind(code)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DiscountCode::try_from).transpose()
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn get_items(&self, user_id: &str) -> Result<Vec<CartItem>, StoreError> {
        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY added_at, product_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CartItem {
                    quantity: to_u32(row.quantity, "quantity")?,
                    product_id: row.product_id,
                })
            })
            .collect()
    }

    async fn set_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<(), StoreError> {
        if quantity == 0 {
            sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(to_i32(quantity)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM cart_discounts WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_applied_codes(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let codes: Vec<String> = sqlx::query_scalar(
            "SELECT code FROM cart_discounts WHERE user_id = $1 ORDER BY position",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }

    async fn set_applied_codes(&self, user_id: &str, codes: &[String]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_discounts WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (position, code) in codes.iter().enumerate() {
            sqlx::query("INSERT INTO cart_discounts (user_id, code, position) VALUES ($1, $2, $3)")
                .bind(user_id)
                .bind(code)
                .bind(position as i32)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<OrderRecord>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE payment_reference = $1",
            ORDER_COLUMNS
        ))
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(OrderRecord::from))
    }

    async fn finalize(&self, order: OrderRecord) -> Result<FinalizeOutcome, StoreError> {
        // Dropping the transaction without commit rolls back every increment
        let mut tx = self.pool.begin().await?;

        for code in &order.discount_codes {
            if conditional_increment(&mut *tx, code).await? == UsageIncrement::LimitReached {
                drop(tx);
                if let Some(existing) = self.find_by_payment_reference(&order.payment_reference).await? {
                    return Ok(FinalizeOutcome::AlreadyExists(existing));
                }
                return Ok(FinalizeOutcome::UsageLimitReached(code.clone()));
            }
        }

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO orders ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (payment_reference) DO NOTHING
            "#,
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.user_id)
        .bind(order.subtotal)
        .bind(order.product_discount_amount)
        .bind(order.final_shipping)
        .bind(order.total)
        .bind(order.charge_amount)
        .bind(&order.currency)
        .bind(&order.discount_codes)
        .bind(&order.payment_reference)
        .bind(Json(&order.lines))
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            drop(tx);
            return match self.find_by_payment_reference(&order.payment_reference).await? {
                Some(existing) => Ok(FinalizeOutcome::AlreadyExists(existing)),
                None => Err(StoreError::Conflict(format!(
                    "Order for payment {} conflicted but was not found",
                    order.payment_reference
                ))),
            };
        }

        tx.commit().await?;
        Ok(FinalizeOutcome::Created(order))
    }

    async fn record_exception(
        &self,
        exception: ReconciliationException,
    ) -> Result<bool, StoreError> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO reconciliation_exceptions ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_reference) DO NOTHING
            "#,
            EXCEPTION_COLUMNS
        ))
        .bind(exception.id)
        .bind(&exception.user_id)
        .bind(&exception.payment_reference)
        .bind(exception.quoted_amount)
        .bind(exception.captured_amount)
        .bind(exception.recomputed_amount)
        .bind(&exception.discount_codes)
        .bind(&exception.reason)
        .bind(exception.created_at)
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() > 0)
    }

    async fn find_exception(
        &self,
        payment_reference: &str,
    ) -> Result<Option<ReconciliationException>, StoreError> {
        let row = sqlx::query_as::<_, ExceptionRow>(&format!(
            "SELECT {} FROM reconciliation_exceptions WHERE payment_reference = $1",
            EXCEPTION_COLUMNS
        ))
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ReconciliationException::from))
    }

    async fn list_exceptions(&self) -> Result<Vec<ReconciliationException>, StoreError> {
        let rows = sqlx::query_as::<_, ExceptionRow>(&format!(
            "SELECT {} FROM reconciliation_exceptions ORDER BY created_at DESC",
            EXCEPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ReconciliationException::from).collect())
    }
}
