use std::str::FromStr;

use async_trait::async_trait;
use common::{
    CartId, CouponId, EntryId, InvoiceId, MerchantId, Money, OrderId, Page, PageRequest,
    PaymentId, ProductId, UserId,
};
use domain::{
    Cart, CartItem, Coupon, CouponUsage, Invoice, InvoiceLine, Order, OrderItem,
    OrderStatusHistory, Payment, Product, ShippingAddress, Stock, StockHistory, TransactionLog,
};
use sqlx::{
    PgConnection, PgPool, Postgres, Row, Transaction,
    postgres::{PgPoolOptions, PgRow},
    types::Json,
};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{OrderFilter, Store, StoreTx},
};

const ORDER_COLUMNS: &str = "id, order_number, user_id, merchant_id, status, payment_status, \
    shipping_status, subtotal, tax, shipping_cost, discount_amount, total_price, coupon_code, \
    notes, tracking_number, cancellation_reason, shipping_address, created_at, updated_at, \
    confirmed_at, shipped_at, delivered_at, completed_at, cancelled_at, refunded_at";

const COUPON_COLUMNS: &str = "id, code, kind, value, min_purchase, max_discount, usage_limit, \
    used_count, per_customer_limit, valid_from, valid_until, is_active, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, amount, method, status, gateway_reference, \
    failure_reason, paid_at, refunded_amount, refund_reason, refunded_at, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id, order_id, invoice_number, status, issue_date, due_date, \
    paid_date, subtotal, tax, discount, shipping, total, items, notes, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, user_id, order_id, payment_id, kind, amount, description, created_at";

/// PostgreSQL-backed store.
///
/// Row locks are `SELECT ... FOR UPDATE` inside a database transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

/// Transaction over a [`PostgresStore`].
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

// Decoding helpers

fn lock_clause(lock: bool) -> &'static str {
    if lock { " FOR UPDATE" } else { "" }
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::new(row.try_get::<i64, _>(column)?))
}

fn opt_money(row: &PgRow, column: &str) -> Result<Option<Money>> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(Money::new))
}

fn to_count(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn count(row: &PgRow, column: &str) -> Result<u32> {
    to_count(row.try_get::<i64, _>(column)?, column)
}

fn opt_count(row: &PgRow, column: &str) -> Result<Option<u32>> {
    row.try_get::<Option<i64>, _>(column)?
        .map(|value| to_count(value, column))
        .transpose()
}

fn label<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr,
    StoreError: From<T::Err>,
{
    Ok(row.try_get::<String, _>(column)?.parse()?)
}

fn uuid<T: From<Uuid>>(row: &PgRow, column: &str) -> Result<T> {
    Ok(T::from(row.try_get::<Uuid, _>(column)?))
}

fn opt_uuid<T: From<Uuid>>(row: &PgRow, column: &str) -> Result<Option<T>> {
    Ok(row.try_get::<Option<Uuid>, _>(column)?.map(T::from))
}

/// Maps unique-constraint failures to [`StoreError::UniqueViolation`].
fn map_write_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
        && let Some(constraint) = db_err.constraint()
    {
        tracing::debug!(constraint, "unique constraint violated");
        return StoreError::unique(constraint);
    }
    StoreError::Database(err)
}

fn expect_one(rows_affected: u64, entity: &'static str, id: impl ToString) -> Result<()> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn decode_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        merchant_id: uuid(row, "merchant_id")?,
        name: row.try_get("name")?,
        price: money(row, "price")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_stock(row: &PgRow) -> Result<Stock> {
    Ok(Stock {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity: count(row, "quantity")?,
        reorder_level: count(row, "reorder_level")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_stock_history(row: &PgRow) -> Result<StockHistory> {
    Ok(StockHistory {
        id: uuid(row, "id")?,
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity_before: count(row, "quantity_before")?,
        quantity_after: count(row, "quantity_after")?,
        reason: label(row, "reason")?,
        notes: row.try_get("notes")?,
        order_id: opt_uuid(row, "order_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        merchant_id: uuid(row, "merchant_id")?,
        quantity: count(row, "quantity")?,
        unit_price: money(row, "unit_price")?,
        subtotal: money(row, "subtotal")?,
    })
}

fn decode_coupon(row: &PgRow) -> Result<Coupon> {
    Ok(Coupon {
        id: uuid(row, "id")?,
        code: row.try_get("code")?,
        kind: label(row, "kind")?,
        value: row.try_get("value")?,
        min_purchase: money(row, "min_purchase")?,
        max_discount: opt_money(row, "max_discount")?,
        usage_limit: opt_count(row, "usage_limit")?,
        used_count: count(row, "used_count")?,
        per_customer_limit: opt_count(row, "per_customer_limit")?,
        valid_from: row.try_get("valid_from")?,
        valid_until: row.try_get("valid_until")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_coupon_usage(row: &PgRow) -> Result<CouponUsage> {
    Ok(CouponUsage {
        id: uuid(row, "id")?,
        coupon_id: uuid(row, "coupon_id")?,
        order_id: uuid(row, "order_id")?,
        user_id: uuid(row, "user_id")?,
        discount_amount: money(row, "discount_amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_order(row: &PgRow) -> Result<Order> {
    let shipping_address: Option<Json<ShippingAddress>> = row.try_get("shipping_address")?;
    Ok(Order {
        id: uuid(row, "id")?,
        order_number: row.try_get("order_number")?,
        user_id: uuid(row, "user_id")?,
        merchant_id: uuid(row, "merchant_id")?,
        status: label(row, "status")?,
        payment_status: label(row, "payment_status")?,
        shipping_status: label(row, "shipping_status")?,
        subtotal: money(row, "subtotal")?,
        tax: money(row, "tax")?,
        shipping_cost: money(row, "shipping_cost")?,
        discount_amount: money(row, "discount_amount")?,
        total_price: money(row, "total_price")?,
        coupon_code: row.try_get("coupon_code")?,
        notes: row.try_get("notes")?,
        tracking_number: row.try_get("tracking_number")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        shipping_address: shipping_address.map(|Json(address)| address),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        shipped_at: row.try_get("shipped_at")?,
        delivered_at: row.try_get("delivered_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        refunded_at: row.try_get("refunded_at")?,
    })
}

fn decode_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: uuid(row, "id")?,
        order_id: uuid(row, "order_id")?,
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: count(row, "quantity")?,
        unit_price: money(row, "unit_price")?,
        total_price: money(row, "total_price")?,
    })
}

fn decode_order_history(row: &PgRow) -> Result<OrderStatusHistory> {
    Ok(OrderStatusHistory {
        id: uuid(row, "id")?,
        order_id: uuid(row, "order_id")?,
        status: label(row, "status")?,
        notes: row.try_get("notes")?,
        changed_by: opt_uuid(row, "changed_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_payment(row: &PgRow) -> Result<Payment> {
    Ok(Payment {
        id: uuid(row, "id")?,
        order_id: uuid(row, "order_id")?,
        user_id: uuid(row, "user_id")?,
        amount: money(row, "amount")?,
        method: label(row, "method")?,
        status: label(row, "status")?,
        gateway_reference: row.try_get("gateway_reference")?,
        failure_reason: row.try_get("failure_reason")?,
        paid_at: row.try_get("paid_at")?,
        refunded_amount: opt_money(row, "refunded_amount")?,
        refund_reason: row.try_get("refund_reason")?,
        refunded_at: row.try_get("refunded_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_invoice(row: &PgRow) -> Result<Invoice> {
    let Json(items): Json<Vec<InvoiceLine>> = row.try_get("items")?;
    Ok(Invoice {
        id: uuid(row, "id")?,
        order_id: uuid(row, "order_id")?,
        invoice_number: row.try_get("invoice_number")?,
        status: label(row, "status")?,
        issue_date: row.try_get("issue_date")?,
        due_date: row.try_get("due_date")?,
        paid_date: row.try_get("paid_date")?,
        subtotal: money(row, "subtotal")?,
        tax: money(row, "tax")?,
        discount: money(row, "discount")?,
        shipping: money(row, "shipping")?,
        total: money(row, "total")?,
        items,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_transaction(row: &PgRow) -> Result<TransactionLog> {
    Ok(TransactionLog {
        id: uuid(row, "id")?,
        user_id: uuid(row, "user_id")?,
        order_id: opt_uuid(row, "order_id")?,
        payment_id: opt_uuid(row, "payment_id")?,
        kind: label(row, "kind")?,
        amount: money(row, "amount")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

// Queries shared by committed reads and transactions

async fn select_product(conn: &mut PgConnection, id: &ProductId) -> Result<Option<Product>> {
    let row = sqlx::query(
        "SELECT id, merchant_id, name, price, is_active, created_at FROM products WHERE id = $1",
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(decode_product).transpose()
}

async fn select_cart(conn: &mut PgConnection, user_id: UserId, lock: bool) -> Result<Option<Cart>> {
    let row = sqlx::query(&format!(
        "SELECT id, user_id, subtotal, tax, shipping, discount, total, created_at, updated_at \
         FROM carts WHERE user_id = $1{}",
        lock_clause(lock)
    ))
    .bind(user_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let id: CartId = uuid(&row, "id")?;

    let items = sqlx::query(
        "SELECT product_id, product_name, merchant_id, quantity, unit_price, subtotal \
         FROM cart_items WHERE cart_id = $1 ORDER BY position",
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(decode_cart_item)
    .collect::<Result<Vec<_>>>()?;

    Ok(Some(Cart {
        id,
        user_id: uuid(&row, "user_id")?,
        items,
        subtotal: money(&row, "subtotal")?,
        tax: money(&row, "tax")?,
        shipping: money(&row, "shipping")?,
        discount: money(&row, "discount")?,
        total: money(&row, "total")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

async fn select_stock(
    conn: &mut PgConnection,
    product_id: &ProductId,
    lock: bool,
) -> Result<Option<Stock>> {
    let row = sqlx::query(&format!(
        "SELECT product_id, quantity, reorder_level, updated_at FROM stocks \
         WHERE product_id = $1{}",
        lock_clause(lock)
    ))
    .bind(product_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(decode_stock).transpose()
}

async fn count_usages(
    conn: &mut PgConnection,
    coupon_id: CouponId,
    user_id: UserId,
) -> Result<u32> {
    let used: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
    )
    .bind(coupon_id.as_uuid())
    .bind(user_id.as_uuid())
    .fetch_one(conn)
    .await?;
    to_count(used, "coupon usage count")
}

async fn select_usage_for_order(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Option<CouponUsage>> {
    let row = sqlx::query(
        "SELECT id, coupon_id, order_id, user_id, discount_amount, created_at \
         FROM coupon_usages WHERE order_id = $1",
    )
    .bind(order_id.as_uuid())
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(decode_coupon_usage).transpose()
}

async fn select_order(conn: &mut PgConnection, id: OrderId, lock: bool) -> Result<Option<Order>> {
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}",
        lock_clause(lock)
    ))
    .bind(id.as_uuid())
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(decode_order).transpose()
}

async fn select_order_items(conn: &mut PgConnection, order_id: OrderId) -> Result<Vec<OrderItem>> {
    sqlx::query(
        "SELECT id, order_id, product_id, product_name, quantity, unit_price, total_price \
         FROM order_items WHERE order_id = $1 ORDER BY line_no",
    )
    .bind(order_id.as_uuid())
    .fetch_all(conn)
    .await?
    .iter()
    .map(decode_order_item)
    .collect()
}

async fn select_payment_by(
    conn: &mut PgConnection,
    column: &str,
    id: Uuid,
    lock: bool,
) -> Result<Option<Payment>> {
    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE {column} = $1{}",
        lock_clause(lock)
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(decode_payment).transpose()
}

async fn select_invoice_by(
    conn: &mut PgConnection,
    column: &str,
    id: Uuid,
    lock: bool,
) -> Result<Option<Invoice>> {
    let row = sqlx::query(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE {column} = $1{}",
        lock_clause(lock)
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(decode_invoice).transpose()
}

async fn select_last_number(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
    prefix: &str,
) -> Result<Option<String>> {
    Ok(sqlx::query_scalar(&format!(
        "SELECT {column} FROM {table} WHERE {column} LIKE $1 ORDER BY {column} DESC LIMIT 1"
    ))
    .bind(format!("{prefix}%"))
    .fetch_optional(conn)
    .await?)
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        select_product(&mut conn, id).await
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, merchant_id, name, price, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET merchant_id = EXCLUDED.merchant_id,
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(product.id.as_str())
        .bind(product.merchant_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.amount())
        .bind(product.is_active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_stock(&self, product_id: &ProductId) -> Result<Option<Stock>> {
        let mut conn = self.pool.acquire().await?;
        select_stock(&mut conn, product_id, false).await
    }

    async fn stock_history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>> {
        sqlx::query(
            r#"
            SELECT id, product_id, quantity_before, quantity_after, reason, notes, order_id, created_at
            FROM stock_histories
            WHERE product_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(product_id.as_str())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(decode_stock_history)
        .collect()
    }

    async fn low_stock(&self) -> Result<Vec<Stock>> {
        sqlx::query(
            "SELECT product_id, quantity, reorder_level, updated_at FROM stocks \
             WHERE quantity <= reorder_level ORDER BY product_id",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(decode_stock)
        .collect()
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        select_cart(&mut conn, user_id, false).await
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(Coupon::normalize_code(code))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_coupon).transpose()
    }

    async fn count_coupon_usages(&self, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        count_usages(&mut conn, coupon_id, user_id).await
    }

    async fn coupon_usage_for_order(&self, order_id: OrderId) -> Result<Option<CouponUsage>> {
        let mut conn = self.pool.acquire().await?;
        select_usage_for_order(&mut conn, order_id).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        select_order(&mut conn, id, false).await
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        select_order_items(&mut conn, order_id).await
    }

    async fn order_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        sqlx::query(
            "SELECT id, order_id, status, notes, changed_by, created_at \
             FROM order_status_histories WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(decode_order_history)
        .collect()
    }

    async fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let (column, id) = match filter {
            OrderFilter::User(user_id) => ("user_id", user_id.as_uuid()),
            OrderFilter::Merchant(merchant_id) => ("merchant_id", merchant_id.as_uuid()),
        };

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {column} = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        let orders = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = $1 \
             ORDER BY created_at DESC, order_number DESC LIMIT $2 OFFSET $3"
        ))
        .bind(id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(decode_order)
        .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(orders, page, total.max(0) as u64))
    }

    async fn merchant_orders(&self, merchant_id: MerchantId) -> Result<Vec<Order>> {
        sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE merchant_id = $1 ORDER BY created_at DESC"
        ))
        .bind(merchant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(decode_order)
        .collect()
    }

    async fn merchant_items_sold(&self, merchant_id: MerchantId) -> Result<u64> {
        let sold: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(oi.quantity), 0)::BIGINT
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.merchant_id = $1 AND o.status <> 'cancelled'
            "#,
        )
        .bind(merchant_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(sold.max(0) as u64)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        select_payment_by(&mut conn, "id", id.as_uuid(), false).await
    }

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        select_payment_by(&mut conn, "order_id", order_id.as_uuid(), false).await
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        select_invoice_by(&mut conn, "id", id.as_uuid(), false).await
    }

    async fn invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        select_invoice_by(&mut conn, "order_id", order_id.as_uuid(), false).await
    }

    async fn transactions_for_order(&self, order_id: OrderId) -> Result<Vec<TransactionLog>> {
        sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transaction_logs WHERE order_id = $1 \
             ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(decode_transaction)
        .collect()
    }

    async fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<TransactionLog>> {
        sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transaction_logs WHERE user_id = $1 \
             ORDER BY created_at ASC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(decode_transaction)
        .collect()
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(map_write_err)
    }

    async fn get_product(&mut self, id: &ProductId) -> Result<Option<Product>> {
        select_product(&mut self.tx, id).await
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        // A missing row cannot be locked; save_cart upserts on user_id.
        select_cart(&mut self.tx, user_id, true).await
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        let cart_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO carts (id, user_id, subtotal, tax, shipping, discount, total, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE
            SET subtotal = EXCLUDED.subtotal,
                tax = EXCLUDED.tax,
                shipping = EXCLUDED.shipping,
                discount = EXCLUDED.discount,
                total = EXCLUDED.total,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.subtotal.amount())
        .bind(cart.tax.amount())
        .bind(cart.shipping.amount())
        .bind(cart.discount.amount())
        .bind(cart.total.amount())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_err)?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *self.tx)
            .await?;

        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, position, product_id, product_name, merchant_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(cart_id)
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(item.merchant_id.as_uuid())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.amount())
            .bind(item.subtotal.amount())
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_err)?;
        }
        Ok(())
    }

    async fn lock_stock(&mut self, product_id: &ProductId) -> Result<Option<Stock>> {
        select_stock(&mut self.tx, product_id, true).await
    }

    async fn insert_stock(&mut self, stock: &Stock) -> Result<()> {
        sqlx::query(
            "INSERT INTO stocks (product_id, quantity, reorder_level, updated_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(stock.product_id.as_str())
        .bind(i64::from(stock.quantity))
        .bind(i64::from(stock.reorder_level))
        .bind(stock.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn update_stock(&mut self, stock: &Stock) -> Result<()> {
        let result = sqlx::query(
            "UPDATE stocks SET quantity = $2, reorder_level = $3, updated_at = $4 \
             WHERE product_id = $1",
        )
        .bind(stock.product_id.as_str())
        .bind(i64::from(stock.quantity))
        .bind(i64::from(stock.reorder_level))
        .bind(stock.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result.rows_affected(), "stock", &stock.product_id)
    }

    async fn append_stock_history(&mut self, entry: &StockHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_histories (id, product_id, quantity_before, quantity_after, reason, notes, order_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.product_id.as_str())
        .bind(i64::from(entry.quantity_before))
        .bind(i64::from(entry.quantity_after))
        .bind(entry.reason.as_str())
        .bind(&entry.notes)
        .bind(entry.order_id.map(|id| id.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_coupon_by_code(&mut self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
        ))
        .bind(Coupon::normalize_code(code))
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(decode_coupon).transpose()
    }

    async fn lock_coupon(&mut self, id: CouponId) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(decode_coupon).transpose()
    }

    async fn insert_coupon(&mut self, coupon: &Coupon) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO coupons ({COUPON_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(coupon.kind.as_str())
        .bind(coupon.value)
        .bind(coupon.min_purchase.amount())
        .bind(coupon.max_discount.map(|m| m.amount()))
        .bind(coupon.usage_limit.map(i64::from))
        .bind(i64::from(coupon.used_count))
        .bind(coupon.per_customer_limit.map(i64::from))
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn update_coupon(&mut self, coupon: &Coupon) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET used_count = $2, is_active = $3, usage_limit = $4, per_customer_limit = $5,
                valid_from = $6, valid_until = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(i64::from(coupon.used_count))
        .bind(coupon.is_active)
        .bind(coupon.usage_limit.map(i64::from))
        .bind(coupon.per_customer_limit.map(i64::from))
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result.rows_affected(), "coupon", coupon.id)
    }

    async fn count_coupon_usages(&mut self, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
        count_usages(&mut self.tx, coupon_id, user_id).await
    }

    async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupon_usages (id, coupon_id, order_id, user_id, discount_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(usage.id.as_uuid())
        .bind(usage.coupon_id.as_uuid())
        .bind(usage.order_id.as_uuid())
        .bind(usage.user_id.as_uuid())
        .bind(usage.discount_amount.amount())
        .bind(usage.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn coupon_usage_for_order(&mut self, order_id: OrderId) -> Result<Option<CouponUsage>> {
        select_usage_for_order(&mut self.tx, order_id).await
    }

    async fn delete_coupon_usage(&mut self, id: EntryId) -> Result<()> {
        sqlx::query("DELETE FROM coupon_usages WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn last_order_number(&mut self, prefix: &str) -> Result<Option<String>> {
        select_last_number(&mut self.tx, "orders", "order_number", prefix).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)"
        ))
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(order.user_id.as_uuid())
        .bind(order.merchant_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.shipping_status.as_str())
        .bind(order.subtotal.amount())
        .bind(order.tax.amount())
        .bind(order.shipping_cost.amount())
        .bind(order.discount_amount.amount())
        .bind(order.total_price.amount())
        .bind(&order.coupon_code)
        .bind(&order.notes)
        .bind(&order.tracking_number)
        .bind(&order.cancellation_reason)
        .bind(order.shipping_address.as_ref().map(Json))
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        select_order(&mut self.tx, id, true).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, shipping_status = $4, tracking_number = $5,
                cancellation_reason = $6, updated_at = $7, confirmed_at = $8, shipped_at = $9,
                delivered_at = $10, completed_at = $11, cancelled_at = $12, refunded_at = $13
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.shipping_status.as_str())
        .bind(&order.tracking_number)
        .bind(&order.cancellation_reason)
        .bind(order.updated_at)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result.rows_affected(), "order", order.id)
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        for (line_no, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, line_no, product_id, product_name, quantity, unit_price, total_price)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(line_no as i32)
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.amount())
            .bind(item.total_price.amount())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        select_order_items(&mut self.tx, order_id).await
    }

    async fn append_order_history(&mut self, entry: &OrderStatusHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_histories (id, order_id, status, notes, changed_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.order_id.as_uuid())
        .bind(entry.status.as_str())
        .bind(&entry.notes)
        .bind(entry.changed_by.map(|id| id.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.amount.amount())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.gateway_reference)
        .bind(&payment.failure_reason)
        .bind(payment.paid_at)
        .bind(payment.refunded_amount.map(|m| m.amount()))
        .bind(&payment.refund_reason)
        .bind(payment.refunded_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        select_payment_by(&mut self.tx, "id", id.as_uuid(), true).await
    }

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        select_payment_by(&mut self.tx, "order_id", order_id.as_uuid(), false).await
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, gateway_reference = $3, failure_reason = $4, paid_at = $5,
                refunded_amount = $6, refund_reason = $7, refunded_at = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.gateway_reference)
        .bind(&payment.failure_reason)
        .bind(payment.paid_at)
        .bind(payment.refunded_amount.map(|m| m.amount()))
        .bind(&payment.refund_reason)
        .bind(payment.refunded_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result.rows_affected(), "payment", payment.id)
    }

    async fn last_invoice_number(&mut self, prefix: &str) -> Result<Option<String>> {
        select_last_number(&mut self.tx, "invoices", "invoice_number", prefix).await
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO invoices ({INVOICE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(invoice.id.as_uuid())
        .bind(invoice.order_id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(invoice.status.as_str())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.paid_date)
        .bind(invoice.subtotal.amount())
        .bind(invoice.tax.amount())
        .bind(invoice.discount.amount())
        .bind(invoice.shipping.amount())
        .bind(invoice.total.amount())
        .bind(Json(&invoice.items))
        .bind(&invoice.notes)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn lock_invoice_for_order(&mut self, order_id: OrderId) -> Result<Option<Invoice>> {
        select_invoice_by(&mut self.tx, "order_id", order_id.as_uuid(), true).await
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        let result = sqlx::query(
            "UPDATE invoices SET status = $2, paid_date = $3, notes = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.status.as_str())
        .bind(invoice.paid_date)
        .bind(&invoice.notes)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await?;
        expect_one(result.rows_affected(), "invoice", invoice.id)
    }

    async fn append_transaction(&mut self, entry: &TransactionLog) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO transaction_logs ({TRANSACTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(entry.id.as_uuid())
        .bind(entry.user_id.as_uuid())
        .bind(entry.order_id.map(|id| id.as_uuid()))
        .bind(entry.payment_id.map(|id| id.as_uuid()))
        .bind(entry.kind.as_str())
        .bind(entry.amount.amount())
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
