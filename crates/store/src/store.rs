use async_trait::async_trait;
use common::{
    CouponId, EntryId, InvoiceId, MerchantId, OrderId, Page, PageRequest, PaymentId, ProductId,
    UserId,
};
use domain::{
    Cart, Coupon, CouponUsage, Invoice, Order, OrderItem, OrderStatusHistory, Payment, Product,
    Stock, StockHistory, TransactionLog,
};

use crate::Result;

/// Whose orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    User(UserId),
    Merchant(MerchantId),
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderFilter::User(user_id) => order.user_id == *user_id,
            OrderFilter::Merchant(merchant_id) => order.merchant_id == *merchant_id,
        }
    }
}

/// Core trait for storage backends.
///
/// Methods on `Store` read committed state and never block on row locks.
/// Every mutation goes through a [`StoreTx`] obtained from [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    // Catalog

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a catalog row.
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    // Stock

    async fn get_stock(&self, product_id: &ProductId) -> Result<Option<Stock>>;

    /// History rows for a product, oldest first.
    async fn stock_history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>>;

    /// Stock rows at or below their reorder level.
    async fn low_stock(&self) -> Result<Vec<Stock>>;

    // Carts and coupons

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    async fn count_coupon_usages(&self, coupon_id: CouponId, user_id: UserId) -> Result<u32>;

    async fn coupon_usage_for_order(&self, order_id: OrderId) -> Result<Option<CouponUsage>>;

    // Orders

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Status trail for an order, oldest first.
    async fn order_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>>;

    /// Orders matching the filter, newest first.
    async fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>>;

    /// Every order of a merchant.
    async fn merchant_orders(&self, merchant_id: MerchantId) -> Result<Vec<Order>>;

    /// Units sold by a merchant across orders that were not cancelled.
    async fn merchant_items_sold(&self, merchant_id: MerchantId) -> Result<u64>;

    // Payments and invoices

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>>;

    async fn invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>>;

    // Transaction log

    async fn transactions_for_order(&self, order_id: OrderId) -> Result<Vec<TransactionLog>>;

    async fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<TransactionLog>>;
}

/// A unit of work.
///
/// `lock_*` methods take an exclusive lock on the row (present or not) that
/// is held until the transaction ends. `update_*` methods require the row to
/// have been locked by this transaction. Writes become visible to other
/// readers only on [`StoreTx::commit`]; dropping the transaction discards
/// them.
///
/// Callers lock rows in this order to stay deadlock-free: cart, payment,
/// order, invoice, coupon, stock (ascending product id).
#[async_trait]
pub trait StoreTx: Send {
    /// Makes every staged write visible atomically.
    ///
    /// Fails with [`StoreError::UniqueViolation`](crate::StoreError) if a
    /// concurrent commit took a unique value first; nothing is applied then.
    async fn commit(self) -> Result<()>;

    async fn get_product(&mut self, id: &ProductId) -> Result<Option<Product>>;

    // Carts

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Inserts or replaces the user's cart. The cart must be locked.
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;

    // Stock

    async fn lock_stock(&mut self, product_id: &ProductId) -> Result<Option<Stock>>;

    async fn insert_stock(&mut self, stock: &Stock) -> Result<()>;

    async fn update_stock(&mut self, stock: &Stock) -> Result<()>;

    async fn append_stock_history(&mut self, entry: &StockHistory) -> Result<()>;

    // Coupons

    async fn lock_coupon_by_code(&mut self, code: &str) -> Result<Option<Coupon>>;

    async fn lock_coupon(&mut self, id: CouponId) -> Result<Option<Coupon>>;

    async fn insert_coupon(&mut self, coupon: &Coupon) -> Result<()>;

    async fn update_coupon(&mut self, coupon: &Coupon) -> Result<()>;

    async fn count_coupon_usages(&mut self, coupon_id: CouponId, user_id: UserId) -> Result<u32>;

    async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> Result<()>;

    async fn coupon_usage_for_order(&mut self, order_id: OrderId) -> Result<Option<CouponUsage>>;

    async fn delete_coupon_usage(&mut self, id: EntryId) -> Result<()>;

    // Orders

    /// Highest order number issued under `prefix`, including this
    /// transaction's own inserts.
    async fn last_order_number(&mut self, prefix: &str) -> Result<Option<String>>;

    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn update_order(&mut self, order: &Order) -> Result<()>;

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()>;

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    async fn append_order_history(&mut self, entry: &OrderStatusHistory) -> Result<()>;

    // Payments

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    // Invoices

    /// Highest invoice number issued under `prefix`, including this
    /// transaction's own inserts.
    async fn last_invoice_number(&mut self, prefix: &str) -> Result<Option<String>>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()>;

    async fn lock_invoice_for_order(&mut self, order_id: OrderId) -> Result<Option<Invoice>>;

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<()>;

    // Transaction log

    async fn append_transaction(&mut self, entry: &TransactionLog) -> Result<()>;
}
