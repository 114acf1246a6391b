use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use common::{
    CouponId, EntryId, InvoiceId, MerchantId, OrderId, Page, PageRequest, PaymentId, ProductId,
    UserId,
};
use domain::{
    Cart, Coupon, CouponUsage, Invoice, Order, OrderItem, OrderStatus, OrderStatusHistory,
    Payment, Product, Stock, StockHistory, TransactionLog,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Result, StoreError, constraints,
    store::{OrderFilter, Store, StoreTx},
};

/// A lockable row. A vacant row (`None`) can still be locked, which
/// serializes concurrent inserts of the same key.
struct Row<V> {
    lock: Arc<Mutex<()>>,
    value: RwLock<Option<V>>,
}

impl<V> Default for Row<V> {
    fn default() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            value: RwLock::new(None),
        }
    }
}

struct Table<K, V> {
    rows: RwLock<HashMap<K, Arc<Row<V>>>>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Table<K, V> {
    async fn row(&self, key: &K) -> Arc<Row<V>> {
        if let Some(row) = self.rows.read().await.get(key) {
            return Arc::clone(row);
        }
        let mut rows = self.rows.write().await;
        Arc::clone(rows.entry(key.clone()).or_default())
    }

    async fn get(&self, key: &K) -> Option<V> {
        let row = self.rows.read().await.get(key).cloned()?;
        let value = row.value.read().await.clone();
        value
    }

    async fn values(&self) -> Vec<V> {
        let rows: Vec<_> = self.rows.read().await.values().cloned().collect();
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(value) = row.value.read().await.clone() {
                values.push(value);
            }
        }
        values
    }

    async fn find(&self, predicate: impl Fn(&V) -> bool) -> Option<V> {
        self.values().await.into_iter().find(|v| predicate(v))
    }

    async fn put(&self, key: &K, value: V) {
        let row = self.row(key).await;
        *row.value.write().await = Some(value);
    }
}

enum Write<V> {
    Insert(V),
    Update(V),
}

impl<V> Write<V> {
    fn value(&self) -> &V {
        match self {
            Write::Insert(v) | Write::Update(v) => v,
        }
    }
}

/// Per-table transaction state: held row locks and staged writes.
struct Staged<K, V> {
    entity: &'static str,
    primary_key: &'static str,
    locks: HashMap<K, OwnedMutexGuard<()>>,
    writes: HashMap<K, Write<V>>,
}

impl<K: Eq + Hash + Clone + Display, V: Clone> Staged<K, V> {
    fn new(entity: &'static str, primary_key: &'static str) -> Self {
        Self {
            entity,
            primary_key,
            locks: HashMap::new(),
            writes: HashMap::new(),
        }
    }

    async fn lock(&mut self, table: &Table<K, V>, key: &K) -> Option<V> {
        if !self.locks.contains_key(key) {
            let row = table.row(key).await;
            let guard = Arc::clone(&row.lock).lock_owned().await;
            self.locks.insert(key.clone(), guard);
        }
        self.current(table, key).await
    }

    async fn current(&self, table: &Table<K, V>, key: &K) -> Option<V> {
        match self.writes.get(key) {
            Some(write) => Some(write.value().clone()),
            None => table.get(key).await,
        }
    }

    fn insert(&mut self, key: K, value: V) {
        self.writes.insert(key, Write::Insert(value));
    }

    fn update(&mut self, key: K, value: V) -> Result<()> {
        if !self.locks.contains_key(&key) {
            return Err(StoreError::NotLocked {
                entity: self.entity,
                id: key.to_string(),
            });
        }
        match self.writes.get_mut(&key) {
            Some(Write::Insert(staged)) => *staged = value,
            _ => {
                self.writes.insert(key, Write::Update(value));
            }
        }
        Ok(())
    }

    fn inserted(&self) -> impl Iterator<Item = &V> {
        self.writes.values().filter_map(|write| match write {
            Write::Insert(v) => Some(v),
            Write::Update(_) => None,
        })
    }

    fn staged(&self) -> impl Iterator<Item = &V> {
        self.writes.values().map(Write::value)
    }

    async fn validate(&self, table: &Table<K, V>) -> Result<()> {
        for (key, write) in &self.writes {
            let exists = table.get(key).await.is_some();
            match write {
                Write::Insert(_) if exists => return Err(StoreError::unique(self.primary_key)),
                Write::Update(_) if !exists => {
                    return Err(StoreError::NotFound {
                        entity: self.entity,
                        id: key.to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn apply(self, table: &Table<K, V>) {
        for (key, write) in self.writes {
            let value = match write {
                Write::Insert(v) | Write::Update(v) => v,
            };
            table.put(&key, value).await;
        }
    }
}

#[derive(Default)]
struct Inner {
    products: RwLock<HashMap<ProductId, Product>>,
    carts: Table<UserId, Cart>,
    stock: Table<ProductId, Stock>,
    coupons: Table<String, Coupon>,
    orders: Table<OrderId, Order>,
    payments: Table<PaymentId, Payment>,
    invoices: Table<OrderId, Invoice>,
    stock_history: RwLock<Vec<StockHistory>>,
    order_items: RwLock<HashMap<OrderId, Vec<OrderItem>>>,
    order_history: RwLock<Vec<OrderStatusHistory>>,
    coupon_usages: RwLock<Vec<CouponUsage>>,
    transactions: RwLock<Vec<TransactionLog>>,
    commit_lock: Mutex<()>,
}

/// Row counts across every table, for assertions in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub orders: usize,
    pub order_items: usize,
    pub order_history: usize,
    pub payments: usize,
    pub invoices: usize,
    pub stock_history: usize,
    pub coupon_usages: usize,
    pub transactions: usize,
}

/// In-memory store with row-level locking.
///
/// Each transaction holds exclusive per-row mutex guards and stages its
/// writes; commit validates unique constraints and applies everything under
/// a single commit lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed rows per table.
    pub async fn row_counts(&self) -> RowCounts {
        let inner = &self.inner;
        RowCounts {
            orders: inner.orders.values().await.len(),
            order_items: inner.order_items.read().await.values().map(Vec::len).sum(),
            order_history: inner.order_history.read().await.len(),
            payments: inner.payments.values().await.len(),
            invoices: inner.invoices.values().await.len(),
            stock_history: inner.stock_history.read().await.len(),
            coupon_usages: inner.coupon_usages.read().await.len(),
            transactions: inner.transactions.read().await.len(),
        }
    }

    async fn committed_items(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.inner
            .order_items
            .read()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        Ok(InMemoryTx::new(Arc::clone(&self.inner)))
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.inner.products.read().await.get(id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.inner
            .products
            .write()
            .await
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn get_stock(&self, product_id: &ProductId) -> Result<Option<Stock>> {
        Ok(self.inner.stock.get(product_id).await)
    }

    async fn stock_history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>> {
        let history = self.inner.stock_history.read().await;
        Ok(history
            .iter()
            .filter(|h| &h.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn low_stock(&self) -> Result<Vec<Stock>> {
        let mut rows: Vec<_> = self
            .inner
            .stock
            .values()
            .await
            .into_iter()
            .filter(Stock::needs_reorder)
            .collect();
        rows.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(rows)
    }

    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.inner.carts.get(&user_id).await)
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.inner.coupons.get(&Coupon::normalize_code(code)).await)
    }

    async fn count_coupon_usages(&self, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
        let usages = self.inner.coupon_usages.read().await;
        Ok(usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id && u.user_id == user_id)
            .count() as u32)
    }

    async fn coupon_usage_for_order(&self, order_id: OrderId) -> Result<Option<CouponUsage>> {
        let usages = self.inner.coupon_usages.read().await;
        Ok(usages.iter().find(|u| u.order_id == order_id).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.orders.get(&id).await)
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self.committed_items(order_id).await)
    }

    async fn order_history(&self, order_id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let history = self.inner.order_history.read().await;
        Ok(history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let mut orders: Vec<_> = self
            .inner
            .orders
            .values()
            .await
            .into_iter()
            .filter(|o| filter.matches(o))
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });

        let total = orders.len() as u64;
        let items = orders
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .collect();
        Ok(Page::new(items, page, total))
    }

    async fn merchant_orders(&self, merchant_id: MerchantId) -> Result<Vec<Order>> {
        let filter = OrderFilter::Merchant(merchant_id);
        Ok(self
            .inner
            .orders
            .values()
            .await
            .into_iter()
            .filter(|o| filter.matches(o))
            .collect())
    }

    async fn merchant_items_sold(&self, merchant_id: MerchantId) -> Result<u64> {
        let orders = self.merchant_orders(merchant_id).await?;
        let items = self.inner.order_items.read().await;
        Ok(orders
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .filter_map(|o| items.get(&o.id))
            .flatten()
            .map(|item| u64::from(item.quantity))
            .sum())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.inner.payments.get(&id).await)
    }

    async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.inner.payments.find(|p| p.order_id == order_id).await)
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.inner.invoices.find(|i| i.id == id).await)
    }

    async fn invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>> {
        Ok(self.inner.invoices.get(&order_id).await)
    }

    async fn transactions_for_order(&self, order_id: OrderId) -> Result<Vec<TransactionLog>> {
        let log = self.inner.transactions.read().await;
        Ok(log
            .iter()
            .filter(|t| t.order_id == Some(order_id))
            .cloned()
            .collect())
    }

    async fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<TransactionLog>> {
        let log = self.inner.transactions.read().await;
        Ok(log
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTx {
    inner: Arc<Inner>,
    carts: Staged<UserId, Cart>,
    stock: Staged<ProductId, Stock>,
    coupons: Staged<String, Coupon>,
    orders: Staged<OrderId, Order>,
    payments: Staged<PaymentId, Payment>,
    invoices: Staged<OrderId, Invoice>,
    stock_history: Vec<StockHistory>,
    order_items: Vec<OrderItem>,
    order_history: Vec<OrderStatusHistory>,
    coupon_usages: Vec<CouponUsage>,
    deleted_usages: HashSet<EntryId>,
    transactions: Vec<TransactionLog>,
}

impl InMemoryTx {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            carts: Staged::new("cart", constraints::CART_USER),
            stock: Staged::new("stock", constraints::STOCK_PRODUCT),
            coupons: Staged::new("coupon", constraints::COUPON_CODE),
            orders: Staged::new("order", constraints::ORDER_ID),
            payments: Staged::new("payment", constraints::PAYMENT_ID),
            invoices: Staged::new("invoice", constraints::INVOICE_ORDER),
            stock_history: Vec::new(),
            order_items: Vec::new(),
            order_history: Vec::new(),
            coupon_usages: Vec::new(),
            deleted_usages: HashSet::new(),
            transactions: Vec::new(),
        }
    }

    async fn committed_usages(&self) -> Vec<CouponUsage> {
        self.inner
            .coupon_usages
            .read()
            .await
            .iter()
            .filter(|u| !self.deleted_usages.contains(&u.id))
            .cloned()
            .collect()
    }

    async fn validate(&self) -> Result<()> {
        let inner = &self.inner;
        self.carts.validate(&inner.carts).await?;
        self.stock.validate(&inner.stock).await?;
        self.coupons.validate(&inner.coupons).await?;
        self.orders.validate(&inner.orders).await?;
        self.payments.validate(&inner.payments).await?;
        self.invoices.validate(&inner.invoices).await?;

        let committed_orders = inner.orders.values().await;
        let mut order_numbers: HashSet<&str> = committed_orders
            .iter()
            .map(|o| o.order_number.as_str())
            .collect();
        for order in self.orders.inserted() {
            if !order_numbers.insert(order.order_number.as_str()) {
                return Err(StoreError::unique(constraints::ORDER_NUMBER));
            }
        }

        let committed_invoices = inner.invoices.values().await;
        let mut invoice_numbers: HashSet<&str> = committed_invoices
            .iter()
            .map(|i| i.invoice_number.as_str())
            .collect();
        for invoice in self.invoices.inserted() {
            if !invoice_numbers.insert(invoice.invoice_number.as_str()) {
                return Err(StoreError::unique(constraints::INVOICE_NUMBER));
            }
        }

        let committed_payments = inner.payments.values().await;
        let mut paid_orders: HashSet<OrderId> =
            committed_payments.iter().map(|p| p.order_id).collect();
        for payment in self.payments.inserted() {
            if !paid_orders.insert(payment.order_id) {
                return Err(StoreError::unique(constraints::PAYMENT_ORDER));
            }
        }

        let mut discounted_orders: HashSet<OrderId> = self
            .committed_usages()
            .await
            .iter()
            .map(|u| u.order_id)
            .collect();
        for usage in &self.coupon_usages {
            if !discounted_orders.insert(usage.order_id) {
                return Err(StoreError::unique(constraints::COUPON_USAGE_ORDER));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn commit(self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let _commit = inner.commit_lock.lock().await;

        self.validate().await?;

        let InMemoryTx {
            carts,
            stock,
            coupons,
            orders,
            payments,
            invoices,
            stock_history,
            order_items,
            order_history,
            coupon_usages,
            deleted_usages,
            transactions,
            ..
        } = self;

        carts.apply(&inner.carts).await;
        stock.apply(&inner.stock).await;
        coupons.apply(&inner.coupons).await;
        orders.apply(&inner.orders).await;
        payments.apply(&inner.payments).await;
        invoices.apply(&inner.invoices).await;

        inner.stock_history.write().await.extend(stock_history);
        {
            let mut items = inner.order_items.write().await;
            for item in order_items {
                items.entry(item.order_id).or_default().push(item);
            }
        }
        inner.order_history.write().await.extend(order_history);
        {
            let mut usages = inner.coupon_usages.write().await;
            usages.retain(|u| !deleted_usages.contains(&u.id));
            usages.extend(coupon_usages);
        }
        inner.transactions.write().await.extend(transactions);

        Ok(())
    }

    async fn get_product(&mut self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.inner.products.read().await.get(id).cloned())
    }

    async fn lock_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.carts.lock(&self.inner.carts, &user_id).await)
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        let existing = self.carts.current(&self.inner.carts, &cart.user_id).await;
        match existing {
            Some(_) => self.carts.update(cart.user_id, cart.clone()),
            None => {
                self.carts.insert(cart.user_id, cart.clone());
                Ok(())
            }
        }
    }

    async fn lock_stock(&mut self, product_id: &ProductId) -> Result<Option<Stock>> {
        Ok(self.stock.lock(&self.inner.stock, product_id).await)
    }

    async fn insert_stock(&mut self, stock: &Stock) -> Result<()> {
        self.stock.insert(stock.product_id.clone(), stock.clone());
        Ok(())
    }

    async fn update_stock(&mut self, stock: &Stock) -> Result<()> {
        self.stock.update(stock.product_id.clone(), stock.clone())
    }

    async fn append_stock_history(&mut self, entry: &StockHistory) -> Result<()> {
        self.stock_history.push(entry.clone());
        Ok(())
    }

    async fn lock_coupon_by_code(&mut self, code: &str) -> Result<Option<Coupon>> {
        let code = Coupon::normalize_code(code);
        Ok(self.coupons.lock(&self.inner.coupons, &code).await)
    }

    async fn lock_coupon(&mut self, id: CouponId) -> Result<Option<Coupon>> {
        let staged = self
            .coupons
            .staged()
            .find(|c| c.id == id)
            .map(|c| c.code.clone());
        let code = match staged {
            Some(code) => Some(code),
            None => self.inner.coupons.find(|c| c.id == id).await.map(|c| c.code),
        };
        match code {
            Some(code) => Ok(self.coupons.lock(&self.inner.coupons, &code).await),
            None => Ok(None),
        }
    }

    async fn insert_coupon(&mut self, coupon: &Coupon) -> Result<()> {
        self.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn update_coupon(&mut self, coupon: &Coupon) -> Result<()> {
        self.coupons.update(coupon.code.clone(), coupon.clone())
    }

    async fn count_coupon_usages(&mut self, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
        let is_match = |u: &CouponUsage| u.coupon_id == coupon_id && u.user_id == user_id;
        let committed = self
            .committed_usages()
            .await
            .iter()
            .filter(|&u| is_match(u))
            .count();
        let staged = self.coupon_usages.iter().filter(|&u| is_match(u)).count();
        Ok((committed + staged) as u32)
    }

    async fn insert_coupon_usage(&mut self, usage: &CouponUsage) -> Result<()> {
        self.coupon_usages.push(usage.clone());
        Ok(())
    }

    async fn coupon_usage_for_order(&mut self, order_id: OrderId) -> Result<Option<CouponUsage>> {
        if let Some(usage) = self.coupon_usages.iter().find(|u| u.order_id == order_id) {
            return Ok(Some(usage.clone()));
        }
        Ok(self
            .committed_usages()
            .await
            .into_iter()
            .find(|u| u.order_id == order_id))
    }

    async fn delete_coupon_usage(&mut self, id: EntryId) -> Result<()> {
        let before = self.coupon_usages.len();
        self.coupon_usages.retain(|u| u.id != id);
        if self.coupon_usages.len() == before {
            self.deleted_usages.insert(id);
        }
        Ok(())
    }

    async fn last_order_number(&mut self, prefix: &str) -> Result<Option<String>> {
        let committed = self.inner.orders.values().await;
        Ok(committed
            .iter()
            .chain(self.orders.inserted())
            .map(|o| o.order_number.as_str())
            .filter(|number| number.starts_with(prefix))
            .max()
            .map(str::to_string))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.lock(&self.inner.orders, &id).await)
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        self.orders.update(order.id, order.clone())
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        self.order_items.extend_from_slice(items);
        Ok(())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let mut items = self
            .inner
            .order_items
            .read()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default();
        items.extend(
            self.order_items
                .iter()
                .filter(|i| i.order_id == order_id)
                .cloned(),
        );
        Ok(items)
    }

    async fn append_order_history(&mut self, entry: &OrderStatusHistory) -> Result<()> {
        self.order_history.push(entry.clone());
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.lock(&self.inner.payments, &id).await)
    }

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        if let Some(payment) = self.payments.staged().find(|p| p.order_id == order_id) {
            return Ok(Some(payment.clone()));
        }
        Ok(self.inner.payments.find(|p| p.order_id == order_id).await)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        self.payments.update(payment.id, payment.clone())
    }

    async fn last_invoice_number(&mut self, prefix: &str) -> Result<Option<String>> {
        let committed = self.inner.invoices.values().await;
        Ok(committed
            .iter()
            .chain(self.invoices.inserted())
            .map(|i| i.invoice_number.as_str())
            .filter(|number| number.starts_with(prefix))
            .max()
            .map(str::to_string))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        self.invoices.insert(invoice.order_id, invoice.clone());
        Ok(())
    }

    async fn lock_invoice_for_order(&mut self, order_id: OrderId) -> Result<Option<Invoice>> {
        Ok(self.invoices.lock(&self.inner.invoices, &order_id).await)
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        self.invoices.update(invoice.order_id, invoice.clone())
    }

    async fn append_transaction(&mut self, entry: &TransactionLog) -> Result<()> {
        self.transactions.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use common::Money;
    use domain::{NewOrder, OrderTotals, StockChangeReason};

    use super::*;

    fn order(number: &str) -> Order {
        Order::place(
            number.to_string(),
            UserId::new(),
            MerchantId::new(),
            NewOrder::default(),
            OrderTotals::compute(Money::new(1_000), Money::zero(), Money::zero()).unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    async fn seeded_stock(store: &InMemoryStore, sku: &str, quantity: u32) {
        let mut tx = store.begin().await.unwrap();
        tx.lock_stock(&ProductId::new(sku)).await.unwrap();
        tx.insert_stock(&Stock::new(sku, quantity, 0)).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = InMemoryStore::new();
        let order = order("ORD-20260101000001");

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        assert!(store.get_order(order.id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert_eq!(store.get_order(order.id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = InMemoryStore::new();
        seeded_stock(&store, "SKU-001", 10).await;

        {
            let mut tx = store.begin().await.unwrap();
            let mut stock = tx.lock_stock(&ProductId::new("SKU-001")).await.unwrap().unwrap();
            let movement = stock.deduct(4, Utc::now()).unwrap();
            tx.update_stock(&stock).await.unwrap();
            tx.append_stock_history(&StockHistory::record(
                stock.product_id.clone(),
                movement,
                StockChangeReason::Purchase,
                None,
                None,
                Utc::now(),
            ))
            .await
            .unwrap();
        }

        let stock = store.get_stock(&ProductId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);
        assert!(store.stock_history(&stock.product_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_lock() {
        let store = InMemoryStore::new();
        seeded_stock(&store, "SKU-001", 10).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.update_stock(&Stock::new("SKU-001", 5, 0)).await;
        assert!(matches!(result, Err(StoreError::NotLocked { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected_at_commit() {
        let store = InMemoryStore::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_order(&order("ORD-20260101000001")).await.unwrap();
        second.insert_order(&order("ORD-20260101000001")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert_eq!(err.violated_constraint(), Some(constraints::ORDER_NUMBER));
        assert_eq!(store.row_counts().await.orders, 1);
    }

    #[tokio::test]
    async fn test_last_order_number_sees_own_inserts() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order("ORD-20260101000001")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order("ORD-20260101000002")).await.unwrap();
        assert_eq!(
            tx.last_order_number("ORD-20260101").await.unwrap().as_deref(),
            Some("ORD-20260101000002")
        );
        assert_eq!(tx.last_order_number("ORD-20260102").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_transaction() {
        let store = InMemoryStore::new();
        seeded_stock(&store, "SKU-001", 10).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_stock(&ProductId::new("SKU-001")).await.unwrap();

        let contender = store.clone();
        let waiting = tokio::spawn(async move {
            let mut tx = contender.begin().await.unwrap();
            tx.lock_stock(&ProductId::new("SKU-001")).await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        drop(holder);
        let stock = waiting.await.unwrap().unwrap();
        assert_eq!(stock.quantity, 10);
    }

    #[tokio::test]
    async fn test_unrelated_rows_do_not_block() {
        let store = InMemoryStore::new();
        seeded_stock(&store, "SKU-001", 10).await;
        seeded_stock(&store, "SKU-002", 10).await;

        let mut first = store.begin().await.unwrap();
        first.lock_stock(&ProductId::new("SKU-001")).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let stock = tokio::time::timeout(
            Duration::from_secs(1),
            second.lock_stock(&ProductId::new("SKU-002")),
        )
        .await
        .expect("lock on another product should not wait")
        .unwrap();
        assert!(stock.is_some());
    }

    #[tokio::test]
    async fn test_coupon_usage_delete_and_count() {
        let store = InMemoryStore::new();
        let coupon = Coupon::percentage("SAVE10", 10);
        let user = UserId::new();
        let usage = CouponUsage::new(coupon.id, OrderId::new(), user, Money::new(100), Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_coupon(&coupon).await.unwrap();
        tx.insert_coupon_usage(&usage).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.count_coupon_usages(coupon.id, user).await.unwrap(), 1);

        let mut tx = store.begin().await.unwrap();
        tx.delete_coupon_usage(usage.id).await.unwrap();
        assert_eq!(tx.count_coupon_usages(coupon.id, user).await.unwrap(), 0);
        tx.commit().await.unwrap();

        assert_eq!(store.count_coupon_usages(coupon.id, user).await.unwrap(), 0);
        assert!(store.coupon_usage_for_order(usage.order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_payment_for_order_rejected() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();
        let payment = || {
            Payment::new(
                order_id,
                UserId::new(),
                Money::new(100),
                domain::PaymentMethod::BankTransfer,
                Utc::now(),
            )
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_payment(&payment()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_payment(&payment()).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.violated_constraint(), Some(constraints::PAYMENT_ORDER));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let mut tx = store.begin().await.unwrap();
        for n in 1..=3 {
            let mut o = order(&format!("ORD-20260101{n:06}"));
            o.user_id = user;
            o.created_at = Utc::now() + chrono::Duration::seconds(n);
            tx.insert_order(&o).await.unwrap();
        }
        tx.insert_order(&order("ORD-20260101000009")).await.unwrap();
        tx.commit().await.unwrap();

        let page = store
            .list_orders(OrderFilter::User(user), PageRequest::new(1, 2))
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].order_number, "ORD-20260101000003");
        assert_eq!(page.items[1].order_number, "ORD-20260101000002");
    }
}
