//! Transactional services of the marketplace fulfillment engine.
//!
//! Each service owns one concern and runs its mutations inside a
//! [`store::StoreTx`]:
//! - [`CartService`] edits carts
//! - [`OrderLifecycle`] turns a cart into an order and moves it through its statuses
//! - [`PaymentLedger`] records payments and refunds
//! - [`InvoiceGenerator`] issues and updates invoices
//! - [`StockLedger`] owns stock counters and their history
//! - [`CouponEngine`] validates coupons and counts their use
//! - [`TransactionJournal`] is the append-only money log
//!
//! [`Fulfillment`] wires them together over one store.

pub mod cart;
pub mod coupon;
pub mod error;
pub mod invoice;
pub mod journal;
pub mod order;
pub mod payment;
pub mod stats;
pub mod stock;

use std::sync::Arc;

use domain::Product;
use store::Store;

pub use cart::CartService;
pub use coupon::CouponEngine;
pub use error::{ErrorKind, FulfillmentError, Result};
pub use invoice::InvoiceGenerator;
pub use journal::TransactionJournal;
pub use order::{MAX_CHECKOUT_ATTEMPTS, OrderDetails, OrderLifecycle};
pub use payment::PaymentLedger;
pub use stats::MerchantStats;
pub use stock::StockLedger;

/// All services sharing one store.
pub struct Fulfillment<S: Store> {
    store: Arc<S>,
    carts: CartService<S>,
    orders: OrderLifecycle<S>,
    payments: PaymentLedger<S>,
    invoices: InvoiceGenerator<S>,
    stock: StockLedger<S>,
    coupons: CouponEngine<S>,
    journal: TransactionJournal<S>,
}

impl<S: Store> Clone for Fulfillment<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            carts: self.carts.clone(),
            orders: self.orders.clone(),
            payments: self.payments.clone(),
            invoices: self.invoices.clone(),
            stock: self.stock.clone(),
            coupons: self.coupons.clone(),
            journal: self.journal.clone(),
        }
    }
}

impl<S: Store> Fulfillment<S> {
    pub fn new(store: S) -> Self {
        let store = Arc::new(store);
        let stock = StockLedger::new(Arc::clone(&store));
        let coupons = CouponEngine::new(Arc::clone(&store));
        let invoices = InvoiceGenerator::new(Arc::clone(&store));
        let journal = TransactionJournal::new(Arc::clone(&store));

        Self {
            carts: CartService::new(Arc::clone(&store), stock.clone()),
            orders: OrderLifecycle::new(
                Arc::clone(&store),
                stock.clone(),
                coupons.clone(),
                invoices.clone(),
                journal.clone(),
            ),
            payments: PaymentLedger::new(Arc::clone(&store), journal.clone()),
            invoices,
            stock,
            coupons,
            journal,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn carts(&self) -> &CartService<S> {
        &self.carts
    }

    pub fn orders(&self) -> &OrderLifecycle<S> {
        &self.orders
    }

    pub fn payments(&self) -> &PaymentLedger<S> {
        &self.payments
    }

    pub fn invoices(&self) -> &InvoiceGenerator<S> {
        &self.invoices
    }

    pub fn stock(&self) -> &StockLedger<S> {
        &self.stock
    }

    pub fn coupons(&self) -> &CouponEngine<S> {
        &self.coupons
    }

    pub fn journal(&self) -> &TransactionJournal<S> {
        &self.journal
    }

    /// Adds or replaces a catalog entry.
    #[tracing::instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.store.upsert_product(product).await?;
        Ok(())
    }
}
