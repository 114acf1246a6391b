//! Checkout and the order status machine.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{MerchantId, Money, OrderId, Page, PageRequest, UserId};
use domain::numbering;
use domain::{
    AmountOverflow, Invoice, NewOrder, Order, OrderError, OrderItem, OrderStatus,
    OrderStatusHistory, OrderTotals, Payment, StockChangeReason, TransactionLog,
};
use serde::Serialize;
use store::{OrderFilter, Store, StoreTx};

use crate::coupon::CouponEngine;
use crate::error::{FulfillmentError, Result};
use crate::invoice::InvoiceGenerator;
use crate::journal::TransactionJournal;
use crate::stats::MerchantStats;
use crate::stock::StockLedger;

/// How many times checkout runs when a concurrent checkout took the same
/// order or invoice number.
pub const MAX_CHECKOUT_ATTEMPTS: u32 = 3;

/// An order with everything recorded against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusHistory>,
    pub payment: Option<Payment>,
    pub invoice: Option<Invoice>,
}

/// Converts carts into orders and drives them through their statuses.
///
/// Every operation runs in a single store transaction. Cancellation reverses
/// every side effect of checkout in the same way: stock is returned, the
/// coupon use is given back, the unpaid invoice is cancelled and a refund
/// entry is logged.
pub struct OrderLifecycle<S: Store> {
    store: Arc<S>,
    stock: StockLedger<S>,
    coupons: CouponEngine<S>,
    invoices: InvoiceGenerator<S>,
    journal: TransactionJournal<S>,
}

impl<S: Store> Clone for OrderLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            stock: self.stock.clone(),
            coupons: self.coupons.clone(),
            invoices: self.invoices.clone(),
            journal: self.journal.clone(),
        }
    }
}

impl<S: Store> OrderLifecycle<S> {
    pub fn new(
        store: Arc<S>,
        stock: StockLedger<S>,
        coupons: CouponEngine<S>,
        invoices: InvoiceGenerator<S>,
        journal: TransactionJournal<S>,
    ) -> Self {
        Self {
            store,
            stock,
            coupons,
            invoices,
            journal,
        }
    }

    /// Places an order from the lines of the user's cart sold by
    /// `merchant_id`. Lines from other merchants stay in the cart.
    ///
    /// Either everything is written (order, items, stock deductions, coupon
    /// use, history, invoice, transaction entry, updated cart) or nothing is.
    /// A coupon that is unknown or not applicable is ignored.
    #[tracing::instrument(skip(self, input))]
    pub async fn create_from_cart(
        &self,
        user_id: UserId,
        merchant_id: MerchantId,
        input: NewOrder,
    ) -> Result<OrderDetails> {
        let started = Instant::now();

        let mut attempt = 1;
        let result = loop {
            match self.checkout(user_id, merchant_id, &input).await {
                Err(err) if err.is_numbering_collision() && attempt < MAX_CHECKOUT_ATTEMPTS => {
                    tracing::warn!(attempt, error = %err, "document number taken, retrying checkout");
                    attempt += 1;
                }
                other => break other,
            }
        };

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(details) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_number = %details.order.order_number,
                    total = %details.order.total_price,
                    "order placed"
                );
            }
            Err(err) => {
                metrics::counter!("checkout_failures_total").increment(1);
                tracing::warn!(error = %err, "checkout rejected");
            }
        }
        result
    }

    async fn checkout(
        &self,
        user_id: UserId,
        merchant_id: MerchantId,
        input: &NewOrder,
    ) -> Result<OrderDetails> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut cart = match tx.lock_cart(user_id).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(FulfillmentError::EmptyCart),
        };
        // Only the merchant's lines become the order; the rest stay in the cart.
        let lines = cart.take_merchant_lines(merchant_id, now)?;
        if lines.is_empty() {
            return Err(FulfillmentError::EmptyCart);
        }

        let order_id = OrderId::new();
        let items = lines
            .iter()
            .map(|item| OrderItem::snapshot(order_id, item))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let subtotal =
            Money::checked_sum(items.iter().map(|item| item.total_price)).ok_or(AmountOverflow)?;

        let mut coupon = match input.coupon_code.as_deref() {
            Some(code) => {
                self.coupons
                    .validate_in(&mut tx, code, user_id, subtotal)
                    .await?
            }
            None => None,
        };
        let discount = coupon.as_ref().map_or(Money::zero(), |coupon| {
            self.coupons.calculate_discount(coupon, subtotal)
        });
        let totals = OrderTotals::compute(subtotal, discount, input.shipping_cost)?;

        let mut by_product: Vec<&OrderItem> = items.iter().collect();
        by_product.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        for item in by_product {
            let deducted = self
                .stock
                .deduct(
                    &mut tx,
                    &item.product_id,
                    item.quantity,
                    StockChangeReason::Purchase,
                    Some(order_id),
                )
                .await?;
            if !deducted {
                return Err(FulfillmentError::InsufficientStock {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                });
            }
        }

        // Numbered after the stock locks so checkouts of the same product
        // read the day's last number one at a time.
        let today = now.date_naive();
        let prefix = numbering::order_number_prefix(today);
        let last = tx.last_order_number(&prefix).await?;
        let sequence = numbering::next_sequence(last.as_deref(), &prefix)
            .ok_or(FulfillmentError::SequenceExhausted { prefix })?;
        let order_number = numbering::format_order_number(today, sequence);

        let input = NewOrder {
            coupon_code: coupon.as_ref().map(|coupon| coupon.code.clone()),
            ..input.clone()
        };
        let order = Order {
            id: order_id,
            ..Order::place(order_number, user_id, merchant_id, input, totals, now)?
        };
        tx.insert_order(&order).await?;
        tx.insert_order_items(&items).await?;

        if let Some(coupon) = coupon.as_mut()
            && discount.is_positive()
        {
            self.coupons
                .apply(&mut tx, coupon, order.id, user_id, discount)
                .await?;
        }

        let history = OrderStatusHistory::new(
            order.id,
            OrderStatus::Pending,
            Some("Order placed".to_string()),
            Some(user_id),
            now,
        );
        tx.append_order_history(&history).await?;

        let invoice = self.invoices.generate(&mut tx, &order, &items, now).await?;

        self.journal
            .record(
                &mut tx,
                &TransactionLog::order_placed(
                    user_id,
                    order.id,
                    &order.order_number,
                    order.total_price,
                    now,
                ),
            )
            .await?;

        tx.save_cart(&cart).await?;
        tx.commit().await?;

        Ok(OrderDetails {
            order,
            items,
            history: vec![history],
            payment: None,
            invoice: Some(invoice),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, order_id: OrderId, changed_by: Option<UserId>) -> Result<Order> {
        self.transition(order_id, changed_by, None, |order, now| order.confirm(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn start_processing(
        &self,
        order_id: OrderId,
        changed_by: Option<UserId>,
    ) -> Result<Order> {
        self.transition(order_id, changed_by, None, |order, now| {
            order.start_processing(now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn ship(
        &self,
        order_id: OrderId,
        tracking_number: Option<String>,
        changed_by: Option<UserId>,
    ) -> Result<Order> {
        let notes = tracking_number
            .as_ref()
            .map(|tracking| format!("Tracking number {tracking}"));
        self.transition(order_id, changed_by, notes, |order, now| {
            order.ship(tracking_number, now)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, order_id: OrderId, changed_by: Option<UserId>) -> Result<Order> {
        self.transition(order_id, changed_by, None, |order, now| order.deliver(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, order_id: OrderId, changed_by: Option<UserId>) -> Result<Order> {
        self.transition(order_id, changed_by, None, |order, now| order.complete(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_refunded(
        &self,
        order_id: OrderId,
        changed_by: Option<UserId>,
    ) -> Result<Order> {
        self.transition(order_id, changed_by, None, |order, now| {
            order.mark_refunded(now)
        })
        .await
    }

    async fn transition<F>(
        &self,
        order_id: OrderId,
        changed_by: Option<UserId>,
        notes: Option<String>,
        apply: F,
    ) -> Result<Order>
    where
        F: FnOnce(&mut Order, DateTime<Utc>) -> std::result::Result<(), OrderError>,
    {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))?;

        let from = order.status;
        apply(&mut order, now)?;

        tx.update_order(&order).await?;
        tx.append_order_history(&OrderStatusHistory::new(
            order.id,
            order.status,
            notes,
            changed_by,
            now,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            %from,
            to = %order.status,
            "order status changed"
        );
        Ok(order)
    }

    /// Cancels an order that has not been delivered and reverses checkout.
    ///
    /// A paid invoice is left as it is; refunding the payment is a separate
    /// operation on the payment ledger.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: OrderId,
        reason: String,
        changed_by: Option<UserId>,
    ) -> Result<Order> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))?;

        order.cancel(reason.clone(), now)?;
        tx.update_order(&order).await?;
        tx.append_order_history(&OrderStatusHistory::new(
            order.id,
            OrderStatus::Cancelled,
            Some(reason.clone()),
            changed_by,
            now,
        ))
        .await?;

        if let Some(mut invoice) = tx.lock_invoice_for_order(order.id).await?
            && invoice.status.can_cancel()
        {
            invoice.cancel(&reason, now)?;
            tx.update_invoice(&invoice).await?;
        }

        if let Some(usage) = tx.coupon_usage_for_order(order.id).await? {
            self.coupons.revoke(&mut tx, &usage).await?;
        }

        let mut items = tx.order_items(order.id).await?;
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        for item in &items {
            self.stock
                .restore(
                    &mut tx,
                    &item.product_id,
                    item.quantity,
                    StockChangeReason::Return,
                    Some(order.id),
                )
                .await?;
        }

        self.journal
            .record(
                &mut tx,
                &TransactionLog::order_refund(
                    order.user_id,
                    order.id,
                    None,
                    order.total_price,
                    format!("Order {} cancelled: {reason}", order.order_number),
                    now,
                ),
            )
            .await?;
        tx.commit().await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_number = %order.order_number, "order cancelled");
        Ok(order)
    }

    /// The order with its items, status trail, payment and invoice.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))?;

        Ok(OrderDetails {
            items: self.store.order_items(order_id).await?,
            history: self.store.order_history(order_id).await?,
            payment: self.store.payment_for_order(order_id).await?,
            invoice: self.store.invoice_for_order(order_id).await?,
            order,
        })
    }

    /// Orders for a user or a merchant, newest first.
    pub async fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        Ok(self.store.list_orders(filter, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn merchant_stats(&self, merchant_id: MerchantId) -> Result<MerchantStats> {
        let orders = self.store.merchant_orders(merchant_id).await?;
        let items_sold = self.store.merchant_items_sold(merchant_id).await?;
        Ok(MerchantStats::from_orders(merchant_id, &orders, items_sold))
    }
}
