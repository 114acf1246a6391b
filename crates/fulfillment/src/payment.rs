//! Payment recording and its effects on orders and invoices.

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderId, PaymentId};
use domain::{
    OrderPaymentStatus, OrderStatus, OrderStatusHistory, Payment, PaymentMethod, TransactionLog,
};
use store::{Store, StoreError, StoreTx, constraints};

use crate::error::{FulfillmentError, Result};
use crate::journal::TransactionJournal;

/// At most one payment exists per order.
///
/// Completing a payment confirms a pending order and sends its draft
/// invoice. Refunds only touch the payment and its order's payment status;
/// the order's own status is changed through the order lifecycle.
pub struct PaymentLedger<S: Store> {
    store: Arc<S>,
    journal: TransactionJournal<S>,
}

impl<S: Store> Clone for PaymentLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            journal: self.journal.clone(),
        }
    }
}

impl<S: Store> PaymentLedger<S> {
    pub fn new(store: Arc<S>, journal: TransactionJournal<S>) -> Self {
        Self { store, journal }
    }

    /// Opens a pending payment for the full order total.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(&self, order_id: OrderId, method: PaymentMethod) -> Result<Payment> {
        let duplicate = |err: StoreError| -> FulfillmentError {
            if err.violated_constraint() == Some(constraints::PAYMENT_ORDER) {
                FulfillmentError::DuplicatePayment { order_id }
            } else {
                err.into()
            }
        };

        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))?;

        if order.is_cancelled() {
            return Err(FulfillmentError::OrderCancelled { order_id });
        }
        if tx.payment_for_order(order_id).await?.is_some() {
            return Err(FulfillmentError::DuplicatePayment { order_id });
        }

        let payment = Payment::new(
            order.id,
            order.user_id,
            order.total_price,
            method,
            Utc::now(),
        );
        tx.insert_payment(&payment).await.map_err(duplicate)?;
        tx.commit().await.map_err(duplicate)?;

        tracing::info!(payment_id = %payment.id, amount = %payment.amount, "payment created");
        Ok(payment)
    }

    /// Records a successful charge.
    #[tracing::instrument(skip(self))]
    pub async fn mark_as_completed(
        &self,
        payment_id: PaymentId,
        gateway_reference: Option<String>,
    ) -> Result<Payment> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut payment = self.lock_payment(&mut tx, payment_id).await?;
        payment.complete(gateway_reference, now)?;
        tx.update_payment(&payment).await?;

        let mut order = tx
            .lock_order(payment.order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", payment.order_id))?;
        order.set_payment_status(OrderPaymentStatus::Paid, now);
        let confirmed = order.status.can_confirm();
        if confirmed {
            order.confirm(now)?;
        }
        tx.update_order(&order).await?;
        if confirmed {
            tx.append_order_history(&OrderStatusHistory::new(
                order.id,
                OrderStatus::Confirmed,
                Some("Payment received".to_string()),
                None,
                now,
            ))
            .await?;
        }

        if let Some(mut invoice) = tx.lock_invoice_for_order(order.id).await?
            && invoice.status.can_send()
        {
            invoice.mark_sent(now)?;
            tx.update_invoice(&invoice).await?;
        }

        self.journal
            .record(
                &mut tx,
                &TransactionLog::deposit(
                    payment.user_id,
                    order.id,
                    payment.id,
                    payment.amount,
                    now,
                ),
            )
            .await?;
        tx.commit().await?;

        metrics::counter!("payments_completed_total").increment(1);
        tracing::info!(order_number = %order.order_number, confirmed, "payment completed");
        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_as_failed(&self, payment_id: PaymentId, reason: String) -> Result<Payment> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut payment = self.lock_payment(&mut tx, payment_id).await?;
        payment.fail(reason, now)?;
        tx.update_payment(&payment).await?;

        if let Some(mut order) = tx.lock_order(payment.order_id).await? {
            order.set_payment_status(OrderPaymentStatus::Failed, now);
            tx.update_order(&order).await?;
        }
        tx.commit().await?;

        metrics::counter!("payments_failed_total").increment(1);
        tracing::warn!(reason = ?payment.failure_reason, "payment failed");
        Ok(payment)
    }

    /// Refunds a completed payment, by default in full.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        payment_id: PaymentId,
        amount: Option<Money>,
        reason: String,
    ) -> Result<Payment> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut payment = self.lock_payment(&mut tx, payment_id).await?;
        let refunded = payment.refund(amount, reason.clone(), now)?;
        tx.update_payment(&payment).await?;

        if let Some(mut order) = tx.lock_order(payment.order_id).await? {
            order.set_payment_status(OrderPaymentStatus::Refunded, now);
            tx.update_order(&order).await?;
        }

        self.journal
            .record(
                &mut tx,
                &TransactionLog::order_refund(
                    payment.user_id,
                    payment.order_id,
                    Some(payment.id),
                    refunded,
                    format!("Refund of payment {}: {reason}", payment.id),
                    now,
                ),
            )
            .await?;
        tx.commit().await?;

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(amount = %refunded, "payment refunded");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.store.get_payment(payment_id).await?)
    }

    pub async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self.store.payment_for_order(order_id).await?)
    }

    async fn lock_payment(&self, tx: &mut S::Tx, payment_id: PaymentId) -> Result<Payment> {
        tx.lock_payment(payment_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("payment", payment_id))
    }
}
