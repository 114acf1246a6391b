//! Invoice issuing and status changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{InvoiceId, OrderId};
use domain::numbering;
use domain::{Invoice, InvoiceError, Order, OrderItem};
use store::{Store, StoreTx};

use crate::error::{FulfillmentError, Result};

pub struct InvoiceGenerator<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for InvoiceGenerator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> InvoiceGenerator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Issues the draft invoice for a freshly placed order.
    ///
    /// Fails with [`InvoiceError::TotalsMismatch`] if the totals recomputed
    /// from `items` disagree with the order. The number is the day's next
    /// sequence; a concurrent issuer taking the same number makes the commit
    /// fail with a unique violation.
    #[tracing::instrument(skip(self, tx, order, items), fields(order_number = %order.order_number))]
    pub async fn generate(
        &self,
        tx: &mut S::Tx,
        order: &Order,
        items: &[OrderItem],
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let today = now.date_naive();
        let prefix = numbering::invoice_number_prefix(today);
        let last = tx.last_invoice_number(&prefix).await?;
        let sequence = numbering::next_sequence(last.as_deref(), &prefix)
            .ok_or(FulfillmentError::SequenceExhausted { prefix })?;

        let invoice = Invoice::generate(
            order,
            items,
            numbering::format_invoice_number(today, sequence),
            now,
        )?;
        tx.insert_invoice(&invoice).await?;

        tracing::info!(invoice_number = %invoice.invoice_number, "invoice generated");
        Ok(invoice)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_as_sent(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        self.transition(invoice_id, |invoice, now| invoice.mark_sent(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_as_paid(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        self.transition(invoice_id, |invoice, now| invoice.mark_paid(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_as_overdue(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        self.transition(invoice_id, |invoice, now| invoice.mark_overdue(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, invoice_id: InvoiceId, reason: &str) -> Result<Invoice> {
        self.transition(invoice_id, |invoice, now| invoice.cancel(reason, now))
            .await
    }

    pub async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.store.get_invoice(invoice_id).await?)
    }

    pub async fn invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>> {
        Ok(self.store.invoice_for_order(order_id).await?)
    }

    async fn transition<F>(&self, invoice_id: InvoiceId, apply: F) -> Result<Invoice>
    where
        F: FnOnce(&mut Invoice, DateTime<Utc>) -> std::result::Result<(), InvoiceError>,
    {
        let not_found = || FulfillmentError::not_found("invoice", invoice_id);
        let order_id = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(not_found)?
            .order_id;

        let mut tx = self.store.begin().await?;
        let mut invoice = tx
            .lock_invoice_for_order(order_id)
            .await?
            .ok_or_else(not_found)?;

        apply(&mut invoice, Utc::now())?;
        tx.update_invoice(&invoice).await?;
        tx.commit().await?;

        tracing::info!(status = %invoice.status, "invoice status changed");
        Ok(invoice)
    }
}
