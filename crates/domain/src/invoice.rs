//! Invoices issued at checkout.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::{InvoiceId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Order, OrderItem};
use crate::pricing::{AmountOverflow, OrderTotals};

/// Days between issue and due date.
pub const PAYMENT_TERMS_DAYS: i64 = 7;

/// Errors that can occur during invoice operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    /// Invoice is not in the expected status.
    #[error("Invalid state transition: cannot {action} a {current_state} invoice")]
    InvalidStateTransition {
        current_state: InvoiceStatus,
        action: &'static str,
    },

    /// Totals recomputed from the lines disagree with the order.
    #[error("Invoice totals mismatch: order {order_total}, recomputed {computed_total}")]
    TotalsMismatch {
        order_total: Money,
        computed_total: Money,
    },

    #[error(transparent)]
    Amount(#[from] AmountOverflow),
}

/// Invoice status.
///
/// ```text
/// Draft ──► Sent ──► Overdue
///   │         │         │
///   └─────────┴─────────┴──► Paid
///
/// anything but Paid ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

labelled_enum!(InvoiceStatus, "invoice status" {
    Draft => "draft",
    Sent => "sent",
    Paid => "paid",
    Overdue => "overdue",
    Cancelled => "cancelled",
});

impl InvoiceStatus {
    pub fn can_send(&self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }

    pub fn can_pay(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Overdue
        )
    }

    pub fn can_mark_overdue(&self) -> bool {
        matches!(self, InvoiceStatus::Sent)
    }

    pub fn can_cancel(&self) -> bool {
        !matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }
}

/// A frozen copy of an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl InvoiceLine {
    /// Copies an order line, recomputing its subtotal.
    pub fn snapshot(item: &OrderItem) -> Result<Self, AmountOverflow> {
        Ok(Self {
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.unit_price.multiply(item.quantity).ok_or(AmountOverflow)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub order_id: OrderId,
    pub invoice_number: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub items: Vec<InvoiceLine>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Issues a draft invoice for an order.
    ///
    /// Totals are recomputed from the lines; if they disagree with what the
    /// order stored, no invoice is produced.
    pub fn generate(
        order: &Order,
        items: &[OrderItem],
        invoice_number: String,
        now: DateTime<Utc>,
    ) -> Result<Self, InvoiceError> {
        let lines = items
            .iter()
            .map(InvoiceLine::snapshot)
            .collect::<Result<Vec<_>, _>>()?;
        let subtotal =
            Money::checked_sum(lines.iter().map(|line| line.subtotal)).ok_or(AmountOverflow)?;
        let totals = OrderTotals::compute(subtotal, order.discount_amount, order.shipping_cost)?;

        if totals != order.totals() {
            return Err(InvoiceError::TotalsMismatch {
                order_total: order.total_price,
                computed_total: totals.total,
            });
        }

        let issue_date = now.date_naive();
        Ok(Self {
            id: InvoiceId::new(),
            order_id: order.id,
            invoice_number,
            status: InvoiceStatus::Draft,
            issue_date,
            due_date: issue_date + Duration::days(PAYMENT_TERMS_DAYS),
            paid_date: None,
            subtotal: totals.subtotal,
            tax: totals.tax,
            discount: totals.discount,
            shipping: totals.shipping,
            total: totals.total,
            items: lines,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        self.guard(self.status.can_send(), "send")?;
        self.status = InvoiceStatus::Sent;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        self.guard(self.status.can_pay(), "pay")?;
        self.status = InvoiceStatus::Paid;
        self.paid_date = Some(now.date_naive());
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        self.guard(self.status.can_mark_overdue(), "mark overdue")?;
        self.status = InvoiceStatus::Overdue;
        self.updated_at = now;
        Ok(())
    }

    /// Cancels the invoice. The reason is appended to any existing notes.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        self.guard(self.status.can_cancel(), "cancel")?;
        self.status = InvoiceStatus::Cancelled;
        let line = format!("Cancelled: {reason}");
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
            _ => line,
        });
        self.updated_at = now;
        Ok(())
    }

    fn guard(&self, allowed: bool, action: &'static str) -> Result<(), InvoiceError> {
        if allowed {
            Ok(())
        } else {
            Err(InvoiceError::InvalidStateTransition {
                current_state: self.status,
                action,
            })
        }
    }
}
