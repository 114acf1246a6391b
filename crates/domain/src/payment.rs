//! Payments and their status machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Payment is not in the expected status.
    #[error("Invalid state transition: cannot {action} a {current_state} payment")]
    InvalidStateTransition {
        current_state: PaymentStatus,
        action: &'static str,
    },

    /// Refund must be positive.
    #[error("Invalid refund amount: {amount}")]
    InvalidRefundAmount { amount: Money },

    /// Refund cannot exceed what was paid.
    #[error("Refund of {requested} exceeds payment amount {paid}")]
    RefundExceedsAmount { requested: Money, paid: Money },
}

/// Status of a single payment.
///
/// ```text
/// Pending ──► Completed ──► Refunded
///    │
///    └──────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

labelled_enum!(PaymentStatus, "payment status" {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    CreditCard,
    EWallet,
    CashOnDelivery,
}

labelled_enum!(PaymentMethod, "payment method" {
    BankTransfer => "bank_transfer",
    CreditCard => "credit_card",
    EWallet => "e_wallet",
    CashOnDelivery => "cash_on_delivery",
});

/// The one payment attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_amount: Option<Money>,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A pending payment for the full order amount.
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            user_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            gateway_reference: None,
            failure_reason: None,
            paid_at: None,
            refunded_amount: None,
            refund_reason: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(
        &mut self,
        gateway_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        self.require(PaymentStatus::Pending, "complete")?;
        self.status = PaymentStatus::Completed;
        self.gateway_reference = gateway_reference;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), PaymentError> {
        self.require(PaymentStatus::Pending, "fail")?;
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    /// Refunds a completed payment, defaulting to the full amount.
    ///
    /// Returns the amount refunded.
    pub fn refund(
        &mut self,
        amount: Option<Money>,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Money, PaymentError> {
        self.require(PaymentStatus::Completed, "refund")?;

        let amount = amount.unwrap_or(self.amount);
        if !amount.is_positive() {
            return Err(PaymentError::InvalidRefundAmount { amount });
        }
        if amount > self.amount {
            return Err(PaymentError::RefundExceedsAmount {
                requested: amount,
                paid: self.amount,
            });
        }

        self.status = PaymentStatus::Refunded;
        self.refunded_amount = Some(amount);
        self.refund_reason = Some(reason);
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(amount)
    }

    fn require(&self, expected: PaymentStatus, action: &'static str) -> Result<(), PaymentError> {
        if self.status != expected {
            return Err(PaymentError::InvalidStateTransition {
                current_state: self.status,
                action,
            });
        }
        Ok(())
    }
}
