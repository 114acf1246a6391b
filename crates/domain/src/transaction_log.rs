//! Append-only money movements.

use chrono::{DateTime, Utc};
use common::{EntryId, Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// An order was placed.
    Order,
    /// Money returned to the customer, by cancellation or payment refund.
    OrderRefund,
    /// A payment was received.
    Deposit,
}

labelled_enum!(TransactionKind, "transaction kind" {
    Order => "order",
    OrderRefund => "order_refund",
    Deposit => "deposit",
});

/// One row of the transaction log. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLog {
    pub id: EntryId,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub payment_id: Option<PaymentId>,
    pub kind: TransactionKind,
    pub amount: Money,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionLog {
    fn new(
        kind: TransactionKind,
        user_id: UserId,
        amount: Money,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            user_id,
            order_id: None,
            payment_id: None,
            kind,
            amount,
            description,
            created_at: now,
        }
    }

    pub fn order_placed(
        user_id: UserId,
        order_id: OrderId,
        order_number: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::new(
                TransactionKind::Order,
                user_id,
                amount,
                format!("Order {order_number}"),
                now,
            )
        }
    }

    pub fn order_refund(
        user_id: UserId,
        order_id: OrderId,
        payment_id: Option<PaymentId>,
        amount: Money,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: Some(order_id),
            payment_id,
            ..Self::new(TransactionKind::OrderRefund, user_id, amount, description, now)
        }
    }

    pub fn deposit(
        user_id: UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: Some(order_id),
            payment_id: Some(payment_id),
            ..Self::new(
                TransactionKind::Deposit,
                user_id,
                amount,
                format!("Payment {payment_id}"),
                now,
            )
        }
    }
}
