//! Order status machines.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered ──► Completed
///    │            │             │             │             │            │
///    └────────────┴─────────────┴─────────────┴──► Cancelled└──► Refunded◄┘
/// ```
///
/// `Cancelled` is reachable from every status before `Delivered`.
/// `Completed` and `Refunded` are labels applied after delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, awaiting payment or merchant confirmation.
    #[default]
    Pending,

    /// Payment received or merchant accepted the order.
    Confirmed,

    /// Merchant is preparing the shipment.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Closed after delivery (terminal).
    Completed,

    /// Cancelled before delivery (terminal).
    Cancelled,

    /// Refunded after delivery (terminal).
    Refunded,
}

labelled_enum!(OrderStatus, "order status" {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Completed => "completed",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Returns true if the order can be confirmed in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if processing can start in this status.
    pub fn can_start_processing(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if the order can be shipped in this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    /// Returns true if the order can be marked delivered in this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if the order can be completed in this status.
    pub fn can_complete(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true if the order can be labelled refunded in this status.
    pub fn can_refund(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Completed)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::Confirmed
                | OrderStatus::Processing
                | OrderStatus::Shipped
        )
    }

    /// Returns true once the fulfillment chain has ended.
    ///
    /// A delivered order is terminal for fulfillment but may still be
    /// labelled completed or refunded.
    pub fn is_terminal(&self) -> bool {
        !self.can_cancel()
    }

    /// Returns true if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match next {
            OrderStatus::Pending => false,
            OrderStatus::Confirmed => self.can_confirm(),
            OrderStatus::Processing => self.can_start_processing(),
            OrderStatus::Shipped => self.can_ship(),
            OrderStatus::Delivered => self.can_deliver(),
            OrderStatus::Completed => self.can_complete(),
            OrderStatus::Cancelled => self.can_cancel(),
            OrderStatus::Refunded => self.can_refund(),
        }
    }
}

/// Where the parcel is, tracked alongside the order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

labelled_enum!(ShippingStatus, "shipping status" {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

/// Money side of an order, summarised from its payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

labelled_enum!(OrderPaymentStatus, "order payment status" {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});
