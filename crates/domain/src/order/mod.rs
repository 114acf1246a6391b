//! Orders and related types.

mod aggregate;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use state::{OrderPaymentStatus, OrderStatus, ShippingStatus};
pub use value_objects::{OrderItem, OrderStatusHistory, ShippingAddress};

use common::Money;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order is not in the expected status.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    /// Shipping cost cannot be negative.
    #[error("Invalid shipping cost: {amount}")]
    InvalidShippingCost { amount: Money },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,
}
