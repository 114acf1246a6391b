//! Fulfillment error types.

use common::{OrderId, ProductId};
use domain::{AmountOverflow, CartError, InvoiceError, OrderError, PaymentError, StockError};
use store::StoreError;
use thiserror::Error;

/// Broad class of a [`FulfillmentError`], used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input. Nothing was changed.
    Validation,
    /// The request is well-formed but breaks a business rule.
    BusinessRule,
    NotFound,
    Conflict,
    Internal,
}

/// Errors that can occur during fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Input failed validation before any rule was evaluated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Checkout was attempted on a missing or empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Not enough units are available for a product.
    #[error("Insufficient stock for {product_id}: requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// A cancelled order cannot take a payment.
    #[error("Order {order_id} is cancelled")]
    OrderCancelled { order_id: OrderId },

    /// A payment already exists for the order.
    #[error("Payment already exists for order {order_id}")]
    DuplicatePayment { order_id: OrderId },

    /// A coupon with the same code already exists.
    #[error("Coupon code already exists: {code}")]
    DuplicateCoupon { code: String },

    /// The day's document numbers under `prefix` are used up.
    #[error("No more numbers available today for {prefix}")]
    SequenceExhausted { prefix: String },

    /// A required entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Amount(#[from] AmountOverflow),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Invoice error: {0}")]
    Invoice(#[from] InvoiceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FulfillmentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Validation(_)
            | FulfillmentError::Amount(_)
            | FulfillmentError::Invoice(InvoiceError::Amount(_)) => ErrorKind::Validation,
            FulfillmentError::EmptyCart
            | FulfillmentError::InsufficientStock { .. }
            | FulfillmentError::OrderCancelled { .. }
            | FulfillmentError::SequenceExhausted { .. }
            | FulfillmentError::Order(_)
            | FulfillmentError::Payment(_)
            | FulfillmentError::Invoice(_) => ErrorKind::BusinessRule,
            FulfillmentError::DuplicatePayment { .. } | FulfillmentError::DuplicateCoupon { .. } => {
                ErrorKind::Conflict
            }
            FulfillmentError::NotFound { .. } => ErrorKind::NotFound,
            FulfillmentError::Cart(err) => match err {
                CartError::InvalidQuantity { .. }
                | CartError::QuantityTooLarge { .. }
                | CartError::Amount(_) => ErrorKind::Validation,
                CartError::ItemNotFound { .. } | CartError::ProductUnavailable { .. } => {
                    ErrorKind::NotFound
                }
            },
            FulfillmentError::Stock(err) => match err {
                StockError::InsufficientStock { .. } => ErrorKind::BusinessRule,
                StockError::InvalidQuantity { .. }
                | StockError::CapacityExceeded { .. }
                | StockError::ReasonMismatch { .. }
                | StockError::NotAnAdjustmentReason { .. } => ErrorKind::Validation,
            },
            FulfillmentError::Store(err) => match err {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::UniqueViolation { .. } => ErrorKind::Conflict,
                _ => ErrorKind::Internal,
            },
        }
    }

    /// Returns true if a concurrent checkout took the same order or invoice
    /// number, in which case the checkout can be run again.
    pub fn is_numbering_collision(&self) -> bool {
        matches!(
            self,
            FulfillmentError::Store(err)
                if err.violated_constraint().is_some_and(store::constraints::is_numbering)
        )
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use store::constraints;

    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(FulfillmentError::EmptyCart.kind(), ErrorKind::BusinessRule);
        assert_eq!(
            FulfillmentError::not_found("order", OrderId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FulfillmentError::from(CartError::InvalidQuantity { quantity: 0 }).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FulfillmentError::DuplicatePayment {
                order_id: OrderId::new()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            FulfillmentError::from(StoreError::Corrupt("bad row".to_string())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_out_of_range_amounts_are_validation_errors() {
        assert_eq!(FulfillmentError::from(AmountOverflow).kind(), ErrorKind::Validation);
        assert_eq!(
            FulfillmentError::from(CartError::from(AmountOverflow)).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FulfillmentError::from(InvoiceError::from(AmountOverflow)).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FulfillmentError::from(StockError::CapacityExceeded {
                product_id: ProductId::new("SKU-001"),
                quantity: 1,
            })
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FulfillmentError::SequenceExhausted {
                prefix: "ORD-20261018".to_string()
            }
            .kind(),
            ErrorKind::BusinessRule
        );
    }

    #[test]
    fn test_numbering_collision() {
        let err = FulfillmentError::from(StoreError::unique(constraints::INVOICE_NUMBER));
        assert!(err.is_numbering_collision());

        let err = FulfillmentError::from(StoreError::unique(constraints::PAYMENT_ORDER));
        assert!(!err.is_numbering_collision());
        assert!(!FulfillmentError::EmptyCart.is_numbering_collision());
    }
}
