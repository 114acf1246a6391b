//! Domain layer for the marketplace fulfillment engine.
//!
//! This crate holds the entities and the rules that do not need storage:
//! - order, payment and invoice status machines
//! - cart line arithmetic and recalculation
//! - coupon eligibility and discount math
//! - stock movements
//! - order totals, tax and document numbering
//!
//! Services that combine these rules inside a transaction live in the
//! `fulfillment` crate.

#[macro_use]
mod macros;

pub mod cart;
pub mod coupon;
pub mod invoice;
pub mod numbering;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod product;
pub mod stock;
pub mod transaction_log;

pub use cart::{Cart, CartError, CartItem};
pub use coupon::{Coupon, CouponKind, CouponUsage, Ineligibility};
pub use invoice::{Invoice, InvoiceError, InvoiceLine, InvoiceStatus};
pub use macros::UnknownVariant;
pub use order::{
    NewOrder, Order, OrderError, OrderItem, OrderPaymentStatus, OrderStatus, OrderStatusHistory,
    ShippingAddress, ShippingStatus,
};
pub use payment::{Payment, PaymentError, PaymentMethod, PaymentStatus};
pub use pricing::{AmountOverflow, OrderTotals, TAX_RATE_PERCENT};
pub use product::Product;
pub use stock::{Stock, StockChangeReason, StockError, StockHistory, StockMovement};
pub use transaction_log::{TransactionKind, TransactionLog};
