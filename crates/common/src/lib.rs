//! Shared types used across the marketplace fulfillment crates.

pub mod money;
pub mod page;
pub mod types;

pub use money::Money;
pub use page::{Page, PageRequest};
pub use types::{
    CartId, CouponId, EntryId, InvoiceId, MerchantId, OrderId, ParseIdError, PaymentId, ProductId,
    UserId,
};
