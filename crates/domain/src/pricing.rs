//! Order money math.

use common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flat tax rate applied to every subtotal.
pub const TAX_RATE_PERCENT: i64 = 10;

/// A money computation left the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Amount out of range")]
pub struct AmountOverflow;

/// Tax owed on a subtotal.
pub fn tax_for(subtotal: Money) -> Result<Money, AmountOverflow> {
    subtotal.percent(TAX_RATE_PERCENT).ok_or(AmountOverflow)
}

/// The money breakdown of an order or invoice.
///
/// `total == subtotal - discount + tax + shipping` holds for every value built
/// through [`OrderTotals::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Computes tax and total from the subtotal, discount and shipping cost.
    ///
    /// Tax is charged on the undiscounted subtotal.
    pub fn compute(
        subtotal: Money,
        discount: Money,
        shipping: Money,
    ) -> Result<Self, AmountOverflow> {
        let tax = tax_for(subtotal)?;
        let total = subtotal
            .checked_sub(discount)
            .and_then(|amount| amount.checked_add(tax))
            .and_then(|amount| amount.checked_add(shipping))
            .ok_or(AmountOverflow)?;
        Ok(Self {
            subtotal,
            discount,
            tax,
            shipping,
            total,
        })
    }
}
