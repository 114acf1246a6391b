//! Per-product stock counters and their change history.

use chrono::{DateTime, Utc};
use common::{EntryId, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from stock arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// The requested quantity is not available.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A movement of zero units was requested.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// The counter cannot hold that many units.
    #[error("Stock for {product_id} cannot take {quantity} more units")]
    CapacityExceeded { product_id: ProductId, quantity: i64 },

    /// The reason does not fit the direction of the adjustment.
    #[error("A {reason} adjustment must {direction} stock")]
    ReasonMismatch {
        reason: StockChangeReason,
        direction: &'static str,
    },

    /// The reason is reserved for checkout and cancellation.
    #[error("{reason} is not a manual adjustment reason")]
    NotAnAdjustmentReason { reason: StockChangeReason },
}

/// Why a stock counter moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockChangeReason {
    Purchase,
    Return,
    Adjustment,
    Damage,
    Loss,
}

labelled_enum!(StockChangeReason, "stock change reason" {
    Purchase => "purchase",
    Return => "return",
    Adjustment => "adjustment",
    Damage => "damage",
    Loss => "loss",
});

impl StockChangeReason {
    /// Checks that a manual correction of `delta` units may be booked under
    /// this reason. Damage and loss only remove stock, returns only add it.
    pub fn check_adjustment(&self, delta: i64) -> Result<(), StockError> {
        let mismatch = |direction| StockError::ReasonMismatch {
            reason: *self,
            direction,
        };
        match self {
            StockChangeReason::Purchase => {
                Err(StockError::NotAnAdjustmentReason { reason: *self })
            }
            StockChangeReason::Damage | StockChangeReason::Loss if delta > 0 => {
                Err(mismatch("decrease"))
            }
            StockChangeReason::Return if delta < 0 => Err(mismatch("increase")),
            _ => Ok(()),
        }
    }
}

/// Before and after counts of a single stock mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub before: u32,
    pub after: u32,
}

impl StockMovement {
    /// Signed change in units.
    pub fn delta(&self) -> i64 {
        i64::from(self.after) - i64::from(self.before)
    }
}

/// Available quantity for one product.
///
/// The quantity is unsigned, so it cannot go below zero; every mutating
/// method either succeeds completely or leaves the counter untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub product_id: ProductId,
    pub quantity: u32,
    pub reorder_level: u32,
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, reorder_level: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            reorder_level,
            updated_at: Utc::now(),
        }
    }

    /// Returns true if `quantity` units can be taken.
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.quantity >= quantity
    }

    /// Returns true once the counter is at or below its reorder level.
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_level
    }

    /// Takes `quantity` units. Returns `None` and changes nothing if fewer
    /// are available.
    pub fn deduct(&mut self, quantity: u32, now: DateTime<Utc>) -> Option<StockMovement> {
        let after = self.quantity.checked_sub(quantity)?;
        Some(self.set(after, now))
    }

    /// Puts `quantity` units back. Fails and changes nothing if the counter
    /// would overflow.
    pub fn restock(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<StockMovement, StockError> {
        let after = self
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| self.capacity_exceeded(i64::from(quantity)))?;
        Ok(self.set(after, now))
    }

    /// Applies a signed manual correction.
    pub fn adjust(&mut self, delta: i64, now: DateTime<Utc>) -> Result<StockMovement, StockError> {
        if delta == 0 {
            return Err(StockError::InvalidQuantity { quantity: delta });
        }
        let after = i64::from(self.quantity)
            .checked_add(delta)
            .ok_or(StockError::InvalidQuantity { quantity: delta })?;
        let after = match u32::try_from(after) {
            Ok(after) => after,
            Err(_) if delta > 0 => return Err(self.capacity_exceeded(delta)),
            Err(_) => {
                return Err(StockError::InsufficientStock {
                    product_id: self.product_id.clone(),
                    requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                    available: self.quantity,
                });
            }
        };
        Ok(self.set(after, now))
    }

    fn capacity_exceeded(&self, quantity: i64) -> StockError {
        StockError::CapacityExceeded {
            product_id: self.product_id.clone(),
            quantity,
        }
    }

    fn set(&mut self, after: u32, now: DateTime<Utc>) -> StockMovement {
        let movement = StockMovement {
            before: self.quantity,
            after,
        };
        self.quantity = after;
        self.updated_at = now;
        movement
    }
}

/// One immutable row of the stock audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockHistory {
    pub id: EntryId,
    pub product_id: ProductId,
    pub quantity_before: u32,
    pub quantity_after: u32,
    pub reason: StockChangeReason,
    pub notes: Option<String>,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl StockHistory {
    pub fn record(
        product_id: ProductId,
        movement: StockMovement,
        reason: StockChangeReason,
        notes: Option<String>,
        order_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            product_id,
            quantity_before: movement.before,
            quantity_after: movement.after,
            reason,
            notes,
            order_id,
            created_at: now,
        }
    }

    /// Signed change recorded by this row.
    pub fn delta(&self) -> i64 {
        i64::from(self.quantity_after) - i64::from(self.quantity_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduct_within_available() {
        let mut stock = Stock::new("SKU-001", 5, 1);
        let movement = stock.deduct(3, Utc::now()).unwrap();
        assert_eq!(movement, StockMovement { before: 5, after: 2 });
        assert_eq!(stock.quantity, 2);
    }

    #[test]
    fn test_deduct_insufficient_leaves_quantity() {
        let mut stock = Stock::new("SKU-001", 2, 0);
        assert!(stock.deduct(3, Utc::now()).is_none());
        assert_eq!(stock.quantity, 2);
    }

    #[test]
    fn test_deduct_exact_quantity_reaches_zero() {
        let mut stock = Stock::new("SKU-001", 2, 0);
        assert!(stock.deduct(2, Utc::now()).is_some());
        assert_eq!(stock.quantity, 0);
    }

    #[test]
    fn test_restock() {
        let mut stock = Stock::new("SKU-001", 2, 0);
        let movement = stock.restock(4, Utc::now()).unwrap();
        assert_eq!(movement.delta(), 4);
        assert_eq!(stock.quantity, 6);
    }

    #[test]
    fn test_restock_past_capacity_fails() {
        let mut stock = Stock::new("SKU-001", u32::MAX - 1, 0);
        let result = stock.restock(2, Utc::now());
        assert!(matches!(result, Err(StockError::CapacityExceeded { quantity: 2, .. })));
        assert_eq!(stock.quantity, u32::MAX - 1);
    }

    #[test]
    fn test_adjust_with_extreme_delta_fails_cleanly() {
        let mut stock = Stock::new("SKU-001", 5, 0);

        let result = stock.adjust(i64::MAX, Utc::now());
        assert_eq!(result, Err(StockError::InvalidQuantity { quantity: i64::MAX }));

        let result = stock.adjust(i64::from(u32::MAX), Utc::now());
        assert!(matches!(result, Err(StockError::CapacityExceeded { .. })));

        let result = stock.adjust(i64::MIN, Utc::now());
        assert!(matches!(result, Err(StockError::InsufficientStock { available: 5, .. })));
        assert_eq!(stock.quantity, 5);
    }

    #[test]
    fn test_adjust_below_zero_fails() {
        let mut stock = Stock::new("SKU-001", 2, 0);
        let result = stock.adjust(-3, Utc::now());
        assert!(matches!(
            result,
            Err(StockError::InsufficientStock { requested: 3, available: 2, .. })
        ));
        assert_eq!(stock.quantity, 2);
    }

    #[test]
    fn test_adjust_zero_is_invalid() {
        let mut stock = Stock::new("SKU-001", 2, 0);
        assert!(matches!(
            stock.adjust(0, Utc::now()),
            Err(StockError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_adjustment_reasons() {
        assert!(StockChangeReason::Adjustment.check_adjustment(-3).is_ok());
        assert!(StockChangeReason::Adjustment.check_adjustment(3).is_ok());
        assert!(StockChangeReason::Damage.check_adjustment(-1).is_ok());
        assert!(matches!(
            StockChangeReason::Loss.check_adjustment(2),
            Err(StockError::ReasonMismatch { .. })
        ));
        assert!(StockChangeReason::Return.check_adjustment(-1).is_err());
        assert!(matches!(
            StockChangeReason::Purchase.check_adjustment(-1),
            Err(StockError::NotAnAdjustmentReason { .. })
        ));
    }

    #[test]
    fn test_needs_reorder() {
        assert!(Stock::new("SKU-001", 3, 3).needs_reorder());
        assert!(!Stock::new("SKU-001", 4, 3).needs_reorder());
    }

    #[test]
    fn test_reason_labels_roundtrip() {
        for reason in StockChangeReason::ALL {
            assert_eq!(reason.as_str().parse::<StockChangeReason>().unwrap(), *reason);
        }
        assert!("theft".parse::<StockChangeReason>().is_err());
    }

    #[test]
    fn test_history_records_movement() {
        let entry = StockHistory::record(
            ProductId::new("SKU-001"),
            StockMovement { before: 5, after: 4 },
            StockChangeReason::Purchase,
            None,
            Some(OrderId::new()),
            Utc::now(),
        );
        assert_eq!(entry.delta(), -1);
        assert_eq!(entry.reason, StockChangeReason::Purchase);
    }
}
