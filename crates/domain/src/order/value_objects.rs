//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{EntryId, Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::pricing::AmountOverflow;

use super::OrderStatus;

/// Delivery address captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub phone: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// A line of an order, copied from the cart at checkout.
///
/// The unit price is a snapshot: later catalog price changes do not touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: EntryId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
}

impl OrderItem {
    /// Snapshots a cart line into an order line.
    pub fn snapshot(order_id: OrderId, item: &CartItem) -> Result<Self, AmountOverflow> {
        Ok(Self {
            id: EntryId::new(),
            order_id,
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.unit_price.multiply(item.quantity).ok_or(AmountOverflow)?,
        })
    }
}

/// One immutable row of an order's status trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: EntryId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub changed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl OrderStatusHistory {
    pub fn new(
        order_id: OrderId,
        status: OrderStatus,
        notes: Option<String>,
        changed_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            order_id,
            status,
            notes,
            changed_by,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::MerchantId;

    use super::*;

    #[test]
    fn test_order_item_snapshot_copies_price() {
        let cart_item = CartItem {
            product_id: ProductId::new("SKU-001"),
            product_name: "Widget".to_string(),
            merchant_id: MerchantId::new(),
            quantity: 3,
            unit_price: Money::new(1_000),
            subtotal: Money::new(3_000),
        };
        let order_id = OrderId::new();

        let item = OrderItem::snapshot(order_id, &cart_item).unwrap();

        assert_eq!(item.order_id, order_id);
        assert_eq!(item.unit_price, Money::new(1_000));
        assert_eq!(item.total_price, Money::new(3_000));
    }

    #[test]
    fn test_shipping_address_serialization() {
        let address = ShippingAddress {
            recipient: "Ana".to_string(),
            phone: None,
            line1: "Jl. Merdeka 1".to_string(),
            line2: None,
            city: "Bandung".to_string(),
            region: Some("Jawa Barat".to_string()),
            postal_code: "40111".to_string(),
            country: "ID".to_string(),
        };
        let json = serde_json::to_value(&address).unwrap();
        let back: ShippingAddress = serde_json::from_value(json).unwrap();
        assert_eq!(address, back);
    }
}
