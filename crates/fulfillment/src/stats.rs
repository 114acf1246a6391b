//! Read-only merchant statistics.

use std::collections::BTreeMap;

use common::{MerchantId, Money};
use domain::{Order, OrderStatus};
use serde::Serialize;

/// Aggregate figures over one merchant's orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MerchantStats {
    pub merchant_id: MerchantId,
    pub total_orders: u64,
    /// Order count per status label. Every status is present.
    pub orders_by_status: BTreeMap<&'static str, u64>,
    /// Sum of totals over orders that were not cancelled.
    pub gross_revenue: Money,
    /// Gross revenue divided by the number of orders that were not cancelled.
    pub average_order_value: Money,
    pub items_sold: u64,
}

impl MerchantStats {
    pub fn from_orders(merchant_id: MerchantId, orders: &[Order], items_sold: u64) -> Self {
        let mut orders_by_status: BTreeMap<&'static str, u64> = OrderStatus::ALL
            .iter()
            .map(|status| (status.as_str(), 0))
            .collect();
        for order in orders {
            *orders_by_status.entry(order.status.as_str()).or_default() += 1;
        }

        let counted: Vec<&Order> = orders.iter().filter(|o| !o.is_cancelled()).collect();
        let gross_revenue =
            Money::checked_sum(counted.iter().map(|o| o.total_price)).unwrap_or(Money::MAX);
        let average_order_value = match i64::try_from(counted.len()) {
            Ok(count) if count > 0 => Money::new(gross_revenue.amount() / count),
            _ => Money::zero(),
        };

        Self {
            merchant_id,
            total_orders: orders.len() as u64,
            orders_by_status,
            gross_revenue,
            average_order_value,
            items_sold,
        }
    }
}
