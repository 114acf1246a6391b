//! Order entity implementation.

use chrono::{DateTime, Utc};
use common::{MerchantId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::pricing::OrderTotals;

use super::{OrderError, OrderPaymentStatus, OrderStatus, ShippingAddress, ShippingStatus};

/// Checkout input for a new order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewOrder {
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub shipping_cost: Money,
    pub notes: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

/// A placed order.
///
/// Fields are public for reading and persistence. Status changes go through
/// the transition methods, which keep status, shipping status and the
/// lifecycle timestamps in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub merchant_id: MerchantId,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub shipping_status: ShippingStatus,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub total_price: Money,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub cancellation_reason: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds a pending order from checkout input and server-computed totals.
    ///
    /// `coupon_code` is only kept when a discount was actually granted.
    pub fn place(
        order_number: String,
        user_id: UserId,
        merchant_id: MerchantId,
        input: NewOrder,
        totals: OrderTotals,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if input.shipping_cost.is_negative() {
            return Err(OrderError::InvalidShippingCost {
                amount: input.shipping_cost,
            });
        }

        let coupon_code = input.coupon_code.filter(|_| totals.discount.is_positive());

        Ok(Self {
            id: OrderId::new(),
            order_number,
            user_id,
            merchant_id,
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Pending,
            shipping_status: ShippingStatus::Pending,
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping_cost: totals.shipping,
            discount_amount: totals.discount,
            total_price: totals.total,
            coupon_code,
            notes: input.notes,
            tracking_number: None,
            cancellation_reason: None,
            shipping_address: input.shipping_address,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            refunded_at: None,
        })
    }

    /// The stored money breakdown.
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: self.subtotal,
            discount: self.discount_amount,
            tax: self.tax,
            shipping: self.shipping_cost,
            total: self.total_price,
        }
    }

    /// Returns true if the stored total matches its components.
    pub fn totals_are_consistent(&self) -> bool {
        self.subtotal
            .checked_sub(self.discount_amount)
            .and_then(|amount| amount.checked_add(self.tax))
            .and_then(|amount| amount.checked_add(self.shipping_cost))
            == Some(self.total_price)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OrderStatus::Cancelled
    }

    // Transitions

    /// Pending to confirmed.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Confirmed, "confirm", now)?;
        self.confirmed_at = Some(now);
        Ok(())
    }

    /// Confirmed to processing.
    pub fn start_processing(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Processing, "start processing", now)?;
        self.shipping_status = ShippingStatus::Processing;
        Ok(())
    }

    /// Processing to shipped.
    pub fn ship(
        &mut self,
        tracking_number: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.transition(OrderStatus::Shipped, "ship", now)?;
        self.shipping_status = ShippingStatus::Shipped;
        self.shipped_at = Some(now);
        if tracking_number.is_some() {
            self.tracking_number = tracking_number;
        }
        Ok(())
    }

    /// Shipped to delivered.
    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Delivered, "deliver", now)?;
        self.shipping_status = ShippingStatus::Delivered;
        self.delivered_at = Some(now);
        Ok(())
    }

    /// Delivered to completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Completed, "complete", now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Delivered or completed to refunded.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Refunded, "refund", now)?;
        self.refunded_at = Some(now);
        Ok(())
    }

    /// Cancels an order that has not been delivered yet.
    pub fn cancel(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled, "cancel", now)?;
        self.shipping_status = ShippingStatus::Cancelled;
        self.cancellation_reason = Some(reason);
        self.cancelled_at = Some(now);
        Ok(())
    }

    /// Mirrors the payment outcome onto the order.
    pub fn set_payment_status(&mut self, status: OrderPaymentStatus, now: DateTime<Utc>) {
        self.payment_status = status;
        self.updated_at = now;
    }

    fn transition(
        &mut self,
        next: OrderStatus,
        action: &'static str,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                action,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
