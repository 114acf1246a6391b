//! Coupon validation and usage accounting.

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderId, UserId};
use domain::{Coupon, CouponUsage};
use store::{Store, StoreTx, constraints};

use crate::error::{FulfillmentError, Result};

pub struct CouponEngine<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for CouponEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> CouponEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Looks up a coupon the user may apply to `cart_total`.
    ///
    /// Unknown or ineligible codes yield `None`, never an error.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: UserId,
        cart_total: Money,
    ) -> Result<Option<Coupon>> {
        let Some(coupon) = self.store.get_coupon_by_code(code).await? else {
            tracing::debug!("unknown coupon code");
            return Ok(None);
        };
        let uses = self.store.count_coupon_usages(coupon.id, user_id).await?;
        Ok(Self::eligible(coupon, cart_total, uses))
    }

    /// Same rules as [`validate`](Self::validate), evaluated against the
    /// locked coupon row so concurrent checkouts cannot overrun its limits.
    #[tracing::instrument(skip(self, tx))]
    pub async fn validate_in(
        &self,
        tx: &mut S::Tx,
        code: &str,
        user_id: UserId,
        cart_total: Money,
    ) -> Result<Option<Coupon>> {
        let Some(coupon) = tx.lock_coupon_by_code(code).await? else {
            tracing::debug!("unknown coupon code");
            return Ok(None);
        };
        let uses = tx.count_coupon_usages(coupon.id, user_id).await?;
        Ok(Self::eligible(coupon, cart_total, uses))
    }

    fn eligible(coupon: Coupon, cart_total: Money, uses: u32) -> Option<Coupon> {
        match coupon.check_eligibility(Utc::now(), cart_total, uses) {
            Ok(()) => Some(coupon),
            Err(reason) => {
                tracing::debug!(code = %coupon.code, %reason, "coupon rejected");
                None
            }
        }
    }

    /// Discount `coupon` grants on `amount`.
    pub fn calculate_discount(&self, coupon: &Coupon, amount: Money) -> Money {
        coupon.calculate_discount(amount)
    }

    /// Counts a use of a locked coupon and records it against the order.
    #[tracing::instrument(skip(self, tx, coupon), fields(code = %coupon.code))]
    pub async fn apply(
        &self,
        tx: &mut S::Tx,
        coupon: &mut Coupon,
        order_id: OrderId,
        user_id: UserId,
        discount: Money,
    ) -> Result<CouponUsage> {
        let now = Utc::now();
        coupon.record_use(now);
        tx.update_coupon(coupon).await?;

        let usage = CouponUsage::new(coupon.id, order_id, user_id, discount, now);
        tx.insert_coupon_usage(&usage).await?;
        Ok(usage)
    }

    /// Gives back the use recorded by `usage` and deletes the usage row.
    #[tracing::instrument(skip(self, tx))]
    pub async fn revoke(&self, tx: &mut S::Tx, usage: &CouponUsage) -> Result<()> {
        if let Some(mut coupon) = tx.lock_coupon(usage.coupon_id).await? {
            coupon.release_use(Utc::now());
            tx.update_coupon(&coupon).await?;
        }
        tx.delete_coupon_usage(usage.id).await?;
        Ok(())
    }

    /// Stores a new coupon. Codes are unique case-insensitively.
    #[tracing::instrument(skip(self, coupon), fields(code = %coupon.code))]
    pub async fn create_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        let code = coupon.code.clone();
        let duplicate = || FulfillmentError::DuplicateCoupon { code: code.clone() };

        let mut tx = self.store.begin().await?;
        if tx.lock_coupon_by_code(&coupon.code).await?.is_some() {
            return Err(duplicate());
        }
        tx.insert_coupon(&coupon).await?;
        match tx.commit().await {
            Err(err) if err.violated_constraint() == Some(constraints::COUPON_CODE) => {
                Err(duplicate())
            }
            Err(err) => Err(err.into()),
            Ok(()) => Ok(coupon),
        }
    }

    pub async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.store.get_coupon_by_code(code).await?)
    }

    pub async fn usage_for_order(&self, order_id: OrderId) -> Result<Option<CouponUsage>> {
        Ok(self.store.coupon_usage_for_order(order_id).await?)
    }
}
