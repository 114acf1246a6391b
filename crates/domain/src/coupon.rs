//! Discount coupons: eligibility rules and discount math.

use chrono::{DateTime, Utc};
use common::{CouponId, EntryId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// `value` is a percentage of the purchase amount.
    Percentage,
    /// `value` is a flat amount in minor units.
    Fixed,
}

labelled_enum!(CouponKind, "coupon kind" {
    Percentage => "percentage",
    Fixed => "fixed",
});

/// Why a coupon cannot be used. Checkout treats every variant the same way
/// (no discount), the reason only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    Inactive,
    NotYetValid,
    Expired,
    UsageLimitReached,
    CustomerLimitReached,
    BelowMinimumPurchase,
}

impl std::fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Ineligibility::Inactive => "coupon is inactive",
            Ineligibility::NotYetValid => "coupon is not valid yet",
            Ineligibility::Expired => "coupon has expired",
            Ineligibility::UsageLimitReached => "coupon usage limit reached",
            Ineligibility::CustomerLimitReached => "customer usage limit reached",
            Ineligibility::BelowMinimumPurchase => "purchase below coupon minimum",
        };
        f.write_str(reason)
    }
}

/// A discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Stored upper-cased; lookups are case-insensitive.
    pub code: String,
    pub kind: CouponKind,
    pub value: i64,
    pub min_purchase: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub per_customer_limit: Option<u32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    fn new(code: &str, kind: CouponKind, value: i64) -> Self {
        let now = Utc::now();
        Self {
            id: CouponId::new(),
            code: Self::normalize_code(code),
            kind,
            value,
            min_purchase: Money::zero(),
            max_discount: None,
            usage_limit: None,
            used_count: 0,
            per_customer_limit: None,
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// A coupon taking `percent` percent off.
    pub fn percentage(code: &str, percent: i64) -> Self {
        Self::new(code, CouponKind::Percentage, percent)
    }

    /// A coupon taking a flat amount off.
    pub fn fixed(code: &str, amount: Money) -> Self {
        Self::new(code, CouponKind::Fixed, amount.amount())
    }

    pub fn with_min_purchase(mut self, min_purchase: Money) -> Self {
        self.min_purchase = min_purchase;
        self
    }

    pub fn with_max_discount(mut self, max_discount: Money) -> Self {
        self.max_discount = Some(max_discount);
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_per_customer_limit(mut self, limit: u32) -> Self {
        self.per_customer_limit = Some(limit);
        self
    }

    pub fn with_validity(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Canonical form of a user-entered code.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Checks every eligibility rule for a purchase of `cart_total` by a
    /// customer who has already used this coupon `customer_uses` times.
    pub fn check_eligibility(
        &self,
        now: DateTime<Utc>,
        cart_total: Money,
        customer_uses: u32,
    ) -> Result<(), Ineligibility> {
        if !self.is_active {
            return Err(Ineligibility::Inactive);
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return Err(Ineligibility::NotYetValid);
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return Err(Ineligibility::Expired);
        }
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) {
            return Err(Ineligibility::UsageLimitReached);
        }
        if self
            .per_customer_limit
            .is_some_and(|limit| customer_uses >= limit)
        {
            return Err(Ineligibility::CustomerLimitReached);
        }
        if cart_total < self.min_purchase {
            return Err(Ineligibility::BelowMinimumPurchase);
        }
        Ok(())
    }

    /// Discount granted on `amount`.
    ///
    /// Percentage coupons take `amount * value / 100`, fixed coupons take
    /// `value`. The result is capped at `max_discount` and at `amount`, and is
    /// zero when `amount` is below the minimum purchase.
    pub fn calculate_discount(&self, amount: Money) -> Money {
        if amount < self.min_purchase || !amount.is_positive() {
            return Money::zero();
        }

        let raw = match self.kind {
            CouponKind::Percentage => amount.percent(self.value.clamp(0, 100)).unwrap_or(amount),
            CouponKind::Fixed => Money::new(self.value),
        };

        let capped = match self.max_discount {
            Some(max) => raw.min(max),
            None => raw,
        };

        capped.min(amount).max(Money::zero())
    }

    /// Counts one more use.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.used_count += 1;
        self.updated_at = now;
    }

    /// Gives back one use.
    pub fn release_use(&mut self, now: DateTime<Utc>) {
        self.used_count = self.used_count.saturating_sub(1);
        self.updated_at = now;
    }
}

/// Record of a coupon applied to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsage {
    pub id: EntryId,
    pub coupon_id: CouponId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub discount_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl CouponUsage {
    pub fn new(
        coupon_id: CouponId,
        order_id: OrderId,
        user_id: UserId,
        discount_amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            coupon_id,
            order_id,
            user_id,
            discount_amount,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_percentage_discount() {
        let coupon = Coupon::percentage("SAVE10", 10);
        assert_eq!(
            coupon.calculate_discount(Money::new(100_000)),
            Money::new(10_000)
        );
    }

    #[test]
    fn test_percentage_discount_capped() {
        let coupon = Coupon::percentage("SAVE10", 10).with_max_discount(Money::new(5_000));
        assert_eq!(
            coupon.calculate_discount(Money::new(100_000)),
            Money::new(5_000)
        );
    }

    #[test]
    fn test_fixed_discount() {
        let coupon = Coupon::fixed("FLAT", Money::new(15_000));
        assert_eq!(
            coupon.calculate_discount(Money::new(100_000)),
            Money::new(15_000)
        );
    }

    #[test]
    fn test_fixed_discount_never_exceeds_amount() {
        let coupon = Coupon::fixed("FLAT", Money::new(15_000));
        assert_eq!(
            coupon.calculate_discount(Money::new(10_000)),
            Money::new(10_000)
        );
    }

    #[test]
    fn test_discount_zero_below_minimum() {
        let coupon = Coupon::percentage("SAVE10", 10).with_min_purchase(Money::new(50_000));
        assert_eq!(coupon.calculate_discount(Money::new(49_999)), Money::zero());
    }

    #[test]
    fn test_code_is_normalized() {
        assert_eq!(Coupon::percentage(" save10 ", 10).code, "SAVE10");
    }

    #[test]
    fn test_inactive_coupon_is_never_eligible() {
        let coupon = Coupon::percentage("SAVE10", 10).deactivated();
        assert_eq!(
            coupon.check_eligibility(Utc::now(), Money::new(1_000_000), 0),
            Err(Ineligibility::Inactive)
        );
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let future = Coupon::percentage("LATER", 10).with_validity(Some(now + Duration::days(1)), None);
        assert_eq!(
            future.check_eligibility(now, Money::new(100), 0),
            Err(Ineligibility::NotYetValid)
        );

        let past = Coupon::percentage("OLD", 10).with_validity(None, Some(now - Duration::days(1)));
        assert_eq!(
            past.check_eligibility(now, Money::new(100), 0),
            Err(Ineligibility::Expired)
        );
    }

    #[test]
    fn test_usage_limits() {
        let now = Utc::now();
        let mut coupon = Coupon::percentage("ONCE", 10).with_usage_limit(1);
        assert!(coupon.check_eligibility(now, Money::new(100), 0).is_ok());
        coupon.record_use(now);
        assert_eq!(
            coupon.check_eligibility(now, Money::new(100), 0),
            Err(Ineligibility::UsageLimitReached)
        );
        coupon.release_use(now);
        assert_eq!(coupon.used_count, 0);

        let per_customer = Coupon::percentage("MINE", 10).with_per_customer_limit(2);
        assert_eq!(
            per_customer.check_eligibility(now, Money::new(100), 2),
            Err(Ineligibility::CustomerLimitReached)
        );
    }

    #[test]
    fn test_minimum_purchase() {
        let coupon = Coupon::percentage("BIG", 10).with_min_purchase(Money::new(50_000));
        assert_eq!(
            coupon.check_eligibility(Utc::now(), Money::new(10_000), 0),
            Err(Ineligibility::BelowMinimumPurchase)
        );
    }

    #[test]
    fn test_release_use_saturates() {
        let mut coupon = Coupon::percentage("SAVE10", 10);
        coupon.release_use(Utc::now());
        assert_eq!(coupon.used_count, 0);
    }
}
