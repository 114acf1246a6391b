//! Integer money amounts.

use serde::{Deserialize, Serialize};

/// Money amount in the smallest currency unit.
///
/// All arithmetic is checked integer arithmetic and returns `None` on
/// overflow; percentage calculations truncate toward zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a money amount from minor units.
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The largest representable amount.
    pub const MAX: Money = Money(i64::MAX);

    /// Returns the amount in minor units.
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity. `None` if the product does not fit.
    pub fn multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Returns `rate` percent of this amount, truncated. `None` if the result
    /// does not fit.
    pub fn percent(&self, rate: i64) -> Option<Money> {
        let scaled = i128::from(self.0) * i128::from(rate) / 100;
        i64::try_from(scaled).ok().map(Money)
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Sums amounts, stopping at the first overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(1000);
        let b = Money::new(500);

        assert_eq!(a.checked_add(b), Some(Money::new(1500)));
        assert_eq!(a.checked_sub(b), Some(Money::new(500)));
        assert_eq!(a.multiply(3), Some(Money::new(3000)));
    }

    #[test]
    fn test_money_percent_truncates() {
        assert_eq!(Money::new(100_000).percent(10), Some(Money::new(10_000)));
        assert_eq!(Money::new(999).percent(10), Some(Money::new(99)));
        assert_eq!(Money::new(5).percent(0), Some(Money::zero()));
    }

    #[test]
    fn test_overflow_is_reported() {
        let half = Money::new(i64::MAX / 2 + 1);
        assert_eq!(half.multiply(2), None);
        assert_eq!(Money::MAX.checked_add(Money::new(1)), None);
        assert_eq!(Money::new(i64::MIN).checked_sub(Money::new(1)), None);
        assert_eq!(Money::MAX.percent(200), None);
        assert_eq!(Money::MAX.percent(10), Some(Money::new(i64::MAX / 10)));
    }

    #[test]
    fn test_money_sign_checks() {
        assert!(Money::new(100).is_positive());
        assert!(Money::zero().is_zero());
        assert!(Money::new(-100).is_negative());
    }

    #[test]
    fn test_money_checked_sum() {
        let amounts = [Money::new(1), Money::new(2), Money::new(3)];
        assert_eq!(Money::checked_sum(amounts), Some(Money::new(6)));
        assert_eq!(Money::checked_sum([Money::MAX, Money::new(1)]), None);
        assert_eq!(Money::checked_sum([]), Some(Money::zero()));
    }

    #[test]
    fn test_money_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Money::new(120_000)).unwrap(), "120000");
    }
}
