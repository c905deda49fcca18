//! Money amounts in minor units.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (paise) to avoid floating point drift.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Converts a decimal major-unit amount (e.g. `49.5`) into minor units.
    ///
    /// Returns `None` for non-finite input or values that do not fit.
    pub fn from_major(major: f64) -> Option<Self> {
        if !major.is_finite() {
            return None;
        }
        let minor = (major * 100.0).round();
        // `i64::MAX as f64` rounds up to 2^63, which itself does not fit.
        if minor.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(minor as i64))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the amount as a decimal major-unit value.
    pub fn as_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies by a quantity, saturating at the numeric bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}₹{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_rounds_to_minor_units() {
        assert_eq!(Money::from_major(120.0).unwrap().minor(), 12000);
        assert_eq!(Money::from_major(49.5).unwrap().minor(), 4950);
        assert_eq!(Money::from_major(0.125).unwrap().minor(), 13);
        assert!(Money::from_major(f64::NAN).is_none());
        assert!(Money::from_major(f64::INFINITY).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(50000).to_string(), "₹500.00");
        assert_eq!(Money::from_minor(5).to_string(), "₹0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-₹12.34");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1000);
        assert_eq!(a.multiply(3).minor(), 3000);
        assert_eq!((a + Money::from_minor(1)).minor(), 1001);
        let total: Money = vec![a, a].into_iter().sum();
        assert_eq!(total.minor(), 2000);
    }

    #[test]
    fn test_from_major_rejects_values_outside_i64() {
        assert!(Money::from_major(2f64.powi(63) / 100.0).is_none());
        assert!(Money::from_major(-(2f64.powi(63)) / 100.0).is_none());
        assert!(Money::from_major(1e15).is_some());
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let big = Money::from_minor(i64::MAX / 2 + 1);
        assert!(big.checked_multiply(2).is_none());
        assert!(big.checked_add(big).is_none());
        assert_eq!(big.multiply(2).minor(), i64::MAX);
        assert_eq!(
            Money::from_minor(250).checked_multiply(4),
            Some(Money::from_minor(1000))
        );
    }

    #[test]
    fn test_as_major() {
        assert_eq!(Money::from_minor(4950).as_major(), 49.5);
    }
}
