//! # Money Module
//!
//! Monetary amounts in the smallest currency unit (cents / centavos).
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  0.1 + 0.2 = 0.30000000000000004  in floating point                     │
//! │                                                                         │
//! │  Sale totals are persisted and re-read for receipts and reports, so    │
//! │  every stored amount is an i64 count of minor units. Fractional        │
//! │  intermediate values (exchange rates, margin division) are computed    │
//! │  with `rust_decimal` and rounded exactly once, back into Money.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use orbia_core::money::Money;
//!
//! let price = Money::from_cents(1099);
//! let line = price.checked_mul_quantity(3).unwrap();
//! assert_eq!(line.cents(), 3297);
//! assert_eq!(line.to_string(), "32.97");
//! ```

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

/// Decimal places of every stored amount.
pub const MINOR_UNIT_DIGITS: u32 = 2;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor units.
///
/// Currency is carried next to the amount (on the sale, on the item), never
/// inside it: a sale is single-currency by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole units (e.g. `from_major(80)` = 80.00).
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Line total for a quantity, `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use orbia_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(10_000);
    /// assert_eq!(unit_price.checked_mul_quantity(3), Some(Money::from_cents(30_000)));
    /// assert_eq!(Money::from_cents(i64::MAX / 2).checked_mul_quantity(3), None);
    /// ```
    #[inline]
    pub const fn checked_mul_quantity(&self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Sum of many amounts, `None` on overflow.
    pub fn checked_sum<'a, I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(*m))
    }

    /// Returns `bps / 10000` of this amount, rounded half away from zero.
    ///
    /// 1000 bps = 10%. The product is taken in i128; `None` when the result
    /// does not fit back into i64.
    ///
    /// ```rust
    /// use orbia_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(35_000).percentage_of(1_000).unwrap().cents(), 3_500);
    /// // 8.25% of 10.00 = 0.825 -> 0.83
    /// assert_eq!(Money::from_cents(1_000).percentage_of(825).unwrap().cents(), 83);
    /// ```
    pub fn percentage_of(&self, bps: i64) -> Option<Money> {
        let product = self.0 as i128 * bps as i128;
        let half = if product < 0 { -5_000 } else { 5_000 };
        i64::try_from((product + half) / 10_000).ok().map(Money)
    }

    /// Smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Exact decimal view (`1099` → `10.99`).
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_DIGITS)
    }

    /// Rounds a decimal amount to minor units, half away from zero.
    ///
    /// Returns `None` when the value does not fit in i64 minor units.
    pub fn from_decimal(value: Decimal) -> Option<Money> {
        let rounded =
            value.round_dp_with_strategy(MINOR_UNIT_DIGITS, RoundingStrategy::MidpointAwayFromZero);
        rounded
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.to_i64())
            .map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain `major.minor` rendering; currency symbols are the UI's job.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_percentage_rounds_half_away_from_zero() {
        let pct = |cents: i64, bps: i64| Money::from_cents(cents).percentage_of(bps).unwrap().cents();
        assert_eq!(pct(1_000, 1_000), 100);
        assert_eq!(pct(1_000, 825), 83);
        assert_eq!(pct(-1_000, 825), -83);
        assert_eq!(pct(1, 4_999), 0);
        assert_eq!(pct(1_000, 15_000), 1_500);
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        assert_eq!(Money::from_cents(i64::MAX / 2).checked_mul_quantity(3), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(Money::from_cents(i64::MAX).percentage_of(20_000), None);

        let lines = [Money::from_cents(i64::MAX), Money::from_cents(100)];
        assert_eq!(Money::checked_sum(&lines), None);
        let lines = [Money::from_cents(300), Money::from_cents(50)];
        assert_eq!(Money::checked_sum(&lines), Some(Money::from_cents(350)));
    }

    #[test]
    fn test_decimal_round_trip_rounds_once() {
        let d = Decimal::from_str("100.005").unwrap();
        assert_eq!(Money::from_decimal(d).unwrap().cents(), 10_001);

        let d = Decimal::from_str("99.994").unwrap();
        assert_eq!(Money::from_decimal(d).unwrap().cents(), 9_999);

        assert_eq!(Money::from_cents(1099).to_decimal().to_string(), "10.99");

        assert_eq!(Money::from_decimal(Decimal::MAX), None);
        assert_eq!(Money::from_decimal(Decimal::from(i64::MAX)), None);
    }

    #[test]
    fn test_sum_and_min() {
        let total: Money = [Money::from_cents(300), Money::from_cents(50)].iter().sum();
        assert_eq!(total.cents(), 350);
        assert_eq!(total.min(Money::from_cents(100)).cents(), 100);
        assert_eq!(total.min(Money::from_cents(1_000)).cents(), 350);
    }
}
