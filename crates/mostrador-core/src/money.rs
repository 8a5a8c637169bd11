//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every price, subtotal, discount, total and cash amount in the        │
//! │    system is an i64 number of cents. The database, the API and the      │
//! │    arithmetic all use cents; only a UI converts for display.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Discount percentages are carried as basis points (`DiscountRate`), so a
//! customer's "20%" is the integer 2000 and the arithmetic stays exact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: allows negative values for register differences
/// - **Single field tuple struct**: zero-cost abstraction over i64
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (pesos/dollars) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use mostrador_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(10000); // $100.00
    /// assert_eq!(unit_price.multiply_quantity(2).cents(), 20000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns the given percentage of this amount, rounded to the nearest
    /// cent (half-up via the +5000 term).
    ///
    /// This is the discount amount, not the discounted price:
    /// `total = subtotal - subtotal.percentage_of(rate)`.
    ///
    /// ## Example
    /// ```rust
    /// use mostrador_core::money::{DiscountRate, Money};
    ///
    /// let subtotal = Money::from_cents(20000); // $200.00
    /// let rate = DiscountRate::from_percent(20); // premium customer
    /// assert_eq!(subtotal.percentage_of(rate).cents(), 4000); // $40.00
    /// ```
    pub fn percentage_of(&self, rate: DiscountRate) -> Money {
        // i128 intermediate to prevent overflow on large amounts.
        let amount = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(amount as i64)
    }

    /// Change due for a cash payment: `max(0, received - total)`.
    ///
    /// A customer can underpay only through non-cash methods, so change
    /// never goes negative.
    pub fn change_for(total: Money, received: Money) -> Money {
        Money((received.0 - total.0).max(0))
    }
}

// =============================================================================
// Discount Rate
// =============================================================================

/// A discount percentage in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000. A premium customer's 20% discount is
/// 2000 bps. Integer bps keep every computation exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// Creates a discount rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        DiscountRate(bps)
    }

    /// Creates a discount rate from a whole percentage (20 → 2000 bps).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        DiscountRate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero discount.
    #[inline]
    pub const fn zero() -> Self {
        DiscountRate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for DiscountRate {
    fn default() -> Self {
        DiscountRate::zero()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display for debugging; UI formatting handles localization.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.major().abs(), self.minor())
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

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
    }

    #[test]
    fn test_percentage_of() {
        // $200.00 at 20% = $40.00 (premium tier scenario)
        let subtotal = Money::from_cents(20000);
        let discount = subtotal.percentage_of(DiscountRate::from_percent(20));
        assert_eq!(discount.cents(), 4000);
        assert_eq!((subtotal - discount).cents(), 16000);
    }

    #[test]
    fn test_percentage_of_rounds_half_up() {
        // $10.01 at 15% = $1.5015 → $1.50; $10.03 at 15% = $1.5045 → $1.50
        assert_eq!(
            Money::from_cents(1001)
                .percentage_of(DiscountRate::from_percent(15))
                .cents(),
            150
        );
        // $10.00 at 8.25% = $0.825 → $0.83
        assert_eq!(
            Money::from_cents(1000)
                .percentage_of(DiscountRate::from_bps(825))
                .cents(),
            83
        );
    }

    #[test]
    fn test_change_for() {
        let total = Money::from_cents(16000);
        assert_eq!(Money::change_for(total, Money::from_cents(20000)).cents(), 4000);
        // Underpayment (non-cash remainder) never yields negative change.
        assert_eq!(Money::change_for(total, Money::from_cents(10000)).cents(), 0);
        assert_eq!(Money::change_for(total, Money::zero()).cents(), 0);
    }

    #[test]
    fn test_discount_rate() {
        let rate = DiscountRate::from_percent(20);
        assert_eq!(rate.bps(), 2000);
        assert!((rate.percent() - 20.0).abs() < f64::EPSILON);
        assert!(DiscountRate::zero().is_zero());
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
    }
}
