use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A monetary amount, rounded to the minor-unit precision of its currency
/// at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    /// Rounds `value` to `exponent` decimal places (the currency's
    /// minor-unit count: 2 for USD, 0 for JPY, 3 for BHD, ...).
    pub fn from_decimal(value: Decimal, exponent: u32) -> Self {
        Money(value.round_dp(exponent))
    }

    pub fn from_minor_units(units: i64, exponent: u32) -> Self {
        Money(Decimal::new(units, exponent))
    }

    pub fn to_minor_units(self, exponent: u32) -> i64 {
        (self.0 * pow10(exponent)).round().to_i64().unwrap()
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

fn pow10(exponent: u32) -> Decimal {
    Decimal::from(10i64.pow(exponent))
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}
