//! Exact monetary amounts
//!
//! Ledger amounts are fixed-precision decimals with scale 2 and room for
//! 13 integer digits. Every arithmetic operation is exact: a value that
//! would need more than two decimal places is rejected rather than rounded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places carried by every amount
pub const SCALE: u32 = 2;

/// Number of integer digits an amount may carry
pub const MAX_INTEGER_DIGITS: u32 = 13;

/// Errors that can occur during amount operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount {0} has more than two decimal places")]
    ExcessPrecision(Decimal),

    #[error("Amount {0} exceeds 13 integer digits")]
    OutOfRange(Decimal),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount with exactly two decimal places
///
/// Amounts carry no currency; the ledger operates in a single functional
/// currency. Construction validates scale and magnitude, so any `Amount`
/// in hand is safe to persist to a `NUMERIC(15, 2)` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Creates an amount from a decimal value
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::ExcessPrecision` if the value needs more than two
    /// decimal places and `MoneyError::OutOfRange` if it exceeds 13 integer digits.
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value.normalize().scale() > SCALE {
            return Err(MoneyError::ExcessPrecision(value));
        }
        if value.abs() >= Self::limit() {
            return Err(MoneyError::OutOfRange(value));
        }
        let mut exact = value;
        exact.rescale(SCALE);
        Ok(Self::unsigned_zero(exact))
    }

    /// Drops the sign of a zero so it never displays as `-0.00`
    fn unsigned_zero(mut value: Decimal) -> Self {
        if value.is_zero() {
            value.set_sign_positive(true);
        }
        Self(value)
    }

    /// Creates an amount from minor units (cents)
    pub fn from_minor(minor_units: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::new(minor_units, SCALE))
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Returns the underlying decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns the value in minor units (cents)
    pub fn minor_units(&self) -> i128 {
        let mut scaled = self.0;
        scaled.rescale(SCALE);
        scaled.mantissa()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Checked addition that stays within the representable range
    pub fn checked_add(&self, other: &Amount) -> Result<Amount, MoneyError> {
        let sum = self.0.checked_add(other.0).ok_or(MoneyError::Overflow)?;
        Self::new(sum).map_err(|_| MoneyError::Overflow)
    }

    /// Checked subtraction that stays within the representable range
    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, MoneyError> {
        let diff = self.0.checked_sub(other.0).ok_or(MoneyError::Overflow)?;
        Self::new(diff).map_err(|_| MoneyError::Overflow)
    }

    /// Multiplies by a quantity, failing if the product is not exact at scale 2
    pub fn checked_mul(&self, quantity: Decimal) -> Result<Amount, MoneyError> {
        let product = self.0.checked_mul(quantity).ok_or(MoneyError::Overflow)?;
        Self::new(product)
    }

    /// Sums amounts with range checking
    pub fn checked_sum<'a, I>(amounts: I) -> Result<Amount, MoneyError>
    where
        I: IntoIterator<Item = &'a Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(amount))
    }

    fn limit() -> Decimal {
        Decimal::from(10_i64.pow(MAX_INTEGER_DIGITS))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Decimal {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| MoneyError::InvalidAmount(format!("{}: {}", s, e)))?;
        Amount::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::unsigned_zero(self.0 + other.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Self) {
        *self = Self::unsigned_zero(self.0 + other.0);
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::unsigned_zero(self.0 - other.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, other: Self) {
        *self = Self::unsigned_zero(self.0 - other.0);
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self {
        Self::unsigned_zero(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, amount| acc + amount)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, amount| acc + *amount)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn checked_sum_is_exact(minors in proptest::collection::vec(-1_000_000_000i64..1_000_000_000i64, 0..50)) {
            let amounts: Vec<Amount> = minors.iter().map(|m| Amount::from_minor(*m).unwrap()).collect();
            let total = Amount::checked_sum(&amounts).unwrap();
            let expected: i128 = minors.iter().map(|m| *m as i128).sum();
            prop_assert_eq!(total.minor_units(), expected);
        }

        #[test]
        fn amount_arithmetic_is_associative(
            a in -1_000_000i64..1_000_000i64,
            b in -1_000_000i64..1_000_000i64,
            c in -1_000_000i64..1_000_000i64
        ) {
            let ma = Amount::from_minor(a).unwrap();
            let mb = Amount::from_minor(b).unwrap();
            let mc = Amount::from_minor(c).unwrap();

            prop_assert_eq!((ma + mb) + mc, ma + (mb + mc));
        }
    }
}
