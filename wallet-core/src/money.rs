//! Fixed-point money at ledger scale
//!
//! Every amount the ledger stores or moves is a [`Money`]: an exact
//! [`Decimal`] held at scale 2 that is never negative. Values with more than
//! two significant fractional digits are rejected rather than rounded, and
//! nothing above [`MAX_MINOR_UNITS`] is accepted so every value fits a
//! `NUMERIC(15, 2)` column.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits carried by every ledger amount
pub const SCALE: u32 = 2;

/// Minor units per major unit (kobo per naira, cents per dollar)
const MINOR_PER_MAJOR: i64 = 100;

/// Largest amount in minor units (`9999999999999.99`)
pub const MAX_MINOR_UNITS: i64 = 999_999_999_999_999;

/// Errors raised when constructing or converting money
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Amount below zero
    #[error("amount must not be negative: {0}")]
    Negative(Decimal),

    /// Amount equal to zero where a positive amount is required
    #[error("amount must be greater than zero")]
    NotPositive,

    /// More than two significant fractional digits
    #[error("amount has more than {SCALE} decimal places: {0}")]
    TooPrecise(Decimal),

    /// Above the largest storable amount
    #[error("amount exceeds maximum of 9999999999999.99: {0}")]
    TooLarge(Decimal),

    /// Result does not fit the representation
    #[error("amount out of range")]
    Overflow,

    /// Text that is not a decimal number
    #[error("not a decimal amount: {0}")]
    Unparseable(String),
}

/// Non-negative amount with exactly two decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero at ledger scale (`0.00`)
    pub fn zero() -> Self {
        Money(Decimal::new(0, SCALE))
    }

    /// Largest representable amount
    pub fn max() -> Self {
        Money(Decimal::new(MAX_MINOR_UNITS, SCALE))
    }

    /// Accept any non-negative amount expressible at scale 2.
    ///
    /// Trailing zeros past the second decimal place are tolerated
    /// (`5.000` becomes `5.00`); significant digits there are not.
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyError::Negative(value));
        }

        let mut normalized = value.normalize();
        if normalized.scale() > SCALE {
            return Err(MoneyError::TooPrecise(value));
        }

        normalized.set_sign_positive(true);
        normalized.rescale(SCALE);
        if normalized > Self::max().0 {
            return Err(MoneyError::TooLarge(value));
        }
        Ok(Money(normalized))
    }

    /// Like [`Money::new`] but zero is rejected as well.
    ///
    /// This is the gate for every amount a caller asks to deposit or transfer.
    pub fn positive(value: Decimal) -> Result<Self, MoneyError> {
        let money = Self::new(value)?;
        if money.is_zero() {
            return Err(MoneyError::NotPositive);
        }
        Ok(money)
    }

    /// Build from gateway minor units (e.g. kobo)
    pub fn from_minor_units(minor: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::new(minor, SCALE))
    }

    /// Convert to gateway minor units: multiply by 100, truncate toward zero.
    ///
    /// Amounts are already held at scale 2, so truncation never discards a
    /// significant digit.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        self.0
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .map(|minor| minor.trunc())
            .and_then(|minor| minor.to_i64())
            .ok_or(MoneyError::Overflow)
    }

    /// Exact sum, `None` above [`Money::max`]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0
            .checked_add(other.0)
            .map(Self::at_scale)
            .filter(|sum| *sum <= Self::max())
    }

    /// Exact difference, `None` if the result would be negative
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        if other > self {
            return None;
        }
        self.0.checked_sub(other.0).map(Self::at_scale)
    }

    /// True for `0.00`
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Underlying decimal (scale 2)
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    fn at_scale(mut value: Decimal) -> Money {
        value.rescale(SCALE);
        Money(value)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| MoneyError::Unparseable(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}
