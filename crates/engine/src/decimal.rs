use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, Mul, Neg, Sub},
    str::FromStr,
};

use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{EngineError, ResultEngine};

/// Fractional digits kept by [`Decimal::checked_div`].
pub const DIVISION_SCALE: u32 = 16;

/// Signed fixed-point number used for **all** balances, prices and points.
///
/// Addition, subtraction and multiplication are exact. Division is the only
/// lossy operation: it rounds to [`DIVISION_SCALE`] fractional digits using
/// round-half-away-from-zero.
///
/// A `Decimal` is immutable; every operation returns a new value.
///
/// # Examples
///
/// ```rust
/// use engine::Decimal;
///
/// let price: Decimal = "30".parse().unwrap();
/// let total = price.checked_mul(Decimal::from(3)).unwrap();
/// assert_eq!(total, "90.00".parse().unwrap());
/// assert!("abc".parse::<Decimal>().is_err());
/// ```
///
/// Textual output round-trips through parsing, but trailing zeros are not
/// preserved:
///
/// ```rust
/// use engine::Decimal;
///
/// let value: Decimal = "12.500".parse().unwrap();
/// assert_eq!(value.to_string(), "12.5");
/// assert_eq!(value.to_string().parse::<Decimal>().unwrap(), value);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Decimal(rust_decimal::Decimal);

impl Decimal {
    pub const ZERO: Decimal = Decimal(rust_decimal::Decimal::ZERO);
    pub const ONE: Decimal = Decimal(rust_decimal::Decimal::ONE);

    /// Parses a decimal literal such as `"10"`, `"-0.25"` or `"+3.5"`.
    ///
    /// Fails with [`EngineError::InvalidNumericLiteral`] when the input is not
    /// a plain decimal number or cannot be represented without rounding.
    pub fn parse(value: &str) -> ResultEngine<Self> {
        let invalid = || EngineError::InvalidNumericLiteral(value.to_string());

        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains('_') {
            return Err(invalid());
        }
        rust_decimal::Decimal::from_str_exact(trimmed)
            .map(Decimal)
            .map_err(|_| invalid())
    }

    /// Exact addition.
    pub fn checked_add(self, rhs: Decimal) -> ResultEngine<Decimal> {
        self.0
            .checked_add(rhs.0)
            .map(Decimal)
            .ok_or_else(|| EngineError::NumericOverflow(format!("{self} + {rhs}")))
    }

    /// Exact subtraction.
    pub fn checked_sub(self, rhs: Decimal) -> ResultEngine<Decimal> {
        self.0
            .checked_sub(rhs.0)
            .map(Decimal)
            .ok_or_else(|| EngineError::NumericOverflow(format!("{self} - {rhs}")))
    }

    /// Exact multiplication.
    pub fn checked_mul(self, rhs: Decimal) -> ResultEngine<Decimal> {
        self.0
            .checked_mul(rhs.0)
            .map(Decimal)
            .ok_or_else(|| EngineError::NumericOverflow(format!("{self} * {rhs}")))
    }

    /// Division rounded to [`DIVISION_SCALE`] digits, half away from zero.
    ///
    /// ```rust
    /// use engine::{Decimal, EngineError};
    ///
    /// let third = Decimal::ONE.checked_div(Decimal::from(3)).unwrap();
    /// assert_eq!(third.to_string(), "0.3333333333333333");
    /// assert_eq!(
    ///     Decimal::ONE.checked_div(Decimal::ZERO),
    ///     Err(EngineError::DivisionByZero)
    /// );
    /// ```
    pub fn checked_div(self, rhs: Decimal) -> ResultEngine<Decimal> {
        if rhs.is_zero() {
            return Err(EngineError::DivisionByZero);
        }
        self.0
            .checked_div(rhs.0)
            .map(|quotient| {
                Decimal(quotient.round_dp_with_strategy(
                    DIVISION_SCALE,
                    RoundingStrategy::MidpointAwayFromZero,
                ))
            })
            .ok_or_else(|| EngineError::NumericOverflow(format!("{self} / {rhs}")))
    }

    /// Returns `true` if the value is 0.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.cmp(&Self::ZERO) == Ordering::Equal
    }

    /// Returns `true` if the value is greater than 0.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.cmp(&Self::ZERO) == Ordering::Greater
    }

    /// Returns `true` if the value is lower than 0.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.cmp(&Self::ZERO) == Ordering::Less
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

impl FromStr for Decimal {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::parse(s)
    }
}

impl TryFrom<&str> for Decimal {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Decimal::parse(value)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self(rust_decimal::Decimal::from(value))
    }
}

impl Add for Decimal {
    type Output = Decimal;

    /// # Panics
    ///
    /// Panics on overflow; use [`Decimal::checked_add`] on untrusted input.
    fn add(self, rhs: Decimal) -> Self::Output {
        Decimal(self.0 + rhs.0)
    }
}

impl Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Self::Output {
        Decimal(self.0 - rhs.0)
    }
}

impl Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Decimal(self.0 * rhs.0)
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Self::Output {
        Decimal(-self.0)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Decimal::parse(&raw).map_err(de::Error::custom)
    }
}
