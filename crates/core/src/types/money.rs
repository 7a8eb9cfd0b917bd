//! Integer money amounts.
//!
//! Catalog prices and order totals are whole currency units (e.g. dollars).
//! The payment processor works in minor units, so conversion happens only at
//! that boundary via [`Money::to_minor_units`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minor units per whole currency unit (cents per dollar).
pub const MINOR_UNITS_PER_UNIT: i64 = 100;

/// A non-negative amount in whole currency units.
///
/// Serialized as a bare integer; deserializing a negative value fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub struct Money(i64);

/// A negative value where an amount was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount must not be negative (got {0})")]
pub struct NegativeAmount(pub i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount. Returns `None` for negative values.
    #[must_use]
    pub const fn new(amount: i64) -> Option<Self> {
        if amount < 0 { None } else { Some(Self(amount)) }
    }

    /// The raw amount in whole units.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Add two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Multiply by a quantity, returning `None` on overflow.
    #[must_use]
    pub fn checked_mul(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    /// Amount in minor units (cents) for the payment processor.
    #[must_use]
    pub const fn to_minor_units(&self) -> Option<i64> {
        self.0.checked_mul(MINOR_UNITS_PER_UNIT)
    }
}

impl TryFrom<i64> for Money {
    type Error = NegativeAmount;

    fn try_from(amount: i64) -> Result<Self, Self::Error> {
        Self::new(amount).ok_or(NegativeAmount(amount))
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
