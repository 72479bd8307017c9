use serde::{Deserialize, Serialize};

use crate::Points;

/// Monetary amount in minor units.
///
/// Serialized as a bare number so step payloads read `{ "total": 30 }`.
/// No currency or rounding logic lives here; that belongs to billing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// Returns `None` on overflow.
    pub fn checked_times(&self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    /// Returns true if the given point balance is worth strictly less than this amount.
    pub fn exceeds_points(&self, points: Points) -> bool {
        i128::from(self.0) > i128::from(points)
    }

    /// Subtracts a point balance, where one point is one minor unit.
    ///
    /// Returns `None` if the points are worth more than the amount.
    pub fn checked_sub_points(&self, points: Points) -> Option<Self> {
        let points = i64::try_from(points).ok()?;
        let remaining = self.0.checked_sub(points)?;
        (remaining >= 0).then_some(Self(remaining))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
