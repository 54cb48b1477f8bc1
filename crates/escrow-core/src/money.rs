//! # Money
//!
//! `Amount` is a non-negative count of the smallest currency unit (cents,
//! paise). All fund arithmetic is checked integer arithmetic; a split can
//! never lose or invent a unit through rounding.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A monetary amount in the smallest currency unit.
///
/// Zero is representable because breakdown fields (`buyer_refund = 0` on a
/// full release) need it. Use [`Amount::positive`] where the domain
/// requires a strictly positive value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw unit count.
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Wrap a raw unit count, rejecting zero.
    pub fn positive(field: &'static str, units: u64) -> Result<Self, ValidationError> {
        if units == 0 {
            return Err(ValidationError::NonPositiveAmount { field });
        }
        Ok(Self(units))
    }

    /// The raw unit count.
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// Whether this amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(ValidationError::Overflow { operation: "add" })
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Result<Amount, ValidationError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(ValidationError::Overflow { operation: "sub" })
    }

    /// Floor of `self * bps / 10_000`.
    ///
    /// Computed in `u128` so large amounts cannot overflow the intermediate
    /// product.
    pub fn basis_points(self, bps: u32) -> Amount {
        let scaled = u128::from(self.0) * u128::from(bps) / 10_000;
        // bps <= 10_000 keeps the result <= self; clamp otherwise.
        Amount(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    /// Require `0 < self < total`, the bound on partial dispute amounts.
    pub fn strictly_within(
        self,
        field: &'static str,
        total: Amount,
    ) -> Result<Amount, ValidationError> {
        if self.0 == 0 || self.0 >= total.0 {
            return Err(ValidationError::AmountOutOfRange {
                field,
                amount: self.0,
                min: 0,
                max: total.0,
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
