//! Amount type with checked arithmetic
//!
//! Worklock escrows a single native asset; amounts are held in smallest
//! units (u128) so every arithmetic operation is overflow-checked and
//! fractional drift is impossible.

use crate::{Result, WorklockError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An amount of escrowed funds, in smallest units
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Amount(pub u128);

impl Amount {
    /// Create a new amount
    pub fn new(value: u128) -> Self {
        Self(value)
    }

    /// The zero amount
    pub fn zero() -> Self {
        Self(0)
    }

    /// Whether this amount is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(WorklockError::AmountOverflow)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(WorklockError::AmountUnderflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}
