//! Monetary amount in the smallest currency unit.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// A strictly positive integer amount in the smallest currency unit (e.g. cents).
///
/// There is no way to build a zero, negative or fractional `Amount`; every
/// constructor validates. Stored as `i64` to match the `BIGINT` ledger column.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl ValueObject for Amount {}

impl Amount {
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::validation(format!(
                "amount must be a positive integer, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<i64> for Amount {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Accepts only finite, integral values that fit in `i64`.
impl TryFrom<f64> for Amount {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(DomainError::validation("amount must be finite"));
        }
        if value.fract() != 0.0 {
            return Err(DomainError::validation(format!(
                "amount must be an integer in the smallest currency unit, got {value}"
            )));
        }
        // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
        if value < i64::MIN as f64 || value >= i64::MAX as f64 {
            return Err(DomainError::validation("amount is out of range"));
        }
        Self::new(value as i64)
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|e| DomainError::validation(format!("amount '{s}' is not an integer: {e}")))?;
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}
