//! Arbitrary precision integers as sign + magnitude.
//!
//! The encoder only needs the minimal big-endian magnitude, so that is the
//! stored representation. Zero has an empty magnitude and is never negative.

use core::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BigInt {
    negative: bool,
    magnitude: Vec<u8>,
}

impl BigInt {
    /// Builds a value from a big-endian magnitude; leading zero bytes are dropped.
    pub fn from_be_bytes(negative: bool, magnitude: &[u8]) -> Self {
        let start = magnitude.iter().position(|&b| b != 0).unwrap_or(magnitude.len());
        let magnitude = magnitude[start..].to_vec();
        Self {
            negative: negative && !magnitude.is_empty(),
            magnitude,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_empty()
    }

    /// Minimal big-endian magnitude.
    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }
}

impl From<u128> for BigInt {
    fn from(value: u128) -> Self {
        Self::from_be_bytes(false, &value.to_be_bytes())
    }
}

impl From<i128> for BigInt {
    fn from(value: i128) -> Self {
        Self::from_be_bytes(value < 0, &value.unsigned_abs().to_be_bytes())
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> Self {
        Self::from(i128::from(value))
    }
}

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        Self::from(u128::from(value))
    }
}

impl fmt::Debug for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigInt({}0x", if self.negative { "-" } else { "" })?;
        if self.magnitude.is_empty() {
            write!(f, "0")?;
        }
        for b in &self.magnitude {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}
