//! # tally-types
//!
//! Shared domain types used across the Tally workspace: identifiers, fixed-point
//! price aliases, persisted oracle records and the event vocabulary.

pub mod events;
pub mod governance;
pub mod state;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Fixed-point price with [`PRICE_DECIMALS`] decimals.
pub type Price = u128;

/// Basis points (10_000 = 100%).
pub type Bps = u32;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Index of a submission round for one asset.
pub type RoundIndex = u64;

/// Decimals of every price stored or emitted by the oracle.
pub const PRICE_DECIMALS: u8 = 8;

/// One whole unit at [`PRICE_DECIMALS`].
pub const PRICE_SCALE: Price = 100_000_000;

/// 100% in basis points.
pub const BPS_DENOMINATOR: Bps = 10_000;

/// A 20-byte account or contract identifier.
///
/// Serialized as lowercase hex without prefix; parsed with or without `0x`.
#[serde_as]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; 20]);

/// Identifier of a tracked asset.
pub type AssetId = Address;

/// Identifier of a price reporter.
pub type ValidatorId = Address;

/// Handle of an external reference price source.
pub type SourceHandle = Address;

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Whether this is the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Build an address whose last byte is `n`. Convenient for fixtures.
    pub fn from_low_u8(n: u8) -> Self {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error parsing an [`Address`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("expected 20 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AddressParseError::Hex(e.to_string()))?;
        let array: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::Length(bytes.len()))?;
        Ok(Address(array))
    }
}
