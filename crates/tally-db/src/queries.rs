//! Database query functions organized by record kind.

pub mod assets;
pub mod bounds;
pub mod consensus;
pub mod rounds;
pub mod settings;
pub mod twap;
pub mod violations;

use tally_types::{Address, Price};

use crate::{DbError, Result};

/// Decode a 20-byte address column.
pub(crate) fn to_address(bytes: &[u8]) -> Result<Address> {
    let array: [u8; 20] = bytes
        .try_into()
        .map_err(|_| DbError::Corrupt(format!("address of {} bytes", bytes.len())))?;
    Ok(Address(array))
}

/// Decode a decimal TEXT price column.
pub(crate) fn to_price(text: &str) -> Result<Price> {
    text.parse()
        .map_err(|e: std::num::ParseIntError| DbError::Corrupt(format!("price '{text}': {e}")))
}
