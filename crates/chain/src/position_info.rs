//! Decoder for the V4 position manager's packed `positionInfo` word.
//!
//! Layout, most significant bits first:
//!
//! ```text
//! | pool id (200 bits) | tickUpper (24) | tickLower (24) | flags (8) |
//! ```
//!
//! The two tick fields are 24-bit two's-complement. The pool id is the
//! top 25 bytes of the full `bytes32` pool id, which is also the key the
//! position manager's `poolKeys` mapping is indexed by.

use alloy::primitives::{FixedBytes, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedPositionInfo {
    /// Truncated pool id, as accepted by `poolKeys(bytes25)`.
    pub pool_id: FixedBytes<25>,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub flags: u8,
}

/// Sign-extend a 24-bit two's-complement field.
fn extend_i24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

impl PackedPositionInfo {
    pub fn decode(word: U256) -> Self {
        let bytes: [u8; 32] = word.to_be_bytes();

        let mut pool_id = [0u8; 25];
        pool_id.copy_from_slice(&bytes[..25]);

        let upper = u32::from_be_bytes([0, bytes[25], bytes[26], bytes[27]]);
        let lower = u32::from_be_bytes([0, bytes[28], bytes[29], bytes[30]]);

        Self {
            pool_id: FixedBytes(pool_id),
            tick_lower: extend_i24(lower),
            tick_upper: extend_i24(upper),
            flags: bytes[31],
        }
    }
}
