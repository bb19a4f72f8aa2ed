//! Native U256 fixed-point helpers shared by the valuation math.
//!
//! Raw token amounts stay in U256 end to end; f64 appears only at the
//! very edge, when a USD display value is produced.

use alloy::primitives::{U256, U512};
use thiserror::Error;

/// 2^96, the Q64.96 scale used by concentrated-liquidity sqrt prices.
pub const Q96: U256 = U256::from_limbs([0, 4294967296, 0, 0]);

/// 2^128, the Q128 scale used by fee-growth accumulators.
pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("result does not fit in 256 bits")]
    Overflow,
    #[error("tick {0} outside [-887272, 887272]")]
    TickOutOfRange(i32),
}

/// Powers of 10 up to the largest that fits in u128.
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// 10^exp as U256. Table lookup through 10^38, computed beyond that for
/// tokens with nonstandard decimals.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// `a * b / denominator` with the product widened to 512 bits, floor
/// division. Errors rather than silently truncating when the quotient
/// exceeds 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = U512::from(a) * U512::from(b);
    let quotient = product / U512::from(denominator);
    let limbs = quotient.as_limbs();
    if limbs[4..].iter().any(|limb| *limb != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

/// Lossy U256 -> f64, for USD display values only.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .enumerate()
        .map(|(i, limb)| *limb as f64 * 2f64.powi(64 * i as i32))
        .sum()
}

/// Raw token amount to whole-token units as f64 (display path).
pub fn token_units_f64(amount: U256, decimals: u8) -> f64 {
    u256_to_f64(amount) / u256_to_f64(pow10(decimals))
}
