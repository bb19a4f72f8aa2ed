//! Exact concentrated-liquidity tick and range math.
//!
//! `sqrt_price_at_tick` reproduces the on-chain TickMath library bit for
//! bit: a Q128.128 ratio is built by multiplying per-bit magic constants,
//! inverted for positive ticks, then narrowed to Q64.96 with a rounding
//! carry. Everything downstream (range amounts) keeps intermediates in
//! 512 bits so no precision is lost before the final floor.

use alloy::primitives::{U256, U512};

use crate::fixed_point::{MathError, Q96};

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

/// sqrt(1.0001^MIN_TICK) * 2^96.
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([4295128739, 0, 0, 0]);
/// sqrt(1.0001^MAX_TICK) * 2^96.
pub const MAX_SQRT_RATIO: U256 = U256::from_limbs([
    6743328256752651558,
    17280870778742802505,
    4294805859,
    0,
]);

/// Per-bit Q128.128 multipliers: entry `i` is
/// `2^128 / 1.0001^(2^(i-1) / 2)` for `i >= 1`; entry 0 is the ratio for
/// an odd tick.
const TICK_MULTIPLIERS: [U256; 20] = [
    U256::from_limbs([0xaa2d162d1a594001, 0xfffcb933bd6fad37, 0, 0]),
    U256::from_limbs([0x59a46990580e213a, 0xfff97272373d4132, 0, 0]),
    U256::from_limbs([0xef12357cf3c7fdcc, 0xfff2e50f5f656932, 0, 0]),
    U256::from_limbs([0x1c3624eaa0941cd0, 0xffe5caca7e10e4e6, 0, 0]),
    U256::from_limbs([0xc9db58835c926644, 0xffcb9843d60f6159, 0, 0]),
    U256::from_limbs([0x472e6896dfb254c0, 0xff973b41fa98c081, 0, 0]),
    U256::from_limbs([0x43ec78b326b52861, 0xff2ea16466c96a38, 0, 0]),
    U256::from_limbs([0x11c461f1969c3053, 0xfe5dee046a99a2a8, 0, 0]),
    U256::from_limbs([0xdcffc83b479aa3a4, 0xfcbe86c7900a88ae, 0, 0]),
    U256::from_limbs([0x6f2b074cf7815e54, 0xf987a7253ac41317, 0, 0]),
    U256::from_limbs([0x940c7a398e4b70f3, 0xf3392b0822b70005, 0, 0]),
    U256::from_limbs([0x43b29c7fa6e889d9, 0xe7159475a2c29b74, 0, 0]),
    U256::from_limbs([0x845ad8f792aa5825, 0xd097f3bdfd2022b8, 0, 0]),
    U256::from_limbs([0x8a65dc1f90e061e5, 0xa9f746462d870fdf, 0, 0]),
    U256::from_limbs([0x90bb3df62baf32f7, 0x70d869a156d2a1b8, 0, 0]),
    U256::from_limbs([0x81231505542fcfa6, 0x31be135f97d08fd9, 0, 0]),
    U256::from_limbs([0xc677de54f3e99bc9, 0x09aa508b5b7a84e1, 0, 0]),
    U256::from_limbs([0x6699c329225ee604, 0x005d6af8dedb8119, 0, 0]),
    U256::from_limbs([0x1ea926041bedfe98, 0x00002216e584f5fa, 0, 0]),
    U256::from_limbs([0x91f7dc42444e8fa2, 0x00000000048a1703, 0, 0]),
];

fn mul_shift_128(a: U256, b: U256) -> U256 {
    let wide: U512 = (U512::from(a) * U512::from(b)) >> 128usize;
    let limbs = wide.as_limbs();
    U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]])
}

/// Q64.96 sqrt price at `tick`. Exact match for the reference library over
/// the whole valid range.
pub fn sqrt_price_at_tick(tick: i32) -> Result<U256, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfRange(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 1 != 0 {
        TICK_MULTIPLIERS[0]
    } else {
        U256::from(1u8) << 128
    };
    for (bit, multiplier) in TICK_MULTIPLIERS.iter().enumerate().skip(1) {
        if abs_tick & (1 << bit) != 0 {
            ratio = mul_shift_128(ratio, *multiplier);
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Narrow Q128.128 to Q64.96, rounding up so the result stays within
    // one ulp of the infinite-precision value at both range ends.
    let truncated = ratio >> 32;
    let carry = if (ratio & U256::from(0xFFFF_FFFFu64)).is_zero() {
        U256::ZERO
    } else {
        U256::from(1u8)
    };
    Ok(truncated + carry)
}

fn u512_to_u256(value: U512) -> Result<U256, MathError> {
    let limbs = value.as_limbs();
    if limbs[4..].iter().any(|limb| *limb != 0) {
        return Err(MathError::Overflow);
    }
    Ok(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

/// amount0 = L * 2^96 * (sqrt_upper - sqrt_lower) / (sqrt_upper * sqrt_lower)
fn amount0_delta(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256, MathError> {
    let (lo, hi) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    if lo.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let numerator = U512::from(liquidity) * U512::from(Q96) * U512::from(hi - lo);
    u512_to_u256(numerator / U512::from(hi) / U512::from(lo))
}

/// amount1 = L * (sqrt_upper - sqrt_lower) / 2^96
fn amount1_delta(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256, MathError> {
    let (lo, hi) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    u512_to_u256(U512::from(liquidity) * U512::from(hi - lo) / U512::from(Q96))
}

/// Token amounts a range position of `liquidity` redeems at the current
/// price. Below the range it is all token0, above it all token1, inside
/// it a mix split at the current sqrt price.
pub fn amounts_for_liquidity(
    sqrt_current: U256,
    sqrt_lower: U256,
    sqrt_upper: U256,
    liquidity: u128,
) -> Result<(U256, U256), MathError> {
    let (sqrt_lower, sqrt_upper) = if sqrt_lower <= sqrt_upper {
        (sqrt_lower, sqrt_upper)
    } else {
        (sqrt_upper, sqrt_lower)
    };

    if sqrt_current <= sqrt_lower {
        Ok((amount0_delta(sqrt_lower, sqrt_upper, liquidity)?, U256::ZERO))
    } else if sqrt_current >= sqrt_upper {
        Ok((U256::ZERO, amount1_delta(sqrt_lower, sqrt_upper, liquidity)?))
    } else {
        Ok((
            amount0_delta(sqrt_current, sqrt_upper, liquidity)?,
            amount1_delta(sqrt_lower, sqrt_current, liquidity)?,
        ))
    }
}
