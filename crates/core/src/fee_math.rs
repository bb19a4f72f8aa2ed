//! Uncollected-fee accounting for concentrated-liquidity positions.

use alloy::primitives::{U256, U512};

/// Fees earned since the position's last checkpoint:
/// `(growth_inside_current - growth_inside_last) * liquidity >> 128`.
///
/// The growth accumulators are mod-2^256 counters. A snapshot where
/// `current < last` means the counter wrapped (or the two reads tore);
/// either way the delta is not a meaningful fee amount at the magnitudes
/// this service handles, so it is clamped to zero.
pub fn uncollected_fee(
    growth_inside_current: U256,
    growth_inside_last: U256,
    liquidity: u128,
) -> U256 {
    if growth_inside_current < growth_inside_last || liquidity == 0 {
        return U256::ZERO;
    }
    let delta = growth_inside_current - growth_inside_last;
    let fee: U512 = (U512::from(delta) * U512::from(liquidity)) >> 128usize;
    let limbs = fee.as_limbs();
    U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::Q128;

    #[test]
    fn test_one_q128_of_growth_pays_liquidity() {
        // delta of exactly 2^128 per unit of liquidity pays `liquidity`.
        let fee = uncollected_fee(Q128, U256::ZERO, 1_000_000u128);
        assert_eq!(fee, U256::from(1_000_000u64));
    }

    #[test]
    fn test_fractional_growth_floors() {
        // delta of 1 with liquidity below 2^128 floors to zero.
        let fee = uncollected_fee(U256::from(1u8), U256::ZERO, u128::MAX);
        assert_eq!(fee, U256::ZERO);

        // delta just under 2^128 loses the fractional part.
        let fee = uncollected_fee(Q128 - U256::from(1u8), U256::ZERO, 2u128);
        assert_eq!(fee, U256::from(1u8));
    }

    #[test]
    fn test_wrapped_accumulator_clamps_to_zero() {
        let fee = uncollected_fee(U256::from(5u8), U256::MAX, 1u128 << 64);
        assert_eq!(fee, U256::ZERO);
    }

    #[test]
    fn test_no_growth_no_fee() {
        let snapshot = Q128 * U256::from(3u8);
        assert_eq!(uncollected_fee(snapshot, snapshot, u128::MAX), U256::ZERO);
    }

    #[test]
    fn test_zero_liquidity_no_fee() {
        assert_eq!(uncollected_fee(Q128, U256::ZERO, 0), U256::ZERO);
    }
}
