//! Turns raw adapter output into assembled positions.
//!
//! Pure math, no I/O: token amounts from liquidity or pool share, fee
//! deltas, range status. Enrichment (symbols, prices, USD) happens in a
//! later pass.

use alloy::primitives::U256;
use smallvec::smallvec;
use tracing::warn;

use lpscope_chain::{PoolRef, RawPosition};

use crate::fee_math::uncollected_fee;
use crate::fixed_point::mul_div;
use crate::position::{PoolId, Position, TokenLeg};
use crate::tick_math::{amounts_for_liquidity, sqrt_price_at_tick};

/// Assemble one raw position. `None` means the math failed (corrupt
/// on-chain data); the position is logged and dropped, not propagated.
pub fn assemble(raw: &RawPosition) -> Option<Position> {
    match assemble_inner(raw) {
        Ok(position) => Some(position),
        Err(e) => {
            warn!(protocol = raw.protocol().tag(), error = %e, "position math failed, dropping");
            None
        }
    }
}

fn assemble_inner(raw: &RawPosition) -> Result<Position, crate::fixed_point::MathError> {
    match raw {
        RawPosition::PoolShare {
            protocol,
            pool,
            token0,
            token1,
            balance,
            total_supply,
            reserve0,
            reserve1,
        } => {
            let amount0 = mul_div(*reserve0, *balance, *total_supply)?;
            let amount1 = mul_div(*reserve1, *balance, *total_supply)?;
            Ok(Position {
                id: format!("{}:{pool:#x}", protocol.tag()),
                protocol: *protocol,
                pool: PoolId::Address(*pool),
                legs: smallvec![TokenLeg::new(*token0, amount0), TokenLeg::new(*token1, amount1)],
                liquidity: 0,
                lp_balance: *balance,
                tick_lower: None,
                tick_upper: None,
                in_range: true,
                value_usd: 0.0,
                uncollected_fee0: U256::ZERO,
                uncollected_fee1: U256::ZERO,
                uncollected_fees_usd: 0.0,
            })
        }
        RawPosition::Concentrated {
            protocol,
            token_id,
            pool,
            token0,
            token1,
            liquidity,
            tick_lower,
            tick_upper,
            current_tick,
            sqrt_price_x96,
            fee_growth_inside0_current,
            fee_growth_inside1_current,
            fee_growth_inside0_last,
            fee_growth_inside1_last,
            tokens_owed0,
            tokens_owed1,
        } => {
            let sqrt_lower = sqrt_price_at_tick(*tick_lower)?;
            let sqrt_upper = sqrt_price_at_tick(*tick_upper)?;
            let (amount0, amount1) =
                amounts_for_liquidity(*sqrt_price_x96, sqrt_lower, sqrt_upper, *liquidity)?;

            let fee0 = uncollected_fee(
                *fee_growth_inside0_current,
                *fee_growth_inside0_last,
                *liquidity,
            ) + U256::from(*tokens_owed0);
            let fee1 = uncollected_fee(
                *fee_growth_inside1_current,
                *fee_growth_inside1_last,
                *liquidity,
            ) + U256::from(*tokens_owed1);

            Ok(Position {
                id: format!("{}:{token_id}", protocol.tag()),
                protocol: *protocol,
                pool: match pool {
                    PoolRef::Address(addr) => PoolId::Address(*addr),
                    PoolRef::Id(id) => PoolId::Id(*id),
                },
                legs: smallvec![TokenLeg::new(*token0, amount0), TokenLeg::new(*token1, amount1)],
                liquidity: *liquidity,
                lp_balance: U256::ZERO,
                tick_lower: Some(*tick_lower),
                tick_upper: Some(*tick_upper),
                in_range: *tick_lower <= *current_tick && *current_tick <= *tick_upper,
                value_usd: 0.0,
                uncollected_fee0: fee0,
                uncollected_fee1: fee1,
                uncollected_fees_usd: 0.0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use lpscope_chain::Protocol;

    fn share(balance: u64, total_supply: u64, reserve0: u64, reserve1: u64) -> RawPosition {
        RawPosition::PoolShare {
            protocol: Protocol::UniswapV2,
            pool: Address::repeat_byte(0x22),
            token0: Address::repeat_byte(0xA0),
            token1: Address::repeat_byte(0xA1),
            balance: U256::from(balance),
            total_supply: U256::from(total_supply),
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
        }
    }

    fn concentrated(tick_lower: i32, tick_upper: i32, current_tick: i32) -> RawPosition {
        RawPosition::Concentrated {
            protocol: Protocol::UniswapV3,
            token_id: U256::from(42u64),
            pool: PoolRef::Address(Address::repeat_byte(0x33)),
            token0: Address::repeat_byte(0xA0),
            token1: Address::repeat_byte(0xA1),
            liquidity: 1_000_000_000_000_000_000u128,
            tick_lower,
            tick_upper,
            current_tick,
            sqrt_price_x96: sqrt_price_at_tick(current_tick).unwrap(),
            fee_growth_inside0_current: U256::ZERO,
            fee_growth_inside1_current: U256::ZERO,
            fee_growth_inside0_last: U256::ZERO,
            fee_growth_inside1_last: U256::ZERO,
            tokens_owed0: 0,
            tokens_owed1: 0,
        }
    }

    #[test]
    fn test_pool_share_pro_rata() {
        // 10% of the supply redeems 10% of each reserve.
        let position = assemble(&share(100, 1000, 5_000, 70_000)).unwrap();
        assert_eq!(position.legs[0].amount, U256::from(500u64));
        assert_eq!(position.legs[1].amount, U256::from(7000u64));
        assert!(position.in_range);
        assert_eq!(position.lp_balance, U256::from(100u64));
    }

    #[test]
    fn test_pool_share_zero_supply_dropped() {
        assert!(assemble(&share(100, 0, 5_000, 70_000)).is_none());
    }

    #[test]
    fn test_concentrated_range_status() {
        assert!(assemble(&concentrated(-60, 60, 0)).unwrap().in_range);
        assert!(assemble(&concentrated(-60, 60, 60)).unwrap().in_range);
        assert!(!assemble(&concentrated(-60, 60, 61)).unwrap().in_range);
        assert!(!assemble(&concentrated(-60, 60, -100)).unwrap().in_range);
    }

    #[test]
    fn test_concentrated_out_of_range_is_one_sided() {
        let below = assemble(&concentrated(-276320, -276300, -276400)).unwrap();
        assert!(below.legs[0].amount > U256::ZERO);
        assert_eq!(below.legs[1].amount, U256::ZERO);

        let above = assemble(&concentrated(-276320, -276300, -276200)).unwrap();
        assert_eq!(above.legs[0].amount, U256::ZERO);
        assert!(above.legs[1].amount > U256::ZERO);
    }

    #[test]
    fn test_fees_add_owed_and_growth() {
        let mut raw = concentrated(-60, 60, 0);
        if let RawPosition::Concentrated {
            tokens_owed0,
            tokens_owed1,
            fee_growth_inside0_current,
            ..
        } = &mut raw
        {
            *tokens_owed0 = 1_234;
            *tokens_owed1 = 5_678;
            *fee_growth_inside0_current = crate::fixed_point::Q128;
        }
        let position = assemble(&raw).unwrap();
        // growth delta of 2^128 over 1e18 liquidity pays 1e18, plus owed.
        assert_eq!(
            position.uncollected_fee0,
            U256::from(1_000_000_000_000_000_000u64) + U256::from(1_234u64)
        );
        assert_eq!(position.uncollected_fee1, U256::from(5_678u64));
    }

    #[test]
    fn test_invalid_tick_dropped() {
        assert!(assemble(&concentrated(-60, 987_272_000, 0)).is_none());
    }
}
