//! Uniswap V3 discovery via the enumerable position NFT manager.
//!
//! The NPM is ERC-721 enumerable, so discovery is `balanceOf` followed by
//! `tokenOfOwnerByIndex` for each slot, then a per-token state fetch.
//! Zero-liquidity tokens (closed ranges that were never burned) are
//! dropped at this stage so the assembler only sees live positions.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::client::ChainClient;
use crate::contracts::{IUniswapV3Factory, IUniswapV3Pool, INonfungiblePositionManager};
use crate::error::ChainError;

use super::{PoolRef, Protocol, ProtocolAdapter, RawPosition};

const TOKEN_CONCURRENCY: usize = 8;

#[derive(Debug)]
pub struct UniswapV3Adapter {
    client: Arc<ChainClient>,
    position_manager: Address,
    factory: Address,
}

/// Snapshot of one initialized tick's fee-growth-outside accumulators.
struct TickOutside {
    fee_growth_outside0: U256,
    fee_growth_outside1: U256,
}

/// Fee growth inside a range, per the V3 core formula. The accumulators
/// are defined modulo 2^256, so every subtraction wraps.
fn fee_growth_inside(
    global: U256,
    lower_outside: U256,
    upper_outside: U256,
    tick_lower: i32,
    tick_upper: i32,
    current_tick: i32,
) -> U256 {
    let below = if current_tick >= tick_lower {
        lower_outside
    } else {
        global.wrapping_sub(lower_outside)
    };
    let above = if current_tick < tick_upper {
        upper_outside
    } else {
        global.wrapping_sub(upper_outside)
    };
    global.wrapping_sub(below).wrapping_sub(above)
}

impl UniswapV3Adapter {
    pub fn new(client: Arc<ChainClient>, position_manager: Address, factory: Address) -> Self {
        Self {
            client,
            position_manager,
            factory,
        }
    }

    async fn token_id_at(&self, wallet: Address, index: u64) -> Result<U256, ChainError> {
        self.client
            .call("v3_token_of_owner_by_index", || async {
                let provider = self.client.provider()?;
                let npm = INonfungiblePositionManager::new(self.position_manager, provider);
                Ok(npm
                    .tokenOfOwnerByIndex(wallet, U256::from(index))
                    .call()
                    .await?
                    ._0)
            })
            .await
    }

    /// Fetch the full raw state for one position NFT. Returns `None` for
    /// zero-liquidity tokens.
    async fn read_position(&self, token_id: U256) -> Result<Option<RawPosition>, ChainError> {
        let position = self
            .client
            .call("v3_positions", || async {
                let provider = self.client.provider()?;
                let npm = INonfungiblePositionManager::new(self.position_manager, provider);
                Ok(npm.positions(token_id).call().await?)
            })
            .await?;

        if position.liquidity == 0 {
            return Ok(None);
        }

        let tick_lower = position.tickLower.as_i32();
        let tick_upper = position.tickUpper.as_i32();

        let pool = self
            .client
            .call("v3_get_pool", || async {
                let provider = self.client.provider()?;
                let factory = IUniswapV3Factory::new(self.factory, provider);
                Ok(factory
                    .getPool(position.token0, position.token1, position.fee)
                    .call()
                    .await?
                    .pool)
            })
            .await?;

        if pool == Address::ZERO {
            return Err(ChainError::NotFound(format!(
                "no pool for position {token_id}"
            )));
        }

        let (sqrt_price_x96, current_tick, global0, global1, lower, upper) = self
            .client
            .call("v3_pool_state", || async {
                let provider = self.client.provider()?;
                let pool = IUniswapV3Pool::new(pool, provider);
                let slot0_call = pool.slot0();
                let global0_call = pool.feeGrowthGlobal0X128();
                let global1_call = pool.feeGrowthGlobal1X128();
                let lower_call = pool.ticks(position.tickLower);
                let upper_call = pool.ticks(position.tickUpper);
                let (slot0, g0, g1, lo, hi) = tokio::join!(
                    slot0_call.call(),
                    global0_call.call(),
                    global1_call.call(),
                    lower_call.call(),
                    upper_call.call()
                );
                let slot0 = slot0?;
                let lo = lo?;
                let hi = hi?;
                Ok((
                    U256::from(slot0.sqrtPriceX96),
                    slot0.tick.as_i32(),
                    g0?._0,
                    g1?._0,
                    TickOutside {
                        fee_growth_outside0: lo.feeGrowthOutside0X128,
                        fee_growth_outside1: lo.feeGrowthOutside1X128,
                    },
                    TickOutside {
                        fee_growth_outside0: hi.feeGrowthOutside0X128,
                        fee_growth_outside1: hi.feeGrowthOutside1X128,
                    },
                ))
            })
            .await?;

        let inside0 = fee_growth_inside(
            global0,
            lower.fee_growth_outside0,
            upper.fee_growth_outside0,
            tick_lower,
            tick_upper,
            current_tick,
        );
        let inside1 = fee_growth_inside(
            global1,
            lower.fee_growth_outside1,
            upper.fee_growth_outside1,
            tick_lower,
            tick_upper,
            current_tick,
        );

        Ok(Some(RawPosition::Concentrated {
            protocol: Protocol::UniswapV3,
            token_id,
            pool: PoolRef::Address(pool),
            token0: position.token0,
            token1: position.token1,
            liquidity: position.liquidity,
            tick_lower,
            tick_upper,
            current_tick,
            sqrt_price_x96,
            fee_growth_inside0_current: inside0,
            fee_growth_inside1_current: inside1,
            fee_growth_inside0_last: position.feeGrowthInside0LastX128,
            fee_growth_inside1_last: position.feeGrowthInside1LastX128,
            tokens_owed0: position.tokensOwed0,
            tokens_owed1: position.tokensOwed1,
        }))
    }
}

#[async_trait]
impl ProtocolAdapter for UniswapV3Adapter {
    fn protocol(&self) -> Protocol {
        Protocol::UniswapV3
    }

    async fn discover(&self, wallet: Address) -> Result<SmallVec<[RawPosition; 4]>, ChainError> {
        let count = self
            .client
            .call("v3_balance_of", || async {
                let provider = self.client.provider()?;
                let npm = INonfungiblePositionManager::new(self.position_manager, provider);
                Ok(npm.balanceOf(wallet).call().await?._0)
            })
            .await?;
        let count = count.min(U256::from(u64::MAX)).to::<u64>();

        let results: Vec<_> = stream::iter(0..count)
            .map(|index| async move {
                let token_id = self.token_id_at(wallet, index).await?;
                let position = self.read_position(token_id).await?;
                Ok::<_, ChainError>((token_id, position))
            })
            .buffer_unordered(TOKEN_CONCURRENCY)
            .collect()
            .await;

        let mut positions = SmallVec::new();
        for result in results {
            match result {
                Ok((_, Some(position))) => positions.push(position),
                Ok((_, None)) => {}
                Err(e) => {
                    warn!(wallet = %wallet, error = %e, "V3 position fetch failed, skipping");
                }
            }
        }

        debug!(
            wallet = %wallet,
            nfts = count,
            found = positions.len(),
            "V3 discovery complete"
        );
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_growth_inside_in_range() {
        // current tick inside the range: inside = global - lower - upper.
        let inside = fee_growth_inside(
            U256::from(1000u64),
            U256::from(100u64),
            U256::from(200u64),
            -60,
            60,
            0,
        );
        assert_eq!(inside, U256::from(700u64));
    }

    #[test]
    fn test_fee_growth_inside_below_range() {
        // current tick below the range: below = global - lower_outside,
        // above = upper_outside, inside = lower - upper.
        let inside = fee_growth_inside(
            U256::from(1000u64),
            U256::from(300u64),
            U256::from(200u64),
            -60,
            60,
            -100,
        );
        assert_eq!(inside, U256::from(100u64));
    }

    #[test]
    fn test_fee_growth_inside_above_range() {
        let inside = fee_growth_inside(
            U256::from(1000u64),
            U256::from(300u64),
            U256::from(200u64),
            -60,
            60,
            100,
        );
        // below = 300, above = 1000 - 200 = 800, inside wraps negative.
        let expected = U256::from(1000u64)
            .wrapping_sub(U256::from(300u64))
            .wrapping_sub(U256::from(800u64));
        assert_eq!(inside, expected);
    }

    #[test]
    fn test_fee_growth_inside_wraps_cleanly() {
        // Accumulator arithmetic is mod 2^256; a wrapped intermediate must
        // not panic and must cancel back out when differenced downstream.
        let inside = fee_growth_inside(
            U256::from(10u64),
            U256::from(300u64),
            U256::from(200u64),
            -60,
            60,
            0,
        );
        let expected = U256::from(10u64)
            .wrapping_sub(U256::from(300u64))
            .wrapping_sub(U256::from(200u64));
        assert_eq!(inside, expected);
    }
}
