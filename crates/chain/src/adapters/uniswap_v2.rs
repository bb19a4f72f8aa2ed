//! Uniswap V2 discovery: LP-token balances across a configured registry.
//!
//! V2 has no per-wallet enumeration, so discovery walks the configured
//! pool list and keeps every pool where the wallet holds a nonzero share
//! balance. The registry is small (tens of pools) and each pool costs at
//! most five view calls, issued concurrently.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::client::ChainClient;
use crate::contracts::IUniswapV2Pair;
use crate::error::ChainError;

use super::{Protocol, ProtocolAdapter, RawPosition};

const POOL_CONCURRENCY: usize = 8;

#[derive(Debug)]
pub struct UniswapV2Adapter {
    client: Arc<ChainClient>,
    pools: Vec<Address>,
}

impl UniswapV2Adapter {
    pub fn new(client: Arc<ChainClient>, pools: Vec<Address>) -> Self {
        Self { client, pools }
    }

    /// Read one pool's share state for `wallet`. Returns `None` when the
    /// wallet holds no LP tokens there.
    async fn read_pool(
        &self,
        wallet: Address,
        pool: Address,
    ) -> Result<Option<RawPosition>, ChainError> {
        let balance = self
            .client
            .call("v2_balance_of", || async {
                let provider = self.client.provider()?;
                let pair = IUniswapV2Pair::new(pool, provider);
                Ok(pair.balanceOf(wallet).call().await?._0)
            })
            .await?;

        if balance.is_zero() {
            return Ok(None);
        }

        let (total_supply, reserves, token0, token1) = self
            .client
            .call("v2_pool_state", || async {
                let provider = self.client.provider()?;
                let pair = IUniswapV2Pair::new(pool, provider);
                let supply_call = pair.totalSupply();
                let reserves_call = pair.getReserves();
                let token0_call = pair.token0();
                let token1_call = pair.token1();
                let (supply, reserves, t0, t1) = tokio::join!(
                    supply_call.call(),
                    reserves_call.call(),
                    token0_call.call(),
                    token1_call.call()
                );
                let reserves = reserves?;
                Ok((
                    supply?._0,
                    (reserves.reserve0, reserves.reserve1),
                    t0?._0,
                    t1?._0,
                ))
            })
            .await?;

        if total_supply.is_zero() {
            // Cannot hold a nonzero balance of a zero-supply token; treat
            // as a torn read and skip.
            warn!(pool = %pool, "V2 pool reports zero totalSupply with nonzero balance");
            return Ok(None);
        }

        Ok(Some(RawPosition::PoolShare {
            protocol: Protocol::UniswapV2,
            pool,
            token0,
            token1,
            balance,
            total_supply,
            reserve0: U256::from(reserves.0),
            reserve1: U256::from(reserves.1),
        }))
    }
}

#[async_trait]
impl ProtocolAdapter for UniswapV2Adapter {
    fn protocol(&self) -> Protocol {
        Protocol::UniswapV2
    }

    async fn discover(&self, wallet: Address) -> Result<SmallVec<[RawPosition; 4]>, ChainError> {
        let results: Vec<_> = stream::iter(self.pools.iter().copied())
            .map(|pool| async move { (pool, self.read_pool(wallet, pool).await) })
            .buffer_unordered(POOL_CONCURRENCY)
            .collect()
            .await;

        let mut positions = SmallVec::new();
        for (pool, result) in results {
            match result {
                Ok(Some(position)) => positions.push(position),
                Ok(None) => {}
                Err(e) => {
                    warn!(pool = %pool, error = %e, "V2 pool read failed, skipping");
                }
            }
        }

        debug!(
            wallet = %wallet,
            pools = self.pools.len(),
            found = positions.len(),
            "V2 discovery complete"
        );
        Ok(positions)
    }
}
