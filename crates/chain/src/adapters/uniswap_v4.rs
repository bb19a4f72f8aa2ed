//! Uniswap V4 discovery via an off-chain NFT ownership index.
//!
//! The V4 position manager is not enumerable, so token ids come from the
//! injected [`NftIndex`]. From there everything is on chain: the packed
//! `positionInfo` word names the pool and range, `poolKeys` recovers the
//! currency pair, and the StateView lens exposes pool and position state
//! inside the singleton manager.
//!
//! An absent or failing index degrades to zero V4 positions with a
//! warning; it never fails the wallet pass.

use std::sync::Arc;

use alloy::primitives::{aliases::I24, keccak256, Address, B256, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::client::ChainClient;
use crate::contracts::{IV4PositionManager, IV4StateView, PoolKey};
use crate::error::ChainError;
use crate::position_info::PackedPositionInfo;

use super::{NftIndex, PoolRef, Protocol, ProtocolAdapter, RawPosition};

const TOKEN_CONCURRENCY: usize = 8;

pub struct UniswapV4Adapter {
    client: Arc<ChainClient>,
    position_manager: Address,
    state_view: Address,
    nft_index: Option<Arc<dyn NftIndex>>,
}

impl std::fmt::Debug for UniswapV4Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniswapV4Adapter")
            .field("position_manager", &self.position_manager)
            .field("state_view", &self.state_view)
            .field("nft_index", &self.nft_index.is_some())
            .finish()
    }
}

/// Full `bytes32` pool id: keccak of the ABI-encoded pool key, exactly as
/// the pool manager derives it.
fn full_pool_id(key: &PoolKey) -> B256 {
    keccak256(key.abi_encode())
}

/// Position key inside the pool manager: keccak of the packed
/// `owner ++ tickLower ++ tickUpper ++ salt` (20 + 3 + 3 + 32 bytes).
/// For NFT positions the owner is the position manager and the salt is
/// the token id.
fn position_key(owner: Address, tick_lower: i32, tick_upper: i32, salt: U256) -> B256 {
    let mut packed = [0u8; 58];
    packed[..20].copy_from_slice(owner.as_slice());
    packed[20..23].copy_from_slice(&(tick_lower as u32).to_be_bytes()[1..]);
    packed[23..26].copy_from_slice(&(tick_upper as u32).to_be_bytes()[1..]);
    packed[26..].copy_from_slice(&salt.to_be_bytes::<32>());
    keccak256(packed)
}

fn to_i24(tick: i32) -> Result<I24, ChainError> {
    I24::try_from(tick).map_err(|_| ChainError::Decode(format!("tick {tick} out of i24 range")))
}

impl UniswapV4Adapter {
    pub fn new(
        client: Arc<ChainClient>,
        position_manager: Address,
        state_view: Address,
        nft_index: Option<Arc<dyn NftIndex>>,
    ) -> Self {
        Self {
            client,
            position_manager,
            state_view,
            nft_index,
        }
    }

    /// Fetch one token id's position. `None` means the id no longer maps
    /// to a live position (burned NFT still in the index, or emptied range).
    async fn read_position(&self, token_id: U256) -> Result<Option<RawPosition>, ChainError> {
        let (info_word, liquidity) = self
            .client
            .call("v4_position_info", || async {
                let provider = self.client.provider()?;
                let posm = IV4PositionManager::new(self.position_manager, provider);
                let info_call = posm.positionInfo(token_id);
                let liquidity_call = posm.getPositionLiquidity(token_id);
                let (info, liquidity) = tokio::join!(info_call.call(), liquidity_call.call());
                Ok((info?.info, liquidity?.liquidity))
            })
            .await?;

        // A burned token decodes to the zero word.
        if info_word.is_zero() || liquidity == 0 {
            return Ok(None);
        }

        let info = PackedPositionInfo::decode(info_word);
        let tick_lower = to_i24(info.tick_lower)?;
        let tick_upper = to_i24(info.tick_upper)?;

        let key = self
            .client
            .call("v4_pool_keys", || async {
                let provider = self.client.provider()?;
                let posm = IV4PositionManager::new(self.position_manager, provider);
                let key = posm.poolKeys(info.pool_id).call().await?;
                Ok(PoolKey {
                    currency0: key.currency0,
                    currency1: key.currency1,
                    fee: key.fee,
                    tickSpacing: key.tickSpacing,
                    hooks: key.hooks,
                })
            })
            .await?;

        let pool_id = full_pool_id(&key);
        let pos_key = position_key(
            self.position_manager,
            info.tick_lower,
            info.tick_upper,
            token_id,
        );

        let (sqrt_price_x96, current_tick, inside0, inside1, last0, last1) = self
            .client
            .call("v4_pool_state", || async {
                let provider = self.client.provider()?;
                let view = IV4StateView::new(self.state_view, provider);
                let slot0_call = view.getSlot0(pool_id);
                let growth_call = view.getFeeGrowthInside(pool_id, tick_lower, tick_upper);
                let position_call = view.getPositionInfo(pool_id, pos_key);
                let (slot0, growth, position) = tokio::join!(
                    slot0_call.call(),
                    growth_call.call(),
                    position_call.call()
                );
                let slot0 = slot0?;
                let growth = growth?;
                let position = position?;
                Ok((
                    U256::from(slot0.sqrtPriceX96),
                    slot0.tick.as_i32(),
                    growth.feeGrowthInside0X128,
                    growth.feeGrowthInside1X128,
                    position.feeGrowthInside0LastX128,
                    position.feeGrowthInside1LastX128,
                ))
            })
            .await?;

        Ok(Some(RawPosition::Concentrated {
            protocol: Protocol::UniswapV4,
            token_id,
            pool: PoolRef::Id(pool_id),
            token0: key.currency0,
            token1: key.currency1,
            liquidity,
            tick_lower: info.tick_lower,
            tick_upper: info.tick_upper,
            current_tick,
            sqrt_price_x96,
            fee_growth_inside0_current: inside0,
            fee_growth_inside1_current: inside1,
            fee_growth_inside0_last: last0,
            fee_growth_inside1_last: last1,
            tokens_owed0: 0,
            tokens_owed1: 0,
        }))
    }
}

#[async_trait]
impl ProtocolAdapter for UniswapV4Adapter {
    fn protocol(&self) -> Protocol {
        Protocol::UniswapV4
    }

    async fn discover(&self, wallet: Address) -> Result<SmallVec<[RawPosition; 4]>, ChainError> {
        let Some(index) = &self.nft_index else {
            debug!("no NFT index configured, V4 discovery disabled");
            return Ok(SmallVec::new());
        };

        let token_ids = match index.owned_token_ids(wallet, self.position_manager).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "NFT index lookup failed, reporting zero V4 positions");
                return Ok(SmallVec::new());
            }
        };

        let results: Vec<_> = stream::iter(token_ids.iter().copied())
            .map(|token_id| async move { (token_id, self.read_position(token_id).await) })
            .buffer_unordered(TOKEN_CONCURRENCY)
            .collect()
            .await;

        let mut positions = SmallVec::new();
        for (token_id, result) in results {
            match result {
                Ok(Some(position)) => positions.push(position),
                Ok(None) => {
                    debug!(token_id = %token_id, "V4 token id has no live position, skipping");
                }
                Err(e) => {
                    warn!(token_id = %token_id, error = %e, "V4 position fetch failed, skipping");
                }
            }
        }

        debug!(
            wallet = %wallet,
            indexed = token_ids.len(),
            found = positions.len(),
            "V4 discovery complete"
        );
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_full_pool_id_is_keccak_of_encoded_key() {
        let key = PoolKey {
            currency0: Address::ZERO,
            currency1: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            fee: alloy::primitives::aliases::U24::from(3000u32),
            tickSpacing: I24::try_from(60).unwrap(),
            hooks: Address::ZERO,
        };
        let encoded = key.abi_encode();
        // Five static fields, one word each.
        assert_eq!(encoded.len(), 160);
        assert_eq!(full_pool_id(&key), keccak256(encoded));
    }

    #[test]
    fn test_position_key_packing() {
        let owner = address!("00000000000000000000000000000000000000aa");
        let key = position_key(owner, -60, 60, U256::from(7u64));

        let mut packed = [0u8; 58];
        packed[..20].copy_from_slice(owner.as_slice());
        // -60 = 0xFFFFC4 as i24, 60 = 0x00003C.
        packed[20..23].copy_from_slice(&[0xFF, 0xFF, 0xC4]);
        packed[23..26].copy_from_slice(&[0x00, 0x00, 0x3C]);
        packed[57] = 7;
        assert_eq!(key, keccak256(packed));
    }

    #[test]
    fn test_position_keys_differ_by_salt() {
        let owner = address!("00000000000000000000000000000000000000aa");
        let a = position_key(owner, -60, 60, U256::from(1u64));
        let b = position_key(owner, -60, 60, U256::from(2u64));
        assert_ne!(a, b);
    }
}
