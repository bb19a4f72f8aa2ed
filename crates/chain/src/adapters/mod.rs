//! Protocol abstraction layer for multi-protocol LP discovery.
//!
//! Each supported AMM gets one [`ProtocolAdapter`] implementation that
//! turns a wallet address into the raw on-chain facts of its positions.
//! Adapters do discovery and state reads only; valuation math happens
//! downstream in the assembler.

mod uniswap_v2;
mod uniswap_v3;
mod uniswap_v4;

pub use uniswap_v2::UniswapV2Adapter;
pub use uniswap_v3::UniswapV3Adapter;
pub use uniswap_v4::UniswapV4Adapter;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use smallvec::SmallVec;
use std::fmt::Debug;

use crate::error::ChainError;

/// Supported AMM protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    UniswapV2,
    UniswapV3,
    UniswapV4,
}

impl Protocol {
    /// Stable identifier used in logs and serialized output.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::UniswapV2 => "univ2",
            Self::UniswapV3 => "univ3",
            Self::UniswapV4 => "univ4",
        }
    }
}

/// How a position's pool is identified on chain. V2/V3 pools are
/// contracts; V4 pools are ids inside the singleton manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRef {
    Address(Address),
    Id(B256),
}

/// Raw on-chain facts about one position, before any valuation.
///
/// A closed enum rather than a trait object: the assembler dispatches on
/// the concrete shape, and there are exactly two shapes in this domain.
#[derive(Debug, Clone)]
pub enum RawPosition {
    /// Constant-product LP share (the pair contract is the LP token).
    PoolShare {
        protocol: Protocol,
        pool: Address,
        token0: Address,
        token1: Address,
        balance: U256,
        total_supply: U256,
        reserve0: U256,
        reserve1: U256,
    },
    /// Concentrated-liquidity range position.
    Concentrated {
        protocol: Protocol,
        token_id: U256,
        pool: PoolRef,
        token0: Address,
        token1: Address,
        liquidity: u128,
        tick_lower: i32,
        tick_upper: i32,
        current_tick: i32,
        sqrt_price_x96: U256,
        fee_growth_inside0_current: U256,
        fee_growth_inside1_current: U256,
        fee_growth_inside0_last: U256,
        fee_growth_inside1_last: U256,
        /// Fees already checkpointed by the protocol (V3 `tokensOwed`).
        tokens_owed0: u128,
        tokens_owed1: u128,
    },
}

impl RawPosition {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::PoolShare { protocol, .. } => *protocol,
            Self::Concentrated { protocol, .. } => *protocol,
        }
    }
}

/// One protocol's discovery surface.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync + Debug {
    fn protocol(&self) -> Protocol;

    /// Find every live position `wallet` holds in this protocol.
    ///
    /// Individual position failures are logged and skipped inside the
    /// adapter; the returned error means the whole discovery pass failed
    /// (e.g. the initial enumeration call).
    async fn discover(&self, wallet: Address) -> Result<SmallVec<[RawPosition; 4]>, ChainError>;
}

/// Off-chain ownership index for non-enumerable position NFTs.
#[async_trait]
pub trait NftIndex: Send + Sync {
    /// Token ids of `contract` NFTs owned by `wallet`.
    async fn owned_token_ids(
        &self,
        wallet: Address,
        contract: Address,
    ) -> Result<Vec<U256>, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_tags_are_stable() {
        assert_eq!(Protocol::UniswapV2.tag(), "univ2");
        assert_eq!(Protocol::UniswapV3.tag(), "univ3");
        assert_eq!(Protocol::UniswapV4.tag(), "univ4");
    }
}
