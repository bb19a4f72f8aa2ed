//! The wallet query facade.
//!
//! `PositionTracker` ties the layers together: cache lookup, single-flight
//! discovery across the protocol adapters, assembly, enrichment, quality
//! classification and the cache write-back. Adapter failures degrade the
//! result instead of failing the query; only a malformed wallet string is
//! a client-visible error.

use std::cmp::Ordering;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use lpscope_api::{AlchemyNftClient, LlamaPriceClient, PriceSource};
use lpscope_chain::{
    ChainClient, ChainError, NftIndex, ProtocolAdapter, RawPosition, TokenMetadataSource,
    TokenMetadataStore, UniswapV2Adapter, UniswapV3Adapter, UniswapV4Adapter,
};

use crate::assembler::assemble;
use crate::cache::{CacheQuality, ValuationCache};
use crate::config::TrackerConfig;
use crate::enrich::enrich;
use crate::position::{Position, PositionsResponse};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),
}

pub struct PositionTracker {
    adapters: Vec<Arc<dyn ProtocolAdapter>>,
    metadata: Arc<dyn TokenMetadataSource>,
    prices: Arc<dyn PriceSource>,
    cache: ValuationCache,
}

/// Adapts the HTTP NFT index client to the chain-side seam.
struct IndexBridge(AlchemyNftClient);

#[async_trait]
impl NftIndex for IndexBridge {
    async fn owned_token_ids(
        &self,
        wallet: Address,
        contract: Address,
    ) -> Result<Vec<alloy::primitives::U256>, ChainError> {
        self.0
            .owned_token_ids(wallet, contract)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))
    }
}

impl PositionTracker {
    pub fn new(
        adapters: Vec<Arc<dyn ProtocolAdapter>>,
        metadata: Arc<dyn TokenMetadataSource>,
        prices: Arc<dyn PriceSource>,
        cache: ValuationCache,
    ) -> Self {
        Self {
            adapters,
            metadata,
            prices,
            cache,
        }
    }

    /// Wire up the full production stack from configuration.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let client = Arc::new(ChainClient::new(
            config.rpc_urls.clone(),
            config.call_timeout,
            config.retry.clone(),
        )?);

        let nft_index: Option<Arc<dyn NftIndex>> = match &config.alchemy_api_key {
            Some(key) => Some(Arc::new(IndexBridge(AlchemyNftClient::new(
                config.alchemy_base_url.clone(),
                key.clone(),
            )))),
            None => {
                warn!("no NFT index API key configured, V4 positions will not be discovered");
                None
            }
        };

        let adapters: Vec<Arc<dyn ProtocolAdapter>> = vec![
            Arc::new(UniswapV2Adapter::new(
                client.clone(),
                config.contracts.v2_pools.clone(),
            )),
            Arc::new(UniswapV3Adapter::new(
                client.clone(),
                config.contracts.v3_position_manager,
                config.contracts.v3_factory,
            )),
            Arc::new(UniswapV4Adapter::new(
                client.clone(),
                config.contracts.v4_position_manager,
                config.contracts.v4_state_view,
                nft_index,
            )),
        ];

        Ok(Self::new(
            adapters,
            Arc::new(TokenMetadataStore::new(client)),
            Arc::new(LlamaPriceClient::new(
                config.price_api_url.clone(),
                config.chain_slug.clone(),
            )),
            ValuationCache::new(config.cache.clone()),
        ))
    }

    pub async fn get_positions(
        &self,
        wallet: &str,
        force_refresh: bool,
    ) -> Result<PositionsResponse, TrackerError> {
        let wallet: Address = wallet
            .trim()
            .parse()
            .map_err(|_| TrackerError::InvalidWallet(wallet.to_string()))?;

        if force_refresh {
            self.cache.invalidate(wallet);
        } else if let Some(entry) = self.cache.read(wallet) {
            debug!(wallet = %wallet, "cache hit");
            return Ok(PositionsResponse {
                positions: entry.positions,
                cached: true,
                last_updated: entry.last_updated,
            });
        }

        // Collapse concurrent misses for the same wallet into one fetch.
        let guard = self.cache.fetch_guard(wallet);
        let response = {
            let _inflight = guard.lock().await;
            match self.cache.read(wallet).filter(|_| !force_refresh) {
                Some(entry) => {
                    debug!(wallet = %wallet, "cache hit after waiting on in-flight fetch");
                    PositionsResponse {
                        positions: entry.positions,
                        cached: true,
                        last_updated: entry.last_updated,
                    }
                }
                None => self.refresh(wallet).await,
            }
        };
        drop(guard);
        self.cache.release_guard(wallet);
        Ok(response)
    }

    /// Run the full discovery pass and write the result back to the cache.
    /// Falls back to a retained stale entry when every adapter fails.
    async fn refresh(&self, wallet: Address) -> PositionsResponse {
        let results =
            futures::future::join_all(self.adapters.iter().map(|a| async move {
                (a.protocol(), a.discover(wallet).await)
            }))
            .await;

        let mut raws: Vec<RawPosition> = Vec::new();
        let mut failures = 0usize;
        for (protocol, result) in results {
            match result {
                Ok(found) => raws.extend(found),
                Err(e) => {
                    warn!(protocol = protocol.tag(), wallet = %wallet, error = %e, "discovery failed");
                    failures += 1;
                }
            }
        }

        if failures == self.adapters.len() && failures > 0 {
            if let Some(entry) = self.cache.stale(wallet) {
                warn!(wallet = %wallet, "all discovery failed, serving retained entry");
                return PositionsResponse {
                    positions: entry.positions,
                    cached: true,
                    last_updated: entry.last_updated,
                };
            }
            // Nothing to fall back to. Report empty without caching it so
            // the next read retries discovery.
            warn!(wallet = %wallet, "all discovery failed with no retained entry");
            return PositionsResponse {
                positions: Vec::new(),
                cached: false,
                last_updated: Utc::now(),
            };
        }

        let mut positions: Vec<Position> = raws.iter().filter_map(assemble).collect();
        enrich(&mut positions, self.metadata.as_ref(), self.prices.as_ref()).await;
        positions.sort_by(|a, b| {
            b.value_usd
                .partial_cmp(&a.value_usd)
                .unwrap_or(Ordering::Equal)
        });

        let quality = CacheQuality::classify(&positions);
        let now = Utc::now();
        self.cache.write(wallet, positions.clone(), quality);

        info!(
            wallet = %wallet,
            positions = positions.len(),
            quality = ?quality,
            "wallet refresh complete"
        );
        PositionsResponse {
            positions,
            cached: false,
            last_updated: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use alloy::primitives::U256;
    use lpscope_chain::{Protocol, TokenMetadata};
    use smallvec::SmallVec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::time::Duration;

    const WALLET: &str = "0x00000000000000000000000000000000000000AA";

    #[derive(Debug)]
    struct MockAdapter {
        calls: Arc<AtomicU32>,
        positions: Vec<RawPosition>,
        fail: bool,
    }

    #[async_trait]
    impl ProtocolAdapter for MockAdapter {
        fn protocol(&self) -> Protocol {
            Protocol::UniswapV2
        }

        async fn discover(
            &self,
            _wallet: Address,
        ) -> Result<SmallVec<[RawPosition; 4]>, ChainError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.fail {
                return Err(ChainError::Transport("rpc down".into()));
            }
            Ok(self.positions.iter().cloned().collect())
        }
    }

    struct MockMetadata;

    #[async_trait]
    impl TokenMetadataSource for MockMetadata {
        async fn metadata(&self, token: Address) -> TokenMetadata {
            TokenMetadata {
                address: token,
                symbol: "MOCK".to_string(),
                decimals: 18,
            }
        }
    }

    struct MockPrices(HashMap<Address, f64>);

    #[async_trait]
    impl PriceSource for MockPrices {
        async fn prices(&self, _tokens: &[Address]) -> Result<HashMap<Address, f64>> {
            Ok(self.0.clone())
        }
    }

    fn share(pool_byte: u8, reserve0: u64) -> RawPosition {
        RawPosition::PoolShare {
            protocol: Protocol::UniswapV2,
            pool: Address::repeat_byte(pool_byte),
            token0: Address::repeat_byte(0xA0),
            token1: Address::repeat_byte(0xA1),
            balance: U256::from(100u64),
            total_supply: U256::from(1000u64),
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve0 * 2),
        }
    }

    fn tracker_with(
        adapters: Vec<Arc<dyn ProtocolAdapter>>,
        prices: HashMap<Address, f64>,
        policy: CachePolicy,
    ) -> PositionTracker {
        PositionTracker::new(
            adapters,
            Arc::new(MockMetadata),
            Arc::new(MockPrices(prices)),
            ValuationCache::new(policy),
        )
    }

    fn wad_prices() -> HashMap<Address, f64> {
        HashMap::from([
            (Address::repeat_byte(0xA0), 1.0),
            (Address::repeat_byte(0xA1), 1.0),
        ])
    }

    #[tokio::test]
    async fn test_invalid_wallet_is_client_error() {
        let tracker = tracker_with(vec![], HashMap::new(), CachePolicy::default());
        let err = tracker.get_positions("not-an-address", false).await;
        assert!(matches!(err, Err(TrackerError::InvalidWallet(_))));
    }

    #[tokio::test]
    async fn test_fresh_hit_makes_no_remote_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = Arc::new(MockAdapter {
            calls: calls.clone(),
            positions: vec![share(0x22, 50_000)],
            fail: false,
        });
        let tracker = tracker_with(vec![adapter], wad_prices(), CachePolicy::default());

        let first = tracker.get_positions(WALLET, false).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.positions.len(), 1);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);

        let second = tracker.get_positions(WALLET, false).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.positions.len(), 1);
        // Idempotent within the TTL: no extra discovery.
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_rediscovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = Arc::new(MockAdapter {
            calls: calls.clone(),
            positions: vec![share(0x22, 50_000)],
            fail: false,
        });
        let tracker = tracker_with(vec![adapter], wad_prices(), CachePolicy::default());

        tracker.get_positions(WALLET, false).await.unwrap();
        let refreshed = tracker.get_positions(WALLET, true).await.unwrap();
        assert!(!refreshed.cached);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_wallet_is_cached_as_complete() {
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = Arc::new(MockAdapter {
            calls: calls.clone(),
            positions: vec![],
            fail: false,
        });
        let tracker = tracker_with(vec![adapter], HashMap::new(), CachePolicy::default());

        let first = tracker.get_positions(WALLET, false).await.unwrap();
        assert!(first.positions.is_empty());

        // Empty classifies as Good, so the long TTL applies and the next
        // read is served from cache.
        let second = tracker.get_positions(WALLET, false).await.unwrap();
        assert!(second.cached);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_positions_sorted_by_value_desc() {
        let adapter = Arc::new(MockAdapter {
            calls: Arc::new(AtomicU32::new(0)),
            positions: vec![share(0x22, 1_000), share(0x33, 900_000)],
            fail: false,
        });
        let tracker = tracker_with(vec![adapter], wad_prices(), CachePolicy::default());

        let response = tracker.get_positions(WALLET, false).await.unwrap();
        assert_eq!(response.positions.len(), 2);
        assert!(response.positions[0].value_usd >= response.positions[1].value_usd);
        assert_eq!(
            response.positions[0].pool,
            crate::position::PoolId::Address(Address::repeat_byte(0x33))
        );
    }

    #[tokio::test]
    async fn test_total_failure_serves_retained_entry() {
        let good = Arc::new(MockAdapter {
            calls: Arc::new(AtomicU32::new(0)),
            positions: vec![share(0x22, 50_000)],
            fail: false,
        });
        // Zero TTL: every entry is stale the moment it is written.
        let policy = CachePolicy {
            good_ttl: Duration::ZERO,
            partial_ttl: Duration::ZERO,
            capacity: 16,
        };
        let tracker = tracker_with(vec![good], wad_prices(), policy.clone());
        let seeded = tracker.get_positions(WALLET, false).await.unwrap();
        assert_eq!(seeded.positions.len(), 1);

        // Swap in an always-failing adapter over the same cache contents.
        let failing = Arc::new(MockAdapter {
            calls: Arc::new(AtomicU32::new(0)),
            positions: vec![],
            fail: true,
        });
        let tracker = PositionTracker {
            adapters: vec![failing],
            metadata: Arc::new(MockMetadata),
            prices: Arc::new(MockPrices(wad_prices())),
            cache: tracker.cache,
        };

        let fallback = tracker.get_positions(WALLET, false).await.unwrap();
        assert!(fallback.cached);
        assert_eq!(fallback.positions.len(), 1);
    }

    #[tokio::test]
    async fn test_guard_map_does_not_grow_with_wallets() {
        let adapter = Arc::new(MockAdapter {
            calls: Arc::new(AtomicU32::new(0)),
            positions: vec![share(0x22, 50_000)],
            fail: false,
        });
        let tracker = tracker_with(vec![adapter], wad_prices(), CachePolicy::default());

        for byte in 1u8..=32 {
            let wallet = format!("{:#x}", Address::repeat_byte(byte));
            tracker.get_positions(&wallet, false).await.unwrap();
        }
        // Guards exist only while a fetch is in flight.
        assert_eq!(tracker.cache.inflight_guards(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_returns_surviving_positions() {
        let good = Arc::new(MockAdapter {
            calls: Arc::new(AtomicU32::new(0)),
            positions: vec![share(0x22, 50_000)],
            fail: false,
        });
        let failing = Arc::new(MockAdapter {
            calls: Arc::new(AtomicU32::new(0)),
            positions: vec![],
            fail: true,
        });
        let tracker = tracker_with(
            vec![good, failing],
            wad_prices(),
            CachePolicy::default(),
        );

        let response = tracker.get_positions(WALLET, false).await.unwrap();
        assert!(!response.cached);
        assert_eq!(response.positions.len(), 1);
    }
}
