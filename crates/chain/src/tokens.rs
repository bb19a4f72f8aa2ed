//! Token metadata (symbol/decimals) resolution with an in-process cache.
//!
//! Metadata is immutable on chain for any token we care about, so entries
//! never expire. Lookup failures degrade to a placeholder instead of
//! failing the wallet pass; the USD value of a mispriced leg is already
//! zero so a wrong symbol only affects display.

use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use crate::client::ChainClient;
use crate::contracts::IErc20;
use crate::error::ChainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    /// Placeholder used when a token's metadata calls fail.
    pub fn unknown(address: Address) -> Self {
        Self {
            address,
            symbol: format!("UNKNOWN-{}", &format!("{address:#x}")[2..8]),
            decimals: 18,
        }
    }

    /// V4 pools use the zero address for the chain's native asset.
    pub fn native(address: Address) -> Self {
        Self {
            address,
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn metadata(&self, token: Address) -> TokenMetadata;
}

/// ERC-20 metadata reader backed by a permanent `DashMap` cache.
pub struct TokenMetadataStore {
    client: Arc<ChainClient>,
    cache: DashMap<Address, TokenMetadata>,
}

impl TokenMetadataStore {
    pub fn new(client: Arc<ChainClient>) -> Self {
        Self {
            client,
            cache: DashMap::new(),
        }
    }

    async fn fetch(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        self.client
            .call("erc20_metadata", || async {
                let provider = self.client.provider()?;
                let erc20 = IErc20::new(token, provider);
                let symbol_call = erc20.symbol();
                let decimals_call = erc20.decimals();
                let (symbol, decimals) = tokio::join!(symbol_call.call(), decimals_call.call());
                Ok(TokenMetadata {
                    address: token,
                    symbol: symbol?._0,
                    decimals: decimals?._0,
                })
            })
            .await
    }
}

#[async_trait]
impl TokenMetadataSource for TokenMetadataStore {
    async fn metadata(&self, token: Address) -> TokenMetadata {
        if let Some(hit) = self.cache.get(&token) {
            return hit.clone();
        }

        let meta = if token == Address::ZERO {
            TokenMetadata::native(token)
        } else {
            match self.fetch(token).await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(token = %token, error = %e, "token metadata lookup failed, using placeholder");
                    TokenMetadata::unknown(token)
                }
            }
        };

        self.cache.insert(token, meta.clone());
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_symbol_embeds_address_prefix() {
        let addr: Address = "0xdeadbeef00000000000000000000000000000000"
            .parse()
            .unwrap();
        let meta = TokenMetadata::unknown(addr);
        assert_eq!(meta.symbol, "UNKNOWN-deadbe");
        assert_eq!(meta.decimals, 18);
    }

    #[test]
    fn test_native_asset_metadata() {
        let meta = TokenMetadata::native(Address::ZERO);
        assert_eq!(meta.symbol, "ETH");
        assert_eq!(meta.decimals, 18);
    }
}
