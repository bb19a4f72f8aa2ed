//! Token price feed client (DefiLlama-compatible coins API).

use std::collections::HashMap;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// A source of spot USD prices for a set of tokens. A token absent from
/// the returned map simply has no quote; that is not an error.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn prices(&self, tokens: &[Address]) -> Result<HashMap<Address, f64>>;
}

#[derive(Debug, Deserialize)]
struct CoinsResponse {
    coins: HashMap<String, CoinQuote>,
}

#[derive(Debug, Deserialize)]
struct CoinQuote {
    price: f64,
}

/// Client for the `prices/current` endpoint of a DefiLlama-style feed.
/// Tokens are keyed as `{chain_slug}:{lowercase_address}`.
#[derive(Debug, Clone)]
pub struct LlamaPriceClient {
    client: reqwest::Client,
    base_url: String,
    chain_slug: String,
}

impl LlamaPriceClient {
    pub fn new(base_url: impl Into<String>, chain_slug: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            chain_slug: chain_slug.into(),
        }
    }

    fn coin_key(&self, token: Address) -> String {
        format!("{}:{token:#x}", self.chain_slug)
    }

    fn parse_response(&self, response: CoinsResponse) -> HashMap<Address, f64> {
        let prefix = format!("{}:", self.chain_slug);
        let mut prices = HashMap::new();
        for (key, quote) in response.coins {
            let Some(addr) = key.strip_prefix(&prefix) else {
                warn!(key, "price feed returned a key for another chain, ignoring");
                continue;
            };
            match addr.parse::<Address>() {
                Ok(addr) => {
                    prices.insert(addr, quote.price);
                }
                Err(_) => {
                    warn!(key, "unparseable token address in price feed response");
                }
            }
        }
        prices
    }
}

#[async_trait]
impl PriceSource for LlamaPriceClient {
    #[instrument(skip(self, tokens), fields(count = tokens.len()))]
    async fn prices(&self, tokens: &[Address]) -> Result<HashMap<Address, f64>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = tokens.iter().map(|t| self.coin_key(*t)).collect();
        let url = format!("{}/prices/current/{}", self.base_url, keys.join(","));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("price feed request failed")?
            .error_for_status()
            .context("price feed returned an error status")?
            .json::<CoinsResponse>()
            .await
            .context("price feed response was not valid JSON")?;

        let prices = self.parse_response(response);
        debug!(requested = tokens.len(), quoted = prices.len(), "price lookup complete");
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LlamaPriceClient {
        LlamaPriceClient::new("https://coins.llama.fi", "ethereum")
    }

    #[test]
    fn test_coin_key_is_lowercase_hex() {
        let token: Address = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
            .parse()
            .unwrap();
        assert_eq!(
            client().coin_key(token),
            "ethereum:0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
    }

    #[test]
    fn test_parse_response_round_trips_addresses() {
        let json = r#"{
            "coins": {
                "ethereum:0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48": { "price": 0.9998 },
                "ethereum:0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2": { "price": 3500.5 }
            }
        }"#;
        let response: CoinsResponse = serde_json::from_str(json).unwrap();
        let prices = client().parse_response(response);

        let usdc: Address = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
            .parse()
            .unwrap();
        assert_eq!(prices.get(&usdc), Some(&0.9998));
        assert_eq!(prices.len(), 2);
    }

    #[test]
    fn test_parse_response_skips_foreign_chains() {
        let json = r#"{
            "coins": {
                "base:0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48": { "price": 1.0 }
            }
        }"#;
        let response: CoinsResponse = serde_json::from_str(json).unwrap();
        assert!(client().parse_response(response).is_empty());
    }

    #[test]
    fn test_extra_fields_tolerated() {
        // The live feed also sends symbol/decimals/timestamp/confidence.
        let json = r#"{
            "coins": {
                "ethereum:0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48": {
                    "decimals": 6,
                    "symbol": "USDC",
                    "price": 1.0,
                    "timestamp": 1700000000,
                    "confidence": 0.99
                }
            }
        }"#;
        let response: CoinsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(client().parse_response(response).len(), 1);
    }
}
