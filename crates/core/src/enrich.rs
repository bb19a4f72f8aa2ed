//! Metadata and pricing enrichment for assembled positions.
//!
//! One pass per batch: collect the distinct tokens, resolve symbol and
//! decimals through the chain-side metadata cache while the price feed is
//! queried concurrently, then fill in the USD figures. A token with no
//! quote contributes zero USD and leaves the position unpriced, which
//! downstream cache-quality classification picks up.

use std::collections::HashMap;

use alloy::primitives::Address;
use futures::stream::{self, StreamExt};
use tracing::warn;

use lpscope_api::PriceSource;
use lpscope_chain::{TokenMetadata, TokenMetadataSource};

use crate::fixed_point::token_units_f64;
use crate::position::Position;

const METADATA_CONCURRENCY: usize = 8;

pub async fn enrich(
    positions: &mut [Position],
    metadata_source: &dyn TokenMetadataSource,
    price_source: &dyn PriceSource,
) {
    let mut tokens: Vec<Address> = positions
        .iter()
        .flat_map(|p| p.legs.iter().map(|leg| leg.token))
        .collect();
    tokens.sort();
    tokens.dedup();

    if tokens.is_empty() {
        return;
    }

    let metadata_fut = async {
        stream::iter(tokens.iter().copied())
            .map(|token| async move { (token, metadata_source.metadata(token).await) })
            .buffer_unordered(METADATA_CONCURRENCY)
            .collect::<HashMap<Address, TokenMetadata>>()
            .await
    };
    let prices_fut = async {
        match price_source.prices(&tokens).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(error = %e, tokens = tokens.len(), "price feed query failed, valuing batch at zero");
                HashMap::new()
            }
        }
    };
    let (metadata, prices) = tokio::join!(metadata_fut, prices_fut);

    for position in positions.iter_mut() {
        let mut value_usd = 0.0;
        let mut fees_usd = 0.0;
        let fee_amounts = [position.uncollected_fee0, position.uncollected_fee1];

        for (i, leg) in position.legs.iter_mut().enumerate() {
            if let Some(meta) = metadata.get(&leg.token) {
                leg.symbol = meta.symbol.clone();
                leg.decimals = meta.decimals;
            }
            leg.price_usd = prices.get(&leg.token).copied().unwrap_or(0.0);
            leg.value_usd = token_units_f64(leg.amount, leg.decimals) * leg.price_usd;
            value_usd += leg.value_usd;

            if let Some(fee) = fee_amounts.get(i) {
                fees_usd += token_units_f64(*fee, leg.decimals) * leg.price_usd;
            }
        }

        position.value_usd = value_usd;
        position.uncollected_fees_usd = fees_usd;
    }
}
