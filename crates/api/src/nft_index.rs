//! Owned-NFT enumeration client (Alchemy-compatible `getNFTsForOwner`).
//!
//! The V4 position manager has no on-chain enumeration, so token ids for
//! a wallet come from this index. The client only ever asks for token
//! ids of a single contract, follows `pageKey` pagination to the end, and
//! tolerates both decimal and 0x-hex token id encodings.

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedNftsResponse {
    #[serde(default)]
    owned_nfts: Vec<OwnedNft>,
    page_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedNft {
    token_id: String,
}

fn parse_token_id(raw: &str) -> Result<U256> {
    let parsed = if let Some(hex) = raw.strip_prefix("0x") {
        U256::from_str_radix(hex, 16)
    } else {
        U256::from_str_radix(raw, 10)
    };
    parsed.with_context(|| format!("unparseable token id: {raw}"))
}

#[derive(Debug, Clone)]
pub struct AlchemyNftClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AlchemyNftClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Token ids of `contract` NFTs owned by `wallet`, across all pages.
    #[instrument(skip(self), fields(wallet = %wallet, contract = %contract))]
    pub async fn owned_token_ids(
        &self,
        wallet: Address,
        contract: Address,
    ) -> Result<Vec<U256>> {
        let url = format!(
            "{}/nft/v3/{}/getNFTsForOwner",
            self.base_url, self.api_key
        );
        let mut token_ids = Vec::new();
        let mut page_key: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[
                ("owner", format!("{wallet:#x}")),
                ("contractAddresses[]", format!("{contract:#x}")),
                ("withMetadata", "false".to_string()),
                ("pageSize", "100".to_string()),
            ]);
            if let Some(key) = &page_key {
                request = request.query(&[("pageKey", key.as_str())]);
            }

            let response = request
                .send()
                .await
                .context("NFT index request failed")?
                .error_for_status()
                .context("NFT index returned an error status")?
                .json::<OwnedNftsResponse>()
                .await
                .context("NFT index response was not valid JSON")?;

            for nft in &response.owned_nfts {
                token_ids.push(parse_token_id(&nft.token_id)?);
            }

            match response.page_key {
                Some(key) => page_key = Some(key),
                None => break,
            }
        }

        debug!(found = token_ids.len(), "NFT enumeration complete");
        Ok(token_ids)
    }
}
