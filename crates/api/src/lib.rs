//! HTTP clients for external collaborators.
//!
//! This crate provides:
//! - A DefiLlama-compatible token price feed client
//! - An Alchemy-compatible owned-NFT index client, used to enumerate
//!   non-enumerable position NFTs

mod nft_index;
mod prices;

pub use nft_index::AlchemyNftClient;
pub use prices::{LlamaPriceClient, PriceSource};
