//! Chain read layer for LP position discovery.
//!
//! This crate provides:
//! - Multi-endpoint RPC client with failover, retry and per-call timeouts
//! - Typed `sol!` bindings for the Uniswap V2/V3/V4 read surfaces
//! - The three protocol discovery adapters behind one trait
//! - The packed V4 position-descriptor decoder
//! - A token metadata (symbol/decimals) cache
//!
//! Everything here is strictly read-only; no signing, no transactions.

pub mod adapters;
mod client;
pub mod contracts;
mod error;
mod position_info;
mod retry;
mod tokens;

pub use adapters::{
    NftIndex, PoolRef, Protocol, ProtocolAdapter, RawPosition, UniswapV2Adapter, UniswapV3Adapter,
    UniswapV4Adapter,
};
pub use client::ChainClient;
pub use error::ChainError;
pub use position_info::PackedPositionInfo;
pub use retry::RetryPolicy;
pub use tokens::{TokenMetadata, TokenMetadataSource, TokenMetadataStore};
