//! LP position tracking core.
//!
//! This crate provides the protocol-independent half of the tracker:
//! - Exact concentrated-liquidity tick and range math
//! - Uncollected-fee accounting
//! - Raw-position assembly and USD enrichment
//! - The quality-aware bounded valuation cache
//! - The `PositionTracker` wallet query facade and its configuration
//!
//! Chain access lives in `lpscope-chain`, external HTTP collaborators in
//! `lpscope-api`.

mod assembler;
mod cache;
pub mod config;
mod enrich;
pub mod fee_math;
pub mod fixed_point;
mod position;
pub mod tick_math;
mod tracker;

pub use assembler::assemble;
pub use cache::{CacheEntry, CachePolicy, CacheQuality, ValuationCache};
pub use config::{ContractAddresses, TrackerConfig};
pub use enrich::enrich;
pub use position::{PoolId, Position, PositionsResponse, TokenLeg};
pub use tracker::{PositionTracker, TrackerError};
