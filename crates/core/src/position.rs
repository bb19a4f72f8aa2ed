//! Position data structures for tracking LP positions and their USD value.

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use lpscope_chain::Protocol;

/// One side of a position: a token, its raw redeemable amount, and the
/// USD value once enrichment has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLeg {
    pub token: Address,
    pub symbol: String,
    pub decimals: u8,
    /// Raw amount in token base units.
    pub amount: U256,
    /// Unit price in USD; zero when the price feed had no quote.
    pub price_usd: f64,
    pub value_usd: f64,
}

impl TokenLeg {
    pub fn new(token: Address, amount: U256) -> Self {
        Self {
            token,
            symbol: String::new(),
            decimals: 18,
            amount,
            price_usd: 0.0,
            value_usd: 0.0,
        }
    }
}

/// How the position's pool is identified, kept for display and dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolId {
    Address(Address),
    Id(B256),
}

/// A fully assembled LP position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Stable identifier: protocol tag plus pool or token id.
    pub id: String,
    #[serde(with = "protocol_tag")]
    pub protocol: Protocol,
    pub pool: PoolId,
    pub legs: SmallVec<[TokenLeg; 2]>,
    /// Range liquidity for concentrated positions, zero for V2 shares.
    pub liquidity: u128,
    /// LP-token balance for V2 shares, zero for concentrated positions.
    pub lp_balance: U256,
    pub tick_lower: Option<i32>,
    pub tick_upper: Option<i32>,
    /// Whether the current pool tick sits inside the range. Always true
    /// for constant-product shares.
    pub in_range: bool,
    pub value_usd: f64,
    /// Fees earned but not yet collected, in raw token units.
    pub uncollected_fee0: U256,
    pub uncollected_fee1: U256,
    pub uncollected_fees_usd: f64,
}

impl Position {
    /// A position counts as priced when at least one leg got a nonzero
    /// unit price from the feed.
    pub fn is_priced(&self) -> bool {
        self.legs.iter().any(|leg| leg.price_usd > 0.0)
    }
}

/// Result of a wallet query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
    /// True when the response was served from cache.
    pub cached: bool,
    pub last_updated: DateTime<Utc>,
}

mod protocol_tag {
    use lpscope_chain::Protocol;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(protocol: &Protocol, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(protocol.tag())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Protocol, D::Error> {
        let tag = String::deserialize(deserializer)?;
        match tag.as_str() {
            "univ2" => Ok(Protocol::UniswapV2),
            "univ3" => Ok(Protocol::UniswapV3),
            "univ4" => Ok(Protocol::UniswapV4),
            other => Err(de::Error::unknown_variant(
                other,
                &["univ2", "univ3", "univ4"],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn leg(price_usd: f64) -> TokenLeg {
        TokenLeg {
            token: Address::ZERO,
            symbol: "T".to_string(),
            decimals: 18,
            amount: U256::from(1u8),
            price_usd,
            value_usd: price_usd,
        }
    }

    fn position(legs: SmallVec<[TokenLeg; 2]>) -> Position {
        Position {
            id: "univ2:0x0".to_string(),
            protocol: Protocol::UniswapV2,
            pool: PoolId::Address(Address::ZERO),
            legs,
            liquidity: 0,
            lp_balance: U256::from(1u8),
            tick_lower: None,
            tick_upper: None,
            in_range: true,
            value_usd: 0.0,
            uncollected_fee0: U256::ZERO,
            uncollected_fee1: U256::ZERO,
            uncollected_fees_usd: 0.0,
        }
    }

    #[test]
    fn test_is_priced_needs_one_nonzero_leg() {
        assert!(position(smallvec![leg(0.0), leg(1.0)]).is_priced());
        assert!(!position(smallvec![leg(0.0), leg(0.0)]).is_priced());
        assert!(!position(smallvec![]).is_priced());
    }

    #[test]
    fn test_protocol_tag_round_trips_through_serde() {
        let p = position(smallvec![leg(1.0)]);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"univ2\""));
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back.protocol, Protocol::UniswapV2);
    }
}
