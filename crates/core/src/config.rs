//! Tracker configuration resolved from the environment, with an optional
//! TOML deployment file for contract addresses and the V2 pool registry.
//!
//! Environment always wins over the deployment file; the file exists so a
//! non-mainnet deployment can swap every address in one place.

use std::path::Path;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use lpscope_chain::RetryPolicy;

use crate::cache::CachePolicy;

/// Environment variable names.
pub mod env {
    pub const RPC_URLS: &str = "LPSCOPE_RPC_URLS";
    pub const CALL_TIMEOUT_SECS: &str = "LPSCOPE_CALL_TIMEOUT_SECS";
    pub const RETRY_MAX_ATTEMPTS: &str = "LPSCOPE_RETRY_MAX_ATTEMPTS";
    pub const CACHE_GOOD_TTL_SECS: &str = "LPSCOPE_CACHE_GOOD_TTL_SECS";
    pub const CACHE_PARTIAL_TTL_SECS: &str = "LPSCOPE_CACHE_PARTIAL_TTL_SECS";
    pub const CACHE_CAPACITY: &str = "LPSCOPE_CACHE_CAPACITY";
    pub const PRICE_API_URL: &str = "LPSCOPE_PRICE_API_URL";
    pub const CHAIN_SLUG: &str = "LPSCOPE_CHAIN_SLUG";
    pub const ALCHEMY_API_KEY: &str = "LPSCOPE_ALCHEMY_API_KEY";
    pub const ALCHEMY_BASE_URL: &str = "LPSCOPE_ALCHEMY_BASE_URL";
    pub const DEPLOYMENT_FILE: &str = "LPSCOPE_DEPLOYMENT";
}

// Ethereum mainnet deployments.
mod mainnet {
    pub const V3_POSITION_MANAGER: &str = "0xC36442b4a4522E871399CD717aBDD847Ab11FE88";
    pub const V3_FACTORY: &str = "0x1F98431c8aD98523631AE4a59f267346ea31F984";
    pub const V4_POSITION_MANAGER: &str = "0xbD216513d74C8cf14cf4747E6AaA6420FF64ee9e";
    pub const V4_STATE_VIEW: &str = "0x7fFE42C4a5DEeA5b0feC41C94C136Cf115597227";
}

/// Contract addresses the adapters need.
#[derive(Debug, Clone)]
pub struct ContractAddresses {
    pub v3_position_manager: Address,
    pub v3_factory: Address,
    pub v4_position_manager: Address,
    pub v4_state_view: Address,
    /// V2 has no per-wallet enumeration; discovery walks this list.
    pub v2_pools: Vec<Address>,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub rpc_urls: Vec<String>,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    pub cache: CachePolicy,
    pub price_api_url: String,
    /// Chain slug the price feed keys tokens by (e.g. "ethereum").
    pub chain_slug: String,
    pub alchemy_base_url: String,
    /// Absent key disables V4 discovery (degraded mode, not an error).
    pub alchemy_api_key: Option<String>,
    pub contracts: ContractAddresses,
}

/// On-disk deployment file shape.
#[derive(Debug, Deserialize)]
struct DeploymentFile {
    #[serde(default)]
    contracts: DeploymentContracts,
    #[serde(default)]
    v2_pools: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentContracts {
    v3_position_manager: Option<String>,
    v3_factory: Option<String>,
    v4_position_manager: Option<String>,
    v4_state_view: Option<String>,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_address(value: &str, what: &str) -> Result<Address> {
    value
        .parse()
        .with_context(|| format!("invalid {what} address: {value}"))
}

impl TrackerConfig {
    /// Resolve the full configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let rpc_urls: Vec<String> = std::env::var(env::RPC_URLS)
            .with_context(|| format!("missing env var: {}", env::RPC_URLS))?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut contracts = ContractAddresses {
            v3_position_manager: parse_address(mainnet::V3_POSITION_MANAGER, "V3 position manager")?,
            v3_factory: parse_address(mainnet::V3_FACTORY, "V3 factory")?,
            v4_position_manager: parse_address(mainnet::V4_POSITION_MANAGER, "V4 position manager")?,
            v4_state_view: parse_address(mainnet::V4_STATE_VIEW, "V4 state view")?,
            v2_pools: Vec::new(),
        };

        if let Ok(path) = std::env::var(env::DEPLOYMENT_FILE) {
            contracts = Self::apply_deployment(Path::new(&path), contracts)?;
        }

        Ok(Self {
            rpc_urls,
            call_timeout: Duration::from_secs(env_or(env::CALL_TIMEOUT_SECS, 10u64)),
            retry: RetryPolicy {
                max_attempts: env_or(env::RETRY_MAX_ATTEMPTS, 3u32),
                ..RetryPolicy::default()
            },
            cache: CachePolicy {
                good_ttl: Duration::from_secs(env_or(env::CACHE_GOOD_TTL_SECS, 300u64)),
                partial_ttl: Duration::from_secs(env_or(env::CACHE_PARTIAL_TTL_SECS, 30u64)),
                capacity: env_or(env::CACHE_CAPACITY, 1024usize),
            },
            price_api_url: std::env::var(env::PRICE_API_URL)
                .unwrap_or_else(|_| "https://coins.llama.fi".to_string()),
            chain_slug: std::env::var(env::CHAIN_SLUG).unwrap_or_else(|_| "ethereum".to_string()),
            alchemy_base_url: std::env::var(env::ALCHEMY_BASE_URL)
                .unwrap_or_else(|_| "https://eth-mainnet.g.alchemy.com".to_string()),
            alchemy_api_key: std::env::var(env::ALCHEMY_API_KEY).ok(),
            contracts,
        })
    }

    fn apply_deployment(path: &Path, mut contracts: ContractAddresses) -> Result<ContractAddresses> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading deployment file {}", path.display()))?;
        let file: DeploymentFile = toml::from_str(&raw)
            .with_context(|| format!("parsing deployment file {}", path.display()))?;

        if let Some(addr) = &file.contracts.v3_position_manager {
            contracts.v3_position_manager = parse_address(addr, "V3 position manager")?;
        }
        if let Some(addr) = &file.contracts.v3_factory {
            contracts.v3_factory = parse_address(addr, "V3 factory")?;
        }
        if let Some(addr) = &file.contracts.v4_position_manager {
            contracts.v4_position_manager = parse_address(addr, "V4 position manager")?;
        }
        if let Some(addr) = &file.contracts.v4_state_view {
            contracts.v4_state_view = parse_address(addr, "V4 state view")?;
        }
        contracts.v2_pools = file
            .v2_pools
            .iter()
            .map(|addr| parse_address(addr, "V2 pool"))
            .collect::<Result<_>>()?;

        info!(
            path = %path.display(),
            v2_pools = contracts.v2_pools.len(),
            "applied deployment file"
        );
        Ok(contracts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_defaults_parse() {
        assert!(parse_address(mainnet::V3_POSITION_MANAGER, "npm").is_ok());
        assert!(parse_address(mainnet::V3_FACTORY, "factory").is_ok());
        assert!(parse_address(mainnet::V4_POSITION_MANAGER, "posm").is_ok());
        assert!(parse_address(mainnet::V4_STATE_VIEW, "view").is_ok());
    }

    #[test]
    fn test_deployment_file_overrides() {
        let dir = std::env::temp_dir().join("lpscope-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("deployment.toml");
        std::fs::write(
            &path,
            r#"
v2_pools = [
    "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc",
    "0x0d4a11d5EEaaC28EC3F61d100daF4d40471f1852",
]

[contracts]
v3_factory = "0x0000000000000000000000000000000000000042"
"#,
        )
        .unwrap();

        let defaults = ContractAddresses {
            v3_position_manager: parse_address(mainnet::V3_POSITION_MANAGER, "npm").unwrap(),
            v3_factory: parse_address(mainnet::V3_FACTORY, "factory").unwrap(),
            v4_position_manager: parse_address(mainnet::V4_POSITION_MANAGER, "posm").unwrap(),
            v4_state_view: parse_address(mainnet::V4_STATE_VIEW, "view").unwrap(),
            v2_pools: Vec::new(),
        };
        let contracts = TrackerConfig::apply_deployment(&path, defaults).unwrap();

        assert_eq!(
            contracts.v3_factory,
            "0x0000000000000000000000000000000000000042".parse::<Address>().unwrap()
        );
        // Untouched field keeps its default.
        assert_eq!(
            contracts.v3_position_manager,
            mainnet::V3_POSITION_MANAGER.parse::<Address>().unwrap()
        );
        assert_eq!(contracts.v2_pools.len(), 2);
    }

    #[test]
    fn test_bad_address_in_deployment_rejected() {
        let dir = std::env::temp_dir().join("lpscope-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "v2_pools = [\"not-an-address\"]\n").unwrap();

        let defaults = ContractAddresses {
            v3_position_manager: Address::ZERO,
            v3_factory: Address::ZERO,
            v4_position_manager: Address::ZERO,
            v4_state_view: Address::ZERO,
            v2_pools: Vec::new(),
        };
        assert!(TrackerConfig::apply_deployment(&path, defaults).is_err());
    }
}
