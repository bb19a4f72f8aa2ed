//! lpscope: wallet LP position tracker.
//!
//! One-shot CLI over the tracker core: resolves configuration from the
//! environment, queries the given wallet across Uniswap V2/V3/V4, and
//! renders the valued positions through structured logs.
//!
//! Usage: `lpscope <wallet> [--refresh]`

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lpscope_core::{PositionTracker, TrackerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lpscope_core=debug,lpscope_chain=debug")),
        )
        .init();

    let (wallet, force_refresh) = parse_args()?;

    let config = TrackerConfig::from_env()?;
    info!(
        endpoints = config.rpc_urls.len(),
        chain = %config.chain_slug,
        v2_pools = config.contracts.v2_pools.len(),
        "starting lpscope"
    );

    let tracker = PositionTracker::from_config(&config)?;
    let response = tracker.get_positions(&wallet, force_refresh).await?;

    if response.positions.is_empty() {
        info!(wallet = %wallet, "no LP positions found");
        return Ok(());
    }

    let mut total_usd = 0.0;
    let mut total_fees_usd = 0.0;
    for position in &response.positions {
        let pair = position
            .legs
            .iter()
            .map(|leg| leg.symbol.as_str())
            .collect::<Vec<_>>()
            .join("/");
        info!(
            id = %position.id,
            pair = %pair,
            in_range = position.in_range,
            value_usd = format!("{:.2}", position.value_usd),
            fees_usd = format!("{:.2}", position.uncollected_fees_usd),
            "position"
        );
        total_usd += position.value_usd;
        total_fees_usd += position.uncollected_fees_usd;
    }

    info!(
        wallet = %wallet,
        positions = response.positions.len(),
        cached = response.cached,
        last_updated = %response.last_updated,
        total_usd = format!("{total_usd:.2}"),
        total_fees_usd = format!("{total_fees_usd:.2}"),
        "query complete"
    );
    Ok(())
}

fn parse_args() -> Result<(String, bool)> {
    let mut wallet = None;
    let mut force_refresh = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--refresh" => force_refresh = true,
            other if other.starts_with("--") => {
                warn!(flag = other, "ignoring unknown flag");
            }
            other => wallet = Some(other.to_string()),
        }
    }
    let wallet =
        wallet.ok_or_else(|| anyhow::anyhow!("usage: lpscope <wallet-address> [--refresh]"))?;
    Ok((wallet, force_refresh))
}
