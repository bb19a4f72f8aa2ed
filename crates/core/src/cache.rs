//! Quality-aware valuation cache with bounded capacity.
//!
//! Entries are tagged with how well the batch was priced: a mostly-priced
//! result can be trusted longer than one where the feed missed half the
//! tokens, so the two qualities get different TTLs. Capacity is bounded
//! with least-recently-accessed eviction. Expired entries are retained
//! until replaced so the tracker can fall back to them when a refetch
//! fails completely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheQuality {
    /// At least half the positions carry a real price. An empty set is
    /// also Good: "no positions" is a complete answer.
    Good,
    Partial,
}

impl CacheQuality {
    pub fn classify(positions: &[Position]) -> Self {
        if positions.is_empty() {
            return Self::Good;
        }
        let priced = positions.iter().filter(|p| p.is_priced()).count();
        if priced * 2 >= positions.len() {
            Self::Good
        } else {
            Self::Partial
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub positions: Vec<Position>,
    pub quality: CacheQuality,
    pub last_updated: DateTime<Utc>,
    captured_at: Instant,
    last_accessed: Instant,
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub good_ttl: Duration,
    pub partial_ttl: Duration,
    pub capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            good_ttl: Duration::from_secs(300),
            partial_ttl: Duration::from_secs(30),
            capacity: 1024,
        }
    }
}

pub struct ValuationCache {
    policy: CachePolicy,
    entries: Mutex<HashMap<Address, CacheEntry>>,
    /// Per-wallet single-flight guards for concurrent misses.
    inflight: DashMap<Address, Arc<tokio::sync::Mutex<()>>>,
}

impl ValuationCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
            inflight: DashMap::new(),
        }
    }

    fn ttl(&self, quality: CacheQuality) -> Duration {
        match quality {
            CacheQuality::Good => self.policy.good_ttl,
            CacheQuality::Partial => self.policy.partial_ttl,
        }
    }

    /// Fresh entry for `wallet`, or `None` on miss or expiry. Touches the
    /// access time on a hit.
    pub fn read(&self, wallet: Address) -> Option<CacheEntry> {
        self.read_at(wallet, Instant::now())
    }

    pub fn read_at(&self, wallet: Address, now: Instant) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&wallet)?;
        if now.duration_since(entry.captured_at) >= self.ttl(entry.quality) {
            return None;
        }
        entry.last_accessed = now;
        Some(entry.clone())
    }

    /// The entry regardless of freshness, for stale fallback. Does not
    /// touch the access time.
    pub fn stale(&self, wallet: Address) -> Option<CacheEntry> {
        self.entries.lock().get(&wallet).cloned()
    }

    pub fn write(&self, wallet: Address, positions: Vec<Position>, quality: CacheQuality) {
        self.write_at(wallet, positions, quality, Instant::now(), Utc::now());
    }

    pub fn write_at(
        &self,
        wallet: Address,
        positions: Vec<Position>,
        quality: CacheQuality,
        now: Instant,
        wall_now: DateTime<Utc>,
    ) {
        let mut entries = self.entries.lock();
        entries.insert(
            wallet,
            CacheEntry {
                positions,
                quality,
                last_updated: wall_now,
                captured_at: now,
                last_accessed: now,
            },
        );

        while entries.len() > self.policy.capacity {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(wallet, _)| *wallet);
            match victim {
                Some(victim) => {
                    debug!(wallet = %victim, "evicting least recently accessed cache entry");
                    entries.remove(&victim);
                }
                None => break,
            }
        }
    }

    pub fn invalidate(&self, wallet: Address) {
        self.entries.lock().remove(&wallet);
    }

    /// Single-flight guard for `wallet`: concurrent misses serialize on
    /// the returned mutex and the winners re-check the cache afterwards.
    /// Callers must pair this with [`ValuationCache::release_guard`] once
    /// their fetch completes.
    pub fn fetch_guard(&self, wallet: Address) -> Arc<tokio::sync::Mutex<()>> {
        self.inflight
            .entry(wallet)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop `wallet`'s guard once no fetch holds it, so the guard map
    /// stays bounded by in-flight work rather than by distinct wallets.
    pub fn release_guard(&self, wallet: Address) {
        self.inflight
            .remove_if(&wallet, |_, guard| Arc::strong_count(guard) == 1);
    }

    #[cfg(test)]
    pub(crate) fn inflight_guards(&self) -> usize {
        self.inflight.len()
    }
}
