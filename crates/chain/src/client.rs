//! Multi-endpoint RPC access with failover, timeout and retry.
//!
//! The client holds an ordered list of equivalent read-only endpoints and
//! an atomic cursor. Every remote call goes through [`ChainClient::call`],
//! which enforces the per-call timeout, retries transient failures per the
//! shared [`RetryPolicy`], and advances the cursor so the retry lands on
//! the next endpoint. Permanent (decode/shape) errors abort immediately.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder};
use tracing::warn;

use crate::error::ChainError;
use crate::retry::RetryPolicy;

pub struct ChainClient {
    endpoints: Vec<String>,
    cursor: AtomicUsize,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("endpoints", &self.endpoints.len())
            .field("call_timeout", &self.call_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ChainClient {
    pub fn new(
        endpoints: Vec<String>,
        call_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ChainError> {
        if endpoints.is_empty() {
            return Err(ChainError::Config("no RPC endpoints configured".into()));
        }
        Ok(Self {
            endpoints,
            cursor: AtomicUsize::new(0),
            call_timeout,
            retry,
        })
    }

    /// Build a provider against the endpoint the cursor currently points at.
    pub fn provider(&self) -> Result<impl Provider + Clone, ChainError> {
        let idx = self.cursor.load(Ordering::Relaxed) % self.endpoints.len();
        let url = self.endpoints[idx]
            .parse()
            .map_err(|e| ChainError::Config(format!("bad RPC url {}: {e}", self.endpoints[idx])))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    /// Rotate to the next endpoint. Called on transient failure so the
    /// retry (and subsequent calls) prefer a different backend.
    pub fn rotate(&self) {
        self.cursor.fetch_add(1, Ordering::Relaxed);
    }

    /// Run a remote read with timeout + retry + endpoint failover.
    ///
    /// `op` is invoked once per attempt and should build its provider via
    /// [`ChainClient::provider`] so rotation takes effect between attempts.
    pub async fn call<T, F, Fut>(&self, label: &str, op: F) -> Result<T, ChainError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(ChainError::Timeout(self.call_timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        call = label,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient chain call failure, rotating endpoint"
                    );
                    self.rotate();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
