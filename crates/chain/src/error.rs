//! Error taxonomy for the chain read layer.
//!
//! Errors are split along one axis that matters operationally: whether a
//! retry against another endpoint can plausibly succeed. Transport and
//! timeout failures are transient; decode and contract-shape failures are
//! permanent and cause the offending position to be dropped from the batch.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Network-level failure (connection reset, rate limit, 5xx). Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The per-call deadline elapsed. Retryable against the next endpoint.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The response decoded to an unexpected shape. Not retryable.
    #[error("decode error: {0}")]
    Decode(String),

    /// The queried entity no longer exists on chain (e.g. a burned
    /// position NFT still present in the off-chain index). Skip, not fail.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid local configuration (bad URL, empty endpoint list).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ChainError {
    /// Whether retrying the call on a rotated endpoint makes sense.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<alloy::contract::Error> for ChainError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(e) => Self::Transport(e.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transience_classification() {
        assert!(ChainError::Transport("reset".into()).is_transient());
        assert!(ChainError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(!ChainError::Decode("bad word".into()).is_transient());
        assert!(!ChainError::NotFound("token 7".into()).is_transient());
        assert!(!ChainError::Config("no endpoints".into()).is_transient());
    }
}
