//! Crate-wide error taxonomy.
//!
//! Every fallible operation in the crate returns [`EngineError`]. The variants
//! map to distinct handling policies: only `Network` is ever retried, and only
//! at the broadcast step.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or missing configuration. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced entity (wallet, account, setting) does not exist.
    /// Fatal for the operation that referenced it.
    #[error("not found: {0}")]
    NotFound(String),

    /// On-chain protocol state makes the operation impossible
    /// (graduated bonding curve, missing pool). Fatal for the task.
    #[error("protocol state: {0}")]
    ProtocolState(String),

    /// The safety validator rejected a transaction. Always fatal.
    #[error("transaction rejected: {0}")]
    Validation(String),

    /// Transport or RPC failure. Retryable at the broadcast step.
    #[error("network error: {0}")]
    Network(String),

    /// An operation collided with one already in progress.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
