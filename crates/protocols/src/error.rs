use thiserror::Error;
use xdex_domain::chain::Chain;
use xdex_domain::enums::{OperationKind, Protocol};
use xdex_domain::error::DomainError;

/// Errors raised while building operation plans.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter does not implement the requested operation.
    #[error("{protocol} does not support {operation}")]
    CapabilityMismatch {
        /// Adapter protocol.
        protocol: Protocol,
        /// Requested operation.
        operation: OperationKind,
    },
    /// No adapter for the chain/protocol pair.
    #[error("{protocol} is not available on {chain}")]
    UnsupportedChain {
        /// Requested protocol.
        protocol: Protocol,
        /// Requested chain.
        chain: Chain,
    },
    /// Pool cannot be read or is not usable.
    #[error("pool unavailable: {0}")]
    PoolUnavailable(String),
    /// Position cannot be found on chain.
    #[error("position not found: {0}")]
    PositionNotFound(String),
    /// Range cannot be resolved for this pool.
    #[error("invalid range: {0}")]
    InvalidRange(String),
    /// Request parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Plan violates step ordering rules.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    /// Aggregator returned a non-success HTTP status.
    #[error("api error {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Node RPC failure.
    #[error("rpc error: {0}")]
    Rpc(String),
    /// Response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Domain validation failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl AdapterError {
    /// Transient failures worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Http(e) => e.is_timeout() || e.is_connect(),
            AdapterError::Api { status, .. } => *status == 429 || *status >= 500,
            AdapterError::Rpc(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timeout") || msg.contains("timed out") || msg.contains("429")
            }
            _ => false,
        }
    }
}
