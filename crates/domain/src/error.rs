use thiserror::Error;

/// Errors raised while constructing or transitioning domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Range bounds are not strictly increasing after normalization.
    #[error("invalid price range: {0}")]
    InvalidRange(String),
    /// Amount cannot be represented in raw token units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// Unknown or unsupported chain identifier.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    /// Token symbol or address not present in the registry.
    #[error("unknown token {symbol} on {chain}")]
    UnknownToken {
        /// Requested symbol or address.
        symbol: String,
        /// Chain the lookup was made on.
        chain: String,
    },
    /// Pool identifier not present in the registry.
    #[error("pool not found: {0}")]
    PoolNotFound(String),
    /// Lifecycle transition that is not allowed.
    #[error("invalid position transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: crate::enums::PositionStatus,
        /// Requested state.
        to: crate::enums::PositionStatus,
    },
    /// Attempt to move a finished transaction back to another status.
    #[error("transaction status is final: {0:?}")]
    StatusFinal(crate::value_objects::tx_result::TxStatus),
}
