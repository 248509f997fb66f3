//! Execution error taxonomy.

use crate::client::TransportError;
use rust_decimal::Decimal;
use thiserror::Error;
use xdex_domain::enums::{OperationKind, Protocol};
use xdex_domain::error::DomainError;
use xdex_domain::value_objects::StepOutcome;
use xdex_protocols::AdapterError;

/// Errors surfaced by the execution engine.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// RPC or API failure.
    #[error("network error: {message}")]
    Network {
        /// Error detail.
        message: String,
        /// Whether the same request may succeed later.
        transient: bool,
    },
    /// Quote or execution moved past the slippage bound.
    #[error("slippage exceeded: {0}")]
    SlippageExceeded(String),
    /// Quote validity window elapsed.
    #[error("quote expired: {0}")]
    QuoteExpired(String),
    /// Wallet cannot cover the operation.
    #[error("insufficient {token}: required {required}, available {available}")]
    InsufficientFunds {
        /// Token symbol.
        token: String,
        /// Amount the operation needs.
        required: Decimal,
        /// Amount the wallet holds.
        available: Decimal,
    },
    /// Pool cannot be read or used.
    #[error("pool unavailable: {0}")]
    PoolUnavailable(String),
    /// Position does not exist or is already closed.
    #[error("position not found: {0}")]
    PositionNotFound(String),
    /// Adapter does not implement the operation.
    #[error("{protocol} does not support {operation}")]
    CapabilityMismatch {
        /// Adapter protocol.
        protocol: Protocol,
        /// Requested operation.
        operation: OperationKind,
    },
    /// A multi-step sequence halted after at least one step succeeded.
    #[error("partial execution: halted after {} step(s)", completed.len())]
    PartialExecution {
        /// Steps attempted, in order, ending with the failed one.
        completed: Vec<StepOutcome>,
    },
    /// Range cannot be resolved.
    #[error("invalid range: {0}")]
    InvalidRange(String),
    /// Caller supplied unusable parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Envelope could not be constructed.
    #[error("build error: {0}")]
    Build(String),
    /// Signing failed or key material is unusable.
    #[error("signing error: {0}")]
    Signing(String),
    /// Chain or protocol is not configured.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ExecutionError {
    /// Returns true if retrying the logical call may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ExecutionError::Network { transient, .. } => *transient,
            ExecutionError::QuoteExpired(_) => true,
            _ => false,
        }
    }

    /// Stable numeric code.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            ExecutionError::Network { .. } => 1001,
            ExecutionError::InsufficientFunds { .. } => 2002,
            ExecutionError::Build(_) => 2101,
            ExecutionError::SlippageExceeded(_) => 3001,
            ExecutionError::QuoteExpired(_) => 3002,
            ExecutionError::PoolUnavailable(_) => 4001,
            ExecutionError::InvalidRange(_) => 4002,
            ExecutionError::PositionNotFound(_) => 5001,
            ExecutionError::Signing(_) => 6001,
            ExecutionError::CapabilityMismatch { .. } => 7001,
            ExecutionError::PartialExecution { .. } => 7002,
            ExecutionError::InvalidInput(_) => 7003,
            ExecutionError::UnsupportedChain(_) => 7004,
            ExecutionError::Configuration(_) => 9001,
        }
    }
}

impl From<AdapterError> for ExecutionError {
    fn from(err: AdapterError) -> Self {
        let transient = err.is_transient();
        match err {
            AdapterError::CapabilityMismatch {
                protocol,
                operation,
            } => ExecutionError::CapabilityMismatch {
                protocol,
                operation,
            },
            AdapterError::UnsupportedChain { protocol, chain } => {
                ExecutionError::UnsupportedChain(format!("{protocol} is not available on {chain}"))
            }
            AdapterError::PoolUnavailable(m) => ExecutionError::PoolUnavailable(m),
            AdapterError::PositionNotFound(m) => ExecutionError::PositionNotFound(m),
            AdapterError::InvalidRange(m) => ExecutionError::InvalidRange(m),
            AdapterError::InvalidInput(m) => ExecutionError::InvalidInput(m),
            AdapterError::InvalidPlan(m) => ExecutionError::Build(m),
            AdapterError::Domain(e) => e.into(),
            other => ExecutionError::Network {
                message: other.to_string(),
                transient,
            },
        }
    }
}

impl From<DomainError> for ExecutionError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidRange(m) => ExecutionError::InvalidRange(m),
            DomainError::UnsupportedChain(m) => ExecutionError::UnsupportedChain(m),
            DomainError::PoolNotFound(m) => ExecutionError::PoolUnavailable(m),
            other => ExecutionError::InvalidInput(other.to_string()),
        }
    }
}

impl From<TransportError> for ExecutionError {
    fn from(err: TransportError) -> Self {
        ExecutionError::Network {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_errors_are_reclassified() {
        let err: ExecutionError = AdapterError::Api {
            status: 429,
            body: "slow down".into(),
        }
        .into();
        assert!(err.is_recoverable());
        assert_eq!(err.code(), 1001);

        let err: ExecutionError = AdapterError::CapabilityMismatch {
            protocol: Protocol::Jupiter,
            operation: OperationKind::ClosePosition,
        }
        .into();
        assert!(!err.is_recoverable());
        assert_eq!(err.code(), 7001);

        let err: ExecutionError = AdapterError::InvalidPlan("empty".into()).into();
        assert!(matches!(err, ExecutionError::Build(_)));
    }

    #[test]
    fn test_slippage_is_not_recoverable() {
        let err = ExecutionError::SlippageExceeded("impact 120 bps > 50 bps".into());
        assert!(!err.is_recoverable());
        assert_eq!(err.code() / 1000, 3);
    }

    #[test]
    fn test_domain_range_error() {
        let err: ExecutionError = DomainError::InvalidRange("lower >= upper".into()).into();
        assert!(matches!(err, ExecutionError::InvalidRange(_)));
    }
}
