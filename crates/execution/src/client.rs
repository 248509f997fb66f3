//! Chain client seam used by the signer, submitter and orchestrator.

use async_trait::async_trait;
use primitive_types::U256;
use solana_sdk::hash::Hash;
use solana_sdk::transaction::Transaction;
use thiserror::Error;
use xdex_domain::chain::Chain;
use xdex_domain::entities::Token;
use xdex_protocols::rpc::TxLog;
use xdex_protocols::{AdapterError, ContractCall};

/// Transport failure, classified for the retry policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Node or API throttled the request.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Timeout, reset connection, gateway error or lagging node.
    #[error("transient network error: {0}")]
    Transient(String),
    /// Wallet cannot pay for the transaction.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    /// Node or program rejected the transaction.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Node already holds this exact transaction from an earlier send.
    #[error("already submitted: {0}")]
    AlreadyKnown(String),
}

const ALREADY_KNOWN: &[&str] = &[
    "already known",
    "already been processed",
    "alreadyprocessed",
    "known transaction",
];

const INSUFFICIENT_FUNDS: &[&str] = &[
    "insufficient funds",
    "insufficient lamports",
    "insufficient balance",
];

const PROGRAM_REJECTIONS: &[&str] = &[
    "slippage",
    "custom program error",
    "program error",
    "execution reverted",
    "instruction error",
];

const RATE_LIMITED: &[&str] = &["429", "rate limit", "too many requests"];

const TRANSIENT: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "connection closed",
    "502",
    "503",
    "504",
    "bad gateway",
    "service unavailable",
    "blockhash not found",
    "node is behind",
];

impl TransportError {
    /// Classifies a raw client error message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
        if has(ALREADY_KNOWN) {
            TransportError::AlreadyKnown(message)
        } else if has(INSUFFICIENT_FUNDS) {
            TransportError::InsufficientFunds(message)
        } else if has(PROGRAM_REJECTIONS) {
            TransportError::Rejected(message)
        } else if has(RATE_LIMITED) {
            TransportError::RateLimited(message)
        } else if has(TRANSIENT) {
            TransportError::Transient(message)
        } else {
            TransportError::Rejected(message)
        }
    }

    /// Returns true if the same request may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited(_) | TransportError::Transient(_)
        )
    }

    /// Numeric code recorded on failed transactions.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            TransportError::Transient(_) => 1001,
            TransportError::RateLimited(_) => 1002,
            TransportError::Rejected(_) => 2001,
            TransportError::InsufficientFunds(_) => 2002,
            TransportError::AlreadyKnown(_) => 2005,
        }
    }
}

impl From<AdapterError> for TransportError {
    fn from(err: AdapterError) -> Self {
        if err.is_transient() {
            TransportError::Transient(err.to_string())
        } else {
            TransportError::classify(err.to_string())
        }
    }
}

/// Replay protection value a signature is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayReference {
    /// Recent blockhash (Solana).
    Blockhash(Hash),
    /// Pending account nonce (EVM).
    Nonce(u64),
}

/// Fee market snapshot used to price EVM envelopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeMarket {
    /// Latest base fee, `None` on chains without one.
    pub base_fee: Option<U256>,
    /// Node-suggested legacy gas price.
    pub gas_price: U256,
}

/// Signed transaction ready for submission.
#[derive(Debug, Clone)]
pub enum SignedPayload {
    /// Signed Solana transaction.
    Solana(Transaction),
    /// RLP/EIP-2718 encoded EVM transaction.
    Evm {
        /// Encoded bytes.
        raw: Vec<u8>,
        /// Transaction hash.
        hash: String,
        /// Sender address.
        from: String,
        /// Call the transaction carries, kept for preflight.
        call: ContractCall,
    },
}

impl SignedPayload {
    /// Signature (Solana) or hash (EVM).
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            SignedPayload::Solana(tx) => tx
                .signatures
                .first()
                .map(ToString::to_string)
                .unwrap_or_default(),
            SignedPayload::Evm { hash, .. } => hash.clone(),
        }
    }
}

/// Final on-chain status of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainStatus {
    /// Executed successfully.
    pub success: bool,
    /// Failure detail when not successful.
    pub error: Option<String>,
    /// Fee paid in the native token's smallest unit, when reported.
    pub fee: Option<u128>,
    /// Slot or block number.
    pub slot: Option<u64>,
    /// Receipt logs (EVM).
    pub logs: Vec<TxLog>,
}

/// Node access for one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain served by this client.
    fn chain(&self) -> Chain;

    /// Fresh replay protection value for `signer`.
    async fn replay_reference(&self, signer: &str) -> Result<ReplayReference, TransportError>;

    /// Current fee market.
    async fn fee_market(&self) -> Result<FeeMarket, TransportError>;

    /// Simulates the payload; an error means the node would reject it.
    async fn preflight(&self, payload: &SignedPayload) -> Result<(), TransportError>;

    /// Broadcasts the payload and returns its id.
    async fn send(
        &self,
        payload: &SignedPayload,
        skip_preflight: bool,
    ) -> Result<String, TransportError>;

    /// Final status, `None` while still pending.
    async fn status(&self, id: &str) -> Result<Option<ChainStatus>, TransportError>;

    /// Balance of `token` held by `owner`, in raw units.
    async fn balance(&self, owner: &str, token: &Token) -> Result<U256, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        for msg in [
            "HTTP status client error (429 Too Many Requests)",
            "operation timed out",
            "Connection reset by peer",
            "503 Service Unavailable",
            "Transaction simulation failed: Blockhash not found",
        ] {
            assert!(TransportError::classify(msg).is_transient(), "{msg}");
        }
        assert!(matches!(
            TransportError::classify("rate limit exceeded"),
            TransportError::RateLimited(_)
        ));
    }

    #[test]
    fn test_classify_terminal() {
        assert!(matches!(
            TransportError::classify(
                "Attempt to debit an account but found no record of a prior credit; \
                 insufficient lamports"
            ),
            TransportError::InsufficientFunds(_)
        ));
        assert!(matches!(
            TransportError::classify("custom program error: 0x1771"),
            TransportError::Rejected(_)
        ));
        assert!(matches!(
            TransportError::classify("execution reverted: Too little received"),
            TransportError::Rejected(_)
        ));
        assert!(!TransportError::classify("something odd").is_transient());
    }

    #[test]
    fn test_classify_already_known() {
        for msg in [
            "already known",
            "Transaction simulation failed: This transaction has already been processed",
            "AlreadyProcessed",
            "known transaction: 0x5e1f",
        ] {
            assert!(
                matches!(TransportError::classify(msg), TransportError::AlreadyKnown(_)),
                "{msg}"
            );
        }
    }

    #[test]
    fn test_adapter_error_conversion() {
        let err: TransportError = AdapterError::Api {
            status: 502,
            body: String::new(),
        }
        .into();
        assert!(err.is_transient());
        let err: TransportError =
            AdapterError::Rpc("-32000: insufficient funds for gas".into()).into();
        assert_eq!(err.code(), 2002);
    }
}
