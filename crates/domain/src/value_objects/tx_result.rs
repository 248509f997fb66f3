//! Per-transaction outcome.

use crate::chain::Chain;
use crate::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Built or submitted, no final status yet.
    Pending,
    /// Confirmed and executed successfully.
    Success,
    /// Rejected before landing or reverted on-chain.
    Failed,
    /// No final status within the confirmation timeout. The transaction may
    /// still land later.
    Timeout,
}

impl TxStatus {
    /// Returns true for Success, Failed and Timeout.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// Result of one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// Chain the transaction was sent to.
    pub chain: Chain,
    /// Current status.
    status: TxStatus,
    /// Signature (Solana) or transaction hash (EVM).
    pub signature: Option<String>,
    /// Fee paid in the native token's smallest unit.
    pub fee_paid: Option<u128>,
    /// Slot or block number the transaction landed in.
    pub slot: Option<u64>,
    /// Raw error detail.
    pub error: Option<String>,
    /// Numeric error code.
    pub error_code: Option<u32>,
    /// Whether retrying the logical operation could succeed.
    pub recoverable: bool,
    /// Time the status was last updated.
    pub updated_at: DateTime<Utc>,
}

impl TxResult {
    /// New pending result.
    #[must_use]
    pub fn pending(chain: Chain) -> Self {
        Self {
            chain,
            status: TxStatus::Pending,
            signature: None,
            fee_paid: None,
            slot: None,
            error: None,
            error_code: None,
            recoverable: false,
            updated_at: Utc::now(),
        }
    }

    /// Confirmed result.
    #[must_use]
    pub fn success(chain: Chain, signature: impl Into<String>, slot: Option<u64>) -> Self {
        let mut r = Self::pending(chain);
        r.status = TxStatus::Success;
        r.signature = Some(signature.into());
        r.slot = slot;
        r
    }

    /// Failed result.
    #[must_use]
    pub fn failed(chain: Chain, signature: Option<String>, error: impl Into<String>) -> Self {
        let mut r = Self::pending(chain);
        r.status = TxStatus::Failed;
        r.signature = signature;
        r.error = Some(error.into());
        r
    }

    /// Timed-out result.
    #[must_use]
    pub fn timeout(chain: Chain, signature: impl Into<String>) -> Self {
        let mut r = Self::pending(chain);
        r.status = TxStatus::Timeout;
        r.signature = Some(signature.into());
        r.error = Some("confirmation timed out".to_string());
        r.recoverable = true;
        r
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> TxStatus {
        self.status
    }

    /// Returns true if the transaction confirmed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }

    /// Moves to `next`. Final statuses never change.
    pub fn advance(&mut self, next: TxStatus) -> Result<(), DomainError> {
        if self.status.is_final() && next != self.status {
            return Err(DomainError::StatusFinal(self.status));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attaches a fee.
    #[must_use]
    pub fn with_fee(mut self, fee: Option<u128>) -> Self {
        self.fee_paid = fee;
        self
    }

    /// Attaches an error code and recoverability.
    #[must_use]
    pub fn with_error_code(mut self, code: u32, recoverable: bool) -> Self {
        self.error_code = Some(code);
        self.recoverable = recoverable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_monotonic() {
        let mut r = TxResult::pending(Chain::Solana);
        r.advance(TxStatus::Pending).unwrap();
        r.advance(TxStatus::Success).unwrap();
        assert!(r.advance(TxStatus::Pending).is_err());
        assert!(r.advance(TxStatus::Failed).is_err());
        assert_eq!(r.status(), TxStatus::Success);
    }

    #[test]
    fn test_timeout_is_distinct_and_recoverable() {
        let r = TxResult::timeout(Chain::Ethereum, "0xabc");
        assert_eq!(r.status(), TxStatus::Timeout);
        assert_ne!(r.status(), TxStatus::Failed);
        assert!(r.recoverable);
    }
}
