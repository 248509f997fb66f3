//! Submission and confirmation of signed transactions.
//!
//! Every transaction moves through `Built -> Submitted -> {Confirmed,
//! Failed, TimedOut}`. Transient send failures are retried with a fixed
//! delay; everything else fails immediately. A resend the node reports as
//! already known counts as submitted. A timed-out transaction may still
//! land, so it is reported as such and never sent again.

use crate::client::{ChainClient, SignedPayload, TransportError};
use crate::config::SubmitConfig;
use crate::error::ExecutionError;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use xdex_domain::chain::Chain;
use xdex_domain::value_objects::TxResult;
use xdex_protocols::rpc::TxLog;

/// Code recorded when a transaction landed but failed on chain.
pub const CODE_ONCHAIN_FAILURE: u32 = 2003;

/// Code recorded when confirmation timed out.
pub const CODE_CONFIRMATION_TIMEOUT: u32 = 2004;

/// Lifecycle of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Signed, not yet accepted by a node.
    Built,
    /// Accepted by a node, awaiting a final status.
    Submitted,
    /// Executed successfully.
    Confirmed,
    /// Rejected or reverted.
    Failed,
    /// No final status within the confirmation timeout.
    TimedOut,
}

/// Outcome of submitting one transaction.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Final state.
    pub state: SubmissionState,
    /// Transaction result.
    pub tx: TxResult,
    /// Receipt logs, when the chain reports them.
    pub logs: Vec<TxLog>,
    /// Send attempts made.
    pub attempts: u32,
}

impl Submission {
    /// Failure before anything reached the chain.
    #[must_use]
    pub fn rejected(chain: Chain, err: &ExecutionError) -> Self {
        Self {
            state: SubmissionState::Failed,
            tx: TxResult::failed(chain, None, err.to_string())
                .with_error_code(err.code(), err.is_recoverable()),
            logs: Vec::new(),
            attempts: 0,
        }
    }

    /// Returns true if the transaction confirmed.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.state == SubmissionState::Confirmed
    }
}

/// Sends signed payloads and waits for their final status.
#[derive(Debug, Clone)]
pub struct Submitter {
    config: SubmitConfig,
}

impl Submitter {
    /// Creates a submitter.
    pub fn new(config: SubmitConfig) -> Self {
        Self { config }
    }

    /// Sends and confirms `payload`.
    pub async fn submit(&self, client: &dyn ChainClient, payload: &SignedPayload) -> Submission {
        match self.send(client, payload).await {
            Ok((signature, attempts)) => {
                let mut submission = self.confirm(client, &signature).await;
                submission.attempts = attempts;
                submission
            }
            Err(submission) => submission,
        }
    }

    /// Runs preflight and sends, retrying transient failures.
    ///
    /// Returns the signature and attempt count, or the failed submission.
    /// Once a send was attempted, failures carry the signature so the caller
    /// can reconcile a transaction that reached the node anyway.
    pub async fn send(
        &self,
        client: &dyn ChainClient,
        payload: &SignedPayload,
    ) -> Result<(String, u32), Submission> {
        let chain = client.chain();
        let id = payload.id();
        let max_attempts = self.config.max_attempts.max(1);

        if !self.config.skip_preflight {
            match client.preflight(payload).await {
                Ok(()) => debug!(signature = %id, "Preflight passed"),
                Err(e) if e.is_transient() => {
                    warn!(signature = %id, error = %e, "Preflight unavailable, sending anyway");
                }
                Err(e) => {
                    error!(signature = %id, error = %e, "Preflight rejected transaction");
                    return Err(Submission {
                        state: SubmissionState::Failed,
                        tx: TxResult::failed(chain, None, e.to_string())
                            .with_error_code(e.code(), false),
                        logs: Vec::new(),
                        attempts: 0,
                    });
                }
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match client.send(payload, self.config.skip_preflight).await {
                Ok(signature) => {
                    info!(signature = %signature, attempt, "Transaction submitted");
                    return Ok((signature, attempt));
                }
                Err(TransportError::AlreadyKnown(reason)) => {
                    info!(
                        signature = %id,
                        attempt,
                        reason = %reason,
                        "Node already has the transaction, confirming"
                    );
                    return Ok((id, attempt));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        signature = %id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transient send failure, retrying"
                    );
                    sleep(self.config.retry_delay()).await;
                }
                Err(e) => {
                    error!(signature = %id, attempt, error = %e, "Send failed");
                    return Err(Submission {
                        state: SubmissionState::Failed,
                        tx: TxResult::failed(chain, Some(id), e.to_string())
                            .with_error_code(e.code(), e.is_transient()),
                        logs: Vec::new(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Polls until `signature` reaches a final status or the timeout elapses.
    pub async fn confirm(&self, client: &dyn ChainClient, signature: &str) -> Submission {
        let chain = client.chain();
        let deadline = Instant::now() + self.config.confirmation_timeout();
        let mut polls = 0u32;

        loop {
            polls += 1;
            match client.status(signature).await {
                Ok(Some(status)) if status.success => {
                    info!(
                        signature = %signature,
                        slot = ?status.slot,
                        polls,
                        "Transaction confirmed"
                    );
                    return Submission {
                        state: SubmissionState::Confirmed,
                        tx: TxResult::success(chain, signature, status.slot).with_fee(status.fee),
                        logs: status.logs,
                        attempts: 1,
                    };
                }
                Ok(Some(status)) => {
                    let reason = status.error.unwrap_or_else(|| "transaction failed".into());
                    error!(signature = %signature, error = %reason, "Transaction failed on chain");
                    let mut tx = TxResult::failed(chain, Some(signature.to_string()), reason)
                        .with_fee(status.fee)
                        .with_error_code(CODE_ONCHAIN_FAILURE, false);
                    tx.slot = status.slot;
                    return Submission {
                        state: SubmissionState::Failed,
                        tx,
                        logs: status.logs,
                        attempts: 1,
                    };
                }
                Ok(None) => debug!(signature = %signature, polls, "Transaction pending"),
                Err(e) if e.is_transient() => {
                    warn!(signature = %signature, error = %e, "Status poll failed, will retry");
                }
                Err(e) => {
                    error!(signature = %signature, error = %e, "Status poll rejected");
                    return Submission {
                        state: SubmissionState::Failed,
                        tx: TxResult::failed(chain, Some(signature.to_string()), e.to_string())
                            .with_error_code(e.code(), false),
                        logs: Vec::new(),
                        attempts: 1,
                    };
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    signature = %signature,
                    timeout_ms = self.config.confirmation_timeout_ms,
                    "Confirmation timed out; transaction may still land"
                );
                return Submission {
                    state: SubmissionState::TimedOut,
                    tx: TxResult::timeout(chain, signature)
                        .with_error_code(CODE_CONFIRMATION_TIMEOUT, true),
                    logs: Vec::new(),
                    attempts: 1,
                };
            }
            sleep(self.config.poll_interval().min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedClient, TEST_CONTRACT, confirmed, reverted};
    use primitive_types::U256;
    use xdex_domain::value_objects::TxStatus;
    use xdex_protocols::ContractCall;

    fn config() -> SubmitConfig {
        SubmitConfig {
            confirmation_timeout_ms: 40,
            poll_interval_ms: 5,
            max_attempts: 3,
            retry_delay_ms: 1,
            skip_preflight: false,
        }
    }

    fn payload() -> SignedPayload {
        SignedPayload::Evm {
            raw: vec![0x02, 0x01],
            hash: "0xabc".into(),
            from: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
            call: ContractCall::new(TEST_CONTRACT, vec![1, 2, 3, 4]).with_value(U256::zero()),
        }
    }

    #[tokio::test]
    async fn test_transient_send_is_retried() {
        let client = ScriptedClient::new(xdex_domain::chain::Chain::Ethereum).with_sends(vec![
            Err(TransportError::RateLimited("429".into())),
            Err(TransportError::Transient("connection reset".into())),
            Ok(()),
        ]);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert_eq!(submission.state, SubmissionState::Confirmed);
        assert_eq!(submission.attempts, 3);
        assert_eq!(client.send_calls(), 3);
        assert_eq!(submission.tx.signature.as_deref(), Some("0xabc"));
        assert_eq!(submission.tx.fee_paid, Some(5_000));
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let client = ScriptedClient::new(xdex_domain::chain::Chain::Ethereum).with_sends(vec![
            Err(TransportError::Transient("timed out".into()));
            5
        ]);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert_eq!(submission.state, SubmissionState::Failed);
        assert_eq!(client.send_calls(), 3);
        assert!(submission.tx.recoverable);
        // An earlier attempt may have reached the node.
        assert_eq!(submission.tx.signature.as_deref(), Some("0xabc"));
        assert_eq!(client.status_calls(), 0);
    }

    #[tokio::test]
    async fn test_already_known_resend_is_confirmed() {
        let client = ScriptedClient::new(xdex_domain::chain::Chain::Ethereum).with_sends(vec![
            Err(TransportError::classify("operation timed out")),
            Err(TransportError::classify("already known")),
        ]);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert!(submission.is_confirmed());
        assert_eq!(submission.attempts, 2);
        assert_eq!(submission.tx.signature.as_deref(), Some("0xabc"));
        assert_eq!(client.send_calls(), 2);
        assert_eq!(client.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_processed_status_waits_for_confirmation() {
        // Solana reports `None` until the signature reaches the confirmed commitment.
        let client = ScriptedClient::new(xdex_domain::chain::Chain::Solana)
            .with_statuses(vec![Ok(None), Ok(None), Ok(Some(confirmed()))]);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert!(submission.is_confirmed());
        assert_eq!(client.status_calls(), 3);
        assert_eq!(submission.tx.slot, Some(42));
    }

    #[tokio::test]
    async fn test_terminal_send_failure_is_not_retried() {
        let client = ScriptedClient::new(xdex_domain::chain::Chain::Ethereum).with_sends(vec![Err(
            TransportError::InsufficientFunds("insufficient funds for gas".into()),
        )]);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert_eq!(submission.tx.status(), TxStatus::Failed);
        assert_eq!(submission.tx.error_code, Some(2002));
        assert!(!submission.tx.recoverable);
        assert_eq!(submission.tx.signature.as_deref(), Some("0xabc"));
        assert_eq!(client.send_calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_and_not_resubmitted() {
        let client =
            ScriptedClient::new(xdex_domain::chain::Chain::Solana).with_default_status(None);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert_eq!(submission.state, SubmissionState::TimedOut);
        assert_eq!(submission.tx.status(), TxStatus::Timeout);
        assert_ne!(submission.tx.status(), TxStatus::Failed);
        assert!(submission.tx.recoverable);
        assert_eq!(client.send_calls(), 1);
        assert!(client.status_calls() > 1);
    }

    #[tokio::test]
    async fn test_onchain_failure() {
        let client = ScriptedClient::new(xdex_domain::chain::Chain::Bsc)
            .with_statuses(vec![Ok(None), Ok(Some(reverted("execution reverted")))]);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert_eq!(submission.state, SubmissionState::Failed);
        assert_eq!(submission.tx.error_code, Some(CODE_ONCHAIN_FAILURE));
        assert_eq!(submission.tx.slot, Some(43));
        assert_eq!(submission.tx.fee_paid, Some(5_000));
    }

    #[tokio::test]
    async fn test_transient_poll_error_keeps_polling() {
        let client = ScriptedClient::new(xdex_domain::chain::Chain::Ethereum).with_statuses(vec![
            Err(TransportError::Transient("503".into())),
            Ok(Some(confirmed())),
        ]);
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert!(submission.is_confirmed());
        assert_eq!(client.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_preflight_rejection_and_skip() {
        let rejecting = || {
            ScriptedClient::new(xdex_domain::chain::Chain::Ethereum)
                .with_preflight_error(TransportError::Rejected("execution reverted".into()))
        };
        let client = rejecting();
        let submission = Submitter::new(config()).submit(&client, &payload()).await;
        assert_eq!(submission.state, SubmissionState::Failed);
        assert!(submission.tx.signature.is_none());
        assert_eq!(client.send_calls(), 0);

        let client = rejecting();
        let mut skip = config();
        skip.skip_preflight = true;
        let submission = Submitter::new(skip).submit(&client, &payload()).await;
        assert!(submission.is_confirmed());
        assert_eq!(client.send_calls(), 1);
    }
}
