//! Solana implementation of [`ChainClient`].

use crate::client::{
    ChainClient, ChainStatus, FeeMarket, ReplayReference, SignedPayload, TransportError,
};
use async_trait::async_trait;
use primitive_types::U256;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_transaction_status_client_types::UiTransactionEncoding;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use xdex_domain::chain::Chain;
use xdex_domain::entities::Token;
use xdex_protocols::rpc::RpcProvider;
use xdex_protocols::solana::{SystemPrograms, parse_pubkey};

/// Solana node client.
pub struct SolanaChainClient {
    provider: Arc<RpcProvider>,
    programs: SystemPrograms,
}

impl SolanaChainClient {
    /// Creates a client over a shared provider.
    pub fn new(provider: Arc<RpcProvider>) -> Self {
        Self {
            provider,
            programs: SystemPrograms::default(),
        }
    }

    fn expect_solana(
        payload: &SignedPayload,
    ) -> Result<&solana_sdk::transaction::Transaction, TransportError> {
        match payload {
            SignedPayload::Solana(tx) => Ok(tx),
            SignedPayload::Evm { .. } => Err(TransportError::Rejected(
                "EVM payload sent to a Solana client".into(),
            )),
        }
    }

    /// Fee charged for a landed transaction, `None` if the node cannot serve it.
    async fn transaction_fee(&self, signature: &Signature) -> Option<u128> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        match self
            .provider
            .client()
            .get_transaction_with_config(signature, config)
            .await
        {
            Ok(tx) => tx.transaction.meta.map(|meta| u128::from(meta.fee)),
            Err(e) => {
                warn!(signature = %signature, error = %e, "Could not fetch transaction fee");
                None
            }
        }
    }
}

/// Final status of a signature once it reached confirmed commitment.
///
/// A signature seen only at processed level can still be dropped with its
/// fork, so it is reported as pending.
fn settled_status(
    err: Option<String>,
    confirmed: bool,
    slot: u64,
    fee: Option<u128>,
) -> Option<ChainStatus> {
    if !confirmed {
        return None;
    }
    Some(ChainStatus {
        success: err.is_none(),
        error: err,
        fee,
        slot: Some(slot),
        logs: Vec::new(),
    })
}

fn rpc_error(err: impl std::fmt::Display) -> TransportError {
    TransportError::classify(err.to_string())
}

#[async_trait]
impl ChainClient for SolanaChainClient {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn replay_reference(&self, _signer: &str) -> Result<ReplayReference, TransportError> {
        let blockhash = self.provider.get_latest_blockhash().await?;
        Ok(ReplayReference::Blockhash(blockhash))
    }

    async fn fee_market(&self) -> Result<FeeMarket, TransportError> {
        // Priority fees come from the compute budget settings.
        Ok(FeeMarket::default())
    }

    async fn preflight(&self, payload: &SignedPayload) -> Result<(), TransportError> {
        let tx = Self::expect_solana(payload)?;
        let result = self
            .provider
            .client()
            .simulate_transaction(tx)
            .await
            .map_err(rpc_error)?;
        if let Some(err) = result.value.err {
            let logs = result.value.logs.unwrap_or_default();
            warn!(error = ?err, logs = logs.len(), "Simulation rejected transaction");
            for line in logs.iter().rev().take(5) {
                debug!(log = %line, "Simulation log");
            }
            return Err(TransportError::Rejected(format!("simulation failed: {err:?}")));
        }
        debug!(
            units = ?result.value.units_consumed,
            "Simulation succeeded"
        );
        Ok(())
    }

    async fn send(
        &self,
        payload: &SignedPayload,
        skip_preflight: bool,
    ) -> Result<String, TransportError> {
        let tx = Self::expect_solana(payload)?;
        let config = RpcSendTransactionConfig {
            skip_preflight,
            // Retries are driven by the submitter.
            max_retries: Some(0),
            ..Default::default()
        };
        let signature = self
            .provider
            .client()
            .send_transaction_with_config(tx, config)
            .await
            .map_err(rpc_error)?;
        Ok(signature.to_string())
    }

    async fn status(&self, id: &str) -> Result<Option<ChainStatus>, TransportError> {
        let signature = Signature::from_str(id)
            .map_err(|e| TransportError::Rejected(format!("invalid signature {id}: {e}")))?;
        let response = self
            .provider
            .client()
            .get_signature_statuses(&[signature])
            .await
            .map_err(rpc_error)?;
        let Some(Some(status)) = response.value.into_iter().next() else {
            return Ok(None);
        };
        if !status.satisfies_commitment(CommitmentConfig::confirmed()) {
            debug!(signature = %signature, slot = status.slot, "Processed, awaiting confirmation");
            return Ok(None);
        }
        let fee = self.transaction_fee(&signature).await;
        let err = status.err.as_ref().map(|e| format!("{e:?}"));
        Ok(settled_status(err, true, status.slot, fee))
    }

    async fn balance(&self, owner: &str, token: &Token) -> Result<U256, TransportError> {
        let owner = parse_pubkey(owner)?;
        let client = self.provider.client();
        if token.is_native() {
            let lamports = client.get_balance(&owner).await.map_err(rpc_error)?;
            return Ok(U256::from(lamports));
        }
        let mint = parse_pubkey(&token.address)?;
        let token_program = self.programs.token_program_for(&self.provider, &mint).await;
        let ata = self.programs.derive_ata(&owner, &mint, &token_program);
        if self.provider.get_account_owner(&ata).await?.is_none() {
            return Ok(U256::zero());
        }
        let amount = client
            .get_token_account_balance(&ata)
            .await
            .map_err(rpc_error)?;
        U256::from_dec_str(&amount.amount)
            .map_err(|e| {
                TransportError::Rejected(format!("token balance {}: {e:?}", amount.amount))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_status_is_pending() {
        assert!(settled_status(None, false, 10, None).is_none());
        assert!(settled_status(Some("InstructionError".into()), false, 10, None).is_none());
    }

    #[test]
    fn test_confirmed_status_carries_fee() {
        let status = settled_status(None, true, 42, Some(5_000)).unwrap();
        assert!(status.success);
        assert_eq!(status.slot, Some(42));
        assert_eq!(status.fee, Some(5_000));

        let failed = settled_status(Some("InstructionError(0, Custom(1))".into()), true, 43, None)
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("InstructionError(0, Custom(1))"));
        assert_eq!(failed.fee, None);
    }
}
