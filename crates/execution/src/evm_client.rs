//! EVM implementation of [`ChainClient`].

use crate::client::{
    ChainClient, ChainStatus, FeeMarket, ReplayReference, SignedPayload, TransportError,
};
use async_trait::async_trait;
use primitive_types::U256;
use std::sync::Arc;
use tracing::debug;
use xdex_domain::chain::Chain;
use xdex_domain::entities::Token;
use xdex_protocols::rpc::EvmRpc;

/// JSON-RPC client for one EVM chain.
pub struct EvmChainClient {
    chain: Chain,
    rpc: Arc<EvmRpc>,
}

impl EvmChainClient {
    /// Creates a client for `chain`.
    pub fn new(chain: Chain, rpc: Arc<EvmRpc>) -> Self {
        Self { chain, rpc }
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn replay_reference(&self, signer: &str) -> Result<ReplayReference, TransportError> {
        Ok(ReplayReference::Nonce(self.rpc.pending_nonce(signer).await?))
    }

    async fn fee_market(&self) -> Result<FeeMarket, TransportError> {
        let base_fee = self.rpc.base_fee().await?;
        let gas_price = self.rpc.gas_price().await?;
        Ok(FeeMarket {
            base_fee,
            gas_price,
        })
    }

    async fn preflight(&self, payload: &SignedPayload) -> Result<(), TransportError> {
        let SignedPayload::Evm { from, call, .. } = payload else {
            return Err(TransportError::Rejected(
                "Solana payload sent to an EVM client".into(),
            ));
        };
        let gas = self
            .rpc
            .estimate_gas(from, &call.to, call.data.clone(), call.value)
            .await?;
        debug!(gas, to = %call.to, "Preflight estimate succeeded");
        Ok(())
    }

    async fn send(
        &self,
        payload: &SignedPayload,
        _skip_preflight: bool,
    ) -> Result<String, TransportError> {
        let SignedPayload::Evm { raw, .. } = payload else {
            return Err(TransportError::Rejected(
                "Solana payload sent to an EVM client".into(),
            ));
        };
        Ok(self.rpc.send_raw_transaction(raw).await?)
    }

    async fn status(&self, id: &str) -> Result<Option<ChainStatus>, TransportError> {
        let Some(receipt) = self.rpc.receipt(id).await? else {
            return Ok(None);
        };
        let fee = receipt.fee();
        Ok(Some(ChainStatus {
            success: receipt.success,
            error: (!receipt.success).then(|| "execution reverted".to_string()),
            fee: (fee.bits() <= 128).then(|| fee.as_u128()),
            slot: receipt.block_number,
            logs: receipt.logs,
        }))
    }

    async fn balance(&self, owner: &str, token: &Token) -> Result<U256, TransportError> {
        if token.is_native() {
            return Ok(self.rpc.balance(owner).await?);
        }
        Ok(self.rpc.token_balance(&token.address, owner).await?)
    }
}
