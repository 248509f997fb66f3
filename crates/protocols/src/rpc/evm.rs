//! EVM node access over alloy's HTTP provider.

use crate::error::AdapterError;
use crate::evm::{balance_of_calldata, decode_balance_of, from_alloy, parse_address, to_alloy};
use alloy::eips::BlockNumberOrTag;
use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::{B256, Bytes};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::reqwest::Url;
use alloy::transports::http::{Client, Http};
use primitive_types::U256;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Log entry of a transaction receipt.
pub use alloy::rpc::types::Log as TxLog;

/// Subset of a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// True if execution succeeded.
    pub success: bool,
    /// Block number.
    pub block_number: Option<u64>,
    /// Gas used.
    pub gas_used: U256,
    /// Effective gas price.
    pub effective_gas_price: U256,
    /// Emitted logs.
    pub logs: Vec<TxLog>,
}

impl TxReceipt {
    /// Fee paid in wei.
    #[must_use]
    pub fn fee(&self) -> U256 {
        self.gas_used.saturating_mul(self.effective_gas_price)
    }
}

fn rpc_error(err: impl fmt::Display) -> AdapterError {
    AdapterError::Rpc(err.to_string())
}

/// EVM node client over HTTP.
pub struct EvmRpc {
    provider: RootProvider<Http<Client>>,
    url: String,
}

impl EvmRpc {
    /// Creates a client for `url`.
    pub fn new(url: &str) -> Result<Self, AdapterError> {
        let parsed = Url::parse(url)
            .map_err(|e| AdapterError::InvalidInput(format!("invalid RPC url {url}: {e}")))?;
        Ok(Self {
            provider: ProviderBuilder::new().on_http(parsed),
            url: url.to_string(),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read-only contract call at the latest block.
    pub async fn call(&self, to: &str, data: Vec<u8>) -> Result<Bytes, AdapterError> {
        let tx = TransactionRequest::default()
            .with_to(parse_address(to)?)
            .with_input(data);
        debug!(to, "eth_call");
        self.provider.call(&tx).await.map_err(rpc_error)
    }

    /// Pending nonce of an address.
    pub async fn pending_nonce(&self, address: &str) -> Result<u64, AdapterError> {
        self.provider
            .get_transaction_count(parse_address(address)?)
            .pending()
            .await
            .map_err(rpc_error)
    }

    /// Legacy gas price.
    pub async fn gas_price(&self) -> Result<U256, AdapterError> {
        let price = self.provider.get_gas_price().await.map_err(rpc_error)?;
        Ok(U256::from(price))
    }

    /// Base fee of the next block, if the chain reports one.
    pub async fn base_fee(&self) -> Result<Option<U256>, AdapterError> {
        let history = self
            .provider
            .get_fee_history(1, BlockNumberOrTag::Latest, &[])
            .await
            .map_err(rpc_error)?;
        Ok(history.base_fee_per_gas.last().map(|fee| U256::from(*fee)))
    }

    /// Gas estimate for a call from `from`.
    pub async fn estimate_gas(
        &self,
        from: &str,
        to: &str,
        data: Vec<u8>,
        value: U256,
    ) -> Result<u64, AdapterError> {
        let tx = TransactionRequest::default()
            .with_from(parse_address(from)?)
            .with_to(parse_address(to)?)
            .with_input(data)
            .with_value(to_alloy(value));
        self.provider.estimate_gas(&tx).await.map_err(rpc_error)
    }

    /// Broadcasts a signed transaction and returns its hash.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, AdapterError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(rpc_error)?;
        Ok(format!("{:#x}", pending.tx_hash()))
    }

    /// Receipt of a transaction, `None` while pending.
    pub async fn receipt(&self, hash: &str) -> Result<Option<TxReceipt>, AdapterError> {
        let hash = B256::from_str(hash)
            .map_err(|e| AdapterError::InvalidInput(format!("invalid tx hash {hash}: {e}")))?;
        let Some(receipt) = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error)?
        else {
            return Ok(None);
        };
        Ok(Some(TxReceipt {
            success: receipt.status(),
            block_number: receipt.block_number,
            gas_used: U256::from(receipt.gas_used),
            effective_gas_price: U256::from(receipt.effective_gas_price),
            logs: receipt.inner.logs().to_vec(),
        }))
    }

    /// Native balance in wei.
    pub async fn balance(&self, address: &str) -> Result<U256, AdapterError> {
        let balance = self
            .provider
            .get_balance(parse_address(address)?)
            .await
            .map_err(rpc_error)?;
        Ok(from_alloy(balance))
    }

    /// ERC-20 balance of `owner`.
    pub async fn token_balance(&self, token: &str, owner: &str) -> Result<U256, AdapterError> {
        let data = self.call(token, balance_of_calldata(owner)?).await?;
        decode_balance_of(&data)
    }
}

impl fmt::Debug for EvmRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmRpc").field("url", &self.url).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_fee() {
        let receipt = TxReceipt {
            success: true,
            block_number: Some(1),
            gas_used: U256::from(21_000u64),
            effective_gas_price: U256::from(2u64),
            logs: vec![],
        };
        assert_eq!(receipt.fee(), U256::from(42_000u64));
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(matches!(EvmRpc::new("not a url"), Err(AdapterError::InvalidInput(_))));
        let rpc = EvmRpc::new("http://localhost:8545").unwrap();
        assert_eq!(rpc.url(), "http://localhost:8545");
    }
}
