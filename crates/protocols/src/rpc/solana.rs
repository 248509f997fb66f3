use crate::error::AdapterError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use tracing::debug;

/// Solana RPC provider.
pub struct RpcProvider {
    /// Nonblocking RPC client.
    client: RpcClient,
    /// Endpoint URL.
    url: String,
}

impl RpcProvider {
    /// Creates a provider for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            client: RpcClient::new(url.clone()),
            url,
        }
    }

    /// Underlying client.
    #[must_use]
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Latest blockhash.
    pub async fn get_latest_blockhash(&self) -> Result<Hash, AdapterError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| AdapterError::Rpc(e.to_string()))
    }

    /// Raw account data.
    pub async fn get_account_data(&self, pubkey: &Pubkey) -> Result<Vec<u8>, AdapterError> {
        debug!(account = %pubkey, "Fetching account data");
        self.client
            .get_account_data(pubkey)
            .await
            .map_err(|e| AdapterError::Rpc(e.to_string()))
    }

    /// Owner program of an account, or `None` if it does not exist.
    pub async fn get_account_owner(&self, pubkey: &Pubkey) -> Result<Option<Pubkey>, AdapterError> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, self.client.commitment())
            .await
            .map_err(|e| AdapterError::Rpc(e.to_string()))?;
        Ok(response.value.map(|account| account.owner))
    }
}

impl fmt::Debug for RpcProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcProvider").field("url", &self.url).finish()
    }
}
