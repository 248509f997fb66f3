//! Adapter registry keyed by chain and protocol.

use crate::adapter::ChainAdapter;
use crate::error::AdapterError;
use crate::quote::QuoteSource;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use xdex_domain::chain::Chain;
use xdex_domain::enums::Protocol;

/// Maps `(chain, protocol)` to an adapter. Built once at startup.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    adapters: HashMap<(Chain, Protocol), Arc<dyn ChainAdapter>>,
    quote_sources: HashMap<Chain, Arc<dyn QuoteSource>>,
}

impl ProtocolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter for every chain it declares.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        for chain in adapter.chains() {
            debug!(chain = %chain, protocol = %adapter.protocol(), "Registering adapter");
            self.adapters
                .insert((*chain, adapter.protocol()), Arc::clone(&adapter));
        }
        self
    }

    /// Registers the quote source used for a chain.
    #[must_use]
    pub fn with_quote_source(mut self, chain: Chain, source: Arc<dyn QuoteSource>) -> Self {
        self.quote_sources.insert(chain, source);
        self
    }

    /// Resolves the adapter for a chain/protocol pair.
    pub fn adapter(
        &self,
        chain: Chain,
        protocol: Protocol,
    ) -> Result<Arc<dyn ChainAdapter>, AdapterError> {
        self.adapters
            .get(&(chain, protocol))
            .cloned()
            .ok_or(AdapterError::UnsupportedChain { protocol, chain })
    }

    /// Resolves the swap aggregator for a chain.
    pub fn swap_adapter(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>, AdapterError> {
        self.adapter(chain, Protocol::aggregator_for(chain))
    }

    /// Resolves the quote source for a chain.
    pub fn quote_source(&self, chain: Chain) -> Result<Arc<dyn QuoteSource>, AdapterError> {
        self.quote_sources
            .get(&chain)
            .cloned()
            .ok_or(AdapterError::UnsupportedChain {
                protocol: Protocol::aggregator_for(chain),
                chain,
            })
    }

    /// Registered pairs.
    #[must_use]
    pub fn entries(&self) -> Vec<(Chain, Protocol)> {
        let mut keys: Vec<_> = self.adapters.keys().copied().collect();
        keys.sort_by_key(|(c, p)| (c.as_str(), p.as_str()));
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::position_manager::PositionManagerAdapter;
    use crate::rpc::evm::EvmRpc;

    #[test]
    fn test_lookup() {
        let rpc = Arc::new(EvmRpc::new("http://localhost:8545").unwrap());
        let registry = ProtocolRegistry::new()
            .with_adapter(Arc::new(PositionManagerAdapter::uniswap(rpc.clone())))
            .with_adapter(Arc::new(PositionManagerAdapter::pancakeswap(rpc)));
        assert!(registry.adapter(Chain::Ethereum, Protocol::UniswapV3).is_ok());
        assert!(registry.adapter(Chain::Bsc, Protocol::PancakeswapV3).is_ok());
        assert!(matches!(
            registry.adapter(Chain::Bsc, Protocol::UniswapV3),
            Err(AdapterError::UnsupportedChain { .. })
        ));
        assert_eq!(registry.entries().len(), 2);
        assert!(registry.quote_source(Chain::Solana).is_err());
    }
}
