//! Wiring from environment to a ready orchestrator.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use xdex_domain::chain::Chain;
use xdex_domain::entities::{Pool, Position};
use xdex_domain::registry::{InMemoryPoolRegistry, TokenRegistry};
use xdex_execution::prelude::*;
use xdex_protocols::ProtocolRegistry;
use xdex_protocols::evm::oneinch::OneInchAdapter;
use xdex_protocols::evm::position_manager::PositionManagerAdapter;
use xdex_protocols::rpc::{EvmRpc, RpcProvider};
use xdex_protocols::solana::jupiter::JupiterAdapter;
use xdex_protocols::solana::meteora::MeteoraDlmmAdapter;
use xdex_protocols::solana::raydium::RaydiumClmmAdapter;

/// Orchestrator plus the pool registry it reads from.
pub struct Runtime {
    pub orchestrator: ExecutionOrchestrator,
    pub pools: Arc<InMemoryPoolRegistry>,
}

/// Builds the runtime for every chain that has an RPC URL and a key.
pub fn build(config: ExecutionConfig, endpoints: &Endpoints) -> Result<Runtime> {
    let env = |key: &str| std::env::var(key).ok();
    let mut protocols = ProtocolRegistry::new();
    let mut attached: Vec<(Arc<dyn ChainClient>, Arc<dyn TxSigner>)> = Vec::new();

    if let Some(url) = endpoints.solana_rpc_url.as_deref() {
        let provider = Arc::new(RpcProvider::new(url));
        let jupiter = Arc::new(JupiterAdapter::default().with_quote_ttl(config.quote_ttl()));
        protocols = protocols
            .with_adapter(jupiter.clone())
            .with_quote_source(Chain::Solana, jupiter)
            .with_adapter(Arc::new(RaydiumClmmAdapter::new(provider.clone())))
            .with_adapter(Arc::new(MeteoraDlmmAdapter::new(provider.clone())));
        match SolanaSigner::from_lookup(env) {
            Ok(signer) => {
                let client: Arc<dyn ChainClient> = Arc::new(SolanaChainClient::new(provider));
                attached.push((client, Arc::new(signer)));
            }
            Err(e) => warn!(error = %e, "Solana wallet not configured"),
        }
    }

    let evm_chains = [
        (Chain::Ethereum, endpoints.eth_rpc_url.as_deref()),
        (Chain::Bsc, endpoints.bsc_rpc_url.as_deref()),
    ];
    if evm_chains.iter().any(|(_, url)| url.is_some()) {
        let oneinch = Arc::new(
            OneInchAdapter::new(endpoints.oneinch_api_key.clone())
                .with_quote_ttl(config.quote_ttl()),
        );
        protocols = protocols.with_adapter(oneinch.clone());
        for (chain, url) in evm_chains {
            let Some(url) = url else { continue };
            let rpc = Arc::new(EvmRpc::new(url)?);
            let manager = match chain {
                Chain::Bsc => PositionManagerAdapter::pancakeswap(rpc.clone()),
                _ => PositionManagerAdapter::uniswap(rpc.clone()),
            };
            protocols = protocols
                .with_adapter(Arc::new(manager))
                .with_quote_source(chain, oneinch.clone());
            match EvmSigner::from_lookup(env) {
                Ok(signer) => {
                    let client: Arc<dyn ChainClient> = Arc::new(EvmChainClient::new(chain, rpc));
                    attached.push((client, Arc::new(signer)));
                }
                Err(e) => warn!(chain = %chain, error = %e, "EVM wallet not configured"),
            }
        }
    }

    if protocols.entries().is_empty() {
        bail!("no chain configured: set SOLANA_RPC_URL, ETH_RPC_URL or BSC_RPC_URL");
    }

    let pools = Arc::new(InMemoryPoolRegistry::new());
    let mut orchestrator =
        ExecutionOrchestrator::new(config, protocols, TokenRegistry::builtin(), pools.clone());
    for (client, signer) in attached {
        orchestrator = orchestrator.with_chain(client, signer)?;
    }
    info!(chains = ?orchestrator.chains(), "Execution engine ready");
    Ok(Runtime {
        orchestrator,
        pools,
    })
}

/// Pool and position persisted between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub pool: Pool,
    pub position: Position,
}

impl PositionRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read position file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid position file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write position file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdex_domain::enums::Protocol;
    use xdex_domain::value_objects::PriceRange;

    #[test]
    fn test_position_record_survives_disk() {
        let tokens = TokenRegistry::builtin();
        let pool = Pool::new(
            "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640",
            Chain::Ethereum,
            Protocol::UniswapV3,
            tokens.resolve(Chain::Ethereum, "USDC").unwrap(),
            tokens.resolve(Chain::Ethereum, "WETH").unwrap(),
            500,
        );
        let position = Position::open(
            "812345",
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            pool.id.clone(),
            42_000,
            PriceRange::OneTick,
            200_000,
            200_010,
        );
        let record = PositionRecord { pool, position };

        let path = std::env::temp_dir().join(format!("xdex-record-{}.json", std::process::id()));
        record.save(&path).unwrap();
        let loaded = PositionRecord::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.pool, record.pool);
        assert_eq!(loaded.position, record.position);
    }
}
