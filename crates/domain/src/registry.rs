//! Token and pool lookup.
//!
//! Tokens come from a static table compiled into the binary. Pools are
//! served through the [`PoolRegistry`] trait so callers can plug in their
//! own discovery; [`InMemoryPoolRegistry`] covers configured pools.

use crate::chain::Chain;
use crate::entities::pool::{Pool, PoolId};
use crate::entities::token::Token;
use crate::error::DomainError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Address used by EVM aggregators for the native gas token.
pub const EVM_NATIVE_ADDRESS: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Wrapped SOL mint.
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

// (symbol, decimals, address, name)
const SOLANA_TOKENS: &[(&str, u8, &str, &str)] = &[
    ("SOL", 9, WSOL_MINT, "Solana"),
    ("USDC", 6, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USD Coin"),
    ("USDT", 6, "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "Tether USD"),
    ("RAY", 6, "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", "Raydium"),
    ("JUP", 6, "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", "Jupiter"),
];

const ETHEREUM_TOKENS: &[(&str, u8, &str, &str)] = &[
    ("ETH", 18, EVM_NATIVE_ADDRESS, "Ether"),
    ("WETH", 18, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "Wrapped Ether"),
    ("USDC", 6, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "USD Coin"),
    ("USDT", 6, "0xdAC17F958D2ee523a2206206994597C13D831ec7", "Tether USD"),
    ("DAI", 18, "0x6B175474E89094C44Da98b954EedeaC495271d0F", "Dai Stablecoin"),
];

const BSC_TOKENS: &[(&str, u8, &str, &str)] = &[
    ("BNB", 18, EVM_NATIVE_ADDRESS, "BNB"),
    ("WBNB", 18, "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c", "Wrapped BNB"),
    ("USDT", 18, "0x55d398326f99059fF775485246999027B3197955", "Tether USD"),
    ("USDC", 18, "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d", "USD Coin"),
    ("DAI", 18, "0x1AF3F329e8BE154074D8769D1FFa4eE058B1DBc3", "Dai Stablecoin"),
];

/// Static token registry.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: HashMap<Chain, Vec<Token>>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TokenRegistry {
    /// Registry with the built-in token table.
    #[must_use]
    pub fn builtin() -> Self {
        let mut tokens = HashMap::new();
        for (chain, table) in [
            (Chain::Solana, SOLANA_TOKENS),
            (Chain::Ethereum, ETHEREUM_TOKENS),
            (Chain::Bsc, BSC_TOKENS),
        ] {
            let list = table
                .iter()
                .map(|(symbol, decimals, address, name)| {
                    Token::new(*symbol, chain, *decimals, *address, *name)
                })
                .collect();
            tokens.insert(chain, list);
        }
        Self { tokens }
    }

    /// Adds or replaces a token.
    pub fn insert(&mut self, token: Token) {
        let list = self.tokens.entry(token.chain).or_default();
        list.retain(|t| !t.symbol.eq_ignore_ascii_case(&token.symbol));
        list.push(token);
    }

    /// Resolves a symbol or address on a chain.
    pub fn resolve(&self, chain: Chain, symbol_or_address: &str) -> Result<Token, DomainError> {
        self.tokens
            .get(&chain)
            .and_then(|list| {
                list.iter().find(|t| {
                    t.symbol.eq_ignore_ascii_case(symbol_or_address)
                        || t.address.eq_ignore_ascii_case(symbol_or_address)
                })
            })
            .cloned()
            .ok_or_else(|| DomainError::UnknownToken {
                symbol: symbol_or_address.to_string(),
                chain: chain.to_string(),
            })
    }

    /// All tokens on a chain.
    #[must_use]
    pub fn tokens(&self, chain: Chain) -> &[Token] {
        self.tokens.get(&chain).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Pool lookup seam.
pub trait PoolRegistry: Send + Sync {
    /// Resolves a pool by id.
    fn get(&self, id: &PoolId) -> Result<Pool, DomainError>;
}

/// Pool registry backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryPoolRegistry {
    pools: RwLock<HashMap<PoolId, Pool>>,
}

impl InMemoryPoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool, returning its id.
    pub fn register(&self, pool: Pool) -> PoolId {
        let id = pool.id.clone();
        if let Ok(mut pools) = self.pools.write() {
            pools.insert(id.clone(), pool);
        }
        id
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Returns true if no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PoolRegistry for InMemoryPoolRegistry {
    fn get(&self, id: &PoolId) -> Result<Pool, DomainError> {
        self.pools
            .read()
            .ok()
            .and_then(|pools| pools.get(id).cloned())
            .ok_or_else(|| DomainError::PoolNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Protocol;

    #[test]
    fn test_resolve_by_symbol_and_address() {
        let reg = TokenRegistry::builtin();
        let usdc = reg.resolve(Chain::Solana, "usdc").unwrap();
        assert_eq!(usdc.decimals, 6);
        let by_addr = reg.resolve(Chain::Solana, &usdc.address).unwrap();
        assert_eq!(by_addr.symbol, "USDC");
        assert!(reg.resolve(Chain::Bsc, "RAY").is_err());
        assert_eq!(reg.resolve(Chain::Bsc, "USDT").unwrap().decimals, 18);
    }

    #[test]
    fn test_pool_registry() {
        let reg = TokenRegistry::builtin();
        let pools = InMemoryPoolRegistry::new();
        let pool = Pool::new(
            "pool1",
            Chain::Solana,
            Protocol::RaydiumClmm,
            reg.resolve(Chain::Solana, "SOL").unwrap(),
            reg.resolve(Chain::Solana, "USDC").unwrap(),
            400,
        );
        let id = pools.register(pool);
        assert_eq!(pools.get(&id).unwrap().pair(), "SOL/USDC");
        assert!(pools.get(&PoolId("missing".into())).is_err());
    }
}
