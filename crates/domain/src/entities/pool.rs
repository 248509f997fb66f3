use crate::chain::Chain;
use crate::entities::token::Token;
use crate::enums::Protocol;
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry key of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub String);

impl PoolId {
    /// Key for a pool address on a chain.
    #[must_use]
    pub fn new(chain: Chain, address: &str) -> Self {
        Self(format!("{chain}:{address}"))
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liquidity pool, immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Registry key.
    pub id: PoolId,
    /// On-chain address.
    pub address: String,
    /// Chain the pool lives on.
    pub chain: Chain,
    /// Protocol that owns the pool.
    pub protocol: Protocol,
    /// First token of the ordered pair.
    pub token0: Token,
    /// Second token of the ordered pair.
    pub token1: Token,
    /// Fee tier in hundredths of a basis point (3000 = 0.3%).
    pub fee_tier: u32,
    /// Tick spacing (CLMM) or bin step (DLMM), when known.
    pub tick_spacing: Option<u16>,
}

impl Pool {
    /// Creates a pool and derives its registry key.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        chain: Chain,
        protocol: Protocol,
        token0: Token,
        token1: Token,
        fee_tier: u32,
    ) -> Self {
        let address = address.into();
        Self {
            id: PoolId::new(chain, &address),
            address,
            chain,
            protocol,
            token0,
            token1,
            fee_tier,
            tick_spacing: None,
        }
    }

    /// Sets the tick spacing or bin step.
    #[must_use]
    pub fn with_tick_spacing(mut self, spacing: u16) -> Self {
        self.tick_spacing = Some(spacing);
        self
    }

    /// Pair label such as `SOL/USDC`.
    #[must_use]
    pub fn pair(&self) -> String {
        format!("{}/{}", self.token0.symbol, self.token1.symbol)
    }
}

/// Live state read from chain, used to size operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// Price of token0 in token1, decimal adjusted.
    pub current_price: Decimal,
    /// Current tick (CLMM) or active bin id (DLMM).
    pub current_index: i32,
    /// Tick spacing (CLMM) or bin step (DLMM).
    pub spacing: u16,
    /// Active liquidity.
    pub liquidity: u128,
    /// Raw sqrt price where the protocol tracks one.
    pub sqrt_price: Option<U256>,
    /// Vault/reserve account for token0 (Solana pools).
    pub vault0: Option<String>,
    /// Vault/reserve account for token1 (Solana pools).
    pub vault1: Option<String>,
}
