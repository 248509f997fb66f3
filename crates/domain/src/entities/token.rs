use crate::chain::Chain;
use crate::error::DomainError;
use crate::value_objects::amount::Amount;
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Token as listed in the static registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Ticker symbol.
    pub symbol: String,
    /// Chain the token lives on.
    pub chain: Chain,
    /// Decimal precision.
    pub decimals: u8,
    /// Mint (Solana) or contract (EVM) address.
    pub address: String,
    /// Display name.
    pub name: String,
}

impl Token {
    /// Creates a new token.
    pub fn new(
        symbol: impl Into<String>,
        chain: Chain,
        decimals: u8,
        address: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            chain,
            decimals,
            address: address.into(),
            name: name.into(),
        }
    }

    /// Returns true when this is the chain's native gas token.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.symbol.eq_ignore_ascii_case(self.chain.native_symbol())
    }

    /// Converts a UI amount to raw units.
    pub fn to_raw(&self, ui: Decimal) -> Result<U256, DomainError> {
        Amount::from_decimal(ui, self.decimals).map(|a| a.raw)
    }

    /// Converts raw units to a UI amount.
    pub fn to_ui(&self, raw: U256) -> Result<Decimal, DomainError> {
        Amount::new(raw, self.decimals).to_decimal()
    }
}
