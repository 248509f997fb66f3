//! Chain identifiers and their transaction model.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction model used by a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    /// Instruction bundles referencing a recent blockhash.
    Solana,
    /// Account/nonce based contract calls.
    Evm,
}

/// Supported chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Solana mainnet.
    Solana,
    /// Ethereum mainnet.
    Ethereum,
    /// BNB Smart Chain.
    Bsc,
}

impl Chain {
    /// All supported chains.
    pub const ALL: [Chain; 3] = [Chain::Solana, Chain::Ethereum, Chain::Bsc];

    /// Transaction model of this chain.
    #[must_use]
    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Solana => ChainFamily::Solana,
            Chain::Ethereum | Chain::Bsc => ChainFamily::Evm,
        }
    }

    /// Returns true for account/nonce based chains.
    #[must_use]
    pub fn is_evm(&self) -> bool {
        self.family() == ChainFamily::Evm
    }

    /// EIP-155 chain id, if any.
    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Chain::Solana => None,
            Chain::Ethereum => Some(1),
            Chain::Bsc => Some(56),
        }
    }

    /// Symbol of the native gas token.
    #[must_use]
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Solana => "SOL",
            Chain::Ethereum => "ETH",
            Chain::Bsc => "BNB",
        }
    }

    /// Decimals of the native gas token.
    #[must_use]
    pub fn native_decimals(&self) -> u8 {
        match self {
            Chain::Solana => 9,
            Chain::Ethereum | Chain::Bsc => 18,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Ethereum => "eth",
            Chain::Bsc => "bsc",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solana" | "sol" => Ok(Chain::Solana),
            "eth" | "ethereum" | "1" => Ok(Chain::Ethereum),
            "bsc" | "bnb" | "56" => Ok(Chain::Bsc),
            other => Err(DomainError::UnsupportedChain(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!("SOL".parse::<Chain>().unwrap(), Chain::Solana);
        assert_eq!("ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("56".parse::<Chain>().unwrap(), Chain::Bsc);
        assert!("polygon".parse::<Chain>().is_err());
    }

    #[test]
    fn test_family() {
        assert!(!Chain::Solana.is_evm());
        assert!(Chain::Bsc.is_evm());
        assert_eq!(Chain::Ethereum.chain_id(), Some(1));
        assert_eq!(Chain::Solana.chain_id(), None);
    }
}
