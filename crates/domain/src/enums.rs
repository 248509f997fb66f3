use crate::chain::Chain;
use serde::{Deserialize, Serialize};
use std::fmt;

/// On-chain protocol or aggregator an adapter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Jupiter swap aggregator (Solana).
    Jupiter,
    /// Raydium concentrated liquidity (Solana).
    RaydiumClmm,
    /// Meteora dynamic liquidity market maker (Solana).
    MeteoraDlmm,
    /// 1inch swap aggregator (EVM).
    OneInch,
    /// Uniswap V3 position manager (Ethereum).
    UniswapV3,
    /// PancakeSwap V3 position manager (BSC).
    PancakeswapV3,
}

impl Protocol {
    /// Default swap aggregator for a chain.
    #[must_use]
    pub fn aggregator_for(chain: Chain) -> Self {
        match chain {
            Chain::Solana => Protocol::Jupiter,
            Chain::Ethereum | Chain::Bsc => Protocol::OneInch,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Jupiter => "jupiter",
            Protocol::RaydiumClmm => "raydium",
            Protocol::MeteoraDlmm => "meteora",
            Protocol::OneInch => "1inch",
            Protocol::UniswapV3 => "uniswap",
            Protocol::PancakeswapV3 => "pancakeswap",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a liquidity position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Position holds liquidity.
    Open,
    /// A close sequence confirmed some steps but not the terminal one.
    PartiallyClosed,
    /// Terminal close step confirmed.
    Closed,
}

impl PositionStatus {
    /// Returns whether moving to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, next),
            (Open, Open)
                | (Open, PartiallyClosed)
                | (Open, Closed)
                | (PartiallyClosed, PartiallyClosed)
                | (PartiallyClosed, Closed)
        )
    }
}

/// Kind of work a single execution step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Token allowance for a spender contract.
    Approve,
    /// Token swap.
    Swap,
    /// Create a position and deposit liquidity.
    OpenPosition,
    /// Deposit into an existing position.
    AddLiquidity,
    /// Withdraw liquidity from a position.
    RemoveLiquidity,
    /// Collect accrued fees.
    ClaimFees,
    /// Destroy the position.
    ClosePosition,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Approve => "approve",
            StepKind::Swap => "swap",
            StepKind::OpenPosition => "open_position",
            StepKind::AddLiquidity => "add_liquidity",
            StepKind::RemoveLiquidity => "remove_liquidity",
            StepKind::ClaimFees => "claim_fees",
            StepKind::ClosePosition => "close_position",
        };
        f.write_str(s)
    }
}

/// Logical operation requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Token swap.
    Swap,
    /// Open a liquidity position.
    OpenPosition,
    /// Add liquidity to a position.
    AddLiquidity,
    /// Remove a share of a position's liquidity.
    RemoveLiquidity,
    /// Collect accrued fees.
    ClaimFees,
    /// Close a position completely.
    ClosePosition,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Swap => "swap",
            OperationKind::OpenPosition => "open_position",
            OperationKind::AddLiquidity => "add_liquidity",
            OperationKind::RemoveLiquidity => "remove_liquidity",
            OperationKind::ClaimFees => "claim_fees",
            OperationKind::ClosePosition => "close_position",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_absorbing() {
        assert!(!PositionStatus::Closed.can_transition_to(PositionStatus::Open));
        assert!(!PositionStatus::Closed.can_transition_to(PositionStatus::PartiallyClosed));
        assert!(!PositionStatus::PartiallyClosed.can_transition_to(PositionStatus::Open));
        assert!(PositionStatus::Open.can_transition_to(PositionStatus::PartiallyClosed));
        assert!(PositionStatus::PartiallyClosed.can_transition_to(PositionStatus::Closed));
    }

    #[test]
    fn test_aggregator_for_chain() {
        assert_eq!(Protocol::aggregator_for(Chain::Solana), Protocol::Jupiter);
        assert_eq!(Protocol::aggregator_for(Chain::Bsc), Protocol::OneInch);
    }
}
