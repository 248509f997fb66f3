use primitive_types::U256;
use xdex_domain::chain::Chain;
use xdex_domain::entities::{Pool, Position, Token};
use xdex_domain::enums::OperationKind;
use xdex_domain::value_objects::{PriceRange, QuoteResult};

/// Per-call context handed to adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContext {
    /// Target chain.
    pub chain: Chain,
    /// Wallet address that signs and owns the result.
    pub owner: String,
    /// Slippage bound embedded into built primitives.
    pub slippage_bps: u16,
    /// Unix deadline for EVM calls.
    pub deadline: u64,
}

/// Swap parameters.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    /// Input token.
    pub from: Token,
    /// Output token.
    pub to: Token,
    /// Input amount in raw units.
    pub amount_raw: U256,
    /// Quote the swap is built from.
    pub quote: QuoteResult,
}

/// Open-position parameters.
#[derive(Debug, Clone)]
pub struct OpenPositionRequest {
    /// Target pool.
    pub pool: Pool,
    /// Requested range.
    pub range: PriceRange,
    /// Maximum token0 deposit, raw units.
    pub amount0_raw: U256,
    /// Maximum token1 deposit, raw units.
    pub amount1_raw: U256,
}

/// Add-liquidity parameters.
#[derive(Debug, Clone)]
pub struct AddLiquidityRequest {
    /// Pool the position belongs to.
    pub pool: Pool,
    /// Existing position.
    pub position: Position,
    /// Maximum token0 deposit, raw units.
    pub amount0_raw: U256,
    /// Maximum token1 deposit, raw units.
    pub amount1_raw: U256,
}

/// Remove-liquidity parameters.
#[derive(Debug, Clone)]
pub struct RemoveLiquidityRequest {
    /// Pool the position belongs to.
    pub pool: Pool,
    /// Existing position.
    pub position: Position,
    /// Share to remove, 1..=100.
    pub percent: u8,
}

/// Parameters for operations that only need the position.
#[derive(Debug, Clone)]
pub struct PositionRequest {
    /// Pool the position belongs to.
    pub pool: Pool,
    /// Existing position.
    pub position: Position,
}

/// Operation handed to [`crate::ChainAdapter::build`].
#[derive(Debug, Clone)]
pub enum OperationRequest {
    /// Token swap.
    Swap(SwapRequest),
    /// Open a position.
    OpenPosition(OpenPositionRequest),
    /// Add liquidity.
    AddLiquidity(AddLiquidityRequest),
    /// Remove liquidity.
    RemoveLiquidity(RemoveLiquidityRequest),
    /// Claim fees.
    ClaimFees(PositionRequest),
    /// Close a position.
    ClosePosition(PositionRequest),
}

impl OperationRequest {
    /// Operation kind of this request.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Swap(_) => OperationKind::Swap,
            OperationRequest::OpenPosition(_) => OperationKind::OpenPosition,
            OperationRequest::AddLiquidity(_) => OperationKind::AddLiquidity,
            OperationRequest::RemoveLiquidity(_) => OperationKind::RemoveLiquidity,
            OperationRequest::ClaimFees(_) => OperationKind::ClaimFees,
            OperationRequest::ClosePosition(_) => OperationKind::ClosePosition,
        }
    }
}
