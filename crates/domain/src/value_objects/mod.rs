pub mod amount;
pub mod execution;
pub mod price_range;
pub mod quote;
pub mod tx_result;

pub use amount::Amount;
pub use execution::{
    ClosePositionResult, ExecutionStep, OpenPositionResult, OverallStatus, StepOutcome, SwapResult,
};
pub use price_range::{AbsoluteRange, Bounds, PriceRange};
pub use quote::QuoteResult;
pub use tx_result::{TxResult, TxStatus};
