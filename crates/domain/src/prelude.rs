//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use xdex_domain::prelude::*;
//! ```

pub use crate::chain::{Chain, ChainFamily};
pub use crate::entities::{Pool, PoolId, PoolState, Position, PositionId, Token};
pub use crate::enums::{OperationKind, PositionStatus, Protocol, StepKind};
pub use crate::error::DomainError;
pub use crate::registry::{InMemoryPoolRegistry, PoolRegistry, TokenRegistry};
pub use crate::value_objects::{
    AbsoluteRange, Amount, ClosePositionResult, ExecutionStep, OpenPositionResult, OverallStatus,
    PriceRange, QuoteResult, StepOutcome, SwapResult, TxResult, TxStatus,
};
