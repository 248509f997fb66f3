//! Protocol adapters for Solana and EVM DEXes.
//!
//! Each adapter translates a requested operation into an ordered list of
//! chain-native primitives grouped into execution steps:
//! - Jupiter and 1inch aggregator swaps and quotes
//! - Raydium CLMM and Meteora DLMM positions (Solana instructions)
//! - Uniswap V3 / PancakeSwap V3 positions (EVM contract calls)
//!
//! Adapters never sign or submit; that is the execution engine's job.

/// Adapter trait and capability dispatch.
pub mod adapter;
/// Adapter error type.
pub mod error;
/// EVM contract-call adapters.
pub mod evm;
/// Tick and bin math.
pub mod math;
/// Operation plans and primitives.
pub mod plan;
/// Quote sources.
pub mod quote;
/// Adapter registry.
pub mod registry;
/// Operation requests.
pub mod request;
/// RPC transports shared with the execution engine.
pub mod rpc;
/// Solana instruction adapters.
pub mod solana;
/// Pool state readers.
pub mod state;

pub use adapter::ChainAdapter;
pub use error::AdapterError;
pub use plan::{ContractCall, OperationPlan, Primitive, StepGroup};
pub use quote::{QuoteRequest, QuoteSource};
pub use registry::ProtocolRegistry;
pub use request::{
    AddLiquidityRequest, ChainContext, OpenPositionRequest, OperationRequest, PositionRequest,
    RemoveLiquidityRequest, SwapRequest,
};
pub use state::PoolStateReader;
