//! Node RPC transports.
//!
//! Thin wrappers shared by the adapters (pool state reads) and the execution
//! engine (submission and confirmation).

/// EVM JSON-RPC over HTTP.
pub mod evm;
/// Solana RPC provider.
pub mod solana;

pub use evm::{EvmRpc, TxLog, TxReceipt};
pub use solana::RpcProvider;
