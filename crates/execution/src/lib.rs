//! Transaction execution engine for cross-chain DEX operations.
//!
//! This crate turns protocol-level operation plans into confirmed
//! transactions:
//! - Chain clients for Solana and EVM RPC endpoints
//! - Transaction envelopes with chain-specific fee settings
//! - Key loading and signing with replay protection
//! - Submission with bounded retries and confirmation polling
//! - Cached quotes with fail-fast slippage checks
//! - The orchestrator sequencing multi-step operations

/// Prelude module for convenient imports.
pub mod prelude;

/// Envelope construction.
pub mod builder;
/// Chain client seam.
pub mod client;
/// Engine configuration.
pub mod config;
/// Execution errors.
pub mod error;
/// EVM chain client.
pub mod evm_client;
/// Realized swap metrics.
pub mod metrics;
/// Operation sequencing.
pub mod orchestrator;
/// Quote engine.
pub mod quote;
/// Transaction signers.
pub mod signer;
/// Solana chain client.
pub mod solana_client;
/// Submission and confirmation.
pub mod submitter;

#[cfg(test)]
pub(crate) mod testing;
