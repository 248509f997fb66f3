//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use xdex_execution::prelude::*;
//! ```

// Builder
pub use crate::builder::{Envelope, EvmEnvelope, SolanaEnvelope, TransactionBuilder};

// Clients
pub use crate::client::{ChainClient, ChainStatus, FeeMarket, SignedPayload, TransportError};
pub use crate::evm_client::EvmChainClient;
pub use crate::solana_client::SolanaChainClient;

// Configuration
pub use crate::config::{
    Endpoints, EvmFeeConfig, EvmFeeMode, ExecutionConfig, SolanaFeeConfig, SubmitConfig,
};

// Errors
pub use crate::error::ExecutionError;

// Orchestration
pub use crate::orchestrator::{CallPhase, ExecutionOrchestrator, correlation_id};
pub use crate::quote::QuoteEngine;
pub use crate::submitter::{Submission, SubmissionState, Submitter};

// Signing
pub use crate::signer::{EvmSigner, SolanaSigner, TxSigner};
