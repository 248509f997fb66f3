//! Core domain model for cross-chain DEX execution.
//!
//! This crate holds the data types shared by the protocol adapters and the
//! execution engine:
//! - Chains, protocols and operation kinds
//! - Tokens, pools and liquidity positions
//! - Price ranges and raw/decimal amounts
//! - Transaction, quote and multi-step execution results
//! - Static token registry and the pool registry seam

/// Prelude module for convenient imports.
pub mod prelude;

/// Supported chains.
pub mod chain;
/// Entities (tokens, pools, positions).
pub mod entities;
/// Protocol and lifecycle enums.
pub mod enums;
/// Domain error type.
pub mod error;
/// Token and pool registries.
pub mod registry;
/// Value objects.
pub mod value_objects;
