use crate::error::AdapterError;
use async_trait::async_trait;
use primitive_types::U256;
use rust_decimal::Decimal;
use xdex_domain::chain::Chain;
use xdex_domain::entities::Token;
use xdex_domain::value_objects::QuoteResult;

/// Quote parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    /// Chain to quote on.
    pub chain: Chain,
    /// Input token.
    pub from: Token,
    /// Output token.
    pub to: Token,
    /// Input amount in UI units.
    pub amount: Decimal,
    /// Input amount in raw units.
    pub amount_raw: U256,
    /// Slippage bound in basis points.
    pub slippage_bps: u16,
}

/// Aggregator that prices a swap.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetches a fresh quote.
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResult, AdapterError>;
}
