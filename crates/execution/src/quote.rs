//! Quote engine with a short-lived cache.
//!
//! The slippage bound is enforced on chain by the swap primitive itself;
//! [`QuoteEngine::check`] only fails fast before anything is signed.

use crate::error::ExecutionError;
use chrono::{DateTime, Utc};
use primitive_types::U256;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use xdex_domain::chain::Chain;
use xdex_domain::value_objects::QuoteResult;
use xdex_protocols::{ProtocolRegistry, QuoteRequest};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuoteKey {
    chain: Chain,
    from: String,
    to: String,
    amount_raw: U256,
    slippage_bps: u16,
}

impl From<&QuoteRequest> for QuoteKey {
    fn from(request: &QuoteRequest) -> Self {
        Self {
            chain: request.chain,
            from: request.from.address.to_ascii_lowercase(),
            to: request.to.address.to_ascii_lowercase(),
            amount_raw: request.amount_raw,
            slippage_bps: request.slippage_bps,
        }
    }
}

/// Fetches quotes from the chain's aggregator and caches them until expiry.
pub struct QuoteEngine {
    protocols: ProtocolRegistry,
    ttl: chrono::Duration,
    cache: Mutex<HashMap<QuoteKey, QuoteResult>>,
}

impl QuoteEngine {
    /// Creates an engine; quotes live at most `ttl`.
    pub fn new(protocols: ProtocolRegistry, ttl: Duration) -> Self {
        Self {
            protocols,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(10)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a cached quote or fetches a fresh one.
    pub async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResult, ExecutionError> {
        if request.from.address.eq_ignore_ascii_case(&request.to.address) {
            return Err(ExecutionError::InvalidInput(format!(
                "cannot quote {} to itself",
                request.from.symbol
            )));
        }
        if request.amount_raw.is_zero() {
            return Err(ExecutionError::InvalidInput("amount must be positive".into()));
        }
        if request.slippage_bps > 10_000 {
            return Err(ExecutionError::InvalidInput(format!(
                "slippage {} bps exceeds 100%",
                request.slippage_bps
            )));
        }

        let key = QuoteKey::from(request);
        let now = Utc::now();
        if let Some(cached) = self.cached(&key, now) {
            debug!(
                from = %request.from.symbol,
                to = %request.to.symbol,
                valid_until = %cached.valid_until,
                "Quote cache hit"
            );
            return Ok(cached);
        }

        let source = self.protocols.quote_source(request.chain)?;
        let mut quote = source.quote(request).await?;
        quote.valid_until = quote.valid_until.min(now + self.ttl);
        info!(
            chain = %request.chain,
            from = %request.from.symbol,
            to = %request.to.symbol,
            amount = %request.amount,
            expected = %quote.to_amount,
            impact_pct = %quote.price_impact_pct,
            "Fetched quote"
        );

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, q| q.is_valid_at(now));
        cache.insert(key, quote.clone());
        Ok(quote)
    }

    fn cached(&self, key: &QuoteKey, now: DateTime<Utc>) -> Option<QuoteResult> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).filter(|q| q.is_valid_at(now)).cloned()
    }

    /// Fail-fast check before building a swap: the quote must still be
    /// valid and its price impact within `slippage_bps`.
    pub fn check(
        quote: &QuoteResult,
        slippage_bps: u16,
        now: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        if !quote.is_valid_at(now) {
            return Err(ExecutionError::QuoteExpired(format!(
                "{} -> {} quote expired at {}",
                quote.from_token, quote.to_token, quote.valid_until
            )));
        }
        let impact = quote.price_impact_bps();
        if impact > Decimal::from(slippage_bps) {
            return Err(ExecutionError::SlippageExceeded(format!(
                "price impact {impact} bps exceeds bound {slippage_bps} bps"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedQuoteSource;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use xdex_domain::registry::TokenRegistry;

    fn request(amount_raw: u64) -> QuoteRequest {
        let reg = TokenRegistry::builtin();
        QuoteRequest {
            chain: Chain::Solana,
            from: reg.resolve(Chain::Solana, "SOL").unwrap(),
            to: reg.resolve(Chain::Solana, "USDC").unwrap(),
            amount: dec!(0.1),
            amount_raw: U256::from(amount_raw),
            slippage_bps: 50,
        }
    }

    fn engine(source: Arc<FixedQuoteSource>) -> QuoteEngine {
        let registry = ProtocolRegistry::new().with_quote_source(Chain::Solana, source);
        QuoteEngine::new(registry, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_repeated_quotes_are_cached() {
        let source = Arc::new(FixedQuoteSource::new(U256::from(15_000_000u64)));
        let engine = engine(source.clone());
        let first = engine.quote(&request(100_000_000)).await.unwrap();
        let second = engine.quote(&request(100_000_000)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert!(first.valid_until <= Utc::now() + chrono::Duration::seconds(10));

        engine.quote(&request(200_000_000)).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let engine = engine(Arc::new(FixedQuoteSource::new(U256::one())));
        assert!(matches!(
            engine.quote(&request(0)).await,
            Err(ExecutionError::InvalidInput(_))
        ));
        let mut same = request(1);
        same.to = same.from.clone();
        assert!(engine.quote(&same).await.is_err());

        let mut eth = request(1);
        eth.chain = Chain::Ethereum;
        assert!(matches!(
            engine.quote(&eth).await,
            Err(ExecutionError::UnsupportedChain(_))
        ));
    }

    #[tokio::test]
    async fn test_check_fails_fast() {
        let source = Arc::new(
            FixedQuoteSource::new(U256::from(15_000_000u64)).with_price_impact_pct(dec!(1.2)),
        );
        let quote = engine(source).quote(&request(100_000_000)).await.unwrap();
        assert!(matches!(
            QuoteEngine::check(&quote, 50, Utc::now()),
            Err(ExecutionError::SlippageExceeded(_))
        ));
        assert!(QuoteEngine::check(&quote, 150, Utc::now()).is_ok());

        let later = quote.valid_until + chrono::Duration::seconds(1);
        let err = QuoteEngine::check(&quote, 150, later).unwrap_err();
        assert!(matches!(err, ExecutionError::QuoteExpired(_)));
        assert!(err.is_recoverable());
    }
}
