use crate::chain::Chain;
use chrono::{DateTime, Utc};
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pre-trade quote from an aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    /// Chain the quote is for.
    pub chain: Chain,
    /// Input token symbol.
    pub from_token: String,
    /// Output token symbol.
    pub to_token: String,
    /// Input amount in UI units.
    pub from_amount: Decimal,
    /// Expected output amount in UI units.
    pub to_amount: Decimal,
    /// Input amount in raw units.
    pub from_amount_raw: U256,
    /// Expected output amount in raw units.
    pub to_amount_raw: U256,
    /// Minimum output after slippage, raw units.
    pub min_to_amount_raw: U256,
    /// Expected price impact in percent (0.1 = 0.1%).
    pub price_impact_pct: Decimal,
    /// Slippage bound the quote was requested with.
    pub slippage_bps: u16,
    /// Route labels, best first.
    pub route: Vec<String>,
    /// Instant after which the quote must not be used.
    pub valid_until: DateTime<Utc>,
    /// Aggregator response needed to build the swap.
    pub raw: serde_json::Value,
}

impl QuoteResult {
    /// Output per input in UI units.
    #[must_use]
    pub fn expected_price(&self) -> Option<Decimal> {
        if self.from_amount.is_zero() {
            return None;
        }
        self.to_amount.checked_div(self.from_amount)
    }

    /// Returns true if the validity window has not elapsed at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }

    /// Price impact in rounded basis points.
    #[must_use]
    pub fn price_impact_bps(&self) -> Decimal {
        (self.price_impact_pct.abs() * Decimal::ONE_HUNDRED).round()
    }
}
