//! Realized swap metrics.

use primitive_types::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Output per unit of input.
#[must_use]
pub fn realized_price(input: Decimal, output: Decimal) -> Option<Decimal> {
    if input.is_zero() {
        return None;
    }
    output.checked_div(input)
}

/// Signed slippage versus the quote in basis points, rounded half away from
/// zero. Positive when the execution was worse than quoted.
#[must_use]
pub fn slippage_bps(expected: Decimal, actual: Decimal) -> Option<i64> {
    if expected.is_zero() {
        return None;
    }
    ((expected - actual) / expected * Decimal::from(10_000))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Amount received from a balance change. When the token is the native one
/// the fee came out of the same balance and is added back.
#[must_use]
pub fn received_amount(before: U256, after: U256, fee: u128, native: bool) -> Option<U256> {
    let after = if native {
        after.checked_add(U256::from(fee))?
    } else {
        after
    };
    after.checked_sub(before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_slippage_bps() {
        assert_eq!(slippage_bps(dec!(100), dec!(98)), Some(200));
        assert_eq!(slippage_bps(dec!(100), dec!(101)), Some(-100));
        assert_eq!(slippage_bps(dec!(15), dec!(14.925)), Some(50));
        assert_eq!(slippage_bps(dec!(3), dec!(2.99985)), Some(1));
        assert_eq!(slippage_bps(Decimal::ZERO, dec!(1)), None);
    }

    #[test]
    fn test_realized_price() {
        assert_eq!(realized_price(dec!(0.1), dec!(14.925)), Some(dec!(149.25)));
        assert_eq!(realized_price(Decimal::ZERO, dec!(1)), None);
    }

    #[test]
    fn test_received_amount() {
        let before = U256::from(1_000u64);
        assert_eq!(
            received_amount(before, U256::from(1_500u64), 0, false),
            Some(U256::from(500u64))
        );
        // Native output: 5000 lamports of fee were paid from the same balance.
        assert_eq!(
            received_amount(before, U256::from(6_000u64), 5_000, true),
            Some(U256::from(10_000u64))
        );
        assert_eq!(received_amount(before, U256::from(900u64), 0, false), None);
    }
}
