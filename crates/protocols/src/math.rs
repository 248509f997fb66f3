//! Price, tick and bin conversions.
//!
//! CLMM prices follow `1.0001^tick`; DLMM prices follow
//! `(1 + bin_step / 10_000)^bin_id`. Both are decimal adjusted by
//! `10^(decimals0 - decimals1)` to convert raw ratios into UI prices.

use crate::error::AdapterError;
use primitive_types::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use xdex_domain::entities::PoolState;
use xdex_domain::value_objects::PriceRange;

/// Smallest usable tick.
pub const MIN_TICK: i32 = -443_636;
/// Largest usable tick.
pub const MAX_TICK: i32 = 443_636;
/// Ticks per Raydium tick array.
pub const TICK_ARRAY_SIZE: i32 = 60;
/// Bins per Meteora bin array.
pub const MAX_BIN_PER_ARRAY: i32 = 70;
/// Widest Meteora position in bins.
pub const MAX_POSITION_WIDTH: i32 = 70;

fn decimal_shift(decimals0: u8, decimals1: u8) -> f64 {
    10f64.powi(decimals0 as i32 - decimals1 as i32)
}

fn to_f64(value: Decimal) -> Result<f64, AdapterError> {
    value
        .to_f64()
        .ok_or_else(|| AdapterError::InvalidRange(format!("{value} is not representable")))
}

fn from_f64(value: f64) -> Result<Decimal, AdapterError> {
    Decimal::from_f64(value)
        .ok_or_else(|| AdapterError::InvalidRange(format!("{value} is not representable")))
}

/// Largest tick whose price does not exceed `price`.
pub fn price_to_tick(price: Decimal, decimals0: u8, decimals1: u8) -> Result<i32, AdapterError> {
    if price <= Decimal::ZERO {
        return Err(AdapterError::InvalidRange(format!(
            "price must be positive, got {price}"
        )));
    }
    let raw = to_f64(price)? / decimal_shift(decimals0, decimals1);
    let tick = (raw.ln() / 1.0001f64.ln()).floor();
    Ok((tick as i32).clamp(MIN_TICK, MAX_TICK))
}

/// UI price at `tick`.
pub fn tick_to_price(tick: i32, decimals0: u8, decimals1: u8) -> Result<Decimal, AdapterError> {
    from_f64(1.0001f64.powi(tick) * decimal_shift(decimals0, decimals1))
}

/// Rounds a tick down to a multiple of `spacing`.
#[must_use]
pub fn align_tick_down(tick: i32, spacing: u16) -> i32 {
    let spacing = spacing.max(1) as i32;
    tick.div_euclid(spacing) * spacing
}

/// Rounds a tick up to a multiple of `spacing`.
#[must_use]
pub fn align_tick_up(tick: i32, spacing: u16) -> i32 {
    let down = align_tick_down(tick, spacing);
    if down == tick {
        tick
    } else {
        down + spacing.max(1) as i32
    }
}

/// Start index of the Raydium tick array that contains `tick`.
#[must_use]
pub fn tick_array_start_index(tick: i32, spacing: u16) -> i32 {
    let ticks_in_array = TICK_ARRAY_SIZE * spacing.max(1) as i32;
    tick.div_euclid(ticks_in_array) * ticks_in_array
}

/// Largest bin id whose price does not exceed `price`.
pub fn price_to_bin_id(
    price: Decimal,
    bin_step: u16,
    decimals0: u8,
    decimals1: u8,
) -> Result<i32, AdapterError> {
    if price <= Decimal::ZERO {
        return Err(AdapterError::InvalidRange(format!(
            "price must be positive, got {price}"
        )));
    }
    let base = 1.0 + bin_step as f64 / 10_000.0;
    let raw = to_f64(price)? / decimal_shift(decimals0, decimals1);
    Ok((raw.ln() / base.ln()).floor() as i32)
}

/// UI price at `bin_id`.
pub fn bin_id_to_price(
    bin_id: i32,
    bin_step: u16,
    decimals0: u8,
    decimals1: u8,
) -> Result<Decimal, AdapterError> {
    let base = 1.0 + bin_step as f64 / 10_000.0;
    from_f64(base.powi(bin_id) * decimal_shift(decimals0, decimals1))
}

/// Index of the Meteora bin array that contains `bin_id`.
#[must_use]
pub fn bin_array_index(bin_id: i32) -> i64 {
    bin_id.div_euclid(MAX_BIN_PER_ARRAY) as i64
}

/// UI price from a Q64.64 sqrt price.
pub fn sqrt_price_x64_to_price(
    sqrt_price_x64: u128,
    decimals0: u8,
    decimals1: u8,
) -> Result<Decimal, AdapterError> {
    let sqrt = sqrt_price_x64 as f64 / 2f64.powi(64);
    from_f64(sqrt * sqrt * decimal_shift(decimals0, decimals1))
}

/// UI price from a Q64.96 sqrt price.
pub fn sqrt_price_x96_to_price(
    sqrt_price_x96: U256,
    decimals0: u8,
    decimals1: u8,
) -> Result<Decimal, AdapterError> {
    // Keep 64 bits of precision before converting to float.
    let high = u128::try_from(sqrt_price_x96 >> 32).map_err(|_| {
        AdapterError::InvalidInput(format!("sqrt price {sqrt_price_x96} exceeds uint160"))
    })?;
    let shifted = high as f64 / 2f64.powi(64);
    from_f64(shifted * shifted * decimal_shift(decimals0, decimals1))
}

/// Liquidity provided by the given amounts over `[tick_lower, tick_upper)` at
/// the current tick. Used as an estimate for plan bookkeeping.
#[must_use]
pub fn liquidity_for_amounts(
    current_tick: i32,
    tick_lower: i32,
    tick_upper: i32,
    amount0: u128,
    amount1: u128,
) -> u128 {
    let sqrt = |t: i32| 1.0001f64.powf(t as f64 / 2.0);
    let (sp, sa, sb) = (sqrt(current_tick), sqrt(tick_lower), sqrt(tick_upper));
    let l0 = |a: f64, b: f64| amount0 as f64 * a * b / (b - a);
    let l1 = |a: f64, b: f64| amount1 as f64 / (b - a);
    let liquidity = if current_tick < tick_lower {
        l0(sa, sb)
    } else if current_tick >= tick_upper {
        l1(sa, sb)
    } else {
        let a = if amount0 > 0 { l0(sp, sb) } else { f64::INFINITY };
        let b = if amount1 > 0 { l1(sa, sp) } else { f64::INFINITY };
        let m = a.min(b);
        if m.is_finite() { m } else { 0.0 }
    };
    if liquidity.is_finite() && liquidity > 0.0 {
        liquidity.min(u128::MAX as f64) as u128
    } else {
        0
    }
}

/// DLMM liquidity of a deposit priced at `active_id`: `amount_x * price + amount_y`
/// in raw token-y units. Matches on-chain bin shares shifted right by 64 bits.
#[must_use]
pub fn bin_liquidity(active_id: i32, bin_step: u16, amount_x: u64, amount_y: u64) -> u128 {
    let price = (1.0 + bin_step as f64 / 10_000.0).powi(active_id);
    let value_x = amount_x as f64 * price;
    let value_x = if value_x.is_finite() {
        value_x.min(u128::MAX as f64) as u128
    } else {
        0
    };
    value_x.saturating_add(u128::from(amount_y))
}

/// Resolves a range to aligned CLMM ticks `(lower, upper)`.
pub fn resolve_tick_range(
    range: &PriceRange,
    state: &PoolState,
    decimals0: u8,
    decimals1: u8,
) -> Result<(i32, i32), AdapterError> {
    let spacing = state.spacing.max(1);
    let (lower, upper) = match *range {
        PriceRange::OneTick => {
            let lower = align_tick_down(state.current_index, spacing);
            (lower, lower + spacing as i32)
        }
        PriceRange::Ticks(bounds) => (
            align_tick_down(bounds.lower(), spacing),
            align_tick_up(bounds.upper(), spacing),
        ),
        PriceRange::BinOffsets(_) => {
            return Err(AdapterError::InvalidRange(
                "bin offsets are only meaningful for DLMM pools".into(),
            ));
        }
        _ => {
            let abs = range.to_absolute(state.current_price)?;
            let lower = price_to_tick(abs.lower(), decimals0, decimals1)?;
            let upper = price_to_tick(abs.upper(), decimals0, decimals1)?;
            (align_tick_down(lower, spacing), align_tick_up(upper, spacing))
        }
    };
    let upper = if upper <= lower {
        lower + spacing as i32
    } else {
        upper
    };
    if lower < MIN_TICK || upper > MAX_TICK {
        return Err(AdapterError::InvalidRange(format!(
            "ticks [{lower}, {upper}] outside supported bounds"
        )));
    }
    Ok((lower, upper))
}

/// Resolves a range to DLMM bin ids `(lower, upper)`, both inclusive.
pub fn resolve_bin_range(
    range: &PriceRange,
    state: &PoolState,
    decimals0: u8,
    decimals1: u8,
) -> Result<(i32, i32), AdapterError> {
    let active = state.current_index;
    let (lower, upper) = match *range {
        PriceRange::OneTick => (active, active),
        PriceRange::BinOffsets(offsets) => (active + offsets.lower(), active + offsets.upper()),
        PriceRange::Ticks(bounds) => bounds.pair(),
        _ => {
            let abs = range.to_absolute(state.current_price)?;
            (
                price_to_bin_id(abs.lower(), state.spacing, decimals0, decimals1)?,
                price_to_bin_id(abs.upper(), state.spacing, decimals0, decimals1)?,
            )
        }
    };
    if lower > upper {
        return Err(AdapterError::InvalidRange(format!(
            "bin range [{lower}, {upper}] is inverted"
        )));
    }
    let width = upper - lower + 1;
    if width > MAX_POSITION_WIDTH {
        return Err(AdapterError::InvalidRange(format!(
            "{width} bins exceeds the maximum position width of {MAX_POSITION_WIDTH}"
        )));
    }
    Ok((lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn state(index: i32, spacing: u16) -> PoolState {
        PoolState {
            current_price: dec!(150),
            current_index: index,
            spacing,
            liquidity: 0,
            sqrt_price: None,
            vault0: None,
            vault1: None,
        }
    }

    #[test]
    fn test_tick_alignment() {
        assert_eq!(align_tick_down(-5, 10), -10);
        assert_eq!(align_tick_down(15, 10), 10);
        assert_eq!(align_tick_up(11, 10), 20);
        assert_eq!(align_tick_up(-10, 10), -10);
    }

    #[test]
    fn test_tick_array_start() {
        assert_eq!(tick_array_start_index(0, 1), 0);
        assert_eq!(tick_array_start_index(59, 1), 0);
        assert_eq!(tick_array_start_index(-1, 1), -60);
        assert_eq!(tick_array_start_index(-1, 10), -600);
    }

    #[test]
    fn test_bin_array_index() {
        assert_eq!(bin_array_index(69), 0);
        assert_eq!(bin_array_index(70), 1);
        assert_eq!(bin_array_index(-1), -1);
    }

    #[test]
    fn test_price_tick_round_trip() {
        let tick = price_to_tick(dec!(150), 9, 6).unwrap();
        let price = tick_to_price(tick, 9, 6).unwrap();
        assert!(price <= dec!(150));
        assert!(price > dec!(149.9));
    }

    #[test]
    fn test_one_tick_range() {
        let (lo, hi) = resolve_tick_range(&PriceRange::OneTick, &state(-15, 10), 9, 6).unwrap();
        assert_eq!((lo, hi), (-20, -10));
    }

    #[test]
    fn test_bin_offsets_range() {
        let range = PriceRange::bin_offsets(-3, 3).unwrap();
        let (lo, hi) = resolve_bin_range(&range, &state(100, 10), 9, 6).unwrap();
        assert_eq!((lo, hi), (97, 103));
        let too_wide = PriceRange::bin_offsets(-50, 50).unwrap();
        assert!(resolve_bin_range(&too_wide, &state(0, 10), 9, 6).is_err());
    }

    #[test]
    fn test_liquidity_estimate_in_range() {
        let l = liquidity_for_amounts(0, -60, 60, 1_000_000, 1_000_000);
        assert!(l > 0);
        assert_eq!(liquidity_for_amounts(0, -60, 60, 0, 0), 0);
    }

    #[test]
    fn test_sqrt_price_x96_rejects_overflow() {
        let one = U256::one() << 96;
        assert_eq!(sqrt_price_x96_to_price(one, 18, 18).unwrap(), dec!(1));
        assert!(matches!(
            sqrt_price_x96_to_price(U256::MAX, 18, 18),
            Err(AdapterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bin_liquidity() {
        assert_eq!(bin_liquidity(0, 10, 1_000, 500), 1_500);
        assert_eq!(bin_liquidity(100, 10, 0, 42), 42);
        // 1.001^-693 is about one half.
        let l = bin_liquidity(-693, 10, 1_000_000, 0);
        assert!((499_000..=501_000).contains(&l), "{l}");
    }
}
