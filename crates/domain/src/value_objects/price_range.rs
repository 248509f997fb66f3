//! Price ranges for liquidity positions.
//!
//! A range is either absolute, relative to the current price (percent or
//! basis points), or expressed in protocol units (ticks / bins). Protocol
//! units are resolved by the adapter that knows the pool's tick spacing or
//! bin step.

use crate::error::DomainError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated pair of bounds. Only the [`PriceRange`] constructors build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds<T> {
    lower: T,
    upper: T,
}

impl<T: Copy> Bounds<T> {
    /// Lower bound.
    #[must_use]
    pub fn lower(&self) -> T {
        self.lower
    }

    /// Upper bound.
    #[must_use]
    pub fn upper(&self) -> T {
        self.upper
    }

    /// Both bounds as `(lower, upper)`.
    #[must_use]
    pub fn pair(&self) -> (T, T) {
        (self.lower, self.upper)
    }
}

/// Requested price range for a new position.
///
/// Bounds are checked on construction and on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "RangeRepr")]
pub enum PriceRange {
    /// Absolute prices in quote per base.
    Absolute(Bounds<Decimal>),
    /// Signed fractions around the current price (-0.01 = 1% below).
    Percent(Bounds<Decimal>),
    /// Signed basis points around the current price.
    Bps(Bounds<i32>),
    /// Narrowest unit the protocol supports around the current price.
    OneTick,
    /// Explicit tick indices (CLMM) or bin ids (DLMM), lower inclusive.
    Ticks(Bounds<i32>),
    /// Bin offsets from the active bin (DLMM).
    BinOffsets(Bounds<i32>),
}

/// Serialized shape of [`PriceRange`].
#[derive(Clone, Copy, Serialize, Deserialize)]
enum RangeRepr {
    Absolute { lower: Decimal, upper: Decimal },
    Percent { lower: Decimal, upper: Decimal },
    Bps { lower: i32, upper: i32 },
    OneTick,
    Ticks { lower: i32, upper: i32 },
    BinOffsets { lower: i32, upper: i32 },
}

impl TryFrom<RangeRepr> for PriceRange {
    type Error = DomainError;

    fn try_from(repr: RangeRepr) -> Result<Self, Self::Error> {
        match repr {
            RangeRepr::Absolute { lower, upper } => Self::absolute(lower, upper),
            RangeRepr::Percent { lower, upper } => Self::percent(lower, upper),
            RangeRepr::Bps { lower, upper } => Self::bps(lower, upper),
            RangeRepr::OneTick => Ok(Self::OneTick),
            RangeRepr::Ticks { lower, upper } => Self::ticks(lower, upper),
            RangeRepr::BinOffsets { lower, upper } => Self::bin_offsets(lower, upper),
        }
    }
}

impl From<PriceRange> for RangeRepr {
    fn from(range: PriceRange) -> Self {
        match range {
            PriceRange::Absolute(Bounds { lower, upper }) => Self::Absolute { lower, upper },
            PriceRange::Percent(Bounds { lower, upper }) => Self::Percent { lower, upper },
            PriceRange::Bps(Bounds { lower, upper }) => Self::Bps { lower, upper },
            PriceRange::OneTick => Self::OneTick,
            PriceRange::Ticks(Bounds { lower, upper }) => Self::Ticks { lower, upper },
            PriceRange::BinOffsets(Bounds { lower, upper }) => Self::BinOffsets { lower, upper },
        }
    }
}

impl PriceRange {
    /// Absolute range; fails unless `0 < lower < upper`.
    pub fn absolute(lower: Decimal, upper: Decimal) -> Result<Self, DomainError> {
        if lower <= Decimal::ZERO {
            return Err(DomainError::InvalidRange(format!(
                "lower price must be positive, got {lower}"
            )));
        }
        if lower >= upper {
            return Err(DomainError::InvalidRange(format!(
                "lower {lower} must be below upper {upper}"
            )));
        }
        Ok(Self::Absolute(Bounds { lower, upper }))
    }

    /// Asymmetric percent range, e.g. `percent(-0.005, 0.015)`.
    pub fn percent(lower: Decimal, upper: Decimal) -> Result<Self, DomainError> {
        if lower <= -Decimal::ONE {
            return Err(DomainError::InvalidRange(format!(
                "lower offset {lower} would produce a non-positive price"
            )));
        }
        if lower >= upper {
            return Err(DomainError::InvalidRange(format!(
                "lower offset {lower} must be below upper offset {upper}"
            )));
        }
        Ok(Self::Percent(Bounds { lower, upper }))
    }

    /// Symmetric percent range around the current price.
    pub fn percent_symmetric(pct: Decimal) -> Result<Self, DomainError> {
        Self::percent(-pct, pct)
    }

    /// Asymmetric basis point range.
    pub fn bps(lower: i32, upper: i32) -> Result<Self, DomainError> {
        if lower <= -10_000 {
            return Err(DomainError::InvalidRange(format!(
                "lower offset {lower} bps would produce a non-positive price"
            )));
        }
        if lower >= upper {
            return Err(DomainError::InvalidRange(format!(
                "lower offset {lower} must be below upper offset {upper}"
            )));
        }
        Ok(Self::Bps(Bounds { lower, upper }))
    }

    /// Explicit tick or bin indices.
    pub fn ticks(lower: i32, upper: i32) -> Result<Self, DomainError> {
        if lower >= upper {
            return Err(DomainError::InvalidRange(format!(
                "lower tick {lower} must be below upper tick {upper}"
            )));
        }
        Ok(Self::Ticks(Bounds { lower, upper }))
    }

    /// Bin offsets around the active bin. Both may be equal for a one-bin range.
    pub fn bin_offsets(lower: i32, upper: i32) -> Result<Self, DomainError> {
        if lower > upper {
            return Err(DomainError::InvalidRange(format!(
                "lower offset {lower} must not exceed upper offset {upper}"
            )));
        }
        Ok(Self::BinOffsets(Bounds { lower, upper }))
    }

    /// Returns true if the range is defined relative to the current price.
    #[must_use]
    pub fn is_relative(&self) -> bool {
        matches!(
            self,
            Self::Percent(_) | Self::Bps(_) | Self::OneTick | Self::BinOffsets(_)
        )
    }

    /// Returns true if the range needs a pool's tick spacing or bin step.
    #[must_use]
    pub fn needs_protocol_context(&self) -> bool {
        matches!(
            self,
            Self::OneTick | Self::Ticks(_) | Self::BinOffsets(_)
        )
    }

    /// Normalizes price-based modes to absolute prices.
    pub fn to_absolute(&self, current_price: Decimal) -> Result<AbsoluteRange, DomainError> {
        let (lower, upper) = match *self {
            Self::Absolute(Bounds { lower, upper }) => (lower, upper),
            Self::Percent(Bounds { lower, upper }) => {
                Self::require_positive(current_price)?;
                (
                    current_price * (Decimal::ONE + lower),
                    current_price * (Decimal::ONE + upper),
                )
            }
            Self::Bps(Bounds { lower, upper }) => {
                Self::require_positive(current_price)?;
                let scale = Decimal::from(10_000);
                (
                    current_price * (Decimal::ONE + Decimal::from(lower) / scale),
                    current_price * (Decimal::ONE + Decimal::from(upper) / scale),
                )
            }
            Self::OneTick | Self::Ticks(_) | Self::BinOffsets(_) => {
                return Err(DomainError::InvalidRange(format!(
                    "{self} cannot be converted without protocol context"
                )));
            }
        };
        AbsoluteRange::new(lower, upper)
    }

    fn require_positive(current_price: Decimal) -> Result<(), DomainError> {
        if current_price <= Decimal::ZERO {
            return Err(DomainError::InvalidRange(format!(
                "current price must be positive, got {current_price}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(b) => write!(f, "Absolute({}, {})", b.lower, b.upper),
            Self::Percent(b) => write!(
                f,
                "Percent({}%, {}%)",
                b.lower * Decimal::ONE_HUNDRED,
                b.upper * Decimal::ONE_HUNDRED
            ),
            Self::Bps(b) => write!(f, "Bps({}, {})", b.lower, b.upper),
            Self::OneTick => f.write_str("OneTick"),
            Self::Ticks(b) => write!(f, "Ticks({}, {})", b.lower, b.upper),
            Self::BinOffsets(b) => write!(f, "BinOffsets({}, {})", b.lower, b.upper),
        }
    }
}

/// Range normalized to absolute prices, always `0 < lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsoluteRange {
    lower: Decimal,
    upper: Decimal,
}

impl AbsoluteRange {
    /// Validates and builds an absolute range.
    pub fn new(lower: Decimal, upper: Decimal) -> Result<Self, DomainError> {
        if lower <= Decimal::ZERO || lower >= upper {
            return Err(DomainError::InvalidRange(format!(
                "normalized range [{lower}, {upper}] is not increasing"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Lower price.
    #[must_use]
    pub fn lower(&self) -> Decimal {
        self.lower
    }

    /// Upper price.
    #[must_use]
    pub fn upper(&self) -> Decimal {
        self.upper
    }

    /// Returns true if the price lies within the range.
    #[must_use]
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.lower && price <= self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_absolute_requires_increasing_bounds() {
        assert!(PriceRange::absolute(dec!(95), dec!(105)).is_ok());
        assert!(matches!(
            PriceRange::absolute(dec!(105), dec!(95)),
            Err(DomainError::InvalidRange(_))
        ));
        assert!(PriceRange::absolute(dec!(100), dec!(100)).is_err());
    }

    #[test]
    fn test_absolute_is_stored_increasing() {
        let range = PriceRange::absolute(dec!(1.5), dec!(2)).unwrap();
        let abs = range.to_absolute(dec!(0)).unwrap();
        assert!(abs.lower() < abs.upper());
    }

    #[test]
    fn test_percent_to_absolute() {
        let range = PriceRange::percent_symmetric(dec!(0.01)).unwrap();
        let abs = range.to_absolute(dec!(100)).unwrap();
        assert_eq!(abs.lower(), dec!(99));
        assert_eq!(abs.upper(), dec!(101));
        assert!(abs.contains(dec!(100)));
    }

    #[test]
    fn test_bps_to_absolute() {
        let range = PriceRange::bps(-50, 150).unwrap();
        let abs = range.to_absolute(dec!(200)).unwrap();
        assert_eq!(abs.lower(), dec!(199));
        assert_eq!(abs.upper(), dec!(203));
    }

    #[test]
    fn test_relative_needs_positive_price() {
        let range = PriceRange::bps(-100, 100).unwrap();
        assert!(range.to_absolute(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_tick_modes_need_context() {
        assert!(PriceRange::OneTick.to_absolute(dec!(10)).is_err());
        assert!(PriceRange::ticks(-10, 10).unwrap().needs_protocol_context());
        assert!(PriceRange::ticks(10, -10).is_err());
    }

    #[test]
    fn test_deserialize_validates_bounds() {
        let range: PriceRange =
            serde_json::from_str(r#"{"Ticks":{"lower":-10,"upper":10}}"#).unwrap();
        assert_eq!(range, PriceRange::ticks(-10, 10).unwrap());
        assert_eq!(
            serde_json::to_string(&range).unwrap(),
            r#"{"Ticks":{"lower":-10,"upper":10}}"#
        );

        let inverted = r#"{"Ticks":{"lower":10,"upper":-10}}"#;
        assert!(serde_json::from_str::<PriceRange>(inverted).is_err());
        assert!(
            serde_json::from_str::<PriceRange>(r#"{"Absolute":{"lower":"0","upper":"5"}}"#)
                .is_err()
        );
        let one: PriceRange = serde_json::from_str(r#""OneTick""#).unwrap();
        assert_eq!(one, PriceRange::OneTick);
    }
}
