use crate::error::DomainError;
use primitive_types::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Raw token amount with its decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount {
    /// Amount in the token's smallest unit.
    pub raw: U256,
    /// Decimal precision.
    pub decimals: u8,
}

impl Amount {
    /// Creates a new amount from raw units.
    #[must_use]
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Converts a UI amount to raw units, truncating extra precision.
    pub fn from_decimal(d: Decimal, decimals: u8) -> Result<Self, DomainError> {
        if d.is_sign_negative() && !d.is_zero() {
            return Err(DomainError::InvalidAmount(format!("negative amount {d}")));
        }
        let multiplier = Self::scale(decimals)?;
        let raw_decimal = d
            .checked_mul(multiplier)
            .ok_or_else(|| DomainError::InvalidAmount(format!("{d} overflows")))?
            .trunc();
        let raw_u128 = raw_decimal
            .to_u128()
            .ok_or_else(|| DomainError::InvalidAmount(format!("{d} overflows")))?;
        Ok(Self {
            raw: U256::from(raw_u128),
            decimals,
        })
    }

    /// Converts raw units back to a UI amount.
    pub fn to_decimal(&self) -> Result<Decimal, DomainError> {
        let too_large =
            || DomainError::InvalidAmount(format!("{} does not fit in a decimal", self.raw));
        if self.raw > U256::from(i128::MAX as u128) {
            return Err(too_large());
        }
        let d = Decimal::try_from_i128_with_scale(self.raw.as_u128() as i128, 0)
            .map_err(|_| too_large())?;
        Ok(d / Self::scale(self.decimals)?)
    }

    /// Returns true for a zero amount.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    fn scale(decimals: u8) -> Result<Decimal, DomainError> {
        10u64
            .checked_pow(decimals as u32)
            .map(Decimal::from)
            .or_else(|| {
                // 10^19 and above only fit through i128.
                10i128.checked_pow(decimals as u32).and_then(|v| {
                    Decimal::try_from_i128_with_scale(v, 0).ok()
                })
            })
            .ok_or_else(|| DomainError::InvalidAmount(format!("unsupported decimals {decimals}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_decimal_truncates() {
        let a = Amount::from_decimal(dec!(0.1234567), 6).unwrap();
        assert_eq!(a.raw, U256::from(123_456u64));
    }

    #[test]
    fn test_eighteen_decimals() {
        let a = Amount::from_decimal(dec!(1.5), 18).unwrap();
        assert_eq!(a.raw, U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(a.to_decimal().unwrap(), dec!(1.5));
    }

    #[test]
    fn test_rejects_negative() {
        assert!(Amount::from_decimal(dec!(-0.5), 9).is_err());
    }
}
