//! Pool state readers.

use crate::error::AdapterError;
use async_trait::async_trait;
use xdex_domain::entities::{Pool, PoolState, Position};

/// Reads live pool and position state needed to size operations.
#[async_trait]
pub trait PoolStateReader: Send + Sync {
    /// Current pool state.
    async fn pool_state(&self, pool: &Pool) -> Result<PoolState, AdapterError>;

    /// On-chain liquidity of a position, when the protocol exposes it.
    async fn position_liquidity(
        &self,
        _pool: &Pool,
        _position: &Position,
    ) -> Result<Option<u128>, AdapterError> {
        Ok(None)
    }
}

/// Reads a little-endian integer at `offset`, failing on short data.
pub(crate) fn read_bytes<const N: usize>(
    data: &[u8],
    offset: usize,
) -> Result<[u8; N], AdapterError> {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            AdapterError::Decode(format!(
                "account data too short: need {} bytes, have {}",
                offset + N,
                data.len()
            ))
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use rust_decimal::Decimal;

    /// Reader returning a fixed state.
    pub struct FixedStateReader {
        pub state: PoolState,
        pub position_liquidity: Option<u128>,
    }

    impl FixedStateReader {
        pub fn new(price: Decimal, index: i32, spacing: u16) -> Self {
            Self {
                state: PoolState {
                    current_price: price,
                    current_index: index,
                    spacing,
                    liquidity: 1_000_000,
                    sqrt_price: None,
                    vault0: None,
                    vault1: None,
                },
                position_liquidity: None,
            }
        }
    }

    #[async_trait]
    impl PoolStateReader for FixedStateReader {
        async fn pool_state(&self, _pool: &Pool) -> Result<PoolState, AdapterError> {
            Ok(self.state.clone())
        }

        async fn position_liquidity(
            &self,
            _pool: &Pool,
            _position: &Position,
        ) -> Result<Option<u128>, AdapterError> {
            Ok(self.position_liquidity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bytes() {
        let data = [1u8, 0, 0, 0, 2];
        assert_eq!(u32::from_le_bytes(read_bytes(&data, 0).unwrap()), 1);
        assert!(read_bytes::<4>(&data, 2).is_err());
    }
}
