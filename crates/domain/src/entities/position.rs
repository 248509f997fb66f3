use crate::entities::pool::PoolId;
use crate::enums::PositionStatus;
use crate::error::DomainError;
use crate::value_objects::price_range::PriceRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local identifier of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub Uuid);

impl PositionId {
    /// Fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Liquidity position. References its pool by id only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Local id.
    pub id: PositionId,
    /// Chain-native handle: NFT mint, position account or token id.
    pub chain_position_id: String,
    /// Owning wallet address.
    pub owner: String,
    /// Pool this position belongs to.
    pub pool: PoolId,
    /// Current liquidity in protocol units.
    pub liquidity: u128,
    /// Range requested at open time.
    pub range: PriceRange,
    /// Resolved lower tick or bin id.
    pub lower_index: i32,
    /// Resolved upper tick or bin id.
    pub upper_index: i32,
    /// Lifecycle state.
    status: PositionStatus,
    /// Time the position was opened.
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Creates an open position.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        chain_position_id: impl Into<String>,
        owner: impl Into<String>,
        pool: PoolId,
        liquidity: u128,
        range: PriceRange,
        lower_index: i32,
        upper_index: i32,
    ) -> Self {
        Self {
            id: PositionId::new(),
            chain_position_id: chain_position_id.into(),
            owner: owner.into(),
            pool,
            liquidity,
            range,
            lower_index,
            upper_index,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
        }
    }

    /// Lifecycle state.
    #[must_use]
    pub fn status(&self) -> PositionStatus {
        self.status
    }

    /// Returns true unless the position is closed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != PositionStatus::Closed
    }

    /// Applies a lifecycle transition.
    pub fn transition(&mut self, next: PositionStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Liquidity corresponding to `percent` of the current amount.
    #[must_use]
    pub fn liquidity_share(&self, percent: u8) -> u128 {
        let percent = percent.min(100) as u128;
        // Split to avoid overflowing on large u128 liquidity values.
        (self.liquidity / 100) * percent + (self.liquidity % 100) * percent / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;

    fn position() -> Position {
        Position::open(
            "mint",
            "owner",
            PoolId::new(Chain::Solana, "pool"),
            1_000,
            PriceRange::OneTick,
            -10,
            10,
        )
    }

    #[test]
    fn test_transitions() {
        let mut p = position();
        p.transition(PositionStatus::PartiallyClosed).unwrap();
        assert!(p.transition(PositionStatus::Open).is_err());
        p.transition(PositionStatus::Closed).unwrap();
        assert!(!p.is_active());
    }

    #[test]
    fn test_liquidity_share() {
        let p = position();
        assert_eq!(p.liquidity_share(50), 500);
        assert_eq!(p.liquidity_share(100), 1_000);
        let mut big = position();
        big.liquidity = u128::MAX;
        assert_eq!(big.liquidity_share(100), u128::MAX);
    }
}
