pub mod pool;
pub mod position;
pub mod token;

// Re-export for easier access
pub use pool::{Pool, PoolId, PoolState};
pub use position::{Position, PositionId};
pub use token::Token;
