//! Nonfungible position manager adapter (Uniswap V3 and PancakeSwap V3).
//!
//! Positions are ERC-721 tokens. Closing cannot be done in one call, so the
//! close plan is three steps: decrease all liquidity, collect owed tokens,
//! burn the NFT. Only the burn is terminal.

use crate::adapter::ChainAdapter;
use crate::error::AdapterError;
use crate::evm::{approve_calldata, decode_error, from_alloy, parse_address, to_alloy};
use crate::math;
use crate::plan::{ContractCall, OperationPlan, Primitive};
use crate::request::{
    AddLiquidityRequest, ChainContext, OpenPositionRequest, PositionRequest,
    RemoveLiquidityRequest,
};
use crate::rpc::evm::{EvmRpc, TxLog};
use crate::state::PoolStateReader;
use alloy::primitives::aliases::{I24, U24};
use alloy::primitives::{Address, U256 as AlloyU256};
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use primitive_types::U256;
use std::sync::Arc;
use tracing::{debug, info};
use xdex_domain::chain::Chain;
use xdex_domain::entities::{Pool, PoolState, Position, Token};
use xdex_domain::enums::{OperationKind, Protocol, StepKind};

/// Uniswap V3 NonfungiblePositionManager on Ethereum.
pub const UNISWAP_V3_POSITION_MANAGER: &str = "0xC36442b4a4522E871399CD717aBDD847Ab11FE88";

/// PancakeSwap V3 NonfungiblePositionManager on BSC.
pub const PANCAKESWAP_V3_POSITION_MANAGER: &str = "0x46A15B0b27311cedF172AB29E4f4766fbE7F4364";

alloy::sol! {
    interface INonfungiblePositionManager {
        struct MintParams {
            address token0;
            address token1;
            uint24 fee;
            int24 tickLower;
            int24 tickUpper;
            uint256 amount0Desired;
            uint256 amount1Desired;
            uint256 amount0Min;
            uint256 amount1Min;
            address recipient;
            uint256 deadline;
        }

        struct IncreaseLiquidityParams {
            uint256 tokenId;
            uint256 amount0Desired;
            uint256 amount1Desired;
            uint256 amount0Min;
            uint256 amount1Min;
            uint256 deadline;
        }

        struct DecreaseLiquidityParams {
            uint256 tokenId;
            uint128 liquidity;
            uint256 amount0Min;
            uint256 amount1Min;
            uint256 deadline;
        }

        struct CollectParams {
            uint256 tokenId;
            address recipient;
            uint128 amount0Max;
            uint128 amount1Max;
        }

        function mint(MintParams calldata params) external payable
            returns (uint256 tokenId, uint128 liquidity, uint256 amount0, uint256 amount1);
        function increaseLiquidity(IncreaseLiquidityParams calldata params) external payable
            returns (uint128 liquidity, uint256 amount0, uint256 amount1);
        function decreaseLiquidity(DecreaseLiquidityParams calldata params) external payable
            returns (uint256 amount0, uint256 amount1);
        function collect(CollectParams calldata params) external payable
            returns (uint256 amount0, uint256 amount1);
        function burn(uint256 tokenId) external payable;
        function positions(uint256 tokenId) external view returns (
            uint96 nonce,
            address operator,
            address token0,
            address token1,
            uint24 fee,
            int24 tickLower,
            int24 tickUpper,
            uint128 liquidity,
            uint256 feeGrowthInside0LastX128,
            uint256 feeGrowthInside1LastX128,
            uint128 tokensOwed0,
            uint128 tokensOwed1
        );

        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }

    // PancakeSwap V3 widens feeProtocol to uint32; a uint8 value decodes the same.
    interface IV3Pool {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint32 feeProtocol,
            bool unlocked
        );
        function tickSpacing() external view returns (int24 spacing);
        function liquidity() external view returns (uint128 active);
    }
}

use INonfungiblePositionManager::{
    CollectParams, DecreaseLiquidityParams, IncreaseLiquidityParams, MintParams,
};

const MINT_GAS: u64 = 600_000;
const APPROVE_GAS: u64 = 60_000;

const CAPABILITIES: &[OperationKind] = &[
    OperationKind::OpenPosition,
    OperationKind::AddLiquidity,
    OperationKind::RemoveLiquidity,
    OperationKind::ClaimFees,
    OperationKind::ClosePosition,
];

/// Adapter for one position-manager deployment.
pub struct PositionManagerAdapter {
    protocol: Protocol,
    chains: [Chain; 1],
    manager: String,
    reader: Arc<dyn PoolStateReader>,
}

impl PositionManagerAdapter {
    /// Uniswap V3 on Ethereum.
    pub fn uniswap(rpc: Arc<EvmRpc>) -> Self {
        Self::with_reader(
            Protocol::UniswapV3,
            Chain::Ethereum,
            UNISWAP_V3_POSITION_MANAGER,
            Arc::new(EvmPoolReader::new(rpc, UNISWAP_V3_POSITION_MANAGER)),
        )
    }

    /// PancakeSwap V3 on BSC.
    pub fn pancakeswap(rpc: Arc<EvmRpc>) -> Self {
        Self::with_reader(
            Protocol::PancakeswapV3,
            Chain::Bsc,
            PANCAKESWAP_V3_POSITION_MANAGER,
            Arc::new(EvmPoolReader::new(rpc, PANCAKESWAP_V3_POSITION_MANAGER)),
        )
    }

    /// Adapter for an arbitrary deployment and state reader.
    pub fn with_reader(
        protocol: Protocol,
        chain: Chain,
        manager: impl Into<String>,
        reader: Arc<dyn PoolStateReader>,
    ) -> Self {
        Self {
            protocol,
            chains: [chain],
            manager: manager.into(),
            reader,
        }
    }

    /// Position manager address.
    #[must_use]
    pub fn manager(&self) -> &str {
        &self.manager
    }

    fn call(&self, data: Vec<u8>) -> Primitive {
        Primitive::ContractCall(ContractCall::new(self.manager.clone(), data))
    }

    fn approvals(&self, deposits: [(&Token, U256); 2]) -> Result<Vec<Primitive>, AdapterError> {
        let mut calls = Vec::new();
        for (token, amount) in deposits {
            if amount.is_zero() {
                continue;
            }
            if token.is_native() {
                return Err(AdapterError::InvalidInput(format!(
                    "{} must be wrapped before it can be deposited",
                    token.symbol
                )));
            }
            calls.push(Primitive::ContractCall(
                ContractCall::new(token.address.clone(), approve_calldata(&self.manager, amount)?)
                    .with_gas_limit(APPROVE_GAS),
            ));
        }
        Ok(calls)
    }

    fn decrease_call(&self, token_id: AlloyU256, liquidity: u128, deadline: u64) -> Primitive {
        let params = DecreaseLiquidityParams {
            tokenId: token_id,
            liquidity,
            amount0Min: AlloyU256::ZERO,
            amount1Min: AlloyU256::ZERO,
            deadline: AlloyU256::from(deadline),
        };
        self.call(INonfungiblePositionManager::decreaseLiquidityCall { params }.abi_encode())
    }

    fn collect_call(
        &self,
        token_id: AlloyU256,
        recipient: &str,
    ) -> Result<Primitive, AdapterError> {
        let params = CollectParams {
            tokenId: token_id,
            recipient: parse_address(recipient)?,
            amount0Max: u128::MAX,
            amount1Max: u128::MAX,
        };
        Ok(self.call(INonfungiblePositionManager::collectCall { params }.abi_encode()))
    }

    fn burn_call(&self, token_id: AlloyU256) -> Primitive {
        self.call(INonfungiblePositionManager::burnCall { tokenId: token_id }.abi_encode())
    }

    async fn current_liquidity(
        &self,
        pool: &Pool,
        position: &Position,
    ) -> Result<u128, AdapterError> {
        Ok(self
            .reader
            .position_liquidity(pool, position)
            .await?
            .unwrap_or(position.liquidity))
    }
}

fn token_id(position: &Position) -> Result<AlloyU256, AdapterError> {
    AlloyU256::from_str_radix(&position.chain_position_id, 10).map_err(|_| {
        AdapterError::PositionNotFound(format!(
            "{} is not a position token id",
            position.chain_position_id
        ))
    })
}

fn to_u128(amount: U256, what: &str) -> Result<u128, AdapterError> {
    u128::try_from(amount).map_err(|_| AdapterError::InvalidInput(format!("{what} exceeds u128")))
}

fn int24(tick: i32) -> Result<I24, AdapterError> {
    I24::try_from(tick)
        .map_err(|_| AdapterError::InvalidRange(format!("tick {tick} exceeds int24")))
}

/// Liquidity the deposit adds at the current tick.
fn deposit_liquidity(
    state: &PoolState,
    tick_lower: i32,
    tick_upper: i32,
    amount0: U256,
    amount1: U256,
) -> Result<u128, AdapterError> {
    Ok(math::liquidity_for_amounts(
        state.current_index,
        tick_lower,
        tick_upper,
        to_u128(amount0, "amount0")?,
        to_u128(amount1, "amount1")?,
    ))
}

#[async_trait]
impl ChainAdapter for PositionManagerAdapter {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn chains(&self) -> &[Chain] {
        &self.chains
    }

    fn capabilities(&self) -> &[OperationKind] {
        CAPABILITIES
    }

    async fn build_open_position(
        &self,
        request: &OpenPositionRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let pool = &request.pool;
        if request.amount0_raw.is_zero() && request.amount1_raw.is_zero() {
            return Err(AdapterError::InvalidInput("both deposit amounts are zero".into()));
        }
        let state = self.reader.pool_state(pool).await?;
        let (tick_lower, tick_upper) = math::resolve_tick_range(
            &request.range,
            &state,
            pool.token0.decimals,
            pool.token1.decimals,
        )?;
        info!(
            protocol = %self.protocol,
            pool = %pool.address,
            tick_lower,
            tick_upper,
            range = %request.range,
            "Building open position"
        );

        let mut primitives = self.approvals([
            (&pool.token0, request.amount0_raw),
            (&pool.token1, request.amount1_raw),
        ])?;
        let liquidity = deposit_liquidity(
            &state,
            tick_lower,
            tick_upper,
            request.amount0_raw,
            request.amount1_raw,
        )?;
        let params = MintParams {
            token0: parse_address(&pool.token0.address)?,
            token1: parse_address(&pool.token1.address)?,
            fee: U24::try_from(pool.fee_tier).map_err(|_| {
                AdapterError::InvalidInput(format!("fee tier {} exceeds uint24", pool.fee_tier))
            })?,
            tickLower: int24(tick_lower)?,
            tickUpper: int24(tick_upper)?,
            amount0Desired: to_alloy(request.amount0_raw),
            amount1Desired: to_alloy(request.amount1_raw),
            amount0Min: AlloyU256::ZERO,
            amount1Min: AlloyU256::ZERO,
            recipient: parse_address(&ctx.owner)?,
            deadline: AlloyU256::from(ctx.deadline),
        };
        let mint = INonfungiblePositionManager::mintCall { params }.abi_encode();
        primitives.push(Primitive::ContractCall(
            ContractCall::new(self.manager.clone(), mint).with_gas_limit(MINT_GAS),
        ));

        let mut plan = OperationPlan::single(
            OperationKind::OpenPosition,
            ctx.chain,
            StepKind::OpenPosition,
            primitives,
        );
        plan.resolved_range = Some((tick_lower, tick_upper));
        plan.liquidity_delta = Some(liquidity);
        Ok(plan)
    }

    async fn build_add_liquidity(
        &self,
        request: &AddLiquidityRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let token_id = token_id(&request.position)?;
        if request.amount0_raw.is_zero() && request.amount1_raw.is_zero() {
            return Err(AdapterError::InvalidInput("both deposit amounts are zero".into()));
        }
        let pool = &request.pool;
        let state = self.reader.pool_state(pool).await?;
        let liquidity = deposit_liquidity(
            &state,
            request.position.lower_index,
            request.position.upper_index,
            request.amount0_raw,
            request.amount1_raw,
        )?;
        let mut primitives = self.approvals([
            (&pool.token0, request.amount0_raw),
            (&pool.token1, request.amount1_raw),
        ])?;
        let params = IncreaseLiquidityParams {
            tokenId: token_id,
            amount0Desired: to_alloy(request.amount0_raw),
            amount1Desired: to_alloy(request.amount1_raw),
            amount0Min: AlloyU256::ZERO,
            amount1Min: AlloyU256::ZERO,
            deadline: AlloyU256::from(ctx.deadline),
        };
        primitives.push(
            self.call(INonfungiblePositionManager::increaseLiquidityCall { params }.abi_encode()),
        );
        debug!(token_id = %token_id, liquidity, "Building increase liquidity");

        let mut plan = OperationPlan::single(
            OperationKind::AddLiquidity,
            ctx.chain,
            StepKind::AddLiquidity,
            primitives,
        )
        .with_position_ref(request.position.chain_position_id.clone());
        plan.liquidity_delta = Some(liquidity);
        Ok(plan)
    }

    async fn build_remove_liquidity(
        &self,
        request: &RemoveLiquidityRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        if request.percent == 0 || request.percent > 100 {
            return Err(AdapterError::InvalidInput(format!(
                "percent must be in 1..=100, got {}",
                request.percent
            )));
        }
        let token_id = token_id(&request.position)?;
        let mut position = request.position.clone();
        position.liquidity = self.current_liquidity(&request.pool, &request.position).await?;
        let liquidity = position.liquidity_share(request.percent);
        if liquidity == 0 {
            return Err(AdapterError::InvalidInput("position has no liquidity to remove".into()));
        }
        debug!(token_id = %token_id, liquidity, "Building decrease liquidity");

        // Decreased amounts are only owed until collected.
        let primitives = vec![
            self.decrease_call(token_id, liquidity, ctx.deadline),
            self.collect_call(token_id, &ctx.owner)?,
        ];
        let mut plan = OperationPlan::single(
            OperationKind::RemoveLiquidity,
            ctx.chain,
            StepKind::RemoveLiquidity,
            primitives,
        )
        .with_position_ref(request.position.chain_position_id.clone());
        plan.liquidity_delta = Some(liquidity);
        Ok(plan)
    }

    async fn build_claim_fees(
        &self,
        request: &PositionRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let token_id = token_id(&request.position)?;
        Ok(OperationPlan::single(
            OperationKind::ClaimFees,
            ctx.chain,
            StepKind::ClaimFees,
            vec![self.collect_call(token_id, &ctx.owner)?],
        )
        .with_position_ref(request.position.chain_position_id.clone()))
    }

    async fn build_close_position(
        &self,
        request: &PositionRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let token_id = token_id(&request.position)?;
        let liquidity = self.current_liquidity(&request.pool, &request.position).await?;
        info!(
            protocol = %self.protocol,
            token_id = %token_id,
            liquidity,
            "Building close position"
        );

        let mut plan = OperationPlan::new(OperationKind::ClosePosition, ctx.chain)
            .with_position_ref(request.position.chain_position_id.clone());
        // decreaseLiquidity reverts on zero liquidity.
        if liquidity > 0 {
            plan.push(
                StepKind::RemoveLiquidity,
                false,
                vec![self.decrease_call(token_id, liquidity, ctx.deadline)],
            );
        }
        plan.push(
            StepKind::ClaimFees,
            false,
            vec![self.collect_call(token_id, &ctx.owner)?],
        );
        plan.push(StepKind::ClosePosition, true, vec![self.burn_call(token_id)]);
        plan.liquidity_delta = Some(liquidity);
        Ok(plan)
    }

    fn position_id_from_logs(&self, logs: &[TxLog]) -> Option<String> {
        let manager = parse_address(&self.manager).ok()?;
        logs.iter()
            .filter(|log| log.inner.address == manager)
            .filter_map(|log| {
                INonfungiblePositionManager::Transfer::decode_log_data(&log.inner.data, true).ok()
            })
            .find(|transfer| transfer.from == Address::ZERO)
            .map(|transfer| transfer.tokenId.to_string())
    }
}

/// Reads V3 pool state and position liquidity through the node.
pub struct EvmPoolReader {
    rpc: Arc<EvmRpc>,
    manager: String,
}

impl EvmPoolReader {
    /// Creates a reader for pools served by `manager`.
    pub fn new(rpc: Arc<EvmRpc>, manager: impl Into<String>) -> Self {
        Self {
            rpc,
            manager: manager.into(),
        }
    }
}

#[async_trait]
impl PoolStateReader for EvmPoolReader {
    async fn pool_state(&self, pool: &Pool) -> Result<PoolState, AdapterError> {
        let data = self
            .rpc
            .call(&pool.address, IV3Pool::slot0Call {}.abi_encode())
            .await
            .map_err(|e| AdapterError::PoolUnavailable(format!("{}: {e}", pool.address)))?;
        let slot0 = IV3Pool::slot0Call::abi_decode_returns(&data, true)
            .map_err(|e| decode_error("slot0", e))?;
        let sqrt_price = from_alloy(AlloyU256::from(slot0.sqrtPriceX96));
        let tick = i32::try_from(slot0.tick)
            .map_err(|_| AdapterError::Decode("slot0 tick out of range".into()))?;
        let spacing = match pool.tick_spacing {
            Some(spacing) => spacing,
            None => {
                let data = self
                    .rpc
                    .call(&pool.address, IV3Pool::tickSpacingCall {}.abi_encode())
                    .await?;
                let spacing = IV3Pool::tickSpacingCall::abi_decode_returns(&data, true)
                    .map_err(|e| decode_error("tickSpacing", e))?
                    .spacing;
                i32::try_from(spacing)
                    .ok()
                    .and_then(|s| u16::try_from(s).ok())
                    .ok_or_else(|| AdapterError::Decode("tick spacing out of range".into()))?
            }
        };
        let data = self
            .rpc
            .call(&pool.address, IV3Pool::liquidityCall {}.abi_encode())
            .await?;
        let liquidity = IV3Pool::liquidityCall::abi_decode_returns(&data, true)
            .map_err(|e| decode_error("liquidity", e))?
            .active;

        Ok(PoolState {
            current_price: math::sqrt_price_x96_to_price(
                sqrt_price,
                pool.token0.decimals,
                pool.token1.decimals,
            )?,
            current_index: tick,
            spacing,
            liquidity,
            sqrt_price: Some(sqrt_price),
            vault0: None,
            vault1: None,
        })
    }

    async fn position_liquidity(
        &self,
        _pool: &Pool,
        position: &Position,
    ) -> Result<Option<u128>, AdapterError> {
        let call = INonfungiblePositionManager::positionsCall {
            tokenId: token_id(position)?,
        };
        let result = self
            .rpc
            .call(&self.manager, call.abi_encode())
            .await
            .map_err(|e| {
                AdapterError::PositionNotFound(format!("{}: {e}", position.chain_position_id))
            })?;
        let decoded = INonfungiblePositionManager::positionsCall::abi_decode_returns(&result, true)
            .map_err(|e| decode_error("positions", e))?;
        Ok(Some(decoded.liquidity))
    }
}
