//! Raydium concentrated liquidity adapter.
//!
//! Positions are Token-2022 NFTs. Every operation fits in one transaction,
//! including close (decrease all liquidity, then burn the NFT), so all plans
//! are single-step.

use crate::adapter::ChainAdapter;
use crate::error::AdapterError;
use crate::math;
use crate::plan::{OperationPlan, Primitive};
use crate::request::{
    AddLiquidityRequest, ChainContext, OpenPositionRequest, PositionRequest,
    RemoveLiquidityRequest,
};
use crate::rpc::RpcProvider;
use crate::solana::{SystemPrograms, WSOL_WRAP_BUFFER_LAMPORTS, anchor_instruction, parse_pubkey};
use crate::state::{PoolStateReader, read_bytes};
use async_trait::async_trait;
use borsh::BorshSerialize;
use primitive_types::U256;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use xdex_domain::chain::Chain;
use xdex_domain::entities::{Pool, PoolState, Position};
use xdex_domain::enums::{OperationKind, Protocol, StepKind};
use xdex_domain::registry::WSOL_MINT;

/// Raydium CLMM program ID (mainnet).
pub const CLMM_PROGRAM_ID: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";

const OPEN_POSITION_TOKEN22_DISCRIMINATOR: [u8; 8] = [77, 255, 174, 82, 125, 29, 201, 46];
const INCREASE_LIQUIDITY_V2_DISCRIMINATOR: [u8; 8] = [133, 29, 89, 223, 69, 238, 176, 10];
const DECREASE_LIQUIDITY_V2_DISCRIMINATOR: [u8; 8] = [58, 127, 188, 62, 79, 82, 196, 96];
const CLOSE_POSITION_DISCRIMINATOR: [u8; 8] = [123, 134, 81, 0, 49, 68, 98, 98];

// PoolState account layout.
const POOL_MINT_0_OFFSET: usize = 73;
const POOL_VAULT_0_OFFSET: usize = 137;
const POOL_VAULT_1_OFFSET: usize = 169;
const POOL_TICK_SPACING_OFFSET: usize = 235;
const POOL_LIQUIDITY_OFFSET: usize = 237;
const POOL_SQRT_PRICE_OFFSET: usize = 253;
const POOL_TICK_CURRENT_OFFSET: usize = 269;

// PersonalPositionState account layout.
const POSITION_LIQUIDITY_OFFSET: usize = 81;

const CAPABILITIES: &[OperationKind] = &[
    OperationKind::OpenPosition,
    OperationKind::AddLiquidity,
    OperationKind::RemoveLiquidity,
    OperationKind::ClaimFees,
    OperationKind::ClosePosition,
];

#[derive(BorshSerialize)]
struct OpenPositionArgs {
    tick_lower_index: i32,
    tick_upper_index: i32,
    tick_array_lower_start_index: i32,
    tick_array_upper_start_index: i32,
    liquidity: u128,
    amount_0_max: u64,
    amount_1_max: u64,
    with_metadata: bool,
    base_flag: Option<bool>,
}

#[derive(BorshSerialize)]
struct IncreaseLiquidityArgs {
    liquidity: u128,
    amount_0_max: u64,
    amount_1_max: u64,
    base_flag: Option<bool>,
}

#[derive(BorshSerialize)]
struct DecreaseLiquidityArgs {
    liquidity: u128,
    amount_0_min: u64,
    amount_1_min: u64,
}

/// Accounts shared by every position instruction.
struct PositionAccounts {
    owner: Pubkey,
    pool: Pubkey,
    nft_mint: Pubkey,
    nft_account: Pubkey,
    personal_position: Pubkey,
    protocol_position: Pubkey,
    tick_array_lower: Pubkey,
    tick_array_upper: Pubkey,
    mint0: Pubkey,
    mint1: Pubkey,
    vault0: Pubkey,
    vault1: Pubkey,
    token_program0: Pubkey,
    token_program1: Pubkey,
    token_account0: Pubkey,
    token_account1: Pubkey,
}

/// Adapter for Raydium CLMM pools.
pub struct RaydiumClmmAdapter {
    /// CLMM program ID.
    program_id: Pubkey,
    /// Shared system program IDs.
    programs: SystemPrograms,
    /// RPC provider used for token program detection.
    provider: Option<Arc<RpcProvider>>,
    /// Pool state source.
    reader: Arc<dyn PoolStateReader>,
}

impl RaydiumClmmAdapter {
    /// Creates an adapter reading pool state through `provider`.
    pub fn new(provider: Arc<RpcProvider>) -> Self {
        let reader = Arc::new(RaydiumPoolReader::new(Arc::clone(&provider)));
        Self::with_reader(reader).with_provider(provider)
    }

    /// Creates an adapter with a custom state reader.
    pub fn with_reader(reader: Arc<dyn PoolStateReader>) -> Self {
        Self {
            program_id: Pubkey::from_str(CLMM_PROGRAM_ID).expect("Invalid program ID"),
            programs: SystemPrograms::default(),
            provider: None,
            reader,
        }
    }

    fn with_provider(mut self, provider: Arc<RpcProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn tick_array_address(&self, pool: &Pubkey, start_index: i32) -> Pubkey {
        let (address, _bump) = Pubkey::find_program_address(
            &[b"tick_array", pool.as_ref(), &start_index.to_be_bytes()],
            &self.program_id,
        );
        address
    }

    fn protocol_position_address(&self, pool: &Pubkey, tick_lower: i32, tick_upper: i32) -> Pubkey {
        let (address, _bump) = Pubkey::find_program_address(
            &[
                b"position",
                pool.as_ref(),
                &tick_lower.to_le_bytes(),
                &tick_upper.to_le_bytes(),
            ],
            &self.program_id,
        );
        address
    }

    /// Personal position PDA of an NFT mint.
    #[must_use]
    pub fn personal_position_address(&self, nft_mint: &Pubkey) -> Pubkey {
        let (address, _bump) =
            Pubkey::find_program_address(&[b"position", nft_mint.as_ref()], &self.program_id);
        address
    }

    async fn token_program(&self, mint: &Pubkey) -> Pubkey {
        match &self.provider {
            Some(provider) => self.programs.token_program_for(provider, mint).await,
            None => self.programs.token,
        }
    }

    async fn position_accounts(
        &self,
        pool: &Pool,
        state: &PoolState,
        owner: Pubkey,
        nft_mint: Pubkey,
        tick_lower: i32,
        tick_upper: i32,
    ) -> Result<PositionAccounts, AdapterError> {
        let pool_key = parse_pubkey(&pool.address)?;
        let mint0 = parse_pubkey(&pool.token0.address)?;
        let mint1 = parse_pubkey(&pool.token1.address)?;
        let vault0 = state
            .vault0
            .as_deref()
            .ok_or_else(|| AdapterError::PoolUnavailable(format!("{} has no vault0", pool.address)))
            .and_then(parse_pubkey)?;
        let vault1 = state
            .vault1
            .as_deref()
            .ok_or_else(|| AdapterError::PoolUnavailable(format!("{} has no vault1", pool.address)))
            .and_then(parse_pubkey)?;
        let token_program0 = self.token_program(&mint0).await;
        let token_program1 = self.token_program(&mint1).await;
        let spacing = state.spacing;

        Ok(PositionAccounts {
            owner,
            pool: pool_key,
            nft_mint,
            nft_account: self
                .programs
                .derive_ata(&owner, &nft_mint, &self.programs.token_2022),
            personal_position: self.personal_position_address(&nft_mint),
            protocol_position: self.protocol_position_address(&pool_key, tick_lower, tick_upper),
            tick_array_lower: self.tick_array_address(
                &pool_key,
                math::tick_array_start_index(tick_lower, spacing),
            ),
            tick_array_upper: self.tick_array_address(
                &pool_key,
                math::tick_array_start_index(tick_upper - 1, spacing),
            ),
            mint0,
            mint1,
            vault0,
            vault1,
            token_program0,
            token_program1,
            token_account0: self.programs.derive_ata(&owner, &mint0, &token_program0),
            token_account1: self.programs.derive_ata(&owner, &mint1, &token_program1),
        })
    }

    fn ensure_token_accounts(&self, a: &PositionAccounts) -> Vec<Instruction> {
        vec![
            self.programs
                .create_ata_idempotent(&a.owner, &a.owner, &a.mint0, &a.token_program0),
            self.programs
                .create_ata_idempotent(&a.owner, &a.owner, &a.mint1, &a.token_program1),
        ]
    }

    fn wrap_if_native(
        &self,
        a: &PositionAccounts,
        amount0: u64,
        amount1: u64,
    ) -> Result<(Vec<Instruction>, Vec<Instruction>), AdapterError> {
        let wsol = parse_pubkey(WSOL_MINT)?;
        let mut setup = Vec::new();
        let mut cleanup = Vec::new();
        for (mint, account, amount) in [
            (a.mint0, a.token_account0, amount0),
            (a.mint1, a.token_account1, amount1),
        ] {
            if mint == wsol && amount > 0 {
                setup.extend(self.programs.wrap_sol(
                    &a.owner,
                    &account,
                    amount + WSOL_WRAP_BUFFER_LAMPORTS,
                )?);
                cleanup.push(self.programs.unwrap_sol(&a.owner, &account)?);
            }
        }
        Ok((setup, cleanup))
    }

    fn build_open_position_instruction(
        &self,
        a: &PositionAccounts,
        args: &OpenPositionArgs,
    ) -> Result<Instruction, AdapterError> {
        let accounts = vec![
            AccountMeta::new(a.owner, true),                               // payer
            AccountMeta::new_readonly(a.owner, false),                     // position_nft_owner
            AccountMeta::new(a.nft_mint, true),                            // position_nft_mint
            AccountMeta::new(a.nft_account, false),                        // position_nft_account
            AccountMeta::new(a.pool, false),                               // pool_state
            AccountMeta::new(a.protocol_position, false),                  // protocol_position
            AccountMeta::new(a.tick_array_lower, false),                   // tick_array_lower
            AccountMeta::new(a.tick_array_upper, false),                   // tick_array_upper
            AccountMeta::new(a.personal_position, false),                  // personal_position
            AccountMeta::new(a.token_account0, false),                     // token_account_0
            AccountMeta::new(a.token_account1, false),                     // token_account_1
            AccountMeta::new(a.vault0, false),                             // token_vault_0
            AccountMeta::new(a.vault1, false),                             // token_vault_1
            AccountMeta::new_readonly(self.programs.rent, false),          // rent
            AccountMeta::new_readonly(self.programs.system, false),        // system_program
            AccountMeta::new_readonly(self.programs.token, false),         // token_program
            AccountMeta::new_readonly(self.programs.ata, false),           // ata_program
            AccountMeta::new_readonly(self.programs.token_2022, false),    // token_program_2022
            AccountMeta::new_readonly(a.mint0, false),                     // vault_0_mint
            AccountMeta::new_readonly(a.mint1, false),                     // vault_1_mint
        ];
        anchor_instruction(
            self.program_id,
            OPEN_POSITION_TOKEN22_DISCRIMINATOR,
            args,
            accounts,
        )
    }

    fn build_increase_liquidity_instruction(
        &self,
        a: &PositionAccounts,
        amount0: u64,
        amount1: u64,
    ) -> Result<Instruction, AdapterError> {
        let args = IncreaseLiquidityArgs {
            liquidity: 0, // derived by the program from the base token
            amount_0_max: amount0,
            amount_1_max: amount1,
            base_flag: Some(amount0 > 0),
        };
        let accounts = vec![
            AccountMeta::new_readonly(a.owner, true),                    // nft_owner
            AccountMeta::new_readonly(a.nft_account, false),             // nft_account
            AccountMeta::new(a.pool, false),                             // pool_state
            AccountMeta::new(a.protocol_position, false),                // protocol_position
            AccountMeta::new(a.personal_position, false),                // personal_position
            AccountMeta::new(a.tick_array_lower, false),                 // tick_array_lower
            AccountMeta::new(a.tick_array_upper, false),                 // tick_array_upper
            AccountMeta::new(a.token_account0, false),                   // token_account_0
            AccountMeta::new(a.token_account1, false),                   // token_account_1
            AccountMeta::new(a.vault0, false),                           // token_vault_0
            AccountMeta::new(a.vault1, false),                           // token_vault_1
            AccountMeta::new_readonly(self.programs.token, false),       // token_program
            AccountMeta::new_readonly(self.programs.token_2022, false),  // token_program_2022
            AccountMeta::new_readonly(a.mint0, false),                   // vault_0_mint
            AccountMeta::new_readonly(a.mint1, false),                   // vault_1_mint
        ];
        anchor_instruction(
            self.program_id,
            INCREASE_LIQUIDITY_V2_DISCRIMINATOR,
            &args,
            accounts,
        )
    }

    fn build_decrease_liquidity_instruction(
        &self,
        a: &PositionAccounts,
        liquidity: u128,
    ) -> Result<Instruction, AdapterError> {
        let args = DecreaseLiquidityArgs {
            liquidity,
            amount_0_min: 0,
            amount_1_min: 0,
        };
        let accounts = vec![
            AccountMeta::new(a.owner, true),                             // nft_owner
            AccountMeta::new(a.nft_account, false),                      // nft_account
            AccountMeta::new(a.personal_position, false),                // personal_position
            AccountMeta::new(a.pool, false),                             // pool_state
            AccountMeta::new_readonly(a.protocol_position, false),       // protocol_position
            AccountMeta::new(a.vault0, false),                           // token_vault_0
            AccountMeta::new(a.vault1, false),                           // token_vault_1
            AccountMeta::new(a.tick_array_lower, false),                 // tick_array_lower
            AccountMeta::new(a.tick_array_upper, false),                 // tick_array_upper
            AccountMeta::new(a.token_account0, false),                   // recipient_account_0
            AccountMeta::new(a.token_account1, false),                   // recipient_account_1
            AccountMeta::new_readonly(self.programs.token, false),       // token_program
            AccountMeta::new_readonly(self.programs.token_2022, false),  // token_program_2022
            AccountMeta::new_readonly(self.programs.memo, false),        // memo_program
            AccountMeta::new_readonly(a.mint0, false),                   // vault_0_mint
            AccountMeta::new_readonly(a.mint1, false),                   // vault_1_mint
        ];
        anchor_instruction(
            self.program_id,
            DECREASE_LIQUIDITY_V2_DISCRIMINATOR,
            &args,
            accounts,
        )
    }

    fn build_close_position_instruction(&self, a: &PositionAccounts) -> Instruction {
        let accounts = vec![
            AccountMeta::new(a.owner, true),                             // nft_owner
            AccountMeta::new(a.nft_mint, false),                         // position_nft_mint
            AccountMeta::new(a.nft_account, false),                      // position_nft_account
            AccountMeta::new(a.personal_position, false),                // personal_position
            AccountMeta::new_readonly(self.programs.system, false),      // system_program
            AccountMeta::new_readonly(self.programs.token_2022, false),  // token_program
        ];
        Instruction {
            program_id: self.program_id,
            accounts,
            data: CLOSE_POSITION_DISCRIMINATOR.to_vec(),
        }
    }

    async fn existing_position_accounts(
        &self,
        pool: &Pool,
        position: &Position,
        ctx: &ChainContext,
    ) -> Result<(PoolState, PositionAccounts), AdapterError> {
        let state = self.reader.pool_state(pool).await?;
        let owner = parse_pubkey(&ctx.owner)?;
        let nft_mint = parse_pubkey(&position.chain_position_id).map_err(|_| {
            AdapterError::PositionNotFound(format!(
                "{} is not a position NFT mint",
                position.chain_position_id
            ))
        })?;
        let accounts = self
            .position_accounts(
                pool,
                &state,
                owner,
                nft_mint,
                position.lower_index,
                position.upper_index,
            )
            .await?;
        Ok((state, accounts))
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

fn to_u64(amount: U256, what: &str) -> Result<u64, AdapterError> {
    if amount > U256::from(u64::MAX) {
        return Err(AdapterError::InvalidInput(format!("{what} exceeds u64")));
    }
    Ok(amount.low_u64())
}

fn instructions(ixs: Vec<Instruction>) -> Vec<Primitive> {
    ixs.into_iter().map(Primitive::Instruction).collect()
}

#[async_trait]
impl ChainAdapter for RaydiumClmmAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::RaydiumClmm
    }

    fn chains(&self) -> &[Chain] {
        &[Chain::Solana]
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
        let state = self.reader.pool_state(pool).await?;
        let (tick_lower, tick_upper) = math::resolve_tick_range(
            &request.range,
            &state,
            pool.token0.decimals,
            pool.token1.decimals,
        )?;
        let amount0 = to_u64(request.amount0_raw, "amount0")?;
        let amount1 = to_u64(request.amount1_raw, "amount1")?;
        if amount0 == 0 && amount1 == 0 {
            return Err(AdapterError::InvalidInput("both deposit amounts are zero".into()));
        }

        info!(
            pool = %pool.address,
            tick_lower,
            tick_upper,
            range = %request.range,
            "Building Raydium open position"
        );

        let nft_mint = Arc::new(Keypair::new());
        let owner = parse_pubkey(&ctx.owner)?;
        let accounts = self
            .position_accounts(pool, &state, owner, nft_mint.pubkey(), tick_lower, tick_upper)
            .await?;

        let args = OpenPositionArgs {
            tick_lower_index: tick_lower,
            tick_upper_index: tick_upper,
            tick_array_lower_start_index: math::tick_array_start_index(tick_lower, state.spacing),
            tick_array_upper_start_index: math::tick_array_start_index(
                tick_upper - 1,
                state.spacing,
            ),
            liquidity: 0,
            amount_0_max: amount0,
            amount_1_max: amount1,
            with_metadata: false,
            base_flag: Some(amount0 > 0),
        };

        let (wrap, unwrap) = self.wrap_if_native(&accounts, amount0, amount1)?;
        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.extend(wrap);
        ixs.push(self.build_open_position_instruction(&accounts, &args)?);
        ixs.extend(unwrap);

        let mut plan = OperationPlan::new(OperationKind::OpenPosition, Chain::Solana);
        plan.push(StepKind::OpenPosition, true, instructions(ixs))
            .co_signers
            .push(Arc::clone(&nft_mint));
        plan.position_ref = Some(nft_mint.pubkey().to_string());
        plan.resolved_range = Some((tick_lower, tick_upper));
        plan.liquidity_delta = Some(math::liquidity_for_amounts(
            state.current_index,
            tick_lower,
            tick_upper,
            amount0 as u128,
            amount1 as u128,
        ));
        Ok(plan)
    }

    async fn build_add_liquidity(
        &self,
        request: &AddLiquidityRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let (state, accounts) = self
            .existing_position_accounts(&request.pool, &request.position, ctx)
            .await?;
        let amount0 = to_u64(request.amount0_raw, "amount0")?;
        let amount1 = to_u64(request.amount1_raw, "amount1")?;
        if amount0 == 0 && amount1 == 0 {
            return Err(AdapterError::InvalidInput("both deposit amounts are zero".into()));
        }
        debug!(position = %accounts.nft_mint, amount0, amount1, "Building Raydium add liquidity");

        let (wrap, unwrap) = self.wrap_if_native(&accounts, amount0, amount1)?;
        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.extend(wrap);
        ixs.push(self.build_increase_liquidity_instruction(&accounts, amount0, amount1)?);
        ixs.extend(unwrap);

        let mut plan = OperationPlan::single(
            OperationKind::AddLiquidity,
            Chain::Solana,
            StepKind::AddLiquidity,
            instructions(ixs),
        )
        .with_position_ref(request.position.chain_position_id.clone());
        plan.liquidity_delta = Some(math::liquidity_for_amounts(
            state.current_index,
            request.position.lower_index,
            request.position.upper_index,
            amount0 as u128,
            amount1 as u128,
        ));
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
        let (_, accounts) = self
            .existing_position_accounts(&request.pool, &request.position, ctx)
            .await?;
        let mut position = request.position.clone();
        position.liquidity = self.current_liquidity(&request.pool, &request.position).await?;
        let liquidity = position.liquidity_share(request.percent);
        if liquidity == 0 {
            return Err(AdapterError::InvalidInput("position has no liquidity to remove".into()));
        }
        debug!(position = %accounts.nft_mint, liquidity, "Building Raydium remove liquidity");

        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.push(self.build_decrease_liquidity_instruction(&accounts, liquidity)?);

        let mut plan = OperationPlan::single(
            OperationKind::RemoveLiquidity,
            Chain::Solana,
            StepKind::RemoveLiquidity,
            instructions(ixs),
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
        let (_, accounts) = self
            .existing_position_accounts(&request.pool, &request.position, ctx)
            .await?;
        // A zero-liquidity decrease settles and transfers accrued fees.
        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.push(self.build_decrease_liquidity_instruction(&accounts, 0)?);

        Ok(OperationPlan::single(
            OperationKind::ClaimFees,
            Chain::Solana,
            StepKind::ClaimFees,
            instructions(ixs),
        )
        .with_position_ref(request.position.chain_position_id.clone()))
    }

    async fn build_close_position(
        &self,
        request: &PositionRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let (_, accounts) = self
            .existing_position_accounts(&request.pool, &request.position, ctx)
            .await?;
        let liquidity = self.current_liquidity(&request.pool, &request.position).await?;
        info!(position = %accounts.nft_mint, liquidity, "Building Raydium close position");

        let mut ixs = self.ensure_token_accounts(&accounts);
        // Always settle fees before burning, even with no liquidity left.
        ixs.push(self.build_decrease_liquidity_instruction(&accounts, liquidity)?);
        ixs.push(self.build_close_position_instruction(&accounts));

        let mut plan = OperationPlan::single(
            OperationKind::ClosePosition,
            Chain::Solana,
            StepKind::ClosePosition,
            instructions(ixs),
        )
        .with_position_ref(request.position.chain_position_id.clone());
        plan.liquidity_delta = Some(liquidity);
        Ok(plan)
    }
}

/// Reads Raydium pool and personal position accounts.
pub struct RaydiumPoolReader {
    provider: Arc<RpcProvider>,
    program_id: Pubkey,
}

impl RaydiumPoolReader {
    /// Creates a reader.
    pub fn new(provider: Arc<RpcProvider>) -> Self {
        Self {
            provider,
            program_id: Pubkey::from_str(CLMM_PROGRAM_ID).expect("Invalid program ID"),
        }
    }
}

/// Parses the fields of a Raydium `PoolState` account this crate uses.
pub fn parse_pool_state(
    data: &[u8],
    pool: &Pool,
) -> Result<PoolState, AdapterError> {
    let mint0 = Pubkey::new_from_array(read_bytes(data, POOL_MINT_0_OFFSET)?);
    if mint0.to_string() != pool.token0.address {
        return Err(AdapterError::PoolUnavailable(format!(
            "{} token0 is {mint0}, registry says {}",
            pool.address, pool.token0.address
        )));
    }
    let vault0 = Pubkey::new_from_array(read_bytes(data, POOL_VAULT_0_OFFSET)?);
    let vault1 = Pubkey::new_from_array(read_bytes(data, POOL_VAULT_1_OFFSET)?);
    let spacing = u16::from_le_bytes(read_bytes(data, POOL_TICK_SPACING_OFFSET)?);
    let liquidity = u128::from_le_bytes(read_bytes(data, POOL_LIQUIDITY_OFFSET)?);
    let sqrt_price = u128::from_le_bytes(read_bytes(data, POOL_SQRT_PRICE_OFFSET)?);
    let tick = i32::from_le_bytes(read_bytes(data, POOL_TICK_CURRENT_OFFSET)?);

    Ok(PoolState {
        current_price: math::sqrt_price_x64_to_price(
            sqrt_price,
            pool.token0.decimals,
            pool.token1.decimals,
        )?,
        current_index: tick,
        spacing,
        liquidity,
        sqrt_price: Some(U256::from(sqrt_price)),
        vault0: Some(vault0.to_string()),
        vault1: Some(vault1.to_string()),
    })
}

#[async_trait]
impl PoolStateReader for RaydiumPoolReader {
    async fn pool_state(&self, pool: &Pool) -> Result<PoolState, AdapterError> {
        let key = parse_pubkey(&pool.address)?;
        let data = self
            .provider
            .get_account_data(&key)
            .await
            .map_err(|e| AdapterError::PoolUnavailable(format!("{}: {e}", pool.address)))?;
        parse_pool_state(&data, pool)
    }

    async fn position_liquidity(
        &self,
        _pool: &Pool,
        position: &Position,
    ) -> Result<Option<u128>, AdapterError> {
        let nft_mint = parse_pubkey(&position.chain_position_id)?;
        let (personal, _bump) =
            Pubkey::find_program_address(&[b"position", nft_mint.as_ref()], &self.program_id);
        let data = self
            .provider
            .get_account_data(&personal)
            .await
            .map_err(|e| AdapterError::PositionNotFound(format!("{nft_mint}: {e}")))?;
        Ok(Some(u128::from_le_bytes(read_bytes(
            &data,
            POSITION_LIQUIDITY_OFFSET,
        )?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::OperationRequest;
    use crate::state::testing::FixedStateReader;
    use rust_decimal_macros::dec;
    use xdex_domain::registry::TokenRegistry;
    use xdex_domain::value_objects::PriceRange;

    fn pool() -> Pool {
        let reg = TokenRegistry::builtin();
        Pool::new(
            Pubkey::new_unique().to_string(),
            Chain::Solana,
            Protocol::RaydiumClmm,
            reg.resolve(Chain::Solana, "SOL").unwrap(),
            reg.resolve(Chain::Solana, "USDC").unwrap(),
            400,
        )
    }

    fn adapter(liquidity: Option<u128>) -> RaydiumClmmAdapter {
        let mut reader = FixedStateReader::new(dec!(150), -18_972, 10);
        reader.state.vault0 = Some(Pubkey::new_unique().to_string());
        reader.state.vault1 = Some(Pubkey::new_unique().to_string());
        reader.position_liquidity = liquidity;
        RaydiumClmmAdapter::with_reader(Arc::new(reader))
    }

    fn ctx() -> ChainContext {
        ChainContext {
            chain: Chain::Solana,
            owner: Pubkey::new_unique().to_string(),
            slippage_bps: 50,
            deadline: 0,
        }
    }

    fn position(pool: &Pool) -> Position {
        Position::open(
            Pubkey::new_unique().to_string(),
            "owner",
            pool.id.clone(),
            1_000,
            PriceRange::OneTick,
            -18_980,
            -18_970,
        )
    }

    fn last_anchor_ix(plan: &OperationPlan, program: &Pubkey) -> Instruction {
        plan.steps[0]
            .primitives
            .iter()
            .rev()
            .find_map(|p| match p {
                Primitive::Instruction(ix) if ix.program_id == *program => Some(ix.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_position_single_step_with_nft_cosigner() {
        let adapter = adapter(None);
        let request = OperationRequest::OpenPosition(OpenPositionRequest {
            pool: pool(),
            range: PriceRange::OneTick,
            amount0_raw: U256::zero(),
            amount1_raw: U256::from(1_000_000u64),
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].co_signers.len(), 1);
        assert_eq!(plan.resolved_range, Some((-18_980, -18_970)));
        assert_eq!(
            plan.position_ref,
            Some(plan.steps[0].co_signers[0].pubkey().to_string())
        );

        let ix = last_anchor_ix(&plan, &adapter.program_id);
        assert_eq!(&ix.data[..8], &OPEN_POSITION_TOKEN22_DISCRIMINATOR);
        assert_eq!(&ix.data[8..12], &(-18_980i32).to_le_bytes());
        assert_eq!(&ix.data[12..16], &(-18_970i32).to_le_bytes());
        assert_eq!(ix.accounts.len(), 20);
        assert!(ix.accounts[2].is_signer);
    }

    #[tokio::test]
    async fn test_close_is_one_step_with_decrease_then_close() {
        let adapter = adapter(Some(777));
        let pool = pool();
        let request = OperationRequest::ClosePosition(PositionRequest {
            position: position(&pool),
            pool,
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].step.kind, StepKind::ClosePosition);
        assert_eq!(plan.liquidity_delta, Some(777));

        let program_ixs: Vec<&Instruction> = plan.steps[0]
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Instruction(ix) if ix.program_id == adapter.program_id => Some(ix),
                _ => None,
            })
            .collect();
        assert_eq!(program_ixs.len(), 2);
        assert_eq!(&program_ixs[0].data[..8], &DECREASE_LIQUIDITY_V2_DISCRIMINATOR);
        assert_eq!(&program_ixs[0].data[8..24], &777u128.to_le_bytes());
        assert_eq!(program_ixs[1].data, CLOSE_POSITION_DISCRIMINATOR.to_vec());
    }

    #[tokio::test]
    async fn test_remove_uses_share_of_onchain_liquidity() {
        let adapter = adapter(Some(10_000));
        let pool = pool();
        let request = OperationRequest::RemoveLiquidity(RemoveLiquidityRequest {
            position: position(&pool),
            pool,
            percent: 25,
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        assert_eq!(plan.liquidity_delta, Some(2_500));
    }

    #[tokio::test]
    async fn test_remove_rejects_zero_percent() {
        let adapter = adapter(Some(10_000));
        let pool = pool();
        let request = OperationRequest::RemoveLiquidity(RemoveLiquidityRequest {
            position: position(&pool),
            pool,
            percent: 0,
        });
        assert!(matches!(
            adapter.build(&request, &ctx()).await,
            Err(AdapterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_pool_state_rejects_short_data() {
        assert!(matches!(
            parse_pool_state(&[0u8; 100], &pool()),
            Err(AdapterError::Decode(_))
        ));
    }
}
