//! Meteora DLMM adapter.
//!
//! A position is a plain account created from a fresh keypair that co-signs
//! the open transaction. Liquidity is spread over bins with a strategy;
//! removal is by basis points over the position's bin range.

use crate::adapter::ChainAdapter;
use crate::error::AdapterError;
use crate::math::{self, MAX_BIN_PER_ARRAY, MAX_POSITION_WIDTH};
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

/// Meteora DLMM program ID (mainnet).
pub const DLMM_PROGRAM_ID: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";

const INITIALIZE_POSITION_DISCRIMINATOR: [u8; 8] = [0xdb, 0xc0, 0xea, 0x47, 0xbe, 0xbf, 0x66, 0x50];
const INITIALIZE_BIN_ARRAY_DISCRIMINATOR: [u8; 8] =
    [0x23, 0x56, 0x13, 0xb9, 0x4e, 0xd4, 0x4b, 0xd3];
const INITIALIZE_BITMAP_EXTENSION_DISCRIMINATOR: [u8; 8] =
    [0x2f, 0x9d, 0xe2, 0xb4, 0x0c, 0xf0, 0x21, 0x47];
const ADD_LIQUIDITY_BY_STRATEGY_DISCRIMINATOR: [u8; 8] =
    [0x07, 0x03, 0x96, 0x7f, 0x94, 0x28, 0x3d, 0xc8];
const REMOVE_LIQUIDITY_BY_RANGE_DISCRIMINATOR: [u8; 8] =
    [0x1a, 0x52, 0x66, 0x98, 0xf0, 0x4a, 0x69, 0x1a];
const CLOSE_POSITION_DISCRIMINATOR: [u8; 8] = [0x7b, 0x86, 0x51, 0x00, 0x31, 0x44, 0x62, 0x62];
const CLAIM_FEE_DISCRIMINATOR: [u8; 8] = [0xa9, 0x20, 0x4f, 0x89, 0x88, 0xe8, 0x46, 0x89];

// LbPair account layout.
const LB_PAIR_ACTIVE_ID_OFFSET: usize = 76;
const LB_PAIR_BIN_STEP_OFFSET: usize = 80;
const LB_PAIR_MINT_X_OFFSET: usize = 88;
const LB_PAIR_RESERVE_X_OFFSET: usize = 152;
const LB_PAIR_RESERVE_Y_OFFSET: usize = 184;

// PositionV2 account layout: discriminator, lb_pair, owner, then one u128
// share per bin in Q64.64.
const POSITION_LIQUIDITY_SHARES_OFFSET: usize = 72;
const SCALE_OFFSET: u32 = 64;

const FULL_REMOVAL_BPS: u16 = 10_000;

const CAPABILITIES: &[OperationKind] = &[
    OperationKind::OpenPosition,
    OperationKind::AddLiquidity,
    OperationKind::RemoveLiquidity,
    OperationKind::ClaimFees,
    OperationKind::ClosePosition,
];

/// Liquidity distribution shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StrategyType {
    /// Uniform over the range, single-sided.
    SpotOneSide = 0,
    /// Uniform over the range, both tokens.
    SpotBalanced = 3,
}

impl StrategyType {
    /// Strategy for the given deposit amounts.
    #[must_use]
    pub fn for_amounts(amount_x: u64, amount_y: u64) -> Self {
        if amount_x > 0 && amount_y > 0 {
            StrategyType::SpotBalanced
        } else {
            StrategyType::SpotOneSide
        }
    }
}

#[derive(BorshSerialize)]
struct InitializePositionArgs {
    lower_bin_id: i32,
    width: i32,
}

#[derive(BorshSerialize)]
struct StrategyParameters {
    min_bin_id: i32,
    max_bin_id: i32,
    strategy_type: u8,
    parameters: [u8; 64],
}

#[derive(BorshSerialize)]
struct AddLiquidityByStrategyArgs {
    amount_x: u64,
    amount_y: u64,
    active_id: i32,
    max_active_bin_slippage: i32,
    strategy_parameters: StrategyParameters,
}

#[derive(BorshSerialize)]
struct RemoveLiquidityByRangeArgs {
    from_bin_id: i32,
    to_bin_id: i32,
    bps_to_remove: u16,
}

/// Accounts shared by the liquidity instructions of one position.
struct PairAccounts {
    owner: Pubkey,
    lb_pair: Pubkey,
    position: Pubkey,
    bitmap_extension: Pubkey,
    mint_x: Pubkey,
    mint_y: Pubkey,
    reserve_x: Pubkey,
    reserve_y: Pubkey,
    token_program_x: Pubkey,
    token_program_y: Pubkey,
    user_x: Pubkey,
    user_y: Pubkey,
    bin_array_lower: Pubkey,
    bin_array_upper: Pubkey,
}

/// Adapter for Meteora DLMM pairs.
pub struct MeteoraDlmmAdapter {
    program_id: Pubkey,
    event_authority: Pubkey,
    programs: SystemPrograms,
    provider: Option<Arc<RpcProvider>>,
    reader: Arc<dyn PoolStateReader>,
}

impl MeteoraDlmmAdapter {
    /// Creates an adapter reading pair state through `provider`.
    pub fn new(provider: Arc<RpcProvider>) -> Self {
        let reader = Arc::new(MeteoraPoolReader::new(Arc::clone(&provider)));
        let mut adapter = Self::with_reader(reader);
        adapter.provider = Some(provider);
        adapter
    }

    /// Creates an adapter with a custom state reader. Without a provider,
    /// bin arrays and the bitmap extension are assumed to exist.
    pub fn with_reader(reader: Arc<dyn PoolStateReader>) -> Self {
        let program_id = Pubkey::from_str(DLMM_PROGRAM_ID).expect("Invalid program ID");
        let (event_authority, _bump) =
            Pubkey::find_program_address(&[b"__event_authority"], &program_id);
        Self {
            program_id,
            event_authority,
            programs: SystemPrograms::default(),
            provider: None,
            reader,
        }
    }

    fn bin_array_address(&self, lb_pair: &Pubkey, bin_id: i32) -> Pubkey {
        let index = math::bin_array_index(bin_id);
        let (address, _bump) = Pubkey::find_program_address(
            &[b"bin_array", lb_pair.as_ref(), &index.to_le_bytes()],
            &self.program_id,
        );
        address
    }

    fn bitmap_extension_address(&self, lb_pair: &Pubkey) -> Pubkey {
        let (address, _bump) =
            Pubkey::find_program_address(&[b"bitmap", lb_pair.as_ref()], &self.program_id);
        address
    }

    async fn token_program(&self, mint: &Pubkey) -> Pubkey {
        match &self.provider {
            Some(provider) => self.programs.token_program_for(provider, mint).await,
            None => self.programs.token,
        }
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, AdapterError> {
        match &self.provider {
            Some(provider) => Ok(provider.get_account_owner(address).await?.is_some()),
            None => Ok(true),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn pair_accounts(
        &self,
        pool: &Pool,
        state: &PoolState,
        owner: Pubkey,
        position: Pubkey,
        lower_bin: i32,
        upper_bin: i32,
    ) -> Result<PairAccounts, AdapterError> {
        let lb_pair = parse_pubkey(&pool.address)?;
        let mint_x = parse_pubkey(&pool.token0.address)?;
        let mint_y = parse_pubkey(&pool.token1.address)?;
        let reserve = |v: &Option<String>, which: &str| {
            v.as_deref()
                .ok_or_else(|| {
                    AdapterError::PoolUnavailable(format!("{} has no {which}", pool.address))
                })
                .and_then(parse_pubkey)
        };
        let reserve_x = reserve(&state.vault0, "reserve_x")?;
        let reserve_y = reserve(&state.vault1, "reserve_y")?;
        let token_program_x = self.token_program(&mint_x).await;
        let token_program_y = self.token_program(&mint_y).await;

        Ok(PairAccounts {
            owner,
            lb_pair,
            position,
            bitmap_extension: self.bitmap_extension_address(&lb_pair),
            mint_x,
            mint_y,
            reserve_x,
            reserve_y,
            token_program_x,
            token_program_y,
            user_x: self.programs.derive_ata(&owner, &mint_x, &token_program_x),
            user_y: self.programs.derive_ata(&owner, &mint_y, &token_program_y),
            bin_array_lower: self.bin_array_address(&lb_pair, lower_bin),
            bin_array_upper: self.bin_array_address(&lb_pair, upper_bin),
        })
    }

    fn ensure_token_accounts(&self, a: &PairAccounts) -> Vec<Instruction> {
        vec![
            self.programs
                .create_ata_idempotent(&a.owner, &a.owner, &a.mint_x, &a.token_program_x),
            self.programs
                .create_ata_idempotent(&a.owner, &a.owner, &a.mint_y, &a.token_program_y),
        ]
    }

    fn wrap_if_native(
        &self,
        a: &PairAccounts,
        amount_x: u64,
        amount_y: u64,
    ) -> Result<(Vec<Instruction>, Vec<Instruction>), AdapterError> {
        let wsol = parse_pubkey(WSOL_MINT)?;
        let mut setup = Vec::new();
        let mut cleanup = Vec::new();
        let sides = [(a.mint_x, a.user_x, amount_x), (a.mint_y, a.user_y, amount_y)];
        for (mint, account, amount) in sides {
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

    /// Creates missing bin arrays over `[lower_bin, upper_bin]` and the
    /// bitmap extension.
    async fn initialize_missing_accounts(
        &self,
        a: &PairAccounts,
        lower_bin: i32,
        upper_bin: i32,
    ) -> Result<Vec<Instruction>, AdapterError> {
        let mut ixs = Vec::new();
        for index in math::bin_array_index(lower_bin)..=math::bin_array_index(upper_bin) {
            let (bin_array, _bump) = Pubkey::find_program_address(
                &[b"bin_array", a.lb_pair.as_ref(), &index.to_le_bytes()],
                &self.program_id,
            );
            if !self.account_exists(&bin_array).await? {
                debug!(index, bin_array = %bin_array, "Initializing bin array");
                ixs.push(anchor_instruction(
                    self.program_id,
                    INITIALIZE_BIN_ARRAY_DISCRIMINATOR,
                    &index,
                    vec![
                        AccountMeta::new_readonly(a.lb_pair, false),            // lb_pair
                        AccountMeta::new(bin_array, false),                     // bin_array
                        AccountMeta::new(a.owner, true),                        // funder
                        AccountMeta::new_readonly(self.programs.system, false), // system_program
                    ],
                )?);
            }
        }
        if !self.account_exists(&a.bitmap_extension).await? {
            debug!(bitmap = %a.bitmap_extension, "Initializing bitmap extension");
            ixs.push(Instruction {
                program_id: self.program_id,
                accounts: vec![
                    AccountMeta::new_readonly(a.lb_pair, false),            // lb_pair
                    AccountMeta::new(a.bitmap_extension, false),            // bitmap_extension
                    AccountMeta::new(a.owner, true),                        // funder
                    AccountMeta::new_readonly(self.programs.system, false), // system_program
                    AccountMeta::new_readonly(self.programs.rent, false),   // rent
                ],
                data: INITIALIZE_BITMAP_EXTENSION_DISCRIMINATOR.to_vec(),
            });
        }
        Ok(ixs)
    }

    fn build_initialize_position_instruction(
        &self,
        a: &PairAccounts,
        lower_bin: i32,
        width: i32,
    ) -> Result<Instruction, AdapterError> {
        anchor_instruction(
            self.program_id,
            INITIALIZE_POSITION_DISCRIMINATOR,
            &InitializePositionArgs {
                lower_bin_id: lower_bin,
                width,
            },
            vec![
                AccountMeta::new(a.owner, true),                        // payer
                AccountMeta::new(a.position, true),                     // position
                AccountMeta::new_readonly(a.lb_pair, false),            // lb_pair
                AccountMeta::new_readonly(a.owner, false),              // owner
                AccountMeta::new_readonly(self.programs.system, false), // system_program
                AccountMeta::new_readonly(self.programs.rent, false),   // rent
                AccountMeta::new_readonly(self.event_authority, false), // event_authority
                AccountMeta::new_readonly(self.program_id, false),      // program
            ],
        )
    }

    fn liquidity_accounts(&self, a: &PairAccounts) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(a.position, false),                    // position
            AccountMeta::new(a.lb_pair, false),                     // lb_pair
            AccountMeta::new(a.bitmap_extension, false),            // bin_array_bitmap_extension
            AccountMeta::new(a.user_x, false),                      // user_token_x
            AccountMeta::new(a.user_y, false),                      // user_token_y
            AccountMeta::new(a.reserve_x, false),                   // reserve_x
            AccountMeta::new(a.reserve_y, false),                   // reserve_y
            AccountMeta::new_readonly(a.mint_x, false),             // token_x_mint
            AccountMeta::new_readonly(a.mint_y, false),             // token_y_mint
            AccountMeta::new(a.bin_array_lower, false),             // bin_array_lower
            AccountMeta::new(a.bin_array_upper, false),             // bin_array_upper
            AccountMeta::new_readonly(a.owner, true),               // sender
            AccountMeta::new_readonly(a.token_program_x, false),    // token_x_program
            AccountMeta::new_readonly(a.token_program_y, false),    // token_y_program
            AccountMeta::new_readonly(self.event_authority, false), // event_authority
            AccountMeta::new_readonly(self.program_id, false),      // program
        ]
    }

    #[allow(clippy::too_many_arguments)]
    fn build_add_liquidity_instruction(
        &self,
        a: &PairAccounts,
        state: &PoolState,
        amount_x: u64,
        amount_y: u64,
        lower_bin: i32,
        upper_bin: i32,
        slippage_bps: u16,
    ) -> Result<Instruction, AdapterError> {
        let args = AddLiquidityByStrategyArgs {
            amount_x,
            amount_y,
            active_id: state.current_index,
            max_active_bin_slippage: max_active_bin_slippage(slippage_bps),
            strategy_parameters: StrategyParameters {
                min_bin_id: lower_bin,
                max_bin_id: upper_bin,
                strategy_type: StrategyType::for_amounts(amount_x, amount_y) as u8,
                parameters: [0u8; 64],
            },
        };
        anchor_instruction(
            self.program_id,
            ADD_LIQUIDITY_BY_STRATEGY_DISCRIMINATOR,
            &args,
            self.liquidity_accounts(a),
        )
    }

    fn build_remove_liquidity_instruction(
        &self,
        a: &PairAccounts,
        lower_bin: i32,
        upper_bin: i32,
        bps_to_remove: u16,
    ) -> Result<Instruction, AdapterError> {
        anchor_instruction(
            self.program_id,
            REMOVE_LIQUIDITY_BY_RANGE_DISCRIMINATOR,
            &RemoveLiquidityByRangeArgs {
                from_bin_id: lower_bin,
                to_bin_id: upper_bin,
                bps_to_remove,
            },
            self.liquidity_accounts(a),
        )
    }

    fn build_claim_fee_instruction(&self, a: &PairAccounts) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(a.lb_pair, false),                     // lb_pair
                AccountMeta::new(a.position, false),                    // position
                AccountMeta::new(a.bin_array_lower, false),             // bin_array_lower
                AccountMeta::new(a.bin_array_upper, false),             // bin_array_upper
                AccountMeta::new_readonly(a.owner, true),               // sender
                AccountMeta::new(a.reserve_x, false),                   // reserve_x
                AccountMeta::new(a.reserve_y, false),                   // reserve_y
                AccountMeta::new(a.user_x, false),                      // user_token_x
                AccountMeta::new(a.user_y, false),                      // user_token_y
                AccountMeta::new_readonly(a.mint_x, false),             // token_x_mint
                AccountMeta::new_readonly(a.mint_y, false),             // token_y_mint
                AccountMeta::new_readonly(a.token_program_x, false),    // token_program
                AccountMeta::new_readonly(self.event_authority, false), // event_authority
                AccountMeta::new_readonly(self.program_id, false),      // program
            ],
            data: CLAIM_FEE_DISCRIMINATOR.to_vec(),
        }
    }

    fn build_close_position_instruction(&self, a: &PairAccounts) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(a.position, false),                    // position
                AccountMeta::new(a.lb_pair, false),                     // lb_pair
                AccountMeta::new(a.bin_array_lower, false),             // bin_array_lower
                AccountMeta::new(a.bin_array_upper, false),             // bin_array_upper
                AccountMeta::new_readonly(a.owner, true),               // sender
                AccountMeta::new(a.owner, false),                       // rent_receiver
                AccountMeta::new_readonly(self.event_authority, false), // event_authority
                AccountMeta::new_readonly(self.program_id, false),      // program
            ],
            data: CLOSE_POSITION_DISCRIMINATOR.to_vec(),
        }
    }

    async fn existing_position_accounts(
        &self,
        request: &PositionRequest,
        ctx: &ChainContext,
    ) -> Result<(PoolState, PairAccounts), AdapterError> {
        let state = self.reader.pool_state(&request.pool).await?;
        let owner = parse_pubkey(&ctx.owner)?;
        let position = parse_pubkey(&request.position.chain_position_id).map_err(|_| {
            AdapterError::PositionNotFound(format!(
                "{} is not a position account",
                request.position.chain_position_id
            ))
        })?;
        let accounts = self
            .pair_accounts(
                &request.pool,
                &state,
                owner,
                position,
                request.position.lower_index,
                request.position.upper_index,
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

/// Active-bin drift tolerated by a deposit: one bin per 10 bps, at least one.
#[must_use]
pub fn max_active_bin_slippage(slippage_bps: u16) -> i32 {
    (slippage_bps as i32 / 10).max(1)
}

/// Widens a range that sits inside one bin array so that it touches two,
/// since the program borrows the lower and upper arrays mutably.
pub fn span_two_bin_arrays(lower_bin: i32, upper_bin: i32) -> Result<(i32, i32), AdapterError> {
    let index = math::bin_array_index(lower_bin);
    if index != math::bin_array_index(upper_bin) {
        return Ok((lower_bin, upper_bin));
    }
    let array_lower = index as i32 * MAX_BIN_PER_ARRAY;
    let array_upper = array_lower + MAX_BIN_PER_ARRAY - 1;
    let (lower, upper) = if lower_bin - (array_lower - 1) <= (array_upper + 1) - upper_bin {
        (array_lower - 1, upper_bin)
    } else {
        (lower_bin, array_upper + 1)
    };
    let width = upper - lower + 1;
    if width > MAX_POSITION_WIDTH {
        return Err(AdapterError::InvalidRange(format!(
            "bin range [{lower_bin}, {upper_bin}] cannot span two bin arrays \
             within {MAX_POSITION_WIDTH} bins"
        )));
    }
    Ok((lower, upper))
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
impl ChainAdapter for MeteoraDlmmAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::MeteoraDlmm
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
        let (lower_bin, upper_bin) = math::resolve_bin_range(
            &request.range,
            &state,
            pool.token0.decimals,
            pool.token1.decimals,
        )?;
        let (lower_bin, upper_bin) = span_two_bin_arrays(lower_bin, upper_bin)?;
        let amount_x = to_u64(request.amount0_raw, "amount0")?;
        let amount_y = to_u64(request.amount1_raw, "amount1")?;
        if amount_x == 0 && amount_y == 0 {
            return Err(AdapterError::InvalidInput("both deposit amounts are zero".into()));
        }

        info!(
            pool = %pool.address,
            active_id = state.current_index,
            lower_bin,
            upper_bin,
            range = %request.range,
            "Building Meteora open position"
        );

        let position = Arc::new(Keypair::new());
        let owner = parse_pubkey(&ctx.owner)?;
        let accounts = self
            .pair_accounts(pool, &state, owner, position.pubkey(), lower_bin, upper_bin)
            .await?;

        let (wrap, unwrap) = self.wrap_if_native(&accounts, amount_x, amount_y)?;
        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.extend(
            self.initialize_missing_accounts(&accounts, lower_bin, upper_bin)
                .await?,
        );
        ixs.push(self.build_initialize_position_instruction(
            &accounts,
            lower_bin,
            upper_bin - lower_bin + 1,
        )?);
        ixs.extend(wrap);
        ixs.push(self.build_add_liquidity_instruction(
            &accounts,
            &state,
            amount_x,
            amount_y,
            lower_bin,
            upper_bin,
            ctx.slippage_bps,
        )?);
        ixs.extend(unwrap);

        let mut plan = OperationPlan::new(OperationKind::OpenPosition, Chain::Solana);
        plan.push(StepKind::OpenPosition, true, instructions(ixs))
            .co_signers
            .push(Arc::clone(&position));
        plan.position_ref = Some(position.pubkey().to_string());
        plan.resolved_range = Some((lower_bin, upper_bin));
        plan.liquidity_delta = Some(math::bin_liquidity(
            state.current_index,
            state.spacing,
            amount_x,
            amount_y,
        ));
        Ok(plan)
    }

    async fn build_add_liquidity(
        &self,
        request: &AddLiquidityRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let target = PositionRequest {
            pool: request.pool.clone(),
            position: request.position.clone(),
        };
        let (state, accounts) = self.existing_position_accounts(&target, ctx).await?;
        let amount_x = to_u64(request.amount0_raw, "amount0")?;
        let amount_y = to_u64(request.amount1_raw, "amount1")?;
        if amount_x == 0 && amount_y == 0 {
            return Err(AdapterError::InvalidInput("both deposit amounts are zero".into()));
        }
        let (lower_bin, upper_bin) = (request.position.lower_index, request.position.upper_index);
        debug!(position = %accounts.position, amount_x, amount_y, "Building Meteora add liquidity");

        let (wrap, unwrap) = self.wrap_if_native(&accounts, amount_x, amount_y)?;
        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.extend(
            self.initialize_missing_accounts(&accounts, lower_bin, upper_bin)
                .await?,
        );
        ixs.extend(wrap);
        ixs.push(self.build_add_liquidity_instruction(
            &accounts,
            &state,
            amount_x,
            amount_y,
            lower_bin,
            upper_bin,
            ctx.slippage_bps,
        )?);
        ixs.extend(unwrap);

        let mut plan = OperationPlan::single(
            OperationKind::AddLiquidity,
            Chain::Solana,
            StepKind::AddLiquidity,
            instructions(ixs),
        )
        .with_position_ref(request.position.chain_position_id.clone());
        plan.liquidity_delta = Some(math::bin_liquidity(
            state.current_index,
            state.spacing,
            amount_x,
            amount_y,
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
        let target = PositionRequest {
            pool: request.pool.clone(),
            position: request.position.clone(),
        };
        let (_, accounts) = self.existing_position_accounts(&target, ctx).await?;
        let mut position = request.position.clone();
        position.liquidity = self.current_liquidity(&request.pool, &request.position).await?;
        if position.liquidity == 0 {
            return Err(AdapterError::InvalidInput("position has no liquidity to remove".into()));
        }
        let bps = u16::from(request.percent) * 100;
        debug!(position = %accounts.position, bps, "Building Meteora remove liquidity");

        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.push(self.build_remove_liquidity_instruction(
            &accounts,
            request.position.lower_index,
            request.position.upper_index,
            bps,
        )?);

        let mut plan = OperationPlan::single(
            OperationKind::RemoveLiquidity,
            Chain::Solana,
            StepKind::RemoveLiquidity,
            instructions(ixs),
        )
        .with_position_ref(request.position.chain_position_id.clone());
        plan.liquidity_delta = Some(position.liquidity_share(request.percent));
        Ok(plan)
    }

    async fn build_claim_fees(
        &self,
        request: &PositionRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let (_, accounts) = self.existing_position_accounts(request, ctx).await?;
        let mut ixs = self.ensure_token_accounts(&accounts);
        ixs.push(self.build_claim_fee_instruction(&accounts));

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
        let (_, accounts) = self.existing_position_accounts(request, ctx).await?;
        let liquidity = self.current_liquidity(&request.pool, &request.position).await?;
        info!(position = %accounts.position, liquidity, "Building Meteora close position");

        let mut ixs = self.ensure_token_accounts(&accounts);
        // Removing from empty bins fails on-chain.
        if liquidity > 0 {
            ixs.push(self.build_remove_liquidity_instruction(
                &accounts,
                request.position.lower_index,
                request.position.upper_index,
                FULL_REMOVAL_BPS,
            )?);
        }
        ixs.push(self.build_claim_fee_instruction(&accounts));
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

/// Reads Meteora `LbPair` accounts.
pub struct MeteoraPoolReader {
    provider: Arc<RpcProvider>,
}

impl MeteoraPoolReader {
    /// Creates a reader.
    pub fn new(provider: Arc<RpcProvider>) -> Self {
        Self { provider }
    }
}

/// Parses the fields of an `LbPair` account this crate uses.
pub fn parse_lb_pair(data: &[u8], pool: &Pool) -> Result<PoolState, AdapterError> {
    let mint_x = Pubkey::new_from_array(read_bytes(data, LB_PAIR_MINT_X_OFFSET)?);
    if mint_x.to_string() != pool.token0.address {
        return Err(AdapterError::PoolUnavailable(format!(
            "{} token x is {mint_x}, registry says {}",
            pool.address, pool.token0.address
        )));
    }
    let active_id = i32::from_le_bytes(read_bytes(data, LB_PAIR_ACTIVE_ID_OFFSET)?);
    let bin_step = u16::from_le_bytes(read_bytes(data, LB_PAIR_BIN_STEP_OFFSET)?);
    let reserve_x = Pubkey::new_from_array(read_bytes(data, LB_PAIR_RESERVE_X_OFFSET)?);
    let reserve_y = Pubkey::new_from_array(read_bytes(data, LB_PAIR_RESERVE_Y_OFFSET)?);

    Ok(PoolState {
        current_price: math::bin_id_to_price(
            active_id,
            bin_step,
            pool.token0.decimals,
            pool.token1.decimals,
        )?,
        current_index: active_id,
        spacing: bin_step,
        liquidity: 0,
        sqrt_price: None,
        vault0: Some(reserve_x.to_string()),
        vault1: Some(reserve_y.to_string()),
    })
}

#[async_trait]
impl PoolStateReader for MeteoraPoolReader {
    async fn pool_state(&self, pool: &Pool) -> Result<PoolState, AdapterError> {
        let key = parse_pubkey(&pool.address)?;
        let data = self
            .provider
            .get_account_data(&key)
            .await
            .map_err(|e| AdapterError::PoolUnavailable(format!("{}: {e}", pool.address)))?;
        parse_lb_pair(&data, pool)
    }

    async fn position_liquidity(
        &self,
        _pool: &Pool,
        position: &Position,
    ) -> Result<Option<u128>, AdapterError> {
        let key = parse_pubkey(&position.chain_position_id)?;
        let data = self
            .provider
            .get_account_data(&key)
            .await
            .map_err(|e| AdapterError::PositionNotFound(format!("{key}: {e}")))?;
        Ok(Some(parse_position_liquidity(&data)?))
    }
}

/// Sums the per-bin shares of a `PositionV2` account, in the units of
/// [`math::bin_liquidity`].
pub fn parse_position_liquidity(data: &[u8]) -> Result<u128, AdapterError> {
    let mut total: u128 = 0;
    for bin in 0..MAX_POSITION_WIDTH as usize {
        let offset = POSITION_LIQUIDITY_SHARES_OFFSET + bin * 16;
        let share = u128::from_le_bytes(read_bytes(data, offset)?);
        total = total.saturating_add(share >> SCALE_OFFSET);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::OperationRequest;
    use crate::state::testing::FixedStateReader;
    use rust_decimal_macros::dec;
    use xdex_domain::entities::Position;
    use xdex_domain::registry::TokenRegistry;
    use xdex_domain::value_objects::PriceRange;

    fn pool() -> Pool {
        let reg = TokenRegistry::builtin();
        Pool::new(
            Pubkey::new_unique().to_string(),
            Chain::Solana,
            Protocol::MeteoraDlmm,
            reg.resolve(Chain::Solana, "SOL").unwrap(),
            reg.resolve(Chain::Solana, "USDC").unwrap(),
            10,
        )
    }

    fn adapter() -> MeteoraDlmmAdapter {
        adapter_with_onchain(None)
    }

    fn adapter_with_onchain(liquidity: Option<u128>) -> MeteoraDlmmAdapter {
        let mut reader = FixedStateReader::new(dec!(150), -4_210, 10);
        reader.state.vault0 = Some(Pubkey::new_unique().to_string());
        reader.state.vault1 = Some(Pubkey::new_unique().to_string());
        reader.position_liquidity = liquidity;
        MeteoraDlmmAdapter::with_reader(Arc::new(reader))
    }

    fn position(pool: &Pool, liquidity: u128) -> Position {
        Position::open(
            Pubkey::new_unique().to_string(),
            "owner",
            pool.id.clone(),
            liquidity,
            PriceRange::OneTick,
            -4_210,
            -4_200,
        )
    }

    fn discriminators(ixs: &[&Instruction]) -> Vec<[u8; 8]> {
        ixs.iter()
            .map(|ix| ix.data[..8].try_into().unwrap())
            .collect()
    }

    fn ctx() -> ChainContext {
        ChainContext {
            chain: Chain::Solana,
            owner: Pubkey::new_unique().to_string(),
            slippage_bps: 50,
            deadline: 0,
        }
    }

    fn program_ixs<'a>(plan: &'a OperationPlan, program: &Pubkey) -> Vec<&'a Instruction> {
        plan.steps[0]
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Instruction(ix) if ix.program_id == *program => Some(ix),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_span_two_bin_arrays() {
        // -4210 sits in array -61 ([-4270, -4201]).
        assert_eq!(span_two_bin_arrays(-4_210, -4_210).unwrap(), (-4_210, -4_200));
        assert_eq!(span_two_bin_arrays(-4_268, -4_260).unwrap(), (-4_271, -4_260));
        assert_eq!(span_two_bin_arrays(-10, 5).unwrap(), (-10, 5));
        assert!(span_two_bin_arrays(0, 69).is_err());
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(StrategyType::for_amounts(1, 1), StrategyType::SpotBalanced);
        assert_eq!(StrategyType::for_amounts(0, 1), StrategyType::SpotOneSide);
        assert_eq!(max_active_bin_slippage(50), 5);
        assert_eq!(max_active_bin_slippage(0), 1);
    }

    #[tokio::test]
    async fn test_open_position_initializes_then_adds() {
        let adapter = adapter();
        let request = OperationRequest::OpenPosition(OpenPositionRequest {
            pool: pool(),
            range: PriceRange::OneTick,
            amount0_raw: U256::zero(),
            amount1_raw: U256::from(5_000_000u64),
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.resolved_range, Some((-4_210, -4_200)));
        // Token y only, so the liquidity is the raw deposit.
        assert_eq!(plan.liquidity_delta, Some(5_000_000));
        let position = plan.steps[0].co_signers[0].pubkey();
        assert_eq!(plan.position_ref, Some(position.to_string()));

        let ixs = program_ixs(&plan, &adapter.program_id);
        assert_eq!(ixs.len(), 2);
        assert_eq!(&ixs[0].data[..8], &INITIALIZE_POSITION_DISCRIMINATOR);
        assert_eq!(&ixs[0].data[8..12], &(-4_210i32).to_le_bytes());
        assert_eq!(&ixs[0].data[12..16], &11i32.to_le_bytes());
        assert_eq!(ixs[0].accounts[1].pubkey, position);

        let add = ixs[1];
        assert_eq!(&add.data[..8], &ADD_LIQUIDITY_BY_STRATEGY_DISCRIMINATOR);
        assert_eq!(add.accounts.len(), 16);
        // amount_x, amount_y, active_id, max_slippage, min, max, then strategy.
        assert_eq!(add.data[8 + 8 + 8 + 4 + 4 + 4 + 4], StrategyType::SpotOneSide as u8);
        assert_eq!(add.data.len(), 8 + 8 + 8 + 4 + 4 + 4 + 4 + 1 + 64);
    }

    #[tokio::test]
    async fn test_open_rejects_too_wide_range() {
        let adapter = adapter();
        let request = OperationRequest::OpenPosition(OpenPositionRequest {
            pool: pool(),
            range: PriceRange::bin_offsets(-50, 50).unwrap(),
            amount0_raw: U256::from(1u64),
            amount1_raw: U256::from(1u64),
        });
        assert!(matches!(
            adapter.build(&request, &ctx()).await,
            Err(AdapterError::InvalidRange(_))
        ));
    }

    #[tokio::test]
    async fn test_close_removes_claims_and_closes_in_one_step() {
        let adapter = adapter();
        let pool = pool();
        let position = position(&pool, 500);
        let request = OperationRequest::ClosePosition(PositionRequest { pool, position });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        assert_eq!(plan.len(), 1);
        let ixs = program_ixs(&plan, &adapter.program_id);
        let discriminators: Vec<&[u8]> = ixs.iter().map(|ix| &ix.data[..8]).collect();
        assert_eq!(
            discriminators,
            vec![
                &REMOVE_LIQUIDITY_BY_RANGE_DISCRIMINATOR[..],
                &CLAIM_FEE_DISCRIMINATOR[..],
                &CLOSE_POSITION_DISCRIMINATOR[..],
            ]
        );
        assert_eq!(&ixs[0].data[16..18], &FULL_REMOVAL_BPS.to_le_bytes());
    }

    #[tokio::test]
    async fn test_add_liquidity_reports_delta() {
        let adapter = adapter();
        let pool = pool();
        let position = position(&pool, 1_000);
        let request = OperationRequest::AddLiquidity(AddLiquidityRequest {
            pool,
            position,
            amount0_raw: U256::zero(),
            amount1_raw: U256::from(2_500u64),
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        assert_eq!(plan.liquidity_delta, Some(2_500));
    }

    #[tokio::test]
    async fn test_close_follows_onchain_liquidity() {
        // Stale local liquidity, empty on-chain: no remove.
        let adapter = adapter_with_onchain(Some(0));
        let pool = pool();
        let request = OperationRequest::ClosePosition(PositionRequest {
            pool: pool.clone(),
            position: position(&pool, 500),
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        let ixs = program_ixs(&plan, &adapter.program_id);
        assert_eq!(
            discriminators(&ixs),
            vec![CLAIM_FEE_DISCRIMINATOR, CLOSE_POSITION_DISCRIMINATOR]
        );
        assert_eq!(plan.liquidity_delta, Some(0));

        // Zero local liquidity, funded on-chain: remove first.
        let adapter = adapter_with_onchain(Some(800));
        let request = OperationRequest::ClosePosition(PositionRequest {
            pool: pool.clone(),
            position: position(&pool, 0),
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        let ixs = program_ixs(&plan, &adapter.program_id);
        assert_eq!(discriminators(&ixs)[0], REMOVE_LIQUIDITY_BY_RANGE_DISCRIMINATOR);
        assert_eq!(plan.liquidity_delta, Some(800));
    }

    #[tokio::test]
    async fn test_remove_uses_onchain_liquidity() {
        let adapter = adapter_with_onchain(Some(1_000));
        let pool = pool();
        let request = OperationRequest::RemoveLiquidity(RemoveLiquidityRequest {
            pool: pool.clone(),
            position: position(&pool, 0),
            percent: 25,
        });
        let plan = adapter.build(&request, &ctx()).await.unwrap();
        assert_eq!(plan.liquidity_delta, Some(250));

        let adapter = adapter_with_onchain(Some(0));
        let request = OperationRequest::RemoveLiquidity(RemoveLiquidityRequest {
            pool: pool.clone(),
            position: position(&pool, 1_000),
            percent: 25,
        });
        assert!(matches!(
            adapter.build(&request, &ctx()).await,
            Err(AdapterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_position_liquidity() {
        let mut data = vec![0u8; POSITION_LIQUIDITY_SHARES_OFFSET + 70 * 16];
        for (bin, share) in [(0usize, 300u128), (69, 200)] {
            let offset = POSITION_LIQUIDITY_SHARES_OFFSET + bin * 16;
            data[offset..offset + 16].copy_from_slice(&(share << 64).to_le_bytes());
        }
        assert_eq!(parse_position_liquidity(&data).unwrap(), 500);
        assert!(parse_position_liquidity(&data[..100]).is_err());
    }

    #[tokio::test]
    async fn test_swap_is_capability_mismatch() {
        let adapter = adapter();
        assert!(!adapter.supports(OperationKind::Swap));
    }
}
