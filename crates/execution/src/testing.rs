//! Scripted collaborators for unit tests.

use crate::client::{
    ChainClient, ChainStatus, FeeMarket, ReplayReference, SignedPayload, TransportError,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use primitive_types::U256;
use rust_decimal::Decimal;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use xdex_domain::chain::{Chain, ChainFamily};
use xdex_domain::entities::{Pool, PoolState, Position, Token};
use xdex_domain::enums::{OperationKind, Protocol, StepKind};
use xdex_domain::value_objects::QuoteResult;
use xdex_protocols::{
    AdapterError, ChainAdapter, ChainContext, ContractCall, OperationPlan, OperationRequest,
    PoolStateReader, Primitive, QuoteRequest, QuoteSource,
};

/// Well-known development key (first Anvil/Hardhat account).
pub const TEST_EVM_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Contract address used by scripted EVM plans.
pub const TEST_CONTRACT: &str = "0xC36442b4a4522E871399CD717aBDD847Ab11FE88";

/// Chain client answering from scripts.
///
/// Send and status results are consumed in call order. When a script runs
/// dry, sends succeed and statuses return `default_status`.
pub struct ScriptedClient {
    chain: Chain,
    blockhash: Hash,
    nonce: u64,
    market: FeeMarket,
    preflight: Option<TransportError>,
    sends: Mutex<VecDeque<Result<(), TransportError>>>,
    statuses: Mutex<VecDeque<Result<Option<ChainStatus>, TransportError>>>,
    default_status: Option<ChainStatus>,
    balances: Mutex<HashMap<String, VecDeque<U256>>>,
    send_calls: AtomicUsize,
    status_calls: AtomicUsize,
    sent: Mutex<Vec<SignedPayload>>,
}

impl ScriptedClient {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            blockhash: Hash::new_unique(),
            nonce: 0,
            market: FeeMarket {
                base_fee: Some(U256::from(20_000_000_000u64)),
                gas_price: U256::from(5_000_000_000u64),
            },
            preflight: None,
            sends: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            default_status: Some(confirmed()),
            balances: Mutex::new(HashMap::new()),
            send_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_preflight_error(mut self, err: TransportError) -> Self {
        self.preflight = Some(err);
        self
    }

    pub fn with_sends(self, script: Vec<Result<(), TransportError>>) -> Self {
        self.sends.lock().unwrap().extend(script);
        self
    }

    pub fn with_statuses(self, script: Vec<Result<Option<ChainStatus>, TransportError>>) -> Self {
        self.statuses.lock().unwrap().extend(script);
        self
    }

    /// Statuses returned once the script is exhausted; `None` never confirms.
    pub fn with_default_status(mut self, status: Option<ChainStatus>) -> Self {
        self.default_status = status;
        self
    }

    /// Successive balance readings for a token address; the last one sticks.
    pub fn with_balances(self, token: &str, readings: Vec<U256>) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert(token.to_ascii_lowercase(), readings.into());
        self
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Every payload handed to `send`, in order.
    pub fn sent(&self) -> Vec<SignedPayload> {
        self.sent.lock().unwrap().clone()
    }
}

/// Successful final status.
pub fn confirmed() -> ChainStatus {
    ChainStatus {
        success: true,
        error: None,
        fee: Some(5_000),
        slot: Some(42),
        logs: Vec::new(),
    }
}

/// Failed final status.
pub fn reverted(reason: &str) -> ChainStatus {
    ChainStatus {
        success: false,
        error: Some(reason.to_string()),
        fee: Some(5_000),
        slot: Some(43),
        logs: Vec::new(),
    }
}

#[async_trait]
impl ChainClient for ScriptedClient {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn replay_reference(&self, _signer: &str) -> Result<ReplayReference, TransportError> {
        Ok(match self.chain.family() {
            ChainFamily::Solana => ReplayReference::Blockhash(self.blockhash),
            ChainFamily::Evm => ReplayReference::Nonce(self.nonce),
        })
    }

    async fn fee_market(&self) -> Result<FeeMarket, TransportError> {
        Ok(self.market)
    }

    async fn preflight(&self, _payload: &SignedPayload) -> Result<(), TransportError> {
        match &self.preflight {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn send(
        &self,
        payload: &SignedPayload,
        _skip_preflight: bool,
    ) -> Result<String, TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(payload.clone());
        let next = self.sends.lock().unwrap().pop_front().unwrap_or(Ok(()));
        next.map(|()| payload.id())
    }

    async fn status(&self, _id: &str) -> Result<Option<ChainStatus>, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.default_status.clone()))
    }

    async fn balance(&self, _owner: &str, token: &Token) -> Result<U256, TransportError> {
        let mut balances = self.balances.lock().unwrap();
        let Some(readings) = balances.get_mut(&token.address.to_ascii_lowercase()) else {
            return Ok(U256::zero());
        };
        let value = if readings.len() > 1 {
            readings.pop_front()
        } else {
            readings.front().copied()
        };
        Ok(value.unwrap_or_default())
    }
}

/// Adapter emitting one primitive per scripted step; the last step is terminal.
pub struct ScriptedAdapter {
    protocol: Protocol,
    chains: [Chain; 1],
    capabilities: Vec<OperationKind>,
    steps: Vec<StepKind>,
    position_ref: Option<String>,
    resolved_range: Option<(i32, i32)>,
    liquidity_delta: Option<u128>,
}

impl ScriptedAdapter {
    pub fn new(protocol: Protocol, chain: Chain, steps: Vec<StepKind>) -> Self {
        Self {
            protocol,
            chains: [chain],
            capabilities: vec![
                OperationKind::Swap,
                OperationKind::OpenPosition,
                OperationKind::AddLiquidity,
                OperationKind::RemoveLiquidity,
                OperationKind::ClaimFees,
                OperationKind::ClosePosition,
            ],
            steps,
            position_ref: None,
            resolved_range: None,
            liquidity_delta: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<OperationKind>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_position(mut self, position_ref: &str, range: (i32, i32), liquidity: u128) -> Self {
        self.position_ref = Some(position_ref.to_string());
        self.resolved_range = Some(range);
        self.liquidity_delta = Some(liquidity);
        self
    }

    pub fn with_liquidity_delta(mut self, liquidity: u128) -> Self {
        self.liquidity_delta = Some(liquidity);
        self
    }

    fn primitive(&self, index: usize) -> Primitive {
        let tag = index as u8 + 1;
        match self.chains[0].family() {
            ChainFamily::Solana => {
                Primitive::Instruction(Instruction::new_with_bytes(
                    Pubkey::new_unique(),
                    &[tag],
                    vec![],
                ))
            }
            ChainFamily::Evm => Primitive::ContractCall(
                ContractCall::new(TEST_CONTRACT, vec![tag; 4]).with_gas_limit(100_000),
            ),
        }
    }
}

#[async_trait]
impl ChainAdapter for ScriptedAdapter {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn chains(&self) -> &[Chain] {
        &self.chains
    }

    fn capabilities(&self) -> &[OperationKind] {
        &self.capabilities
    }

    async fn build(
        &self,
        request: &OperationRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let kind = request.kind();
        if !self.supports(kind) {
            return Err(self.unsupported(kind));
        }
        let mut plan = OperationPlan::new(kind, ctx.chain);
        let last = self.steps.len().saturating_sub(1);
        for (i, step) in self.steps.iter().enumerate() {
            let primitive = self.primitive(i);
            plan.push(*step, i == last, vec![primitive]);
        }
        plan.position_ref = self.position_ref.clone();
        plan.resolved_range = self.resolved_range;
        plan.liquidity_delta = self.liquidity_delta;
        plan.validate()?;
        Ok(plan)
    }
}

/// Quote source with a fixed output, counting calls.
pub struct FixedQuoteSource {
    to_amount_raw: U256,
    price_impact_pct: Decimal,
    calls: AtomicUsize,
}

impl FixedQuoteSource {
    pub fn new(to_amount_raw: U256) -> Self {
        Self {
            to_amount_raw,
            price_impact_pct: Decimal::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_price_impact_pct(mut self, pct: Decimal) -> Self {
        self.price_impact_pct = pct;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for FixedQuoteSource {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResult, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bps = U256::from(10_000 - request.slippage_bps.min(10_000));
        let min_to_amount_raw = self.to_amount_raw * bps / U256::from(10_000u32);
        Ok(QuoteResult {
            chain: request.chain,
            from_token: request.from.symbol.clone(),
            to_token: request.to.symbol.clone(),
            from_amount: request.amount,
            to_amount: request.to.to_ui(self.to_amount_raw)?,
            from_amount_raw: request.amount_raw,
            to_amount_raw: self.to_amount_raw,
            min_to_amount_raw,
            price_impact_pct: self.price_impact_pct,
            slippage_bps: request.slippage_bps,
            route: vec!["scripted".to_string()],
            valid_until: Utc::now() + Duration::seconds(30),
            raw: serde_json::json!({ "outAmount": self.to_amount_raw.to_string() }),
        })
    }
}

/// Pool reader with a fixed state and settable on-chain position liquidity.
pub struct StaticPoolReader {
    state: PoolState,
    position_liquidity: Mutex<Option<u128>>,
}

impl StaticPoolReader {
    pub fn new(state: PoolState) -> Self {
        Self {
            state,
            position_liquidity: Mutex::new(None),
        }
    }

    pub fn set_position_liquidity(&self, liquidity: Option<u128>) {
        *self.position_liquidity.lock().unwrap() = liquidity;
    }
}

#[async_trait]
impl PoolStateReader for StaticPoolReader {
    async fn pool_state(&self, _pool: &Pool) -> Result<PoolState, AdapterError> {
        Ok(self.state.clone())
    }

    async fn position_liquidity(
        &self,
        _pool: &Pool,
        _position: &Position,
    ) -> Result<Option<u128>, AdapterError> {
        Ok(*self.position_liquidity.lock().unwrap())
    }
}
