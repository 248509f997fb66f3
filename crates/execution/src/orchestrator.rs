//! Execution orchestrator.
//!
//! Entry point for every logical operation. A call resolves its adapter,
//! builds an [`OperationPlan`], then walks the plan one step at a time:
//! build envelopes, sign under the wallet's sequence lock, submit, confirm.
//! The first step that does not confirm halts the sequence; steps already
//! confirmed are reported, never rolled back.
//!
//! Calls are independent and the orchestrator can be shared across tasks.
//! Transactions from one wallet on one chain are serialized by the signer's
//! sequence lock, so concurrent calls never race on a nonce.

use crate::builder::{Envelope, TransactionBuilder};
use crate::client::ChainClient;
use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::metrics;
use crate::quote::QuoteEngine;
use crate::signer::TxSigner;
use crate::submitter::{Submission, Submitter};
use chrono::Utc;
use primitive_types::U256;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;
use xdex_domain::chain::Chain;
use xdex_domain::entities::{Pool, PoolId, Position, Token};
use xdex_domain::enums::{OperationKind, PositionStatus, StepKind};
use xdex_domain::registry::{PoolRegistry, TokenRegistry};
use xdex_domain::value_objects::{
    ClosePositionResult, OpenPositionResult, OverallStatus, PriceRange, QuoteResult, StepOutcome,
    SwapResult, TxResult,
};
use xdex_protocols::rpc::TxLog;
use xdex_protocols::{
    AddLiquidityRequest, ChainAdapter, ChainContext, OpenPositionRequest, OperationPlan,
    OperationRequest, PositionRequest, ProtocolRegistry, QuoteRequest, RemoveLiquidityRequest,
    StepGroup, SwapRequest,
};

/// Phase of an in-flight call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Accepted, nothing built yet.
    Idle,
    /// Building a plan or envelope.
    Building,
    /// Signing and sending.
    Submitting,
    /// Waiting for a final status.
    Confirming,
    /// Every step confirmed.
    Done,
    /// Halted after a multi-step failure.
    PartiallyFailed,
    /// The only step failed.
    Failed,
}

struct CallTracker {
    phase: CallPhase,
}

impl CallTracker {
    fn new() -> Self {
        Self {
            phase: CallPhase::Idle,
        }
    }

    fn enter(&mut self, next: CallPhase) {
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "Call phase");
            self.phase = next;
        }
    }

    fn finish(&mut self, status: OverallStatus) {
        self.enter(match status {
            OverallStatus::Success => CallPhase::Done,
            OverallStatus::PartiallyFailed => CallPhase::PartiallyFailed,
            OverallStatus::Failed => CallPhase::Failed,
        });
    }
}

/// Client and signer for one chain.
#[derive(Clone)]
struct ChainHandle {
    client: Arc<dyn ChainClient>,
    signer: Arc<dyn TxSigner>,
}

/// Outcome of walking a plan.
struct PlanRun {
    outcomes: Vec<StepOutcome>,
    status: OverallStatus,
    terminal_logs: Vec<TxLog>,
    fees_paid: u128,
}

impl PlanRun {
    fn last_tx(&self) -> Result<TxResult, ExecutionError> {
        self.outcomes
            .last()
            .map(|o| o.tx.clone())
            .ok_or_else(|| ExecutionError::Build("plan produced no steps".into()))
    }

    fn step_succeeded(&self, kind: StepKind) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.step.kind == kind && o.tx.is_success())
    }
}

/// Correlation id for one logical call, e.g. `swap_3f2a9c01b7d4`.
#[must_use]
pub fn correlation_id(operation: OperationKind) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{operation}_{}", &id[..12])
}

fn operation_span(operation: OperationKind) -> Span {
    let id = correlation_id(operation);
    info_span!("operation", operation = %operation, correlation_id = %id)
}

/// Sequences plans into signed, submitted and confirmed transactions.
pub struct ExecutionOrchestrator {
    config: ExecutionConfig,
    protocols: ProtocolRegistry,
    tokens: TokenRegistry,
    pools: Arc<dyn PoolRegistry>,
    chains: HashMap<Chain, ChainHandle>,
    builder: TransactionBuilder,
    submitter: Submitter,
    quotes: QuoteEngine,
}

impl ExecutionOrchestrator {
    /// Creates an orchestrator with no chains attached.
    pub fn new(
        config: ExecutionConfig,
        protocols: ProtocolRegistry,
        tokens: TokenRegistry,
        pools: Arc<dyn PoolRegistry>,
    ) -> Self {
        let quotes = QuoteEngine::new(protocols.clone(), config.quote_ttl());
        Self {
            builder: TransactionBuilder::new(config.clone()),
            submitter: Submitter::new(config.submit.clone()),
            config,
            protocols,
            tokens,
            pools,
            chains: HashMap::new(),
            quotes,
        }
    }

    /// Attaches the client and signing wallet for the client's chain.
    pub fn with_chain(
        mut self,
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn TxSigner>,
    ) -> Result<Self, ExecutionError> {
        let chain = client.chain();
        if signer.family() != chain.family() {
            return Err(ExecutionError::Configuration(format!(
                "{chain} needs a {:?} signer, got {:?}",
                chain.family(),
                signer.family()
            )));
        }
        info!(chain = %chain, wallet = %signer.address(), "Attached chain");
        self.chains.insert(chain, ChainHandle { client, signer });
        Ok(self)
    }

    /// Engine settings.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Token registry used to resolve symbols.
    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Chains with a client and signer attached.
    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.chains.keys().copied().collect();
        chains.sort_by_key(|c| c.as_str());
        chains
    }

    /// Signing wallet on `chain`.
    pub fn wallet(&self, chain: Chain) -> Result<String, ExecutionError> {
        Ok(self.handle(chain)?.signer.address())
    }

    /// Quotes `amount` of `from` into `to` with the default slippage bound.
    pub async fn quote(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        chain: Chain,
    ) -> Result<QuoteResult, ExecutionError> {
        let slippage_bps = self.config.default_slippage_bps;
        let request = self.quote_request(from, to, amount, slippage_bps, chain)?;
        self.quotes.quote(&request).await
    }

    /// Swaps `amount` of `from` into `to` through the chain's aggregator.
    pub async fn swap(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        slippage_bps: u16,
        chain: Chain,
    ) -> Result<SwapResult, ExecutionError> {
        self.swap_inner(from, to, amount, slippage_bps, chain)
            .instrument(operation_span(OperationKind::Swap))
            .await
    }

    async fn swap_inner(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        slippage_bps: u16,
        chain: Chain,
    ) -> Result<SwapResult, ExecutionError> {
        let handle = self.handle(chain)?;
        let request = self.quote_request(from, to, amount, slippage_bps, chain)?;
        let owner = handle.signer.address();
        self.ensure_balance(handle, &owner, &request.from, request.amount_raw)
            .await?;

        let quote = self.quotes.quote(&request).await?;
        QuoteEngine::check(&quote, slippage_bps, Utc::now())?;

        let adapter = self.protocols.swap_adapter(chain)?;
        let before = self.read_balance(handle, &owner, &request.to).await;
        let operation = OperationRequest::Swap(SwapRequest {
            from: request.from.clone(),
            to: request.to.clone(),
            amount_raw: request.amount_raw,
            quote: quote.clone(),
        });
        let (_, run) = self
            .execute(adapter.as_ref(), &operation, chain, handle, &owner, slippage_bps)
            .await?;

        let fees_paid = run.fees_paid;
        let mut outcomes = run.outcomes;
        let terminal = outcomes
            .pop()
            .ok_or_else(|| ExecutionError::Build("swap plan produced no steps".into()))?;
        let mut result = SwapResult {
            from_token: request.from.symbol.clone(),
            to_token: request.to.symbol.clone(),
            from_amount: amount,
            actual_to_amount: None,
            tx_result: terminal.tx,
            quote,
            realized_price: None,
            slippage_bps: None,
            preparatory_steps: outcomes,
        };

        if result.is_success() {
            let after = self.read_balance(handle, &owner, &request.to).await;
            let native = request.to.is_native();
            let received = before
                .zip(after)
                .and_then(|(b, a)| metrics::received_amount(b, a, fees_paid, native));
            if let Some(raw) = received {
                let actual = request.to.to_ui(raw)?;
                result.actual_to_amount = Some(actual);
                result.realized_price = metrics::realized_price(amount, actual);
                result.slippage_bps = metrics::slippage_bps(result.quote.to_amount, actual);
            }
            info!(
                from = %result.from_token,
                to = %result.to_token,
                amount = %amount,
                expected = %result.quote.to_amount,
                actual = ?result.actual_to_amount,
                slippage_bps = ?result.slippage_bps,
                "Swap confirmed"
            );
        } else {
            warn!(
                status = ?result.tx_result.status(),
                error = ?result.tx_result.error,
                "Swap did not confirm"
            );
        }
        Ok(result)
    }

    /// Opens a liquidity position on `pool`.
    pub async fn open_position(
        &self,
        pool: &PoolId,
        range: PriceRange,
        amount0: Decimal,
        amount1: Decimal,
    ) -> Result<OpenPositionResult, ExecutionError> {
        self.open_position_inner(pool, range, amount0, amount1)
            .instrument(operation_span(OperationKind::OpenPosition))
            .await
    }

    async fn open_position_inner(
        &self,
        pool_id: &PoolId,
        range: PriceRange,
        amount0: Decimal,
        amount1: Decimal,
    ) -> Result<OpenPositionResult, ExecutionError> {
        let pool = self.pools.get(pool_id)?;
        let handle = self.handle(pool.chain)?;
        let owner = handle.signer.address();
        let (amount0_raw, amount1_raw) = self.deposit_amounts(&pool, amount0, amount1)?;
        self.ensure_balance(handle, &owner, &pool.token0, amount0_raw)
            .await?;
        self.ensure_balance(handle, &owner, &pool.token1, amount1_raw)
            .await?;

        let adapter = self.protocols.adapter(pool.chain, pool.protocol)?;
        let operation = OperationRequest::OpenPosition(OpenPositionRequest {
            pool: pool.clone(),
            range,
            amount0_raw,
            amount1_raw,
        });
        let (plan, run) = self
            .execute(
                adapter.as_ref(),
                &operation,
                pool.chain,
                handle,
                &owner,
                self.config.default_slippage_bps,
            )
            .await?;

        let position = if run.status == OverallStatus::Success {
            let chain_ref = plan
                .position_ref
                .clone()
                .or_else(|| adapter.position_id_from_logs(&run.terminal_logs));
            match chain_ref {
                Some(chain_ref) => {
                    let (lower, upper) = plan.resolved_range.unwrap_or_default();
                    let position = Position::open(
                        chain_ref,
                        owner.clone(),
                        pool.id.clone(),
                        plan.liquidity_delta.unwrap_or_default(),
                        range,
                        lower,
                        upper,
                    );
                    info!(
                        pool = %pool.id,
                        position = %position.chain_position_id,
                        lower,
                        upper,
                        "Position opened"
                    );
                    Some(position)
                }
                None => {
                    warn!(pool = %pool.id, "Position confirmed but its on-chain id is unknown");
                    None
                }
            }
        } else {
            None
        };

        Ok(OpenPositionResult {
            steps: run.outcomes,
            overall_status: run.status,
            position,
        })
    }

    /// Deposits more tokens into an open position.
    pub async fn add_liquidity(
        &self,
        position: &mut Position,
        amount0: Decimal,
        amount1: Decimal,
    ) -> Result<TxResult, ExecutionError> {
        self.add_liquidity_inner(position, amount0, amount1)
            .instrument(operation_span(OperationKind::AddLiquidity))
            .await
    }

    async fn add_liquidity_inner(
        &self,
        position: &mut Position,
        amount0: Decimal,
        amount1: Decimal,
    ) -> Result<TxResult, ExecutionError> {
        let (pool, handle, owner) = self.position_context(position)?;
        let (amount0_raw, amount1_raw) = self.deposit_amounts(&pool, amount0, amount1)?;
        self.ensure_balance(handle, &owner, &pool.token0, amount0_raw)
            .await?;
        self.ensure_balance(handle, &owner, &pool.token1, amount1_raw)
            .await?;

        let adapter = self.protocols.adapter(pool.chain, pool.protocol)?;
        let operation = OperationRequest::AddLiquidity(AddLiquidityRequest {
            pool: pool.clone(),
            position: position.clone(),
            amount0_raw,
            amount1_raw,
        });
        let (plan, run) = self
            .execute(
                adapter.as_ref(),
                &operation,
                pool.chain,
                handle,
                &owner,
                self.config.default_slippage_bps,
            )
            .await?;

        if run.status == OverallStatus::Success {
            let added = plan.liquidity_delta.unwrap_or_default();
            position.liquidity = position.liquidity.saturating_add(added);
            info!(position = %position.chain_position_id, added, "Liquidity added");
        }
        run.last_tx()
    }

    /// Withdraws `percent` (1..=100) of a position's liquidity.
    pub async fn remove_liquidity(
        &self,
        position: &mut Position,
        percent: u8,
    ) -> Result<TxResult, ExecutionError> {
        self.remove_liquidity_inner(position, percent)
            .instrument(operation_span(OperationKind::RemoveLiquidity))
            .await
    }

    async fn remove_liquidity_inner(
        &self,
        position: &mut Position,
        percent: u8,
    ) -> Result<TxResult, ExecutionError> {
        if percent == 0 || percent > 100 {
            return Err(ExecutionError::InvalidInput(format!(
                "percent must be within 1..=100, got {percent}"
            )));
        }
        let (pool, handle, owner) = self.position_context(position)?;
        if position.liquidity == 0 {
            return Err(ExecutionError::InvalidInput(format!(
                "position {} has no liquidity",
                position.chain_position_id
            )));
        }

        let adapter = self.protocols.adapter(pool.chain, pool.protocol)?;
        let operation = OperationRequest::RemoveLiquidity(RemoveLiquidityRequest {
            pool: pool.clone(),
            position: position.clone(),
            percent,
        });
        let (plan, run) = self
            .execute(
                adapter.as_ref(),
                &operation,
                pool.chain,
                handle,
                &owner,
                self.config.default_slippage_bps,
            )
            .await?;

        if run.status == OverallStatus::Success {
            let removed = plan
                .liquidity_delta
                .unwrap_or_else(|| position.liquidity_share(percent));
            position.liquidity = position.liquidity.saturating_sub(removed);
            info!(
                position = %position.chain_position_id,
                removed,
                remaining = position.liquidity,
                "Liquidity removed"
            );
        }
        run.last_tx()
    }

    /// Collects accrued fees without touching liquidity.
    pub async fn claim_fees(&self, position: &Position) -> Result<TxResult, ExecutionError> {
        self.claim_fees_inner(position)
            .instrument(operation_span(OperationKind::ClaimFees))
            .await
    }

    async fn claim_fees_inner(&self, position: &Position) -> Result<TxResult, ExecutionError> {
        let (pool, handle, owner) = self.position_context(position)?;
        let adapter = self.protocols.adapter(pool.chain, pool.protocol)?;
        let operation = OperationRequest::ClaimFees(PositionRequest {
            pool: pool.clone(),
            position: position.clone(),
        });
        let (_, run) = self
            .execute(
                adapter.as_ref(),
                &operation,
                pool.chain,
                handle,
                &owner,
                self.config.default_slippage_bps,
            )
            .await?;
        run.last_tx()
    }

    /// Withdraws all liquidity, claims fees and closes the position.
    ///
    /// On a partial failure the position is marked `PartiallyClosed` and the
    /// result lists exactly the steps that ran.
    pub async fn close_position(
        &self,
        position: &mut Position,
    ) -> Result<ClosePositionResult, ExecutionError> {
        self.close_position_inner(position)
            .instrument(operation_span(OperationKind::ClosePosition))
            .await
    }

    async fn close_position_inner(
        &self,
        position: &mut Position,
    ) -> Result<ClosePositionResult, ExecutionError> {
        let (pool, handle, owner) = self.position_context(position)?;
        let adapter = self.protocols.adapter(pool.chain, pool.protocol)?;
        let operation = OperationRequest::ClosePosition(PositionRequest {
            pool: pool.clone(),
            position: position.clone(),
        });
        let (_, run) = self
            .execute(
                adapter.as_ref(),
                &operation,
                pool.chain,
                handle,
                &owner,
                self.config.default_slippage_bps,
            )
            .await?;

        if run.step_succeeded(StepKind::RemoveLiquidity) {
            position.liquidity = 0;
        }
        if run.status == OverallStatus::Success {
            position.transition(PositionStatus::Closed)?;
            position.liquidity = 0;
            info!(position = %position.chain_position_id, "Position closed");
        } else if run.outcomes.iter().any(|o| o.tx.is_success()) {
            position.transition(PositionStatus::PartiallyClosed)?;
            warn!(
                position = %position.chain_position_id,
                completed = run.outcomes.len() - 1,
                "Close halted part way"
            );
        }

        Ok(ClosePositionResult {
            steps: run.outcomes,
            overall_status: run.status,
            position_status: position.status(),
        })
    }

    fn handle(&self, chain: Chain) -> Result<&ChainHandle, ExecutionError> {
        self.chains
            .get(&chain)
            .ok_or_else(|| ExecutionError::UnsupportedChain(format!("{chain} is not configured")))
    }

    fn context(&self, chain: Chain, owner: &str, slippage_bps: u16) -> ChainContext {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        ChainContext {
            chain,
            owner: owner.to_string(),
            slippage_bps,
            deadline: now + self.config.deadline_secs,
        }
    }

    fn quote_request(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        slippage_bps: u16,
        chain: Chain,
    ) -> Result<QuoteRequest, ExecutionError> {
        if amount <= Decimal::ZERO {
            return Err(ExecutionError::InvalidInput(format!(
                "amount must be positive, got {amount}"
            )));
        }
        let from = self.tokens.resolve(chain, from)?;
        let to = self.tokens.resolve(chain, to)?;
        let amount_raw = from.to_raw(amount)?;
        Ok(QuoteRequest {
            chain,
            from,
            to,
            amount,
            amount_raw,
            slippage_bps,
        })
    }

    fn deposit_amounts(
        &self,
        pool: &Pool,
        amount0: Decimal,
        amount1: Decimal,
    ) -> Result<(U256, U256), ExecutionError> {
        let amount0_raw = pool.token0.to_raw(amount0)?;
        let amount1_raw = pool.token1.to_raw(amount1)?;
        if amount0_raw.is_zero() && amount1_raw.is_zero() {
            return Err(ExecutionError::InvalidInput(
                "at least one deposit amount must be positive".into(),
            ));
        }
        Ok((amount0_raw, amount1_raw))
    }

    /// Resolves the pool and wallet for an existing position.
    fn position_context(
        &self,
        position: &Position,
    ) -> Result<(Pool, &ChainHandle, String), ExecutionError> {
        if !position.is_active() {
            return Err(ExecutionError::PositionNotFound(format!(
                "position {} is closed",
                position.chain_position_id
            )));
        }
        let pool = self.pools.get(&position.pool)?;
        let handle = self.handle(pool.chain)?;
        let owner = handle.signer.address();
        if !owner.eq_ignore_ascii_case(&position.owner) {
            return Err(ExecutionError::InvalidInput(format!(
                "position {} is owned by {}, wallet is {owner}",
                position.chain_position_id, position.owner
            )));
        }
        Ok((pool, handle, owner))
    }

    async fn ensure_balance(
        &self,
        handle: &ChainHandle,
        owner: &str,
        token: &Token,
        required: U256,
    ) -> Result<(), ExecutionError> {
        if required.is_zero() {
            return Ok(());
        }
        match handle.client.balance(owner, token).await {
            Ok(available) if available < required => Err(ExecutionError::InsufficientFunds {
                token: token.symbol.clone(),
                required: token.to_ui(required)?,
                available: token.to_ui(available)?,
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(token = %token.symbol, error = %e, "Balance check skipped");
                Ok(())
            }
        }
    }

    async fn read_balance(&self, handle: &ChainHandle, owner: &str, token: &Token) -> Option<U256> {
        match handle.client.balance(owner, token).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(token = %token.symbol, error = %e, "Balance unavailable");
                None
            }
        }
    }

    /// Builds the plan for `request` and walks it.
    async fn execute(
        &self,
        adapter: &dyn ChainAdapter,
        request: &OperationRequest,
        chain: Chain,
        handle: &ChainHandle,
        owner: &str,
        slippage_bps: u16,
    ) -> Result<(OperationPlan, PlanRun), ExecutionError> {
        let mut call = CallTracker::new();
        call.enter(CallPhase::Building);
        let ctx = self.context(chain, owner, slippage_bps);
        let plan = adapter.build(request, &ctx).await?;
        info!(
            protocol = %adapter.protocol(),
            chain = %chain,
            steps = plan.len(),
            "Built plan"
        );
        let run = self.run_plan(&plan, handle, &mut call).await;
        Ok((plan, run))
    }

    async fn run_plan(
        &self,
        plan: &OperationPlan,
        handle: &ChainHandle,
        call: &mut CallTracker,
    ) -> PlanRun {
        let mut outcomes = Vec::with_capacity(plan.len());
        let mut terminal_logs = Vec::new();
        let mut fees_paid = 0u128;

        for group in &plan.steps {
            info!(
                step = group.step.index,
                kind = %group.step.kind,
                terminal = group.step.terminal,
                "Executing step"
            );
            let (submission, fees) = self.run_step(plan.chain, group, handle, call).await;
            fees_paid = fees_paid.saturating_add(fees);
            let confirmed = submission.is_confirmed();
            if group.step.terminal {
                terminal_logs = submission.logs;
            }
            outcomes.push(StepOutcome {
                step: group.step,
                tx: submission.tx,
            });
            if !confirmed {
                warn!(
                    step = group.step.index,
                    kind = %group.step.kind,
                    remaining = plan.len() - outcomes.len(),
                    "Step failed, halting"
                );
                break;
            }
        }

        let status = OverallStatus::aggregate(&outcomes, plan.len());
        call.finish(status);
        PlanRun {
            outcomes,
            status,
            terminal_logs,
            fees_paid,
        }
    }

    /// Runs every envelope of one step. The step's result is the last
    /// envelope's, or the first one that did not confirm.
    async fn run_step(
        &self,
        chain: Chain,
        group: &StepGroup,
        handle: &ChainHandle,
        call: &mut CallTracker,
    ) -> (Submission, u128) {
        call.enter(CallPhase::Building);
        let market = match handle.client.fee_market().await {
            Ok(market) => market,
            Err(e) => return (Submission::rejected(chain, &e.into()), 0),
        };
        let envelopes = match self.builder.build_step(chain, group, &market) {
            Ok(envelopes) => envelopes,
            Err(e) => return (Submission::rejected(chain, &e), 0),
        };

        let mut fees = 0u128;
        let mut last = None;
        for envelope in &envelopes {
            let submission = self.run_envelope(chain, handle, envelope, call).await;
            fees = fees.saturating_add(submission.tx.fee_paid.unwrap_or_default());
            let confirmed = submission.is_confirmed();
            last = Some(submission);
            if !confirmed {
                break;
            }
        }
        let submission = last.unwrap_or_else(|| {
            Submission::rejected(
                chain,
                &ExecutionError::Build(format!("step {} produced no envelopes", group.step.index)),
            )
        });
        (submission, fees)
    }

    async fn run_envelope(
        &self,
        chain: Chain,
        handle: &ChainHandle,
        envelope: &Envelope,
        call: &mut CallTracker,
    ) -> Submission {
        let client = handle.client.as_ref();
        let _sequence = handle.signer.sequence_lock().lock().await;

        call.enter(CallPhase::Submitting);
        let payload = match handle.signer.sign(envelope, client).await {
            Ok(payload) => payload,
            Err(e) => return Submission::rejected(chain, &e),
        };
        let signature = match self.submitter.send(client, &payload).await {
            Ok((signature, _)) => signature,
            Err(submission) => return submission,
        };

        call.enter(CallPhase::Confirming);
        let mut submission = self.submitter.confirm(client, &signature).await;
        if submission.is_confirmed() && submission.tx.fee_paid.is_none() {
            submission.tx.fee_paid = envelope.estimated_fee();
        }
        submission
    }
}
