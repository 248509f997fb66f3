//! The adapter seam between logical operations and chain primitives.

use crate::error::AdapterError;
use crate::plan::OperationPlan;
use crate::request::{
    AddLiquidityRequest, ChainContext, OpenPositionRequest, OperationRequest, PositionRequest,
    RemoveLiquidityRequest, SwapRequest,
};
use crate::rpc::evm::TxLog;
use async_trait::async_trait;
use xdex_domain::chain::Chain;
use xdex_domain::enums::{OperationKind, Protocol};

/// Translates operations into ordered primitive groups for one protocol.
///
/// Implementations must not mutate shared state. Network reads are limited
/// to what is needed to size the primitives (pool state, aggregator routes).
/// The `build_*` defaults reject the operation, so a variant only overrides
/// what it declares in [`ChainAdapter::capabilities`].
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Protocol tag.
    fn protocol(&self) -> Protocol;

    /// Chains this instance serves.
    fn chains(&self) -> &[Chain];

    /// Operations this adapter implements.
    fn capabilities(&self) -> &[OperationKind];

    /// Returns true if the adapter implements `kind`.
    fn supports(&self, kind: OperationKind) -> bool {
        self.capabilities().contains(&kind)
    }

    /// Builds a validated plan for `request`.
    async fn build(
        &self,
        request: &OperationRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let kind = request.kind();
        if !self.supports(kind) {
            return Err(self.unsupported(kind));
        }
        if !self.chains().contains(&ctx.chain) {
            return Err(AdapterError::UnsupportedChain {
                protocol: self.protocol(),
                chain: ctx.chain,
            });
        }
        let plan = match request {
            OperationRequest::Swap(r) => self.build_swap(r, ctx).await?,
            OperationRequest::OpenPosition(r) => self.build_open_position(r, ctx).await?,
            OperationRequest::AddLiquidity(r) => self.build_add_liquidity(r, ctx).await?,
            OperationRequest::RemoveLiquidity(r) => self.build_remove_liquidity(r, ctx).await?,
            OperationRequest::ClaimFees(r) => self.build_claim_fees(r, ctx).await?,
            OperationRequest::ClosePosition(r) => self.build_close_position(r, ctx).await?,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Builds a swap.
    async fn build_swap(
        &self,
        _request: &SwapRequest,
        _ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        Err(self.unsupported(OperationKind::Swap))
    }

    /// Builds a position open.
    async fn build_open_position(
        &self,
        _request: &OpenPositionRequest,
        _ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        Err(self.unsupported(OperationKind::OpenPosition))
    }

    /// Builds a liquidity deposit.
    async fn build_add_liquidity(
        &self,
        _request: &AddLiquidityRequest,
        _ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        Err(self.unsupported(OperationKind::AddLiquidity))
    }

    /// Builds a liquidity withdrawal.
    async fn build_remove_liquidity(
        &self,
        _request: &RemoveLiquidityRequest,
        _ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        Err(self.unsupported(OperationKind::RemoveLiquidity))
    }

    /// Builds a fee claim.
    async fn build_claim_fees(
        &self,
        _request: &PositionRequest,
        _ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        Err(self.unsupported(OperationKind::ClaimFees))
    }

    /// Builds a close sequence.
    async fn build_close_position(
        &self,
        _request: &PositionRequest,
        _ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        Err(self.unsupported(OperationKind::ClosePosition))
    }

    /// Extracts a newly minted position id from receipt logs.
    fn position_id_from_logs(&self, _logs: &[TxLog]) -> Option<String> {
        None
    }

    /// Capability-mismatch error for `operation`.
    fn unsupported(&self, operation: OperationKind) -> AdapterError {
        AdapterError::CapabilityMismatch {
            protocol: self.protocol(),
            operation,
        }
    }
}
