//! Multi-step execution results.

use crate::entities::position::Position;
use crate::enums::{PositionStatus, StepKind};
use crate::value_objects::quote::QuoteResult;
use crate::value_objects::tx_result::{TxResult, TxStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One ordered step of a logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Position in the sequence, starting at zero.
    pub index: usize,
    /// What the step does.
    pub kind: StepKind,
    /// Failure of this step ends the logical operation irrecoverably.
    pub terminal: bool,
}

impl ExecutionStep {
    /// Creates a new step.
    #[must_use]
    pub fn new(index: usize, kind: StepKind, terminal: bool) -> Self {
        Self {
            index,
            kind,
            terminal,
        }
    }
}

/// A step together with the transaction that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step descriptor.
    pub step: ExecutionStep,
    /// Transaction result.
    pub tx: TxResult,
}

/// Aggregated status of a logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    /// Every step succeeded.
    Success,
    /// A multi-step sequence halted after its first failing step.
    PartiallyFailed,
    /// The only step failed or timed out.
    Failed,
}

impl OverallStatus {
    /// Aggregates step outcomes.
    ///
    /// Success iff the list is non-empty and every step succeeded. A failing
    /// single step is `Failed`; any failure in a longer plan is
    /// `PartiallyFailed`.
    #[must_use]
    pub fn aggregate(outcomes: &[StepOutcome], planned_steps: usize) -> Self {
        let all_ok = !outcomes.is_empty() && outcomes.iter().all(|o| o.tx.is_success());
        if all_ok && outcomes.len() == planned_steps {
            OverallStatus::Success
        } else if planned_steps <= 1 {
            OverallStatus::Failed
        } else {
            OverallStatus::PartiallyFailed
        }
    }
}

/// Result of a swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapResult {
    /// Input token symbol.
    pub from_token: String,
    /// Output token symbol.
    pub to_token: String,
    /// Input amount in UI units.
    pub from_amount: Decimal,
    /// Output amount actually received, if measurable.
    pub actual_to_amount: Option<Decimal>,
    /// Swap transaction.
    pub tx_result: TxResult,
    /// Quote used to validate the swap.
    pub quote: QuoteResult,
    /// Output per input actually achieved.
    pub realized_price: Option<Decimal>,
    /// Signed slippage versus the quote; positive is worse than quoted.
    pub slippage_bps: Option<i64>,
    /// Preparatory steps such as token approvals.
    pub preparatory_steps: Vec<StepOutcome>,
}

impl SwapResult {
    /// Returns true if the swap confirmed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.tx_result.status() == TxStatus::Success
    }
}

/// Result of opening a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPositionResult {
    /// Executed steps in order.
    pub steps: Vec<StepOutcome>,
    /// Aggregated status.
    pub overall_status: OverallStatus,
    /// New position, present once the terminal step confirmed.
    pub position: Option<Position>,
}

/// Result of closing a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePositionResult {
    /// Executed steps in order; nothing follows a failed step.
    pub steps: Vec<StepOutcome>,
    /// Aggregated status.
    pub overall_status: OverallStatus,
    /// Lifecycle state of the position after the call.
    pub position_status: PositionStatus,
}

impl ClosePositionResult {
    /// Last known transaction state.
    #[must_use]
    pub fn last_tx(&self) -> Option<&TxResult> {
        self.steps.last().map(|s| &s.tx)
    }
}
