//! Operation plans: ordered, independently submittable step groups.

use crate::error::AdapterError;
use primitive_types::U256;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use std::fmt;
use std::sync::Arc;
use xdex_domain::chain::{Chain, ChainFamily};
use xdex_domain::enums::{OperationKind, StepKind};
use xdex_domain::value_objects::ExecutionStep;

/// Contract call on an account/nonce chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Target contract address.
    pub to: String,
    /// ABI-encoded calldata.
    pub data: Vec<u8>,
    /// Native value sent with the call.
    pub value: U256,
    /// Gas estimate supplied by the adapter or aggregator.
    pub gas_limit: Option<u64>,
    /// Legacy gas price suggested by an aggregator.
    pub gas_price: Option<U256>,
}

impl ContractCall {
    /// Call without value or gas hints.
    #[must_use]
    pub fn new(to: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            to: to.into(),
            data,
            value: U256::zero(),
            gas_limit: None,
            gas_price: None,
        }
    }

    /// Sets the gas estimate.
    #[must_use]
    pub fn with_gas_limit(mut self, gas: u64) -> Self {
        self.gas_limit = Some(gas);
        self
    }

    /// Sets the native value.
    #[must_use]
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Chain-native operation primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    /// Solana instruction.
    Instruction(Instruction),
    /// EVM contract call.
    ContractCall(ContractCall),
}

impl Primitive {
    /// Transaction model this primitive belongs to.
    #[must_use]
    pub fn family(&self) -> ChainFamily {
        match self {
            Primitive::Instruction(_) => ChainFamily::Solana,
            Primitive::ContractCall(_) => ChainFamily::Evm,
        }
    }
}

/// Primitives carried by one execution step.
pub struct StepGroup {
    /// Step descriptor.
    pub step: ExecutionStep,
    /// Primitives in order.
    pub primitives: Vec<Primitive>,
    /// Extra keypairs that must co-sign (fresh position mints or accounts).
    pub co_signers: Vec<Arc<Keypair>>,
}

impl StepGroup {
    /// Step group without co-signers.
    #[must_use]
    pub fn new(step: ExecutionStep, primitives: Vec<Primitive>) -> Self {
        Self {
            step,
            primitives,
            co_signers: Vec::new(),
        }
    }

    /// Adds a co-signer.
    #[must_use]
    pub fn with_co_signer(mut self, keypair: Arc<Keypair>) -> Self {
        self.co_signers.push(keypair);
        self
    }
}

impl fmt::Debug for StepGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let co_signers: Vec<String> = self
            .co_signers
            .iter()
            .map(|k| k.pubkey().to_string())
            .collect();
        f.debug_struct("StepGroup")
            .field("step", &self.step)
            .field("primitives", &self.primitives.len())
            .field("co_signers", &co_signers)
            .finish()
    }
}

/// Ordered plan for one logical operation.
#[derive(Debug)]
pub struct OperationPlan {
    /// Operation the plan implements.
    pub operation: OperationKind,
    /// Target chain.
    pub chain: Chain,
    /// Steps in execution order.
    pub steps: Vec<StepGroup>,
    /// Chain-native handle of the position created or touched, if known.
    pub position_ref: Option<String>,
    /// Resolved lower and upper tick or bin ids for new positions.
    pub resolved_range: Option<(i32, i32)>,
    /// Liquidity the plan adds (positive) or removes, when known up front.
    pub liquidity_delta: Option<u128>,
}

impl OperationPlan {
    /// Empty plan.
    #[must_use]
    pub fn new(operation: OperationKind, chain: Chain) -> Self {
        Self {
            operation,
            chain,
            steps: Vec::new(),
            position_ref: None,
            resolved_range: None,
            liquidity_delta: None,
        }
    }

    /// Single-step plan; the step is terminal.
    #[must_use]
    pub fn single(
        operation: OperationKind,
        chain: Chain,
        kind: StepKind,
        primitives: Vec<Primitive>,
    ) -> Self {
        let mut plan = Self::new(operation, chain);
        plan.push(kind, true, primitives);
        plan
    }

    /// Appends a step with the next index and returns it for co-signers.
    pub fn push(
        &mut self,
        kind: StepKind,
        terminal: bool,
        primitives: Vec<Primitive>,
    ) -> &mut StepGroup {
        let index = self.steps.len();
        self.steps
            .push(StepGroup::new(ExecutionStep::new(index, kind, terminal), primitives));
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    /// Sets the position handle.
    #[must_use]
    pub fn with_position_ref(mut self, position: impl Into<String>) -> Self {
        self.position_ref = Some(position.into());
        self
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks ordering rules: at least one step, contiguous indices, every
    /// step has primitives of the chain's family, exactly one terminal step
    /// and it comes last.
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.steps.is_empty() {
            return Err(AdapterError::InvalidPlan("plan has no steps".into()));
        }
        let family = self.chain.family();
        for (i, group) in self.steps.iter().enumerate() {
            if group.step.index != i {
                return Err(AdapterError::InvalidPlan(format!(
                    "step {} found at position {i}",
                    group.step.index
                )));
            }
            if group.primitives.is_empty() {
                return Err(AdapterError::InvalidPlan(format!("step {i} is empty")));
            }
            if group.primitives.iter().any(|p| p.family() != family) {
                return Err(AdapterError::InvalidPlan(format!(
                    "step {i} mixes primitives for another chain family"
                )));
            }
        }
        let terminals = self.steps.iter().filter(|g| g.step.terminal).count();
        let last_terminal = self.steps.last().is_some_and(|g| g.step.terminal);
        if terminals != 1 || !last_terminal {
            return Err(AdapterError::InvalidPlan(
                "exactly one terminal step is required and it must be last".into(),
            ));
        }
        Ok(())
    }

    /// Step descriptors in order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ExecutionStep> {
        self.steps.iter().map(|g| g.step).collect()
    }
}
