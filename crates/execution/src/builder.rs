//! Turns step primitives into signable envelopes.
//!
//! Solana steps become one transaction carrying every instruction of the
//! step, prefixed with compute budget instructions. EVM steps become one
//! transaction per contract call, priced under exactly one fee model.

use crate::client::FeeMarket;
use crate::config::{EvmFeeConfig, EvmFeeMode, ExecutionConfig, SolanaFeeConfig};
use crate::error::ExecutionError;
use primitive_types::U256;
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Keypair;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use xdex_domain::chain::{Chain, ChainFamily};
use xdex_protocols::{ContractCall, Primitive, StepGroup};

/// Base fee per signature in lamports.
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Unsigned Solana transaction contents.
pub struct SolanaEnvelope {
    /// Instructions in order, compute budget first.
    pub instructions: Vec<Instruction>,
    /// Extra signers required by the instructions.
    pub co_signers: Vec<Arc<Keypair>>,
    /// Expected fee in lamports.
    pub estimated_fee: u64,
}

impl fmt::Debug for SolanaEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaEnvelope")
            .field("instructions", &self.instructions.len())
            .field("co_signers", &self.co_signers.len())
            .field("estimated_fee", &self.estimated_fee)
            .finish()
    }
}

/// Unsigned EVM transaction fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmEnvelope {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Target contract.
    pub to: String,
    /// Calldata.
    pub data: Vec<u8>,
    /// Native value.
    pub value: U256,
    /// Gas limit after the safety multiplier.
    pub gas_limit: u64,
    /// Legacy gas price.
    pub gas_price: Option<U256>,
    /// Dynamic fee cap.
    pub max_fee_per_gas: Option<U256>,
    /// Dynamic priority tip.
    pub max_priority_fee_per_gas: Option<U256>,
}

impl EvmEnvelope {
    /// Prices the envelope under `mode`, clearing the other model's fields.
    ///
    /// Dynamic pricing needs a base fee; without one the envelope falls back
    /// to legacy pricing.
    pub fn apply_fee_mode(&mut self, mode: EvmFeeMode, market: &FeeMarket, tip: U256) {
        match (mode, market.base_fee) {
            (EvmFeeMode::Dynamic, Some(base_fee)) => {
                let max_fee = base_fee.saturating_mul(U256::from(2u8)).saturating_add(tip);
                self.max_fee_per_gas = Some(max_fee);
                self.max_priority_fee_per_gas = Some(tip);
                self.gas_price = None;
            }
            (mode, _) => {
                if mode == EvmFeeMode::Dynamic {
                    warn!(chain_id = self.chain_id, "No base fee reported, using legacy gas price");
                }
                let suggested = self.gas_price.unwrap_or_default();
                self.gas_price = Some(market.gas_price.max(suggested));
                self.max_fee_per_gas = None;
                self.max_priority_fee_per_gas = None;
            }
        }
    }

    /// Upper bound of the fee in wei.
    #[must_use]
    pub fn max_fee(&self) -> U256 {
        let per_gas = self
            .gas_price
            .or(self.max_fee_per_gas)
            .unwrap_or_default();
        per_gas.saturating_mul(U256::from(self.gas_limit))
    }
}

/// Signable envelope.
#[derive(Debug)]
pub enum Envelope {
    /// Solana transaction.
    Solana(SolanaEnvelope),
    /// EVM transaction.
    Evm(EvmEnvelope),
}

impl Envelope {
    /// Fee the builder expects the transaction to pay.
    #[must_use]
    pub fn estimated_fee(&self) -> Option<u128> {
        match self {
            Envelope::Solana(env) => Some(u128::from(env.estimated_fee)),
            Envelope::Evm(env) => {
                let fee = env.max_fee();
                (fee.bits() <= 128).then(|| fee.as_u128())
            }
        }
    }
}

/// Builds envelopes from step primitives and fee settings.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    config: ExecutionConfig,
}

impl TransactionBuilder {
    /// Creates a builder with the given fee settings.
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Builds the envelopes for one step on `chain`.
    pub fn build_step(
        &self,
        chain: Chain,
        group: &StepGroup,
        market: &FeeMarket,
    ) -> Result<Vec<Envelope>, ExecutionError> {
        match chain.family() {
            ChainFamily::Solana => Ok(vec![Envelope::Solana(self.build_solana(
                &group.primitives,
                &group.co_signers,
            )?)]),
            ChainFamily::Evm => {
                let calls = evm_calls(&group.primitives)?;
                let fees = self.config.evm_fees(chain)?;
                calls
                    .into_iter()
                    .map(|call| self.build_evm(chain, call, fees, market).map(Envelope::Evm))
                    .collect()
            }
        }
    }

    /// Builds a Solana envelope.
    pub fn build_solana(
        &self,
        primitives: &[Primitive],
        co_signers: &[Arc<Keypair>],
    ) -> Result<SolanaEnvelope, ExecutionError> {
        if primitives.is_empty() {
            return Err(ExecutionError::Build("no instructions to build".into()));
        }
        let SolanaFeeConfig {
            compute_unit_limit,
            compute_unit_price_micro_lamports,
        } = self.config.solana;

        let mut instructions = Vec::with_capacity(primitives.len() + 2);
        if compute_unit_limit > 0 {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
                compute_unit_limit,
            ));
        }
        if compute_unit_price_micro_lamports > 0 {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
                compute_unit_price_micro_lamports,
            ));
        }
        for primitive in primitives {
            match primitive {
                Primitive::Instruction(ix) => instructions.push(ix.clone()),
                Primitive::ContractCall(call) => {
                    return Err(ExecutionError::Build(format!(
                        "contract call to {} in a Solana step",
                        call.to
                    )));
                }
            }
        }

        let signers = 1 + co_signers.len() as u64;
        let priority = u128::from(compute_unit_limit)
            * u128::from(compute_unit_price_micro_lamports)
            / 1_000_000;
        let estimated_fee = LAMPORTS_PER_SIGNATURE * signers + priority as u64;
        debug!(
            instructions = instructions.len(),
            signers,
            estimated_fee,
            "Built Solana envelope"
        );
        Ok(SolanaEnvelope {
            instructions,
            co_signers: co_signers.to_vec(),
            estimated_fee,
        })
    }

    /// Builds an EVM envelope for one call.
    pub fn build_evm(
        &self,
        chain: Chain,
        call: &ContractCall,
        fees: &EvmFeeConfig,
        market: &FeeMarket,
    ) -> Result<EvmEnvelope, ExecutionError> {
        if call.data.is_empty() {
            return Err(ExecutionError::Build(format!("empty calldata for {}", call.to)));
        }
        let chain_id = chain
            .chain_id()
            .ok_or_else(|| ExecutionError::UnsupportedChain(format!("{chain} has no chain id")))?;
        let gas = call.gas_limit.unwrap_or(fees.default_gas_limit);
        let gas_limit = (gas as f64 * fees.gas_limit_multiplier).ceil() as u64;

        let mut envelope = EvmEnvelope {
            chain_id,
            to: call.to.clone(),
            data: call.data.clone(),
            value: call.value,
            gas_limit,
            gas_price: call.gas_price,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        };
        envelope.apply_fee_mode(fees.mode, market, U256::from(fees.priority_fee_wei));
        debug!(
            chain = %chain,
            to = %envelope.to,
            gas_limit,
            mode = ?fees.mode,
            "Built EVM envelope"
        );
        Ok(envelope)
    }
}

fn evm_calls(primitives: &[Primitive]) -> Result<Vec<&ContractCall>, ExecutionError> {
    if primitives.is_empty() {
        return Err(ExecutionError::Build("no contract calls to build".into()));
    }
    primitives
        .iter()
        .map(|p| match p {
            Primitive::ContractCall(call) => Ok(call),
            Primitive::Instruction(ix) => Err(ExecutionError::Build(format!(
                "Solana instruction for {} in an EVM step",
                ix.program_id
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;
    use xdex_domain::enums::StepKind;
    use xdex_domain::value_objects::ExecutionStep;

    fn instruction(tag: u8) -> Primitive {
        Primitive::Instruction(Instruction::new_with_bytes(Pubkey::new_unique(), &[tag], vec![]))
    }

    fn call(gas: Option<u64>) -> ContractCall {
        let mut call =
            ContractCall::new("0xC36442b4a4522E871399CD717aBDD847Ab11FE88", vec![1, 2, 3, 4]);
        call.gas_limit = gas;
        call
    }

    fn market() -> FeeMarket {
        FeeMarket {
            base_fee: Some(U256::from(20_000_000_000u64)),
            gas_price: U256::from(25_000_000_000u64),
        }
    }

    #[test]
    fn test_solana_compute_budget_and_fee() {
        let builder = TransactionBuilder::new(ExecutionConfig::default());
        let co_signer = Arc::new(Keypair::new());
        let env = builder
            .build_solana(&[instruction(7)], &[co_signer])
            .unwrap();
        assert_eq!(env.instructions.len(), 3);
        assert_eq!(
            env.instructions[0],
            ComputeBudgetInstruction::set_compute_unit_limit(200_000)
        );
        assert_eq!(
            env.instructions[1],
            ComputeBudgetInstruction::set_compute_unit_price(10_000)
        );
        assert_eq!(env.instructions[2].data, vec![7]);
        // 2 signatures + 200_000 CU * 10_000 µ-lamports
        assert_eq!(env.estimated_fee, 12_000);
    }

    #[test]
    fn test_solana_zero_budget_adds_nothing() {
        let mut config = ExecutionConfig::default();
        config.solana.compute_unit_limit = 0;
        config.solana.compute_unit_price_micro_lamports = 0;
        let env = TransactionBuilder::new(config)
            .build_solana(&[instruction(1)], &[])
            .unwrap();
        assert_eq!(env.instructions.len(), 1);
        assert_eq!(env.estimated_fee, LAMPORTS_PER_SIGNATURE);
    }

    #[test]
    fn test_empty_and_mismatched_primitives_rejected() {
        let builder = TransactionBuilder::new(ExecutionConfig::default());
        assert!(matches!(
            builder.build_solana(&[], &[]),
            Err(ExecutionError::Build(_))
        ));
        assert!(matches!(
            builder.build_solana(&[Primitive::ContractCall(call(None))], &[]),
            Err(ExecutionError::Build(_))
        ));

        let group = StepGroup::new(
            ExecutionStep::new(0, StepKind::Swap, true),
            vec![instruction(1)],
        );
        assert!(matches!(
            builder.build_step(Chain::Ethereum, &group, &market()),
            Err(ExecutionError::Build(_))
        ));
        let empty = StepGroup::new(ExecutionStep::new(0, StepKind::Swap, true), vec![]);
        assert!(builder.build_step(Chain::Bsc, &empty, &market()).is_err());
    }

    #[test]
    fn test_evm_dynamic_fees() {
        let builder = TransactionBuilder::new(ExecutionConfig::default());
        let config = ExecutionConfig::default();
        let env = builder
            .build_evm(Chain::Ethereum, &call(Some(100_000)), &config.ethereum, &market())
            .unwrap();
        assert_eq!(env.chain_id, 1);
        assert_eq!(env.gas_limit, 120_000);
        assert_eq!(
            env.max_fee_per_gas,
            Some(U256::from(40_000_000_000u64 + 100_000_000))
        );
        assert_eq!(env.max_priority_fee_per_gas, Some(U256::from(100_000_000u64)));
        assert_eq!(env.gas_price, None);
    }

    #[test]
    fn test_evm_legacy_fees_and_default_gas() {
        let builder = TransactionBuilder::new(ExecutionConfig::default());
        let config = ExecutionConfig::default();
        let env = builder
            .build_evm(Chain::Bsc, &call(None), &config.bsc, &market())
            .unwrap();
        assert_eq!(env.chain_id, 56);
        assert_eq!(env.gas_limit, 360_000);
        assert_eq!(env.gas_price, Some(U256::from(25_000_000_000u64)));
        assert!(env.max_fee_per_gas.is_none());
        assert!(env.max_priority_fee_per_gas.is_none());
    }

    #[test]
    fn test_fee_modes_are_exclusive() {
        let mut env = EvmEnvelope {
            chain_id: 1,
            to: "0x0".into(),
            data: vec![1],
            value: U256::zero(),
            gas_limit: 21_000,
            gas_price: Some(U256::from(9u8)),
            max_fee_per_gas: Some(U256::from(9u8)),
            max_priority_fee_per_gas: Some(U256::from(1u8)),
        };
        env.apply_fee_mode(EvmFeeMode::Legacy, &market(), U256::one());
        assert!(env.gas_price.is_some());
        assert!(env.max_fee_per_gas.is_none() && env.max_priority_fee_per_gas.is_none());

        env.apply_fee_mode(EvmFeeMode::Dynamic, &market(), U256::one());
        assert!(env.gas_price.is_none());
        assert!(env.max_fee_per_gas.is_some() && env.max_priority_fee_per_gas.is_some());

        let no_base = FeeMarket {
            base_fee: None,
            gas_price: U256::from(5u8),
        };
        env.apply_fee_mode(EvmFeeMode::Dynamic, &no_base, U256::one());
        assert_eq!(env.gas_price, Some(U256::from(5u8)));
        assert!(env.max_fee_per_gas.is_none());
    }

    #[test]
    fn test_one_envelope_per_call() {
        let builder = TransactionBuilder::new(ExecutionConfig::default());
        let group = StepGroup::new(
            ExecutionStep::new(0, StepKind::OpenPosition, true),
            vec![
                Primitive::ContractCall(call(Some(60_000))),
                Primitive::ContractCall(call(Some(600_000))),
            ],
        );
        let envelopes = builder.build_step(Chain::Ethereum, &group, &market()).unwrap();
        assert_eq!(envelopes.len(), 2);
        assert!(envelopes.iter().all(|e| matches!(e, Envelope::Evm(_))));
    }
}
