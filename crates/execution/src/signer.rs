//! Transaction signers.
//!
//! A signer owns its key and its replay protection. Both implementations
//! re-derive the replay value on every signature; the EVM signer also never
//! reuses a nonce it already issued. Callers serialize work per signer
//! through [`TxSigner::sequence_lock`].

use crate::builder::Envelope;
use crate::client::{ChainClient, ReplayReference, SignedPayload};
use crate::error::ExecutionError;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::eth::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use primitive_types::U256;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::PoisonError;
use tokio::sync::Mutex;
use tracing::{debug, info};
use xdex_domain::chain::ChainFamily;
use xdex_protocols::ContractCall;
use xdex_protocols::evm::to_alloy;
use zeroize::Zeroizing;

/// Signs envelopes for one wallet.
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Transaction model this signer handles.
    fn family(&self) -> ChainFamily;

    /// Wallet address.
    fn address(&self) -> String;

    /// Critical section guarding the replay protection value. Hold it from
    /// signing until the transaction reaches a final status.
    fn sequence_lock(&self) -> &Mutex<()>;

    /// Signs `envelope` with a freshly derived replay protection value.
    async fn sign(
        &self,
        envelope: &Envelope,
        client: &dyn ChainClient,
    ) -> Result<SignedPayload, ExecutionError>;
}

/// Ed25519 signer for Solana.
pub struct SolanaSigner {
    keypair: Keypair,
    lock: Mutex<()>,
}

impl SolanaSigner {
    /// Wraps a keypair.
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            lock: Mutex::new(()),
        }
    }

    /// Parses a JSON byte array keypair (`solana-keygen` format).
    pub fn from_json(content: &str) -> Result<Self, ExecutionError> {
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            serde_json::from_str(content.trim())
                .map_err(|e| ExecutionError::Signing(format!("keypair is not a byte array: {e}")))?,
        );
        let keypair = Keypair::try_from(bytes.as_slice())
            .map_err(|e| ExecutionError::Signing(format!("invalid keypair: {e}")))?;
        Ok(Self::new(keypair))
    }

    /// Reads a `solana-keygen` keypair file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let path = path.as_ref();
        let content = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            ExecutionError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?);
        Self::from_json(&content)
    }

    /// Loads the key from `SOLANA_PRIVATE_KEY` or `SOLANA_KEYPAIR_PATH`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ExecutionError> {
        if let Some(secret) = lookup("SOLANA_PRIVATE_KEY").map(Zeroizing::new) {
            return Self::from_json(&secret);
        }
        match lookup("SOLANA_KEYPAIR_PATH") {
            Some(path) => Self::from_file(path),
            None => Err(ExecutionError::Configuration(
                "SOLANA_PRIVATE_KEY or SOLANA_KEYPAIR_PATH must be set".into(),
            )),
        }
    }
}

impl fmt::Debug for SolanaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaSigner")
            .field("address", &self.keypair.pubkey().to_string())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TxSigner for SolanaSigner {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    fn sequence_lock(&self) -> &Mutex<()> {
        &self.lock
    }

    async fn sign(
        &self,
        envelope: &Envelope,
        client: &dyn ChainClient,
    ) -> Result<SignedPayload, ExecutionError> {
        let Envelope::Solana(env) = envelope else {
            return Err(ExecutionError::Signing(
                "Solana signer cannot sign an EVM envelope".into(),
            ));
        };
        let ReplayReference::Blockhash(blockhash) = client.replay_reference(&self.address()).await?
        else {
            return Err(ExecutionError::Signing(
                "client returned a nonce instead of a blockhash".into(),
            ));
        };

        let payer = self.keypair.pubkey();
        let mut tx = Transaction::new_with_payer(&env.instructions, Some(&payer));
        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(1 + env.co_signers.len());
        signers.push(&self.keypair);
        for co_signer in &env.co_signers {
            signers.push(&**co_signer);
        }
        tx.try_sign(&signers, blockhash)
            .map_err(|e| ExecutionError::Signing(e.to_string()))?;

        debug!(
            signature = %tx.signatures.first().map(ToString::to_string).unwrap_or_default(),
            blockhash = %blockhash,
            signers = signers.len(),
            "Signed Solana transaction"
        );
        Ok(SignedPayload::Solana(tx))
    }
}

/// Secp256k1 signer for one EVM chain.
pub struct EvmSigner {
    signer: PrivateKeySigner,
    last_nonce: std::sync::Mutex<Option<u64>>,
    lock: Mutex<()>,
}

impl EvmSigner {
    /// Wraps a local signer.
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            last_nonce: std::sync::Mutex::new(None),
            lock: Mutex::new(()),
        }
    }

    /// Parses a hex private key, with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self, ExecutionError> {
        let trimmed = key.trim().trim_start_matches("0x");
        let bytes = Zeroizing::new(
            hex::decode(trimmed)
                .map_err(|e| ExecutionError::Signing(format!("private key is not hex: {e}")))?,
        );
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| ExecutionError::Signing(format!("invalid private key: {e}")))?;
        Ok(Self::new(signer))
    }

    /// Loads the key from `EVM_PRIVATE_KEY`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ExecutionError> {
        let key = lookup("EVM_PRIVATE_KEY")
            .map(Zeroizing::new)
            .ok_or_else(|| ExecutionError::Configuration("EVM_PRIVATE_KEY must be set".into()))?;
        Self::from_hex(&key)
    }

    /// Nonce for the next transaction: the node's pending nonce, but never
    /// at or below the last nonce this signer issued.
    fn next_nonce(&self, fetched: u64) -> u64 {
        let last = *self.last_nonce.lock().unwrap_or_else(PoisonError::into_inner);
        match last {
            Some(last) => fetched.max(last + 1),
            None => fetched,
        }
    }

    fn record_nonce(&self, nonce: u64) {
        *self.last_nonce.lock().unwrap_or_else(PoisonError::into_inner) = Some(nonce);
    }
}

impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.signer.address().to_string())
            .finish_non_exhaustive()
    }
}

fn to_u128(value: U256, field: &str) -> Result<u128, ExecutionError> {
    if value.bits() > 128 {
        return Err(ExecutionError::Signing(format!("{field} {value} exceeds u128")));
    }
    Ok(value.as_u128())
}

#[async_trait]
impl TxSigner for EvmSigner {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn address(&self) -> String {
        self.signer.address().to_string()
    }

    fn sequence_lock(&self) -> &Mutex<()> {
        &self.lock
    }

    async fn sign(
        &self,
        envelope: &Envelope,
        client: &dyn ChainClient,
    ) -> Result<SignedPayload, ExecutionError> {
        let Envelope::Evm(env) = envelope else {
            return Err(ExecutionError::Signing(
                "EVM signer cannot sign a Solana envelope".into(),
            ));
        };
        let ReplayReference::Nonce(fetched) = client.replay_reference(&self.address()).await?
        else {
            return Err(ExecutionError::Signing(
                "client returned a blockhash instead of a nonce".into(),
            ));
        };
        let nonce = self.next_nonce(fetched);
        let to = Address::from_str(&env.to)
            .map_err(|e| ExecutionError::Signing(format!("invalid recipient {}: {e}", env.to)))?;

        let mut tx = TransactionRequest::default()
            .with_to(to)
            .with_input(Bytes::from(env.data.clone()))
            .with_value(to_alloy(env.value))
            .with_chain_id(env.chain_id)
            .with_nonce(nonce)
            .with_gas_limit(env.gas_limit);
        tx = match (env.gas_price, env.max_fee_per_gas, env.max_priority_fee_per_gas) {
            (Some(gas_price), None, None) => tx.with_gas_price(to_u128(gas_price, "gas price")?),
            (None, Some(max_fee), Some(tip)) => tx
                .with_max_fee_per_gas(to_u128(max_fee, "max fee")?)
                .with_max_priority_fee_per_gas(to_u128(tip, "priority fee")?),
            _ => {
                return Err(ExecutionError::Signing(
                    "envelope must carry exactly one fee model".into(),
                ));
            }
        };
        tx.from = Some(self.signer.address());

        let wallet = EthereumWallet::from(self.signer.clone());
        let signed = tx
            .build(&wallet)
            .await
            .map_err(|e| ExecutionError::Signing(e.to_string()))?;
        let hash = format!("{:#x}", signed.tx_hash());
        self.record_nonce(nonce);
        info!(hash = %hash, nonce, chain_id = env.chain_id, "Signed EVM transaction");

        Ok(SignedPayload::Evm {
            raw: signed.encoded_2718(),
            hash,
            from: self.address(),
            call: ContractCall {
                to: env.to.clone(),
                data: env.data.clone(),
                value: env.value,
                gas_limit: Some(env.gas_limit),
                gas_price: env.gas_price,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{EvmEnvelope, SolanaEnvelope};
    use crate::testing::{ScriptedClient, TEST_EVM_KEY};
    use solana_sdk::instruction::Instruction;
    use solana_sdk::pubkey::Pubkey;
    use std::sync::Arc;
    use xdex_domain::chain::Chain;

    fn evm_envelope(dynamic: bool) -> Envelope {
        Envelope::Evm(EvmEnvelope {
            chain_id: 1,
            to: "0xC36442b4a4522E871399CD717aBDD847Ab11FE88".into(),
            data: vec![0xde, 0xad, 0xbe, 0xef],
            value: U256::zero(),
            gas_limit: 120_000,
            gas_price: (!dynamic).then(|| U256::from(5_000_000_000u64)),
            max_fee_per_gas: dynamic.then(|| U256::from(40_000_000_000u64)),
            max_priority_fee_per_gas: dynamic.then(|| U256::from(100_000_000u64)),
        })
    }

    #[tokio::test]
    async fn test_evm_nonce_never_reused() {
        let signer = EvmSigner::from_hex(TEST_EVM_KEY).unwrap();
        let client = ScriptedClient::new(Chain::Ethereum).with_nonce(7);

        let first = signer.sign(&evm_envelope(true), &client).await.unwrap();
        // Node has not seen the first transaction yet and still reports 7.
        let second = signer.sign(&evm_envelope(true), &client).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(signer.next_nonce(7), 9);

        // Node moved ahead; its value wins.
        assert_eq!(signer.next_nonce(20), 20);
    }

    #[tokio::test]
    async fn test_evm_fee_models_encode_differently() {
        let signer = EvmSigner::from_hex(TEST_EVM_KEY).unwrap();
        let client = ScriptedClient::new(Chain::Ethereum);
        let SignedPayload::Evm { raw, from, .. } =
            signer.sign(&evm_envelope(true), &client).await.unwrap()
        else {
            panic!("expected EVM payload");
        };
        assert_eq!(raw[0], 0x02);
        assert_eq!(from, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

        let SignedPayload::Evm { raw, .. } =
            signer.sign(&evm_envelope(false), &client).await.unwrap()
        else {
            panic!("expected EVM payload");
        };
        assert!(raw[0] >= 0xc0);
    }

    #[tokio::test]
    async fn test_evm_rejects_mixed_fee_fields() {
        let signer = EvmSigner::from_hex(TEST_EVM_KEY).unwrap();
        let client = ScriptedClient::new(Chain::Ethereum);
        let Envelope::Evm(mut env) = evm_envelope(true) else {
            unreachable!()
        };
        env.gas_price = Some(U256::one());
        assert!(matches!(
            signer.sign(&Envelope::Evm(env), &client).await,
            Err(ExecutionError::Signing(_))
        ));
    }

    #[tokio::test]
    async fn test_solana_signs_with_co_signers() {
        let signer = SolanaSigner::new(Keypair::new());
        let co_signer = Arc::new(Keypair::new());
        let program = Pubkey::new_unique();
        let ix = Instruction::new_with_bytes(
            program,
            &[1],
            vec![solana_sdk::instruction::AccountMeta::new(co_signer.pubkey(), true)],
        );
        let envelope = Envelope::Solana(SolanaEnvelope {
            instructions: vec![ix],
            co_signers: vec![co_signer],
            estimated_fee: 10_000,
        });
        let client = ScriptedClient::new(Chain::Solana);
        let SignedPayload::Solana(tx) = signer.sign(&envelope, &client).await.unwrap() else {
            panic!("expected Solana payload");
        };
        assert_eq!(tx.signatures.len(), 2);
        assert!(tx.is_signed());
        assert_eq!(tx.message.recent_blockhash, client.blockhash());
    }

    #[tokio::test]
    async fn test_family_mismatch_and_redacted_debug() {
        let signer = SolanaSigner::new(Keypair::new());
        let client = ScriptedClient::new(Chain::Solana);
        assert!(signer.sign(&evm_envelope(true), &client).await.is_err());

        let evm = EvmSigner::from_hex(TEST_EVM_KEY).unwrap();
        let debug = format!("{evm:?}");
        assert!(debug.contains("0xf39F"));
        assert!(!debug.contains(TEST_EVM_KEY.trim_start_matches("0x")));
    }

    #[test]
    fn test_key_loading_errors() {
        assert!(matches!(
            EvmSigner::from_lookup(|_| None),
            Err(ExecutionError::Configuration(_))
        ));
        assert!(matches!(
            EvmSigner::from_hex("0xnothex"),
            Err(ExecutionError::Signing(_))
        ));
        assert!(SolanaSigner::from_json("[1, 2, 3]").is_err());

        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let signer =
            SolanaSigner::from_lookup(|k| (k == "SOLANA_PRIVATE_KEY").then(|| json.clone()))
                .unwrap();
        assert_eq!(signer.address(), keypair.pubkey().to_string());
    }
}
