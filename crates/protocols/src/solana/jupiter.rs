//! Jupiter aggregator: quotes and swap instructions.
//!
//! Swaps are requested as raw instructions rather than a serialized
//! transaction so the execution engine controls fees, blockhash and signing.

use crate::adapter::ChainAdapter;
use crate::error::AdapterError;
use crate::plan::{OperationPlan, Primitive};
use crate::quote::{QuoteRequest, QuoteSource};
use crate::request::{ChainContext, SwapRequest};
use crate::solana::parse_pubkey;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Duration, Utc};
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use solana_sdk::instruction::{AccountMeta, Instruction};
use std::str::FromStr;
use tracing::{debug, info};
use xdex_domain::chain::Chain;
use xdex_domain::enums::{OperationKind, Protocol, StepKind};
use xdex_domain::value_objects::QuoteResult;

/// Default Jupiter API base.
pub const JUPITER_API_URL: &str = "https://lite-api.jup.ag/swap/v1";

/// Default validity window of a quote.
pub const DEFAULT_QUOTE_TTL_SECS: i64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterQuote {
    in_amount: String,
    out_amount: String,
    other_amount_threshold: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
    #[serde(default)]
    route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePlanStep {
    swap_info: SwapInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInfo {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructions {
    #[serde(default)]
    setup_instructions: Vec<JupiterInstruction>,
    swap_instruction: JupiterInstruction,
    #[serde(default)]
    cleanup_instruction: Option<JupiterInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterInstruction {
    program_id: String,
    accounts: Vec<JupiterAccount>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterAccount {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

impl JupiterInstruction {
    fn into_instruction(self) -> Result<Instruction, AdapterError> {
        let accounts = self
            .accounts
            .into_iter()
            .map(|a| {
                let pubkey = parse_pubkey(&a.pubkey)?;
                Ok(if a.is_writable {
                    AccountMeta::new(pubkey, a.is_signer)
                } else {
                    AccountMeta::new_readonly(pubkey, a.is_signer)
                })
            })
            .collect::<Result<Vec<_>, AdapterError>>()?;
        Ok(Instruction {
            program_id: parse_pubkey(&self.program_id)?,
            accounts,
            data: BASE64
                .decode(&self.data)
                .map_err(|e| AdapterError::Decode(format!("instruction data: {e}")))?,
        })
    }
}

fn parse_raw(s: &str, field: &str) -> Result<U256, AdapterError> {
    U256::from_dec_str(s).map_err(|e| AdapterError::Decode(format!("{field} {s}: {e:?}")))
}

/// Jupiter swap adapter and quote source.
pub struct JupiterAdapter {
    http: reqwest::Client,
    base_url: String,
    quote_ttl: Duration,
}

impl Default for JupiterAdapter {
    fn default() -> Self {
        Self::new(JUPITER_API_URL)
    }
}

impl JupiterAdapter {
    /// Creates an adapter for the given API base.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            quote_ttl: Duration::seconds(DEFAULT_QUOTE_TTL_SECS),
        }
    }

    /// Sets the validity window of returned quotes.
    #[must_use]
    pub fn with_quote_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.quote_ttl = Duration::from_std(ttl).unwrap_or(self.quote_ttl);
        self
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(AdapterError::Api {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    /// Converts an API quote response into a [`QuoteResult`].
    pub fn quote_from_response(
        &self,
        request: &QuoteRequest,
        raw: Value,
    ) -> Result<QuoteResult, AdapterError> {
        let parsed: JupiterQuote = serde_json::from_value(raw.clone())
            .map_err(|e| AdapterError::Decode(format!("quote response: {e}")))?;
        let from_amount_raw = parse_raw(&parsed.in_amount, "inAmount")?;
        let to_amount_raw = parse_raw(&parsed.out_amount, "outAmount")?;
        let min_to_amount_raw = parse_raw(&parsed.other_amount_threshold, "otherAmountThreshold")?;
        // Jupiter reports impact as a fraction; the result stores percent.
        let price_impact_pct = parsed
            .price_impact_pct
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .map_err(|e| AdapterError::Decode(format!("priceImpactPct: {e}")))?
            .unwrap_or_default()
            * Decimal::ONE_HUNDRED;

        Ok(QuoteResult {
            chain: Chain::Solana,
            from_token: request.from.symbol.clone(),
            to_token: request.to.symbol.clone(),
            from_amount: request.from.to_ui(from_amount_raw)?,
            to_amount: request.to.to_ui(to_amount_raw)?,
            from_amount_raw,
            to_amount_raw,
            min_to_amount_raw,
            price_impact_pct,
            slippage_bps: request.slippage_bps,
            route: parsed
                .route_plan
                .into_iter()
                .filter_map(|step| step.swap_info.label)
                .collect(),
            valid_until: Utc::now() + self.quote_ttl,
            raw,
        })
    }
}

#[async_trait]
impl QuoteSource for JupiterAdapter {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResult, AdapterError> {
        if request.amount_raw.is_zero() {
            return Err(AdapterError::InvalidInput("quote amount is zero".into()));
        }
        debug!(
            from = %request.from.symbol,
            to = %request.to.symbol,
            amount = %request.amount_raw,
            slippage_bps = request.slippage_bps,
            "Requesting Jupiter quote"
        );
        let response = self
            .http
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", request.from.address.clone()),
                ("outputMint", request.to.address.clone()),
                ("amount", request.amount_raw.to_string()),
                ("slippageBps", request.slippage_bps.to_string()),
                ("swapMode", "ExactIn".to_string()),
                ("asLegacyTransaction", "true".to_string()),
            ])
            .send()
            .await?;
        let raw: Value = Self::check(response).await?.json().await?;
        self.quote_from_response(request, raw)
    }
}

/// Instructions from a swap-instructions response, in execution order.
/// Compute budget instructions are dropped; the builder sets its own.
pub fn swap_instructions_from_response(raw: Value) -> Result<Vec<Instruction>, AdapterError> {
    let parsed: SwapInstructions = serde_json::from_value(raw)
        .map_err(|e| AdapterError::Decode(format!("swap-instructions response: {e}")))?;
    let mut ixs = Vec::with_capacity(parsed.setup_instructions.len() + 2);
    for ix in parsed.setup_instructions {
        ixs.push(ix.into_instruction()?);
    }
    ixs.push(parsed.swap_instruction.into_instruction()?);
    if let Some(cleanup) = parsed.cleanup_instruction {
        ixs.push(cleanup.into_instruction()?);
    }
    Ok(ixs)
}

#[async_trait]
impl ChainAdapter for JupiterAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Jupiter
    }

    fn chains(&self) -> &[Chain] {
        &[Chain::Solana]
    }

    fn capabilities(&self) -> &[OperationKind] {
        &[OperationKind::Swap]
    }

    async fn build_swap(
        &self,
        request: &SwapRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        if request.quote.raw.is_null() {
            return Err(AdapterError::InvalidInput(
                "quote carries no aggregator route".into(),
            ));
        }
        info!(
            from = %request.from.symbol,
            to = %request.to.symbol,
            amount = %request.amount_raw,
            route = ?request.quote.route,
            "Building Jupiter swap"
        );
        let body = json!({
            "quoteResponse": request.quote.raw,
            "userPublicKey": ctx.owner,
            "wrapAndUnwrapSol": true,
            "asLegacyTransaction": true,
        });
        let response = self
            .http
            .post(format!("{}/swap-instructions", self.base_url))
            .json(&body)
            .send()
            .await?;
        let raw: Value = Self::check(response).await?.json().await?;
        let ixs = swap_instructions_from_response(raw)?;

        Ok(OperationPlan::single(
            OperationKind::Swap,
            Chain::Solana,
            StepKind::Swap,
            ixs.into_iter().map(Primitive::Instruction).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use solana_sdk::pubkey::Pubkey;
    use xdex_domain::registry::TokenRegistry;

    fn request() -> QuoteRequest {
        let reg = TokenRegistry::builtin();
        QuoteRequest {
            chain: Chain::Solana,
            from: reg.resolve(Chain::Solana, "SOL").unwrap(),
            to: reg.resolve(Chain::Solana, "USDC").unwrap(),
            amount: dec!(1),
            amount_raw: U256::from(1_000_000_000u64),
            slippage_bps: 50,
        }
    }

    #[test]
    fn test_quote_from_response() {
        let adapter = JupiterAdapter::default();
        let raw = json!({
            "inAmount": "1000000000",
            "outAmount": "150250000",
            "otherAmountThreshold": "149498750",
            "priceImpactPct": "0.0012",
            "routePlan": [
                { "swapInfo": { "label": "Raydium CLMM" } },
                { "swapInfo": { "label": "Meteora DLMM" } }
            ]
        });
        let quote = adapter.quote_from_response(&request(), raw).unwrap();
        assert_eq!(quote.to_amount, dec!(150.25));
        assert_eq!(quote.min_to_amount_raw, U256::from(149_498_750u64));
        assert_eq!(quote.price_impact_pct, dec!(0.12));
        assert_eq!(quote.route, vec!["Raydium CLMM", "Meteora DLMM"]);
        assert!(quote.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_quote_rejects_malformed_amount() {
        let adapter = JupiterAdapter::default();
        let raw = json!({
            "inAmount": "abc",
            "outAmount": "1",
            "otherAmountThreshold": "1"
        });
        assert!(matches!(
            adapter.quote_from_response(&request(), raw),
            Err(AdapterError::Decode(_))
        ));
    }

    #[test]
    fn test_swap_instructions_order() {
        let program = Pubkey::new_unique().to_string();
        let account = Pubkey::new_unique().to_string();
        let ix = |data: &str| {
            json!({
                "programId": program,
                "accounts": [{ "pubkey": account, "isSigner": false, "isWritable": true }],
                "data": data
            })
        };
        let raw = json!({
            "computeBudgetInstructions": [ix("AA==")],
            "setupInstructions": [ix("AQ==")],
            "swapInstruction": ix("Ag=="),
            "cleanupInstruction": ix("Aw=="),
        });
        let ixs = swap_instructions_from_response(raw).unwrap();
        let data: Vec<u8> = ixs.iter().map(|ix| ix.data[0]).collect();
        assert_eq!(data, vec![1, 2, 3]);
        assert!(ixs[0].accounts[0].is_writable);
    }

    #[tokio::test]
    async fn test_build_swap_requires_route() {
        let adapter = JupiterAdapter::default();
        let mut quote = adapter
            .quote_from_response(
                &request(),
                json!({ "inAmount": "1", "outAmount": "1", "otherAmountThreshold": "1" }),
            )
            .unwrap();
        quote.raw = Value::Null;
        let reg = TokenRegistry::builtin();
        let swap = SwapRequest {
            from: reg.resolve(Chain::Solana, "SOL").unwrap(),
            to: reg.resolve(Chain::Solana, "USDC").unwrap(),
            amount_raw: U256::one(),
            quote,
        };
        let ctx = ChainContext {
            chain: Chain::Solana,
            owner: Pubkey::new_unique().to_string(),
            slippage_bps: 50,
            deadline: 0,
        };
        assert!(matches!(
            adapter.build_swap(&swap, &ctx).await,
            Err(AdapterError::InvalidInput(_))
        ));
    }
}
