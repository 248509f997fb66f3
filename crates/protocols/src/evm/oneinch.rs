//! 1inch aggregator (swap API v6) for Ethereum and BSC.

use super::{approve_calldata, decode_error, from_alloy, parse_address, to_alloy};
use crate::adapter::ChainAdapter;
use crate::error::AdapterError;
use crate::plan::{ContractCall, OperationPlan, Primitive};
use crate::quote::{QuoteRequest, QuoteSource};
use crate::request::{ChainContext, SwapRequest};
use alloy::primitives::{Bytes, U256 as AlloyU256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use primitive_types::U256;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info};
use xdex_domain::chain::Chain;
use xdex_domain::entities::Token;
use xdex_domain::enums::{OperationKind, Protocol, StepKind};
use xdex_domain::value_objects::QuoteResult;

/// Default 1inch swap API base.
pub const ONEINCH_API_URL: &str = "https://api.1inch.dev/swap/v6.0";

/// Default validity window of a quote.
pub const DEFAULT_QUOTE_TTL_SECS: i64 = 10;

const CHAINS: &[Chain] = &[Chain::Ethereum, Chain::Bsc];

alloy::sol! {
    /// Generic entry point of the v6 aggregation router.
    interface IAggregationRouterV6 {
        struct SwapDescription {
            address srcToken;
            address dstToken;
            address srcReceiver;
            address dstReceiver;
            uint256 amount;
            uint256 minReturnAmount;
            uint256 flags;
        }

        function swap(address executor, SwapDescription desc, bytes data)
            external
            payable
            returns (uint256 returnAmount, uint256 spentAmount);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    dst_amount: String,
    #[serde(default)]
    protocols: Value,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    tx: TxFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxFields {
    to: String,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<u64>,
    #[serde(default)]
    gas_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllowanceResponse {
    allowance: String,
}

#[derive(Debug, Deserialize)]
struct SpenderResponse {
    address: String,
}

/// Parses a decimal or `0x` hex amount string.
fn parse_amount(s: &str) -> Result<U256, AdapterError> {
    if s.starts_with("0x") {
        return AlloyU256::from_str(s)
            .map(from_alloy)
            .map_err(|e| AdapterError::Decode(format!("amount {s}: {e}")));
    }
    U256::from_dec_str(s).map_err(|e| AdapterError::Decode(format!("amount {s}: {e:?}")))
}

impl TxFields {
    fn into_call(self) -> Result<ContractCall, AdapterError> {
        let data = Bytes::from_str(&self.data)
            .map_err(|e| AdapterError::Decode(format!("calldata: {e}")))?
            .to_vec();
        let mut call = ContractCall::new(self.to, data);
        if let Some(value) = self.value.as_deref() {
            call = call.with_value(parse_amount(value)?);
        }
        if let Some(gas) = self.gas.filter(|g| *g > 0) {
            call = call.with_gas_limit(gas);
        }
        call.gas_price = self.gas_price.as_deref().map(parse_amount).transpose()?;
        Ok(call)
    }
}

/// Slippage in percent as 1inch expects it (`50` bps -> `"0.5"`).
#[must_use]
pub fn slippage_percent(slippage_bps: u16) -> String {
    Decimal::new(i64::from(slippage_bps), 2).normalize().to_string()
}

/// Checks that a generic router `swap` spends exactly `amount`.
///
/// Other router entry points (`unoswap`, `clipperSwap`) pass through unchecked.
pub fn verify_swap_amount(data: &[u8], amount: U256) -> Result<(), AdapterError> {
    if !data.starts_with(&IAggregationRouterV6::swapCall::SELECTOR) {
        return Ok(());
    }
    let call = IAggregationRouterV6::swapCall::abi_decode(data, true)
        .map_err(|e| decode_error("1inch swap", e))?;
    if call.desc.amount != to_alloy(amount) {
        return Err(AdapterError::Decode(format!(
            "1inch swap spends {} instead of {amount}",
            call.desc.amount
        )));
    }
    Ok(())
}

/// ERC-20 approval of `amount` to the router `spender`.
pub fn approve_call(
    token: &Token,
    spender: &str,
    amount: U256,
) -> Result<ContractCall, AdapterError> {
    parse_address(&token.address)?;
    Ok(ContractCall::new(
        token.address.clone(),
        approve_calldata(spender, amount)?,
    ))
}

/// Minimum output after slippage.
#[must_use]
pub fn min_amount_out(amount: U256, slippage_bps: u16) -> U256 {
    let keep = U256::from(10_000u64.saturating_sub(u64::from(slippage_bps)));
    amount.saturating_mul(keep) / U256::from(10_000u64)
}

/// 1inch swap adapter and quote source.
pub struct OneInchAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    quote_ttl: Duration,
}

impl OneInchAdapter {
    /// Creates an adapter using the public API base.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(ONEINCH_API_URL, api_key)
    }

    /// Creates an adapter for a custom API base.
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            quote_ttl: Duration::seconds(DEFAULT_QUOTE_TTL_SECS),
        }
    }

    /// Sets the validity window of returned quotes.
    #[must_use]
    pub fn with_quote_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.quote_ttl = Duration::from_std(ttl).unwrap_or(self.quote_ttl);
        self
    }

    fn chain_id(chain: Chain) -> Result<u64, AdapterError> {
        chain
            .chain_id()
            .filter(|_| CHAINS.contains(&chain))
            .ok_or(AdapterError::UnsupportedChain {
                protocol: Protocol::OneInch,
                chain,
            })
    }

    async fn get(
        &self,
        chain: Chain,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, AdapterError> {
        let url = format!("{}/{}/{endpoint}", self.base_url, Self::chain_id(chain)?);
        debug!(url = %url, "1inch request");
        let mut request = self.http.get(&url).query(params);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// Converts a `/quote` response into a [`QuoteResult`].
    pub fn quote_from_response(
        &self,
        request: &QuoteRequest,
        raw: Value,
    ) -> Result<QuoteResult, AdapterError> {
        let parsed: QuoteResponse = serde_json::from_value(raw.clone())
            .map_err(|e| AdapterError::Decode(format!("quote response: {e}")))?;
        let to_amount_raw = parse_amount(&parsed.dst_amount)?;

        Ok(QuoteResult {
            chain: request.chain,
            from_token: request.from.symbol.clone(),
            to_token: request.to.symbol.clone(),
            from_amount: request.from.to_ui(request.amount_raw)?,
            to_amount: request.to.to_ui(to_amount_raw)?,
            from_amount_raw: request.amount_raw,
            to_amount_raw,
            min_to_amount_raw: min_amount_out(to_amount_raw, request.slippage_bps),
            // The v6 quote endpoint does not report price impact.
            price_impact_pct: Decimal::ZERO,
            slippage_bps: request.slippage_bps,
            route: route_labels(&parsed.protocols),
            valid_until: Utc::now() + self.quote_ttl,
            raw,
        })
    }

    async fn allowance(
        &self,
        chain: Chain,
        token: &Token,
        owner: &str,
    ) -> Result<U256, AdapterError> {
        let raw = self
            .get(
                chain,
                "approve/allowance",
                &[
                    ("tokenAddress", token.address.clone()),
                    ("walletAddress", owner.to_string()),
                ],
            )
            .await?;
        let parsed: AllowanceResponse = serde_json::from_value(raw)
            .map_err(|e| AdapterError::Decode(format!("allowance response: {e}")))?;
        parse_amount(&parsed.allowance)
    }

    async fn spender(&self, chain: Chain) -> Result<String, AdapterError> {
        let raw = self.get(chain, "approve/spender", &[]).await?;
        let parsed: SpenderResponse = serde_json::from_value(raw)
            .map_err(|e| AdapterError::Decode(format!("spender response: {e}")))?;
        Ok(parsed.address)
    }
}

/// Flattens the nested `protocols` route description into names.
fn route_labels(protocols: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => {
                if let Some(name) = map.get("name").and_then(Value::as_str) {
                    if !out.iter().any(|n| n == name) {
                        out.push(name.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(protocols, &mut out);
    out
}

/// Parses a `/swap` response into the swap call.
pub fn swap_call_from_response(raw: Value) -> Result<ContractCall, AdapterError> {
    let parsed: SwapResponse = serde_json::from_value(raw)
        .map_err(|e| AdapterError::Decode(format!("swap response: {e}")))?;
    parsed.tx.into_call()
}

#[async_trait]
impl QuoteSource for OneInchAdapter {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResult, AdapterError> {
        if request.amount_raw.is_zero() {
            return Err(AdapterError::InvalidInput("quote amount is zero".into()));
        }
        let raw = self
            .get(
                request.chain,
                "quote",
                &[
                    ("src", request.from.address.clone()),
                    ("dst", request.to.address.clone()),
                    ("amount", request.amount_raw.to_string()),
                    ("includeProtocols", "true".to_string()),
                ],
            )
            .await?;
        self.quote_from_response(request, raw)
    }
}

#[async_trait]
impl ChainAdapter for OneInchAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::OneInch
    }

    fn chains(&self) -> &[Chain] {
        CHAINS
    }

    fn capabilities(&self) -> &[OperationKind] {
        &[OperationKind::Swap]
    }

    async fn build_swap(
        &self,
        request: &SwapRequest,
        ctx: &ChainContext,
    ) -> Result<OperationPlan, AdapterError> {
        let mut plan = OperationPlan::new(OperationKind::Swap, ctx.chain);

        let needs_approval = if request.from.is_native() {
            false
        } else {
            let allowance = self.allowance(ctx.chain, &request.from, &ctx.owner).await?;
            allowance < request.amount_raw
        };
        if needs_approval {
            info!(token = %request.from.symbol, "Allowance too low, adding approve step");
            let spender = self.spender(ctx.chain).await?;
            let call = approve_call(&request.from, &spender, request.amount_raw)?;
            plan.push(StepKind::Approve, false, vec![Primitive::ContractCall(call)]);
        }

        let mut params = vec![
            ("src", request.from.address.clone()),
            ("dst", request.to.address.clone()),
            ("amount", request.amount_raw.to_string()),
            ("from", ctx.owner.clone()),
            ("slippage", slippage_percent(ctx.slippage_bps)),
        ];
        // Estimation reverts while the approval is still unconfirmed.
        if needs_approval {
            params.push(("disableEstimate", "true".to_string()));
        }
        let raw = self.get(ctx.chain, "swap", &params).await?;
        let call = swap_call_from_response(raw)?;
        verify_swap_amount(&call.data, request.amount_raw)?;
        info!(
            chain = %ctx.chain,
            from = %request.from.symbol,
            to = %request.to.symbol,
            router = %call.to,
            "Building 1inch swap"
        );
        plan.push(StepKind::Swap, true, vec![Primitive::ContractCall(call)]);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use xdex_domain::registry::TokenRegistry;

    fn request() -> QuoteRequest {
        let reg = TokenRegistry::builtin();
        QuoteRequest {
            chain: Chain::Ethereum,
            from: reg.resolve(Chain::Ethereum, "ETH").unwrap(),
            to: reg.resolve(Chain::Ethereum, "USDC").unwrap(),
            amount: dec!(1),
            amount_raw: U256::exp10(18),
            slippage_bps: 100,
        }
    }

    #[test]
    fn test_slippage_percent() {
        assert_eq!(slippage_percent(50), "0.5");
        assert_eq!(slippage_percent(100), "1");
        assert_eq!(slippage_percent(5), "0.05");
    }

    #[test]
    fn test_min_amount_out() {
        assert_eq!(min_amount_out(U256::from(10_000u64), 100), U256::from(9_900u64));
        assert_eq!(min_amount_out(U256::from(10_000u64), 20_000), U256::zero());
    }

    #[test]
    fn test_quote_from_response() {
        let adapter = OneInchAdapter::new(None);
        let raw = json!({
            "dstAmount": "2500000000",
            "protocols": [[[{ "name": "UNISWAP_V3", "part": 100 }]]]
        });
        let quote = adapter.quote_from_response(&request(), raw).unwrap();
        assert_eq!(quote.to_amount, dec!(2500));
        assert_eq!(quote.min_to_amount_raw, U256::from(2_475_000_000u64));
        assert_eq!(quote.route, vec!["UNISWAP_V3"]);
        assert_eq!(quote.from_amount, dec!(1));
    }

    #[test]
    fn test_swap_call_from_response() {
        let raw = json!({
            "dstAmount": "1",
            "tx": {
                "from": "0x0000000000000000000000000000000000000001",
                "to": "0x111111125421ca6dc452d289314280a0f8842a65",
                "data": "0x12aa3caf",
                "value": "1000",
                "gas": 180000,
                "gasPrice": "3000000000"
            }
        });
        let call = swap_call_from_response(raw).unwrap();
        assert_eq!(call.data, vec![0x12, 0xaa, 0x3c, 0xaf]);
        assert_eq!(call.value, U256::from(1_000u64));
        assert_eq!(call.gas_limit, Some(180_000));
        assert_eq!(call.gas_price, Some(U256::from(3_000_000_000u64)));
    }

    fn router_swap(amount: u64) -> Vec<u8> {
        let token = parse_address("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48").unwrap();
        IAggregationRouterV6::swapCall {
            executor: token,
            desc: IAggregationRouterV6::SwapDescription {
                srcToken: token,
                dstToken: token,
                srcReceiver: token,
                dstReceiver: token,
                amount: AlloyU256::from(amount),
                minReturnAmount: AlloyU256::from(1u64),
                flags: AlloyU256::ZERO,
            },
            data: Bytes::new(),
        }
        .abi_encode()
    }

    #[test]
    fn test_verify_swap_amount() {
        assert!(verify_swap_amount(&router_swap(1_000), U256::from(1_000u64)).is_ok());
        assert!(matches!(
            verify_swap_amount(&router_swap(999), U256::from(1_000u64)),
            Err(AdapterError::Decode(_))
        ));
        // unoswap and friends are not decoded
        assert!(verify_swap_amount(&[0x12, 0xaa, 0x3c, 0xaf], U256::one()).is_ok());
    }

    #[test]
    fn test_approve_call_targets_token() {
        let reg = TokenRegistry::builtin();
        let usdc = reg.resolve(Chain::Ethereum, "USDC").unwrap();
        let router = "0x111111125421ca6dc452d289314280a0f8842a65";
        let call = approve_call(&usdc, router, U256::from(5_000u64)).unwrap();
        assert_eq!(call.to, usdc.address);
        assert_eq!(call.data, approve_calldata(router, U256::from(5_000u64)).unwrap());
        assert!(call.value.is_zero());
    }

    #[test]
    fn test_parse_amount_hex_and_decimal() {
        assert_eq!(parse_amount("0x3e8").unwrap(), U256::from(1_000u64));
        assert_eq!(parse_amount("1000").unwrap(), U256::from(1_000u64));
        assert!(parse_amount("0xzz").is_err());
    }

    #[test]
    fn test_solana_is_unsupported() {
        assert!(matches!(
            OneInchAdapter::chain_id(Chain::Solana),
            Err(AdapterError::UnsupportedChain { .. })
        ));
        assert_eq!(OneInchAdapter::chain_id(Chain::Bsc).unwrap(), 56);
    }
}
