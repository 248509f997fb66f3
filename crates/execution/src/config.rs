//! Execution configuration.
//!
//! A plain value handed to the builder, submitter and orchestrator at
//! construction time. Defaults are usable as-is; [`ExecutionConfig::from_env`]
//! overlays `XDEX_*` variables on top of them.

use crate::error::ExecutionError;
use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use xdex_domain::chain::Chain;

/// Solana compute budget settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SolanaFeeConfig {
    /// Compute unit limit; 0 leaves the runtime default.
    pub compute_unit_limit: u32,
    /// Price per compute unit in micro-lamports; 0 adds no priority fee.
    pub compute_unit_price_micro_lamports: u64,
}

impl Default for SolanaFeeConfig {
    fn default() -> Self {
        Self {
            compute_unit_limit: 200_000,
            compute_unit_price_micro_lamports: 10_000,
        }
    }
}

/// EVM fee model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmFeeMode {
    /// Fixed `gasPrice`.
    Legacy,
    /// `maxFeePerGas` plus `maxPriorityFeePerGas`.
    Dynamic,
}

/// EVM gas settings for one chain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EvmFeeConfig {
    /// Fee model.
    pub mode: EvmFeeMode,
    /// Multiplier applied to the call's gas estimate.
    pub gas_limit_multiplier: f64,
    /// Gas used when neither adapter nor aggregator gives an estimate.
    pub default_gas_limit: u64,
    /// Priority tip in wei (dynamic mode only).
    pub priority_fee_wei: u64,
}

impl EvmFeeConfig {
    /// Ethereum mainnet defaults.
    #[must_use]
    pub fn ethereum() -> Self {
        Self {
            mode: EvmFeeMode::Dynamic,
            ..Self::default()
        }
    }

    /// BSC defaults.
    #[must_use]
    pub fn bsc() -> Self {
        Self {
            mode: EvmFeeMode::Legacy,
            ..Self::default()
        }
    }
}

impl Default for EvmFeeConfig {
    fn default() -> Self {
        Self {
            mode: EvmFeeMode::Dynamic,
            gas_limit_multiplier: 1.2,
            default_gas_limit: 300_000,
            priority_fee_wei: 100_000_000, // 0.1 gwei
        }
    }
}

/// Submission and confirmation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Time to wait for a final status after submission.
    pub confirmation_timeout_ms: u64,
    /// Interval between status polls.
    pub poll_interval_ms: u64,
    /// Maximum send attempts for transient failures.
    pub max_attempts: u32,
    /// Fixed delay between send attempts.
    pub retry_delay_ms: u64,
    /// Skip node-side simulation before sending.
    pub skip_preflight: bool,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: 60_000, // 1 minute
            poll_interval_ms: 2_000,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            skip_preflight: false,
        }
    }
}

impl SubmitConfig {
    /// Confirmation timeout.
    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    /// Poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay between send attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Complete execution configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Solana compute budget.
    pub solana: SolanaFeeConfig,
    /// Ethereum gas settings.
    pub ethereum: EvmFeeConfig,
    /// BSC gas settings.
    pub bsc: EvmFeeConfig,
    /// Submission settings.
    pub submit: SubmitConfig,
    /// Quote validity window in seconds.
    pub quote_ttl_secs: u64,
    /// Slippage used when the caller gives none.
    pub default_slippage_bps: u16,
    /// Deadline added to the current time for EVM position calls.
    pub deadline_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            solana: SolanaFeeConfig::default(),
            ethereum: EvmFeeConfig::ethereum(),
            bsc: EvmFeeConfig::bsc(),
            submit: SubmitConfig::default(),
            quote_ttl_secs: 10,
            default_slippage_bps: 50, // 0.5%
            deadline_secs: 1_200,     // 20 minutes
        }
    }
}

impl ExecutionConfig {
    /// Defaults overlaid with `XDEX_*` process environment variables.
    pub fn from_env() -> Result<Self, ExecutionError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlays values returned by `lookup` for the `XDEX_*` keys.
    pub fn overlay(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ExecutionError> {
        set(&lookup, "XDEX_COMPUTE_UNIT_LIMIT", &mut self.solana.compute_unit_limit)?;
        set(
            &lookup,
            "XDEX_COMPUTE_UNIT_PRICE",
            &mut self.solana.compute_unit_price_micro_lamports,
        )?;
        for (prefix, fees) in [("XDEX_ETH", &mut self.ethereum), ("XDEX_BSC", &mut self.bsc)] {
            set(
                &lookup,
                &format!("{prefix}_GAS_LIMIT_MULTIPLIER"),
                &mut fees.gas_limit_multiplier,
            )?;
            set(&lookup, &format!("{prefix}_PRIORITY_FEE_WEI"), &mut fees.priority_fee_wei)?;
            if let Some(mode) = lookup(&format!("{prefix}_FEE_MODE")) {
                fees.mode = match mode.to_ascii_lowercase().as_str() {
                    "legacy" => EvmFeeMode::Legacy,
                    "dynamic" | "eip1559" => EvmFeeMode::Dynamic,
                    other => {
                        return Err(ExecutionError::Configuration(format!(
                            "{prefix}_FEE_MODE: unknown mode {other}"
                        )));
                    }
                };
            }
        }
        set(
            &lookup,
            "XDEX_CONFIRMATION_TIMEOUT_MS",
            &mut self.submit.confirmation_timeout_ms,
        )?;
        set(&lookup, "XDEX_POLL_INTERVAL_MS", &mut self.submit.poll_interval_ms)?;
        set(&lookup, "XDEX_MAX_ATTEMPTS", &mut self.submit.max_attempts)?;
        set(&lookup, "XDEX_RETRY_DELAY_MS", &mut self.submit.retry_delay_ms)?;
        if let Some(v) = lookup("XDEX_SKIP_PREFLIGHT") {
            self.submit.skip_preflight = parse_flag("XDEX_SKIP_PREFLIGHT", &v)?;
        }
        set(&lookup, "XDEX_QUOTE_TTL_SECS", &mut self.quote_ttl_secs)?;
        set(&lookup, "XDEX_DEFAULT_SLIPPAGE_BPS", &mut self.default_slippage_bps)?;
        set(&lookup, "XDEX_DEADLINE_SECS", &mut self.deadline_secs)?;
        self.validate()?;
        Ok(self)
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.submit.max_attempts == 0 {
            return Err(ExecutionError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.submit.poll_interval_ms == 0 {
            return Err(ExecutionError::Configuration(
                "poll_interval_ms must be positive".into(),
            ));
        }
        for fees in [&self.ethereum, &self.bsc] {
            if !(fees.gas_limit_multiplier.is_finite() && fees.gas_limit_multiplier >= 1.0) {
                return Err(ExecutionError::Configuration(format!(
                    "gas_limit_multiplier must be >= 1.0, got {}",
                    fees.gas_limit_multiplier
                )));
            }
        }
        if self.default_slippage_bps > 10_000 {
            return Err(ExecutionError::Configuration(
                "default_slippage_bps exceeds 10000".into(),
            ));
        }
        Ok(())
    }

    /// Gas settings for an EVM chain.
    pub fn evm_fees(&self, chain: Chain) -> Result<&EvmFeeConfig, ExecutionError> {
        match chain {
            Chain::Ethereum => Ok(&self.ethereum),
            Chain::Bsc => Ok(&self.bsc),
            Chain::Solana => Err(ExecutionError::UnsupportedChain(format!(
                "{chain} has no EVM fee settings"
            ))),
        }
    }

    /// Quote validity window.
    #[must_use]
    pub fn quote_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_ttl_secs)
    }
}

/// Node endpoints and API keys.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    /// Solana RPC URL.
    pub solana_rpc_url: Option<String>,
    /// Ethereum RPC URL.
    pub eth_rpc_url: Option<String>,
    /// BSC RPC URL.
    pub bsc_rpc_url: Option<String>,
    /// 1inch API key.
    pub oneinch_api_key: Option<String>,
}

impl Endpoints {
    /// Reads endpoints from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads endpoints through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            solana_rpc_url: get("SOLANA_RPC_URL"),
            eth_rpc_url: get("ETH_RPC_URL"),
            bsc_rpc_url: get("BSC_RPC_URL"),
            oneinch_api_key: get("ONEINCH_API_KEY"),
        }
    }

    /// RPC URL for a chain.
    pub fn rpc_url(&self, chain: Chain) -> Result<&str, ExecutionError> {
        let (url, var) = match chain {
            Chain::Solana => (&self.solana_rpc_url, "SOLANA_RPC_URL"),
            Chain::Ethereum => (&self.eth_rpc_url, "ETH_RPC_URL"),
            Chain::Bsc => (&self.bsc_rpc_url, "BSC_RPC_URL"),
        };
        url.as_deref()
            .ok_or_else(|| ExecutionError::Configuration(format!("{var} is not set")))
    }
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoints")
            .field("solana_rpc_url", &self.solana_rpc_url)
            .field("eth_rpc_url", &self.eth_rpc_url)
            .field("bsc_rpc_url", &self.bsc_rpc_url)
            .field("oneinch_api_key", &self.oneinch_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn set<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ExecutionError>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| ExecutionError::Configuration(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ExecutionError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ExecutionError::Configuration(format!(
            "{key}={raw}: expected a boolean"
        ))),
    }
}
