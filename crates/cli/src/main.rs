//! Command Line Interface for the cross-chain execution engine.
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xdex_domain::chain::Chain;
use xdex_domain::entities::Pool;
use xdex_domain::enums::Protocol;
use xdex_domain::value_objects::{OverallStatus, PriceRange, StepOutcome, TxResult};
use xdex_execution::prelude::*;

mod setup;

use setup::{PositionRecord, Runtime};

#[derive(Parser)]
#[command(name = "xdex")]
#[command(about = "Cross-chain DEX execution CLI for Solana, Ethereum and BSC", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quote a swap without executing it
    Quote {
        /// Chain (solana, ethereum, bsc)
        #[arg(short, long)]
        chain: Chain,
        /// Input token symbol or address
        #[arg(long)]
        from: String,
        /// Output token symbol or address
        #[arg(long)]
        to: String,
        /// Input amount in token units
        #[arg(short, long)]
        amount: Decimal,
    },
    /// Swap through the chain's aggregator
    Swap {
        #[arg(short, long)]
        chain: Chain,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        amount: Decimal,
        /// Slippage bound in basis points (defaults to XDEX_DEFAULT_SLIPPAGE_BPS)
        #[arg(short, long)]
        slippage_bps: Option<u16>,
    },
    /// Open a liquidity position and write it to a position file
    Open {
        #[command(flatten)]
        pool: PoolArgs,
        /// Range: one-tick, ticks:L:U, bins:L:U, bps:L:U, pct:L:U or abs:L:U
        #[arg(short, long, value_parser = parse_range)]
        range: PriceRange,
        /// Token0 deposit
        #[arg(long, default_value = "0")]
        amount0: Decimal,
        /// Token1 deposit
        #[arg(long, default_value = "0")]
        amount1: Decimal,
        /// Where to store the opened position
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Add liquidity to a position
    Add {
        /// Position file written by `open`
        #[arg(short, long)]
        position: PathBuf,
        #[arg(long, default_value = "0")]
        amount0: Decimal,
        #[arg(long, default_value = "0")]
        amount1: Decimal,
    },
    /// Remove a percentage of a position's liquidity
    Remove {
        #[arg(short, long)]
        position: PathBuf,
        /// Percent of liquidity to remove (1-100)
        #[arg(long)]
        percent: u8,
    },
    /// Claim accrued fees
    Claim {
        #[arg(short, long)]
        position: PathBuf,
    },
    /// Withdraw everything and close the position
    Close {
        #[arg(short, long)]
        position: PathBuf,
    },
}

#[derive(clap::Args)]
struct PoolArgs {
    #[arg(short, long)]
    chain: Chain,
    #[arg(long, value_enum)]
    protocol: ProtocolArg,
    /// Pool address
    #[arg(long)]
    pool: String,
    #[arg(long)]
    token0: String,
    #[arg(long)]
    token1: String,
    /// Fee tier in hundredths of a basis point
    #[arg(long, default_value_t = 3000)]
    fee_tier: u32,
    /// Tick spacing or bin step
    #[arg(long)]
    tick_spacing: Option<u16>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Raydium,
    Meteora,
    Uniswap,
    Pancakeswap,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Raydium => Protocol::RaydiumClmm,
            ProtocolArg::Meteora => Protocol::MeteoraDlmm,
            ProtocolArg::Uniswap => Protocol::UniswapV3,
            ProtocolArg::Pancakeswap => Protocol::PancakeswapV3,
        }
    }
}

/// Parses `kind:lower:upper` range strings.
fn parse_range(raw: &str) -> Result<PriceRange> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("one-tick") {
        return Ok(PriceRange::OneTick);
    }
    let mut parts = raw.splitn(3, ':');
    let (Some(kind), Some(lower), Some(upper)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("expected kind:lower:upper or one-tick, got {raw}");
    };
    let int = |s: &str| -> Result<i32> {
        s.trim().parse().with_context(|| format!("invalid index {s}"))
    };
    let dec = |s: &str| -> Result<Decimal> {
        s.trim().parse().with_context(|| format!("invalid number {s}"))
    };
    let range = match kind.to_ascii_lowercase().as_str() {
        "ticks" => PriceRange::ticks(int(lower)?, int(upper)?)?,
        "bins" => PriceRange::bin_offsets(int(lower)?, int(upper)?)?,
        "bps" => PriceRange::bps(int(lower)?, int(upper)?)?,
        "pct" => PriceRange::percent(dec(lower)?, dec(upper)?)?,
        "abs" => PriceRange::absolute(dec(lower)?, dec(upper)?)?,
        other => bail!("unknown range kind {other}"),
    };
    Ok(range)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if std::env::var("XDEX_LOG_JSON").is_ok_and(|v| v == "1") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turns a halted multi-step sequence into a command failure.
fn ensure_complete(status: OverallStatus, steps: &[StepOutcome]) -> Result<()> {
    match status {
        OverallStatus::Success => Ok(()),
        OverallStatus::PartiallyFailed => Err(ExecutionError::PartialExecution {
            completed: steps.to_vec(),
        }
        .into()),
        OverallStatus::Failed => Err(anyhow!(
            "operation failed: {}",
            steps
                .last()
                .and_then(|s| s.tx.error.clone())
                .unwrap_or_else(|| "no step executed".into())
        )),
    }
}

fn ensure_success(tx: &TxResult) -> Result<()> {
    if tx.is_success() {
        return Ok(());
    }
    Err(anyhow!(
        "transaction {:?}: {}",
        tx.status(),
        tx.error.clone().unwrap_or_default()
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = ExecutionConfig::from_env().context("invalid execution configuration")?;
    let default_slippage = config.default_slippage_bps;
    let Runtime {
        orchestrator,
        pools,
    } = setup::build(config, &Endpoints::from_env())?;

    match cli.command {
        Commands::Quote {
            chain,
            from,
            to,
            amount,
        } => {
            let quote = orchestrator.quote(&from, &to, amount, chain).await?;
            print_json(&quote)?;
        }
        Commands::Swap {
            chain,
            from,
            to,
            amount,
            slippage_bps,
        } => {
            let slippage = slippage_bps.unwrap_or(default_slippage);
            let result = orchestrator
                .swap(&from, &to, amount, slippage, chain)
                .await?;
            print_json(&result)?;
            ensure_success(&result.tx_result)?;
        }
        Commands::Open {
            pool,
            range,
            amount0,
            amount1,
            out,
        } => {
            let tokens = orchestrator.tokens();
            let mut new_pool = Pool::new(
                pool.pool,
                pool.chain,
                pool.protocol.into(),
                tokens.resolve(pool.chain, &pool.token0)?,
                tokens.resolve(pool.chain, &pool.token1)?,
                pool.fee_tier,
            );
            if let Some(spacing) = pool.tick_spacing {
                new_pool = new_pool.with_tick_spacing(spacing);
            }
            let pool_id = pools.register(new_pool.clone());

            let result = orchestrator
                .open_position(&pool_id, range, amount0, amount1)
                .await?;
            print_json(&result)?;
            if let Some(position) = &result.position {
                PositionRecord {
                    pool: new_pool,
                    position: position.clone(),
                }
                .save(&out)?;
                eprintln!("✅ Position {} saved to {}", position.chain_position_id, out.display());
            }
            ensure_complete(result.overall_status, &result.steps)?;
        }
        Commands::Add {
            position,
            amount0,
            amount1,
        } => {
            let mut record = PositionRecord::load(&position)?;
            pools.register(record.pool.clone());
            let tx = orchestrator
                .add_liquidity(&mut record.position, amount0, amount1)
                .await?;
            record.save(&position)?;
            print_json(&tx)?;
            ensure_success(&tx)?;
        }
        Commands::Remove { position, percent } => {
            let mut record = PositionRecord::load(&position)?;
            pools.register(record.pool.clone());
            let tx = orchestrator
                .remove_liquidity(&mut record.position, percent)
                .await?;
            record.save(&position)?;
            print_json(&tx)?;
            ensure_success(&tx)?;
        }
        Commands::Claim { position } => {
            let record = PositionRecord::load(&position)?;
            pools.register(record.pool.clone());
            let tx = orchestrator.claim_fees(&record.position).await?;
            print_json(&tx)?;
            ensure_success(&tx)?;
        }
        Commands::Close { position } => {
            let mut record = PositionRecord::load(&position)?;
            pools.register(record.pool.clone());
            let result = orchestrator.close_position(&mut record.position).await?;
            record.save(&position)?;
            print_json(&result)?;
            ensure_complete(result.overall_status, &result.steps)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("one-tick").unwrap(), PriceRange::OneTick);
        assert_eq!(
            parse_range("ticks:-120:60").unwrap(),
            PriceRange::ticks(-120, 60).unwrap()
        );
        assert_eq!(
            parse_range("pct:-0.05:0.05").unwrap(),
            PriceRange::percent(dec!(-0.05), dec!(0.05)).unwrap()
        );
        assert!(parse_range("abs:180:120").is_err());
        assert!(parse_range("ticks:10").is_err());
        assert!(parse_range("range:1:2").is_err());
    }

    #[test]
    fn test_partial_sequence_fails_command() {
        assert!(ensure_complete(OverallStatus::Success, &[]).is_ok());
        let err = ensure_complete(OverallStatus::PartiallyFailed, &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExecutionError>(),
            Some(ExecutionError::PartialExecution { .. })
        ));
    }

    #[test]
    fn test_cli_parses_swap() {
        let cli = Cli::try_parse_from([
            "xdex", "swap", "--chain", "solana", "--from", "SOL", "--to", "USDC", "--amount", "0.1",
        ])
        .unwrap();
        match cli.command {
            Commands::Swap {
                chain,
                amount,
                slippage_bps,
                ..
            } => {
                assert_eq!(chain, Chain::Solana);
                assert_eq!(amount, dec!(0.1));
                assert_eq!(slippage_bps, None);
            }
            _ => panic!("expected swap"),
        }
    }
}
