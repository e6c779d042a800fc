//! # Run a single backtest
//! coda-backtest run --data data/BTCUSDT_1d.csv --symbol BTCUSDT
//!
//! # Optimize the bundled SMA crossover strategy
//! coda-backtest optimize --data data/BTCUSDT_1d.csv --symbol BTCUSDT --metric sharpe_ratio

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use coda_backtest::{
    load_bars_csv, BacktestEngine, BacktestOptions, OptimizationMethod, Optimizer,
    OptimizerConfig, ParameterSpace, SmaCrossover,
};

#[derive(Parser)]
#[command(name = "coda-backtest")]
#[command(about = "Strategy backtesting and parameter optimization engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Path to a CSV bar file (timestamp,open,high,low,close,volume)
    #[arg(short, long)]
    data: String,

    /// Symbol the bars belong to
    #[arg(short, long, default_value = "BTCUSDT")]
    symbol: String,

    /// Bar interval label
    #[arg(short, long, default_value = "1d")]
    timeframe: String,

    /// Starting capital
    #[arg(long, default_value_t = 10_000.0)]
    capital: f64,

    /// Commission rate per side (fraction of notional)
    #[arg(long, default_value_t = 0.001)]
    commission: f64,

    /// Slippage rate per side (fraction of fill price)
    #[arg(long, default_value_t = 0.0005)]
    slippage: f64,

    /// Allow short entries on negative signals
    #[arg(long)]
    shorts: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest of the SMA crossover strategy
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Fast SMA period
        #[arg(long, default_value_t = 10)]
        fast: usize,

        /// Slow SMA period
        #[arg(long, default_value_t = 30)]
        slow: usize,

        /// Print the full structured result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search the SMA crossover parameter space
    Optimize {
        #[command(flatten)]
        common: CommonArgs,

        /// grid_search or random_search
        #[arg(short, long, default_value = "grid_search")]
        method: OptimizationMethod,

        /// Metric to maximize
        #[arg(long, default_value = "sharpe_ratio")]
        metric: String,

        /// Evaluation cap (subsamples the grid, sizes the random draw)
        #[arg(long)]
        max_evaluations: Option<usize>,

        /// Seed for candidate sampling
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Worker pool size (defaults to all cores)
        #[arg(long)]
        workers: Option<usize>,

        /// Print the full structured result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn options_from(common: &CommonArgs) -> Result<BacktestOptions> {
    let initial_capital = Decimal::from_f64(common.capital)
        .context("initial capital is not a valid number")?;
    Ok(BacktestOptions {
        initial_capital,
        commission_rate: common.commission,
        slippage_rate: common.slippage,
        enable_short_positions: common.shorts,
        ..Default::default()
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            common,
            fast,
            slow,
            json,
        } => {
            let bars = load_bars_csv(&common.data)
                .with_context(|| format!("failed to load bars from {}", common.data))?;
            let strategy = SmaCrossover::new(fast, slow)?;
            let engine = BacktestEngine::new(options_from(&common)?);
            let result = engine.run(&strategy, &bars, &common.symbol, &common.timeframe)?;

            println!("{}", result.summary());
            if json {
                println!("{}", serde_json::to_string_pretty(&result.to_record())?);
            }
        }

        Commands::Optimize {
            common,
            method,
            metric,
            max_evaluations,
            seed,
            workers,
            json,
        } => {
            let bars = load_bars_csv(&common.data)
                .with_context(|| format!("failed to load bars from {}", common.data))?;
            let strategy = SmaCrossover::new(10, 30)?;

            let mut space = ParameterSpace::new();
            space.add_int("fast_period", 5, 25, 5)?;
            space.add_int("slow_period", 30, 90, 15)?;

            let config = OptimizerConfig {
                method,
                metric,
                max_evaluations,
                seed,
                max_workers: workers,
            };
            let optimizer = Optimizer::new(options_from(&common)?, config);
            let result =
                optimizer.optimize(&strategy, &bars, &space, &common.symbol, &common.timeframe)?;

            println!("{}", result.summary());
            if !result.parameter_importance.is_empty() {
                println!("Parameter importance:");
                for (name, value) in &result.parameter_importance {
                    println!("  {:<14} {:.3}", name, value);
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&result.to_record())?);
            }
        }
    }

    Ok(())
}
