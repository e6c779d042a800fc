//! Backtesting engine for signal-driven strategies.
//!
//! This module provides the complete simulation framework:
//! - Run configuration with cost and sizing models
//! - Trade lifecycle management (entry, excursion tracking, exits)
//! - The chronological simulation loop and its result type

use thiserror::Error;

pub mod engine;
pub mod options;
pub mod trade;

pub use engine::{BacktestEngine, BacktestResult, EquityPoint};
pub use options::{BacktestOptions, PositionSizing};
pub use trade::{ExitReason, OpenPosition, Trade, TradeDirection};

use crate::strategy::StrategyError;

/// Input errors fatal to a single backtest run.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("no historical bars were provided")]
    EmptyData,

    #[error("bars are not strictly ordered by timestamp (index {0})")]
    UnorderedBars(usize),

    #[error("strategy emitted {got} signals for {expected} bars")]
    SignalCountMismatch { expected: usize, got: usize },

    #[error("strategy emitted a non-finite signal at bar {0}")]
    NonFiniteSignal(usize),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Strategy(#[from] StrategyError),
}
