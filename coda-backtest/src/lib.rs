pub mod backtest;
pub mod data;
pub mod metrics;
pub mod optimize;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{
    BacktestEngine, BacktestError, BacktestOptions, BacktestResult, EquityPoint, ExitReason,
    PositionSizing, Trade, TradeDirection,
};
pub use data::{load_bars_csv, Bar, LoaderError};
pub use metrics::{MetricsCalculator, PerformanceMetrics};
pub use optimize::{
    OptimizationMethod, OptimizationResult, OptimizeError, Optimizer, OptimizerConfig, ParamSet,
    ParamValue, ParameterRange, ParameterSpace,
};
pub use strategy::{Momentum, SmaCrossover, Strategy, StrategyError};
