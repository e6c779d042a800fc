//! Parameter-space search.
//!
//! Describes searchable strategy parameters and runs grid or random
//! search over them, one isolated backtest per candidate.

use thiserror::Error;

pub mod optimizer;
pub mod space;

pub use optimizer::{
    Evaluation, OptimizationMethod, OptimizationResult, Optimizer, OptimizerConfig,
    DEFAULT_RANDOM_EVALUATIONS, MAX_UNCAPPED_GRID,
};
pub use space::{ParamSet, ParamValue, ParameterRange, ParameterSpace};

use crate::backtest::BacktestError;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("parameter space is empty")]
    EmptySpace,

    #[error("invalid parameter range: {0}")]
    InvalidRange(String),

    #[error("parameter `{0}` is already registered")]
    DuplicateParameter(String),

    #[error("grid of {size} combinations exceeds the uncapped ceiling of {ceiling}; set max_evaluations")]
    GridTooLarge { size: usize, ceiling: usize },

    #[error("unknown optimization method `{0}`")]
    UnknownMethod(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Backtest(#[from] BacktestError),
}
