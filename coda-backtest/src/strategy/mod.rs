//! Strategy abstraction.
//!
//! The engine depends only on this capability set: produce a per-bar
//! signal series, clone into an independent copy, and accept parameter
//! updates. Concrete strategies implement the trait; the backtest and
//! optimization engines never branch on a concrete type.

pub mod momentum;
pub mod sma_crossover;

use thiserror::Error;

use crate::data::Bar;
use crate::optimize::ParamSet;

pub use momentum::Momentum;
pub use sma_crossover::SmaCrossover;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("signal generation failed: {0}")]
    SignalGeneration(String),
}

/// A tunable trading strategy.
///
/// `generate_signals` must return exactly one value per input bar:
/// positive = buy, negative = sell, zero = no action. The engine treats
/// signal values as sign-only; magnitude carries no meaning for entries
/// or exits.
pub trait Strategy: Send + Sync {
    /// Stable identifier for this strategy.
    fn strategy_id(&self) -> &str;

    /// Produce one signal per bar.
    fn generate_signals(&self, bars: &[Bar]) -> Result<Vec<f64>, StrategyError>;

    /// Apply a set of named parameter values.
    ///
    /// Unknown parameter names are rejected so that optimization runs
    /// fail loudly on a misspelled dimension instead of silently
    /// evaluating an unchanged strategy.
    fn set_params(&mut self, params: &ParamSet) -> Result<(), StrategyError>;

    /// Clone into an independent boxed copy.
    fn clone_box(&self) -> Box<dyn Strategy>;
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Parse a positive integer parameter value.
pub(crate) fn usize_param(name: &str, value: Option<i64>) -> Result<usize, StrategyError> {
    match value {
        Some(v) if v > 0 => Ok(v as usize),
        Some(v) => Err(StrategyError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be a positive integer, got {}", v),
        }),
        None => Err(StrategyError::InvalidValue {
            name: name.to_string(),
            reason: "expected an integer value".to_string(),
        }),
    }
}
