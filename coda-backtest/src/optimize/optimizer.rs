//! Parameter optimization engine.
//!
//! Generates candidate parameter combinations from a [`ParameterSpace`],
//! evaluates one backtest per candidate in parallel, and aggregates the
//! outcomes. Every worker owns an independent clone of the strategy, so
//! evaluations cannot observe each other's state; the historical bars
//! are shared read-only.
//!
//! [`ParameterSpace`]: super::ParameterSpace

use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::backtest::{BacktestEngine, BacktestError, BacktestOptions};
use crate::data::Bar;
use crate::metrics::PerformanceMetrics;
use crate::strategy::Strategy;

use super::space::{ParamSet, ParameterRange, ParameterSpace};
use super::OptimizeError;

/// Number of samples a random search draws when no cap is given.
pub const DEFAULT_RANDOM_EVALUATIONS: usize = 50;

/// Largest grid the optimizer will run without an explicit cap.
pub const MAX_UNCAPPED_GRID: usize = 100_000;

/// Candidate generation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    /// Exhaustive Cartesian enumeration, subsampled when capped.
    GridSearch,
    /// Independent uniform samples.
    RandomSearch,
}

impl std::fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GridSearch => write!(f, "grid_search"),
            Self::RandomSearch => write!(f, "random_search"),
        }
    }
}

impl FromStr for OptimizationMethod {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid_search" | "grid" => Ok(Self::GridSearch),
            "random_search" | "random" => Ok(Self::RandomSearch),
            other => Err(OptimizeError::UnknownMethod(other.to_string())),
        }
    }
}

/// Configuration for an optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub method: OptimizationMethod,

    /// Metric name the search maximizes, looked up in the metrics bag.
    pub metric: String,

    /// Evaluation cap. Grids larger than this are uniformly subsampled
    /// without replacement; random search draws exactly this many.
    pub max_evaluations: Option<usize>,

    /// Seed for sampling and subsampling; fixed seed, fixed candidates.
    pub seed: u64,

    /// Worker pool size. Defaults to the global rayon pool.
    pub max_workers: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            method: OptimizationMethod::GridSearch,
            metric: "sharpe_ratio".to_string(),
            max_evaluations: None,
            seed: 42,
            max_workers: None,
        }
    }
}

/// One successful candidate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub parameters: ParamSet,
    pub metrics: PerformanceMetrics,
    /// Value of the target metric for this candidate.
    pub metric_value: f64,
}

/// Aggregated outcome of an optimization run. Frozen once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub strategy_id: String,
    pub method: OptimizationMethod,
    pub metric: String,
    pub parameter_space: ParameterSpace,
    /// Successful evaluations, in submission order.
    pub evaluations: Vec<Evaluation>,
    /// Best evaluation by the target metric; ties keep the first found.
    pub best: Option<Evaluation>,
    /// Candidates that failed and were excluded.
    pub failed_evaluations: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: f64,
    /// Normalized |Pearson correlation| per numeric/boolean dimension.
    pub parameter_importance: Vec<(String, f64)>,
}

impl OptimizationResult {
    pub fn best_parameters(&self) -> Option<&ParamSet> {
        self.best.as_ref().map(|e| &e.parameters)
    }

    pub fn best_metric_value(&self) -> Option<f64> {
        self.best.as_ref().map(|e| e.metric_value)
    }

    /// Structured record for downstream consumers.
    pub fn to_record(&self) -> serde_json::Value {
        let importance: serde_json::Map<String, serde_json::Value> = self
            .parameter_importance
            .iter()
            .map(|(name, value)| (name.clone(), json!(value)))
            .collect();
        json!({
            "strategy_id": self.strategy_id,
            "optimization_method": self.method,
            "metric_name": self.metric,
            "best_parameters": self.best_parameters(),
            "best_metric_value": self.best_metric_value(),
            "parameter_space": self.parameter_space,
            "results_count": self.evaluations.len(),
            "failed_count": self.failed_evaluations,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "duration_seconds": self.duration_secs,
            "parameter_importance": importance,
        })
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let best = match &self.best {
            Some(best) => {
                let mut params: Vec<String> = best
                    .parameters
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                params.sort();
                format!("{:.4} at {}", best.metric_value, params.join(", "))
            }
            None => "no successful evaluations".to_string(),
        };
        format!(
            "Optimization ({}) of {} over {} candidates ({} failed) in {:.2}s\n\
             Best {}: {}",
            self.method,
            self.strategy_id,
            self.evaluations.len() + self.failed_evaluations,
            self.failed_evaluations,
            self.duration_secs,
            self.metric,
            best,
        )
    }
}

/// The optimization engine.
pub struct Optimizer {
    options: BacktestOptions,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(options: BacktestOptions, config: OptimizerConfig) -> Self {
        Self { options, config }
    }

    /// Search the parameter space for the combination maximizing the
    /// target metric.
    ///
    /// A single candidate's failure is logged and excluded; the run
    /// always completes with whatever subset succeeded.
    pub fn optimize(
        &self,
        strategy: &dyn Strategy,
        bars: &[Bar],
        space: &ParameterSpace,
        symbol: &str,
        timeframe: &str,
    ) -> Result<OptimizationResult, OptimizeError> {
        self.options.validate().map_err(OptimizeError::Backtest)?;
        if space.is_empty() {
            return Err(OptimizeError::EmptySpace);
        }
        if bars.is_empty() {
            return Err(OptimizeError::Backtest(BacktestError::EmptyData));
        }

        let start_time = Utc::now();
        let started = Instant::now();
        let combinations = self.candidates(space)?;
        info!(
            method = %self.config.method,
            candidates = combinations.len(),
            metric = %self.config.metric,
            "starting optimization"
        );

        let engine = BacktestEngine::new(self.options.clone());
        let run_candidate = |params: &ParamSet| -> Option<Evaluation> {
            self.evaluate(&engine, strategy, bars, symbol, timeframe, params)
        };

        let outcomes: Vec<Option<Evaluation>> = match self.config.max_workers {
            Some(workers) => rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| OptimizeError::WorkerPool(e.to_string()))?
                .install(|| combinations.par_iter().map(run_candidate).collect()),
            None => combinations.par_iter().map(run_candidate).collect(),
        };

        let submitted = outcomes.len();
        let evaluations: Vec<Evaluation> = outcomes.into_iter().flatten().collect();
        let failed_evaluations = submitted - evaluations.len();

        // Strictly-greater comparison keeps the first-found candidate on
        // ties, in submission order.
        let mut best: Option<&Evaluation> = None;
        for evaluation in &evaluations {
            if best.map_or(true, |b| evaluation.metric_value > b.metric_value) {
                best = Some(evaluation);
            }
        }
        let best = best.cloned();

        let parameter_importance = Self::parameter_importance(space, &evaluations);
        let duration_secs = started.elapsed().as_secs_f64();
        info!(
            evaluated = evaluations.len(),
            failed = failed_evaluations,
            duration_secs,
            "optimization complete"
        );

        Ok(OptimizationResult {
            strategy_id: strategy.strategy_id().to_string(),
            method: self.config.method,
            metric: self.config.metric.clone(),
            parameter_space: space.clone(),
            evaluations,
            best,
            failed_evaluations,
            start_time,
            end_time: Utc::now(),
            duration_secs,
            parameter_importance,
        })
    }

    /// Candidate combinations for the configured method, in the order
    /// they are submitted for evaluation.
    fn candidates(&self, space: &ParameterSpace) -> Result<Vec<ParamSet>, OptimizeError> {
        let mut rng = Pcg64::seed_from_u64(self.config.seed);
        match self.config.method {
            OptimizationMethod::GridSearch => {
                let size = space.grid_size();
                if size == usize::MAX {
                    // Saturated product: indices no longer decode uniquely.
                    return Err(OptimizeError::GridTooLarge {
                        size,
                        ceiling: MAX_UNCAPPED_GRID,
                    });
                }
                match self.config.max_evaluations {
                    Some(cap) if size > cap => {
                        info!(grid = size, cap, "subsampling grid to evaluation cap");
                        let mut indices = rand::seq::index::sample(&mut rng, size, cap).into_vec();
                        indices.sort_unstable();
                        Ok(indices
                            .into_iter()
                            .filter_map(|idx| space.nth_grid_combination(idx))
                            .collect())
                    }
                    Some(_) => Ok(space.grid_combinations()),
                    None if size > MAX_UNCAPPED_GRID => Err(OptimizeError::GridTooLarge {
                        size,
                        ceiling: MAX_UNCAPPED_GRID,
                    }),
                    None => Ok(space.grid_combinations()),
                }
            }
            OptimizationMethod::RandomSearch => {
                let n = self
                    .config
                    .max_evaluations
                    .unwrap_or(DEFAULT_RANDOM_EVALUATIONS);
                Ok(space.random_combinations(n, &mut rng))
            }
        }
    }

    /// Evaluate one candidate on a private strategy clone. Any failure
    /// is logged with the offending combination and excluded.
    fn evaluate(
        &self,
        engine: &BacktestEngine,
        strategy: &dyn Strategy,
        bars: &[Bar],
        symbol: &str,
        timeframe: &str,
        params: &ParamSet,
    ) -> Option<Evaluation> {
        let mut candidate = strategy.clone_box();
        if let Err(error) = candidate.set_params(params) {
            warn!(combination = %format_params(params), %error, "candidate rejected");
            return None;
        }

        let result = match engine.run(candidate.as_ref(), bars, symbol, timeframe) {
            Ok(result) => result,
            Err(error) => {
                warn!(combination = %format_params(params), %error, "evaluation failed");
                return None;
            }
        };

        let metrics = result.metrics().clone();
        match metrics.get(&self.config.metric) {
            Some(value) if !value.is_nan() => Some(Evaluation {
                parameters: params.clone(),
                metrics,
                metric_value: value,
            }),
            _ => {
                warn!(
                    combination = %format_params(params),
                    metric = %self.config.metric,
                    "target metric unavailable for candidate"
                );
                None
            }
        }
    }

    /// Absolute Pearson correlation between each numeric/boolean
    /// dimension and the target metric, normalized so the maximum
    /// importance equals 1. Dimensions that cannot be correlated are
    /// omitted.
    fn parameter_importance(
        space: &ParameterSpace,
        evaluations: &[Evaluation],
    ) -> Vec<(String, f64)> {
        let mut importance = Vec::new();
        for (name, range) in space.iter() {
            if matches!(range, ParameterRange::Categorical { .. }) {
                continue;
            }

            let pairs: Vec<(f64, f64)> = evaluations
                .iter()
                .filter(|e| e.metric_value.is_finite())
                .filter_map(|e| {
                    let x = e.parameters.get(name)?.as_f64()?;
                    Some((x, e.metric_value))
                })
                .collect();
            if pairs.len() < 2 {
                continue;
            }

            let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
            let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
            let std_x = xs.iter().population_std_dev();
            let std_y = ys.iter().population_std_dev();
            if std_x == 0.0 || std_y == 0.0 || !std_x.is_finite() || !std_y.is_finite() {
                continue;
            }

            let mean_x = xs.iter().mean();
            let mean_y = ys.iter().mean();
            let covariance = pairs
                .iter()
                .map(|(x, y)| (x - mean_x) * (y - mean_y))
                .sum::<f64>()
                / pairs.len() as f64;
            let correlation = (covariance / (std_x * std_y)).abs();
            if correlation.is_finite() {
                importance.push((name.to_string(), correlation));
            }
        }

        let max = importance.iter().map(|(_, v)| *v).fold(0.0, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }
        for (_, value) in &mut importance {
            *value /= max;
        }
        importance
    }
}

fn format_params(params: &ParamSet) -> String {
    let mut parts: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    parts.sort();
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyError;
    use chrono::DateTime;
    use rust_decimal::Decimal;

    /// Holds when its period divides the bar index, otherwise alternates
    /// long/flat; P&L responds monotonically to `period`, which makes
    /// importance deterministic.
    #[derive(Debug, Clone)]
    struct Tunable {
        period: i64,
        fail_above: Option<i64>,
    }

    impl Tunable {
        fn new() -> Self {
            Self {
                period: 1,
                fail_above: None,
            }
        }
    }

    impl Strategy for Tunable {
        fn strategy_id(&self) -> &str {
            "tunable"
        }

        fn generate_signals(&self, bars: &[Bar]) -> Result<Vec<f64>, StrategyError> {
            if let Some(limit) = self.fail_above {
                if self.period > limit {
                    return Err(StrategyError::SignalGeneration(format!(
                        "period {} unsupported",
                        self.period
                    )));
                }
            }
            // Enter on the first bar, exit after `period` bars, repeat.
            let cycle = self.period.max(1) as usize + 1;
            Ok((0..bars.len())
                .map(|i| match i % cycle {
                    0 => 1.0,
                    r if r == cycle - 1 => -1.0,
                    _ => 0.0,
                })
                .collect())
        }

        fn set_params(&mut self, params: &ParamSet) -> Result<(), StrategyError> {
            for (name, value) in params {
                match name.as_str() {
                    "period" => {
                        self.period = value.as_int().ok_or_else(|| {
                            StrategyError::InvalidValue {
                                name: name.clone(),
                                reason: "expected int".to_string(),
                            }
                        })?;
                    }
                    other => return Err(StrategyError::UnknownParameter(other.to_string())),
                }
            }
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn Strategy> {
            Box::new(self.clone())
        }
    }

    fn rising_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                Bar::from_close(
                    DateTime::from_timestamp(1_700_000_000 + i as i64 * 86_400, 0).unwrap(),
                    Decimal::from(100 + i as i64),
                    1.0,
                )
            })
            .collect()
    }

    fn frictionless() -> BacktestOptions {
        BacktestOptions {
            commission_rate: 0.0,
            slippage_rate: 0.0,
            ..Default::default()
        }
    }

    fn space() -> ParameterSpace {
        let mut space = ParameterSpace::new();
        space.add_int("period", 1, 5, 1).unwrap();
        space
    }

    #[test]
    fn test_grid_search_evaluates_every_combination() {
        let optimizer = Optimizer::new(
            frictionless(),
            OptimizerConfig {
                metric: "total_return".to_string(),
                ..Default::default()
            },
        );
        let result = optimizer
            .optimize(&Tunable::new(), &rising_bars(40), &space(), "BTCUSDT", "1d")
            .unwrap();

        assert_eq!(result.evaluations.len(), 5);
        assert_eq!(result.failed_evaluations, 0);
        assert!(result.best.is_some());
    }

    #[test]
    fn test_grid_search_is_deterministic() {
        let run = || {
            Optimizer::new(
                frictionless(),
                OptimizerConfig {
                    metric: "total_return".to_string(),
                    ..Default::default()
                },
            )
            .optimize(&Tunable::new(), &rising_bars(40), &space(), "BTCUSDT", "1d")
            .unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.best_parameters(), second.best_parameters());
        assert_eq!(first.best_metric_value(), second.best_metric_value());
    }

    #[test]
    fn test_capped_grid_subsamples_exactly() {
        let optimizer = Optimizer::new(
            frictionless(),
            OptimizerConfig {
                metric: "total_return".to_string(),
                max_evaluations: Some(3),
                ..Default::default()
            },
        );
        let result = optimizer
            .optimize(&Tunable::new(), &rising_bars(40), &space(), "BTCUSDT", "1d")
            .unwrap();
        assert_eq!(result.evaluations.len() + result.failed_evaluations, 3);

        // Same seed, same subsample.
        let again = optimizer
            .optimize(&Tunable::new(), &rising_bars(40), &space(), "BTCUSDT", "1d")
            .unwrap();
        let params = |r: &OptimizationResult| -> Vec<ParamSet> {
            r.evaluations.iter().map(|e| e.parameters.clone()).collect()
        };
        assert_eq!(params(&result), params(&again));
    }

    #[test]
    fn test_random_search_draws_default_count() {
        let optimizer = Optimizer::new(
            frictionless(),
            OptimizerConfig {
                method: OptimizationMethod::RandomSearch,
                metric: "total_return".to_string(),
                ..Default::default()
            },
        );
        let result = optimizer
            .optimize(&Tunable::new(), &rising_bars(40), &space(), "BTCUSDT", "1d")
            .unwrap();
        assert_eq!(
            result.evaluations.len() + result.failed_evaluations,
            DEFAULT_RANDOM_EVALUATIONS
        );
    }

    #[test]
    fn test_failed_candidates_are_excluded_not_fatal() {
        let strategy = Tunable {
            period: 1,
            fail_above: Some(3),
        };
        let optimizer = Optimizer::new(
            frictionless(),
            OptimizerConfig {
                metric: "total_return".to_string(),
                ..Default::default()
            },
        );
        let result = optimizer
            .optimize(&strategy, &rising_bars(40), &space(), "BTCUSDT", "1d")
            .unwrap();

        // Periods 4 and 5 fail; the run still completes.
        assert_eq!(result.failed_evaluations, 2);
        assert_eq!(result.evaluations.len(), 3);
        assert!(result.best.is_some());
        assert!(result
            .evaluations
            .iter()
            .all(|e| e.parameters["period"].as_int().unwrap() <= 3));
    }

    #[test]
    fn test_importance_for_linear_driver() {
        // In a steadily rising market, longer holds capture more of the
        // move, so `period` correlates strongly with total return.
        let optimizer = Optimizer::new(
            frictionless(),
            OptimizerConfig {
                metric: "total_return".to_string(),
                ..Default::default()
            },
        );
        let result = optimizer
            .optimize(&Tunable::new(), &rising_bars(60), &space(), "BTCUSDT", "1d")
            .unwrap();

        let (name, value) = &result.parameter_importance[0];
        assert_eq!(name, "period");
        assert_eq!(*value, 1.0);
    }

    #[test]
    fn test_empty_space_rejected() {
        let optimizer = Optimizer::new(frictionless(), OptimizerConfig::default());
        let err = optimizer
            .optimize(
                &Tunable::new(),
                &rising_bars(10),
                &ParameterSpace::new(),
                "BTCUSDT",
                "1d",
            )
            .unwrap_err();
        assert!(matches!(err, OptimizeError::EmptySpace));
    }

    #[test]
    fn test_empty_bars_rejected() {
        let optimizer = Optimizer::new(frictionless(), OptimizerConfig::default());
        let err = optimizer
            .optimize(&Tunable::new(), &[], &space(), "BTCUSDT", "1d")
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizeError::Backtest(BacktestError::EmptyData)
        ));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "grid_search".parse::<OptimizationMethod>().unwrap(),
            OptimizationMethod::GridSearch
        );
        assert_eq!(
            "random".parse::<OptimizationMethod>().unwrap(),
            OptimizationMethod::RandomSearch
        );
        assert!("simulated_annealing".parse::<OptimizationMethod>().is_err());
    }

    #[test]
    fn test_record_shape() {
        let optimizer = Optimizer::new(
            frictionless(),
            OptimizerConfig {
                metric: "total_return".to_string(),
                ..Default::default()
            },
        );
        let result = optimizer
            .optimize(&Tunable::new(), &rising_bars(40), &space(), "BTCUSDT", "1d")
            .unwrap();
        let record = result.to_record();

        assert_eq!(record["strategy_id"], "tunable");
        assert_eq!(record["optimization_method"], "grid_search");
        assert_eq!(record["results_count"], 5);
        assert!(record["best_parameters"].is_object());
        assert!(record["parameter_importance"].is_object());
    }
}
