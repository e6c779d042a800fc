//! Core backtesting engine.
//!
//! Runs the simulation loop, one chronological pass over the bars with
//! at most one open position at a time:
//! 1. Open a position when flat and the bar's signal is non-zero
//! 2. Close it when the signal flips against the direction, or force a
//!    close at the final bar
//! 3. Track favorable/adverse excursions while the position is open
//! 4. Record the mark-to-market account value for every bar

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::data::Bar;
use crate::metrics::{MetricsCalculator, PerformanceMetrics};
use crate::strategy::Strategy;

use super::options::{BacktestOptions, PositionSizing};
use super::trade::{ExitReason, OpenPosition, Trade, TradeDirection};
use super::BacktestError;

/// Account value snapshot for one bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Cash plus unrealized P&L.
    pub equity: Decimal,
    pub cash: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Result of a completed backtest.
///
/// Owns the trade ledger and equity curve produced by exactly one
/// engine run; read-only afterwards. Metrics are computed on first
/// access and cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub options: BacktestOptions,
    /// All completed trades, in entry-time order.
    pub trades: Vec<Trade>,
    /// One point per processed bar plus the initial point.
    pub equity_curve: Vec<EquityPoint>,
    #[serde(skip)]
    metrics: OnceLock<PerformanceMetrics>,
}

impl BacktestResult {
    /// Performance metrics for this run, computed on first access.
    pub fn metrics(&self) -> &PerformanceMetrics {
        self.metrics.get_or_init(|| {
            MetricsCalculator::calculate(
                &self.equity_curve,
                Some(&self.trades),
                self.options.risk_free_rate,
                self.options.trading_days_per_year,
            )
        })
    }

    /// Final account value.
    pub fn final_equity(&self) -> Decimal {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.options.initial_capital)
    }

    /// Total return over the run, in percent.
    pub fn total_return_pct(&self) -> f64 {
        let initial: f64 = self.options.initial_capital.try_into().unwrap_or(1.0);
        let final_eq: f64 = self.final_equity().try_into().unwrap_or(1.0);
        if initial == 0.0 {
            return 0.0;
        }
        (final_eq - initial) / initial * 100.0
    }

    /// Structured record for downstream consumers.
    pub fn to_record(&self) -> serde_json::Value {
        let metrics = self.metrics();
        json!({
            "strategy_id": self.strategy_id,
            "symbol": self.symbol,
            "timeframe": self.timeframe,
            "start_date": self.start_date,
            "end_date": self.end_date,
            "options": self.options,
            "summary": {
                "trade_count": self.trades.len(),
                "win_rate": metrics.win_rate,
                "profit_factor": metrics.profit_factor,
                "total_pnl": metrics.total_pnl,
                "max_drawdown": metrics.max_drawdown,
                "sharpe_ratio": metrics.sharpe_ratio,
            },
            "metrics": metrics,
            "trades": self.trades,
        })
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let metrics = self.metrics();
        format!(
            "Backtest {} on {} {} ({} to {})\n\
             ----------------------------------------\n\
             Total Return: {:.2}%\n\
             Final Equity: {:.2}\n\
             Max Drawdown: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             Trades: {} | Win Rate: {} | Profit Factor: {}",
            self.strategy_id,
            self.symbol,
            self.timeframe,
            self.start_date.format("%Y-%m-%d"),
            self.end_date.format("%Y-%m-%d"),
            self.total_return_pct(),
            self.final_equity(),
            metrics.max_drawdown,
            metrics.sharpe_ratio,
            self.trades.len(),
            metrics
                .win_rate
                .map(|w| format!("{:.1}%", w))
                .unwrap_or_else(|| "n/a".to_string()),
            metrics
                .profit_factor
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "n/a".to_string()),
        )
    }
}

/// The main backtesting engine.
pub struct BacktestEngine {
    options: BacktestOptions,
}

impl BacktestEngine {
    pub fn new(options: BacktestOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BacktestOptions {
        &self.options
    }

    /// Run the simulation for one strategy over one bar series.
    pub fn run(
        &self,
        strategy: &dyn Strategy,
        bars: &[Bar],
        symbol: &str,
        timeframe: &str,
    ) -> Result<BacktestResult, BacktestError> {
        self.options.validate()?;
        if bars.is_empty() {
            return Err(BacktestError::EmptyData);
        }
        for idx in 1..bars.len() {
            if bars[idx].timestamp <= bars[idx - 1].timestamp {
                return Err(BacktestError::UnorderedBars(idx));
            }
        }

        let signals = strategy.generate_signals(bars)?;
        if signals.len() != bars.len() {
            return Err(BacktestError::SignalCountMismatch {
                expected: bars.len(),
                got: signals.len(),
            });
        }
        if let Some(idx) = signals.iter().position(|s| !s.is_finite()) {
            return Err(BacktestError::NonFiniteSignal(idx));
        }

        let mut cash = self.options.initial_capital;
        let mut open: Option<OpenPosition> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut next_trade_id: u64 = 1;

        let mut equity_curve = Vec::with_capacity(bars.len() + 1);
        equity_curve.push(EquityPoint {
            timestamp: bars[0].timestamp,
            equity: cash,
            cash,
            unrealized_pnl: Decimal::ZERO,
        });

        let last = bars.len() - 1;
        for (idx, bar) in bars.iter().enumerate() {
            let signal = signals[idx];

            // 1. Entry: flat and a non-zero signal.
            if open.is_none() && signal != 0.0 {
                let direction = if signal > 0.0 {
                    Some(TradeDirection::Long)
                } else if self.options.enable_short_positions {
                    Some(TradeDirection::Short)
                } else {
                    None
                };

                if let Some(direction) = direction {
                    let entry_price = direction.entry_fill(bar.close, self.options.slippage_rate);
                    let size = self.position_size(cash, entry_price);
                    if size > Decimal::ZERO {
                        let position = OpenPosition::open(
                            next_trade_id,
                            symbol,
                            bar,
                            direction,
                            entry_price,
                            size,
                            cash,
                            self.options.commission_rate,
                        );
                        cash -= position.entry_cost();
                        next_trade_id += 1;
                        open = Some(position);
                    } else {
                        debug!(
                            bar = idx,
                            close = %bar.close,
                            "entry skipped: sized to zero units"
                        );
                    }
                }
            }

            // 2. Exit: signal flip or forced close at the final bar.
            // 3. Excursion tracking while the position stays open.
            if let Some(mut position) = open.take() {
                let flipped = match position.direction {
                    TradeDirection::Long => signal < 0.0,
                    TradeDirection::Short => signal > 0.0,
                };

                if flipped || idx == last {
                    let reason = if flipped {
                        ExitReason::Signal
                    } else {
                        ExitReason::EndOfData
                    };
                    let (trade, cash_delta) = position.close(
                        bar,
                        reason,
                        self.options.commission_rate,
                        self.options.slippage_rate,
                    );
                    cash += cash_delta;
                    trades.push(trade);
                } else {
                    position.update_excursions(bar.close);
                    open = Some(position);
                }
            }

            // 4. Mark-to-market equity for this bar.
            let unrealized = open
                .as_ref()
                .map(|p| p.unrealized_pnl(bar.close))
                .unwrap_or(Decimal::ZERO);
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                equity: cash + unrealized,
                cash,
                unrealized_pnl: unrealized,
            });
        }

        Ok(BacktestResult {
            strategy_id: strategy.strategy_id().to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            start_date: bars[0].timestamp,
            end_date: bars[last].timestamp,
            options: self.options.clone(),
            trades,
            equity_curve,
            metrics: OnceLock::new(),
        })
    }

    /// Units to open against the given fill price.
    fn position_size(&self, cash: Decimal, entry_price: Decimal) -> Decimal {
        if entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let size = match self.options.position_sizing {
            PositionSizing::Percent => {
                let fraction = Decimal::from_f64(self.options.max_position_size.min(1.0))
                    .unwrap_or_default();
                cash * fraction / entry_price
            }
            PositionSizing::Fixed => {
                Decimal::from_f64(self.options.max_position_size).unwrap_or_default()
            }
        };
        if self.options.use_fractional_sizes {
            size
        } else {
            size.trunc()
        }
    }
}
