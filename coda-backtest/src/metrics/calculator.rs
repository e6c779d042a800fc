//! Performance metrics calculator.
//!
//! A pure function over an equity curve and an optional trade ledger.
//! Degenerate inputs never raise: zero volatility, zero drawdown and
//! zero gross loss all map to the explicit fallback values documented
//! on each metric.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::backtest::{EquityPoint, Trade};

/// Named bag of scalar statistics. Never mutates after construction.
///
/// Optional metrics are omitted (both here and in serialized form) when
/// their inputs are degenerate or absent, e.g. trade statistics without
/// a trade ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// End-to-start return of the equity curve, percent.
    pub total_return: f64,

    /// Compound annual growth rate, percent. Absent when the curve is
    /// too short to annualize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annualized_return: Option<f64>,

    /// Annualized standard deviation of per-bar returns, percent.
    pub annualized_volatility: f64,

    /// Annualized excess return over total volatility. 0 when the
    /// return series has no variance.
    pub sharpe_ratio: f64,

    /// Like Sharpe, but the denominator is the deviation of negative
    /// returns only. 0 when no negative returns exist.
    pub sortino_ratio: f64,

    /// Worst peak-to-trough decline, percent. Always <= 0.
    pub max_drawdown: f64,

    /// Annualized return over |max drawdown|. Absent when the curve
    /// never draws down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calmar_ratio: Option<f64>,

    pub trade_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,

    /// Gross profit over gross loss. +inf when there are profits and no
    /// losses, 0 when there are neither.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,

    /// |average win / average loss|. Absent without losing trades.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_loss_ratio: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pnl: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_win: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_loss: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_win: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_loss: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_wins: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_losses: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_trade_duration_secs: Option<f64>,
}

impl PerformanceMetrics {
    /// Look up a metric by name. Integer-valued metrics are widened.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "total_return" => Some(self.total_return),
            "annualized_return" => self.annualized_return,
            "annualized_volatility" => Some(self.annualized_volatility),
            "sharpe_ratio" => Some(self.sharpe_ratio),
            "sortino_ratio" => Some(self.sortino_ratio),
            "max_drawdown" => Some(self.max_drawdown),
            "calmar_ratio" => self.calmar_ratio,
            "trade_count" => Some(self.trade_count as f64),
            "win_rate" => self.win_rate,
            "profit_factor" => self.profit_factor,
            "win_loss_ratio" => self.win_loss_ratio,
            "total_pnl" => self.total_pnl,
            "avg_win" => self.avg_win,
            "avg_loss" => self.avg_loss,
            "largest_win" => self.largest_win,
            "largest_loss" => self.largest_loss,
            "max_consecutive_wins" => self.max_consecutive_wins.map(|v| v as f64),
            "max_consecutive_losses" => self.max_consecutive_losses.map(|v| v as f64),
            "avg_trade_duration_secs" => self.avg_trade_duration_secs,
            _ => None,
        }
    }
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from an equity curve and optional ledger.
    pub fn calculate(
        equity_curve: &[EquityPoint],
        trades: Option<&[Trade]>,
        risk_free_rate: f64,
        trading_days_per_year: u32,
    ) -> PerformanceMetrics {
        let equity: Vec<f64> = equity_curve
            .iter()
            .map(|p| p.equity.try_into().unwrap_or(0.0))
            .collect();
        let periods = trading_days_per_year as f64;

        let returns = Self::simple_returns(&equity);
        let (std_dev, sharpe_ratio) = Self::sharpe(&returns, risk_free_rate, periods);
        let sortino_ratio = Self::sortino(&returns, risk_free_rate, periods);
        let max_drawdown = Self::max_drawdown(&equity);
        let annualized_volatility = std_dev * periods.sqrt() * 100.0;

        let total_return = match (equity.first(), equity.last()) {
            (Some(&start), Some(&end)) if start != 0.0 => (end / start - 1.0) * 100.0,
            _ => 0.0,
        };

        let annualized_return = Self::annualized_return(&equity, periods);
        let calmar_ratio = match (annualized_return, max_drawdown) {
            (Some(annual), dd) if dd < 0.0 => Some(annual / dd.abs()),
            _ => None,
        };

        let mut metrics = PerformanceMetrics {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            calmar_ratio,
            trade_count: 0,
            win_rate: None,
            profit_factor: None,
            win_loss_ratio: None,
            total_pnl: None,
            avg_win: None,
            avg_loss: None,
            largest_win: None,
            largest_loss: None,
            max_consecutive_wins: None,
            max_consecutive_losses: None,
            avg_trade_duration_secs: None,
        };

        if let Some(trades) = trades {
            metrics.trade_count = trades.len();
            if !trades.is_empty() {
                Self::trade_statistics(&mut metrics, trades);
            }
        }

        metrics
    }

    /// Per-bar simple returns of the equity curve.
    fn simple_returns(equity: &[f64]) -> Vec<f64> {
        equity
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect()
    }

    /// Population standard deviation and Sharpe ratio of the returns.
    fn sharpe(returns: &[f64], risk_free_rate: f64, periods: f64) -> (f64, f64) {
        if returns.is_empty() {
            return (0.0, 0.0);
        }
        let mean = returns.iter().mean();
        let std_dev = returns.iter().population_std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return (0.0, 0.0);
        }
        let excess = mean - risk_free_rate / periods;
        (std_dev, excess / std_dev * periods.sqrt())
    }

    /// Sharpe numerator over the deviation of negative returns only.
    fn sortino(returns: &[f64], risk_free_rate: f64, periods: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let downside: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
        if downside.is_empty() {
            return 0.0;
        }
        let downside_dev = downside.iter().population_std_dev();
        if downside_dev == 0.0 || !downside_dev.is_finite() {
            return 0.0;
        }
        let mean = returns.iter().mean();
        let excess = mean - risk_free_rate / periods;
        excess / downside_dev * periods.sqrt()
    }

    /// Worst decline from the running peak, percent. <= 0 by construction.
    fn max_drawdown(equity: &[f64]) -> f64 {
        let mut peak = f64::MIN;
        let mut worst = 0.0_f64;
        for &value in equity {
            peak = peak.max(value);
            if peak > 0.0 {
                worst = worst.min(value / peak - 1.0);
            }
        }
        worst * 100.0
    }

    /// CAGR over `len(curve) / periods` years, percent.
    fn annualized_return(equity: &[f64], periods: f64) -> Option<f64> {
        let (&start, &end) = (equity.first()?, equity.last()?);
        let years = equity.len() as f64 / periods;
        if years <= 0.0 || start <= 0.0 || end <= 0.0 {
            return None;
        }
        Some(((end / start).powf(1.0 / years) - 1.0) * 100.0)
    }

    fn trade_statistics(metrics: &mut PerformanceMetrics, trades: &[Trade]) {
        let pnls: Vec<f64> = trades
            .iter()
            .map(|t| t.net_pnl.try_into().unwrap_or(0.0))
            .collect();

        let winners: Vec<f64> = pnls.iter().copied().filter(|&p| p > 0.0).collect();
        let losers: Vec<f64> = pnls.iter().copied().filter(|&p| p < 0.0).collect();

        let gross_profit: f64 = winners.iter().sum();
        let gross_loss: f64 = losers.iter().sum::<f64>().abs();

        metrics.win_rate = Some(winners.len() as f64 / trades.len() as f64 * 100.0);
        metrics.total_pnl = Some(pnls.iter().sum());
        metrics.profit_factor = Some(Self::profit_factor(gross_profit, gross_loss));

        if !winners.is_empty() {
            let avg_win = gross_profit / winners.len() as f64;
            metrics.avg_win = Some(avg_win);
            metrics.largest_win = Some(winners.iter().copied().fold(f64::MIN, f64::max));
            if !losers.is_empty() {
                let avg_loss = gross_loss / losers.len() as f64;
                metrics.win_loss_ratio = Some((avg_win / avg_loss).abs());
            }
        }
        if !losers.is_empty() {
            metrics.avg_loss = Some(-(gross_loss / losers.len() as f64));
            metrics.largest_loss = Some(losers.iter().copied().fold(f64::MAX, f64::min));
        }

        let (max_wins, max_losses) = Self::streaks(&pnls);
        metrics.max_consecutive_wins = Some(max_wins);
        metrics.max_consecutive_losses = Some(max_losses);

        let total_secs: f64 = trades
            .iter()
            .map(|t| t.duration().num_milliseconds() as f64 / 1000.0)
            .sum();
        metrics.avg_trade_duration_secs = Some(total_secs / trades.len() as f64);
    }

    /// Gross profit over gross loss, with the documented edge cases.
    fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
        if gross_loss == 0.0 {
            if gross_profit > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            gross_profit / gross_loss
        }
    }

    /// Longest consecutive win and loss streaks.
    fn streaks(pnls: &[f64]) -> (usize, usize) {
        let mut max_wins = 0;
        let mut max_losses = 0;
        let mut wins = 0;
        let mut losses = 0;
        for &pnl in pnls {
            if pnl > 0.0 {
                wins += 1;
                losses = 0;
            } else if pnl < 0.0 {
                losses += 1;
                wins = 0;
            } else {
                wins = 0;
                losses = 0;
            }
            max_wins = max_wins.max(wins);
            max_losses = max_losses.max(losses);
        }
        (max_wins, max_losses)
    }
}
