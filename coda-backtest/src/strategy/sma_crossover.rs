//! Simple moving average crossover strategy.

use crate::data::Bar;
use crate::optimize::ParamSet;

use super::{usize_param, Strategy, StrategyError};

/// Buys on a golden cross (fast SMA crossing above slow SMA) and sells
/// on a death cross. Emits a signal only on the crossing bar.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    fast_period: usize,
    slow_period: usize,
}

impl SmaCrossover {
    pub fn new(fast_period: usize, slow_period: usize) -> Result<Self, StrategyError> {
        if fast_period == 0 {
            return Err(StrategyError::InvalidValue {
                name: "fast_period".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if slow_period <= fast_period {
            return Err(StrategyError::InvalidValue {
                name: "slow_period".to_string(),
                reason: format!("must be greater than fast_period ({})", fast_period),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
        })
    }

    /// SMA over the `period` closes ending at `end` (inclusive).
    fn sma(closes: &[f64], end: usize, period: usize) -> Option<f64> {
        if end + 1 < period {
            return None;
        }
        let window = &closes[end + 1 - period..=end];
        Some(window.iter().sum::<f64>() / period as f64)
    }
}

impl Strategy for SmaCrossover {
    fn strategy_id(&self) -> &str {
        "sma_crossover"
    }

    fn generate_signals(&self, bars: &[Bar]) -> Result<Vec<f64>, StrategyError> {
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.try_into().unwrap_or(0.0))
            .collect();

        let mut signals = vec![0.0; bars.len()];
        for i in 1..bars.len() {
            let (Some(fast), Some(slow)) = (
                Self::sma(&closes, i, self.fast_period),
                Self::sma(&closes, i, self.slow_period),
            ) else {
                continue;
            };
            let (Some(prev_fast), Some(prev_slow)) = (
                Self::sma(&closes, i - 1, self.fast_period),
                Self::sma(&closes, i - 1, self.slow_period),
            ) else {
                continue;
            };

            if prev_fast <= prev_slow && fast > slow {
                signals[i] = 1.0;
            } else if prev_fast >= prev_slow && fast < slow {
                signals[i] = -1.0;
            }
        }

        Ok(signals)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), StrategyError> {
        for (name, value) in params {
            match name.as_str() {
                "fast_period" => {
                    self.fast_period = usize_param(name, value.as_int())?;
                }
                "slow_period" => {
                    self.slow_period = usize_param(name, value.as_int())?;
                }
                other => return Err(StrategyError::UnknownParameter(other.to_string())),
            }
        }

        if self.slow_period <= self.fast_period {
            return Err(StrategyError::InvalidValue {
                name: "slow_period".to_string(),
                reason: format!("must be greater than fast_period ({})", self.fast_period),
            });
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::ParamValue;
    use chrono::DateTime;
    use rust_decimal::Decimal;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::from_close(
                    DateTime::from_timestamp(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                    Decimal::from_f64_retain(c).unwrap(),
                    1.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_golden_cross_emits_buy() {
        // Falling then sharply rising closes: fast SMA crosses above slow.
        let strategy = SmaCrossover::new(2, 4).unwrap();
        let series = bars(&[10.0, 9.0, 8.0, 7.0, 6.0, 9.0, 12.0, 15.0]);
        let signals = strategy.generate_signals(&series).unwrap();

        assert_eq!(signals.len(), series.len());
        assert!(signals.iter().any(|&s| s > 0.0));
        // Warm-up region stays flat.
        assert_eq!(signals[0], 0.0);
        assert_eq!(signals[1], 0.0);
    }

    #[test]
    fn test_death_cross_emits_sell() {
        let strategy = SmaCrossover::new(2, 4).unwrap();
        let series = bars(&[5.0, 6.0, 7.0, 8.0, 9.0, 6.0, 3.0, 1.0]);
        let signals = strategy.generate_signals(&series).unwrap();
        assert!(signals.iter().any(|&s| s < 0.0));
    }

    #[test]
    fn test_invalid_periods_rejected() {
        assert!(SmaCrossover::new(0, 10).is_err());
        assert!(SmaCrossover::new(10, 10).is_err());
    }

    #[test]
    fn test_set_params() {
        let mut strategy = SmaCrossover::new(5, 20).unwrap();
        let mut params = ParamSet::new();
        params.insert("fast_period".to_string(), ParamValue::Int(8));
        params.insert("slow_period".to_string(), ParamValue::Int(34));
        strategy.set_params(&params).unwrap();
        assert_eq!(strategy.fast_period, 8);
        assert_eq!(strategy.slow_period, 34);
    }

    #[test]
    fn test_unknown_param_rejected() {
        let mut strategy = SmaCrossover::new(5, 20).unwrap();
        let mut params = ParamSet::new();
        params.insert("lookback".to_string(), ParamValue::Int(8));
        assert!(matches!(
            strategy.set_params(&params),
            Err(StrategyError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_inconsistent_params_rejected() {
        let mut strategy = SmaCrossover::new(5, 20).unwrap();
        let mut params = ParamSet::new();
        params.insert("fast_period".to_string(), ParamValue::Int(30));
        assert!(strategy.set_params(&params).is_err());
    }
}
