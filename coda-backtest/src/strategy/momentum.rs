//! Lookback-return momentum strategy.

use crate::data::Bar;
use crate::optimize::ParamSet;

use super::{usize_param, Strategy, StrategyError};

/// Signals in the direction of the trailing return when its magnitude
/// exceeds a threshold.
#[derive(Debug, Clone)]
pub struct Momentum {
    lookback: usize,
    threshold: f64,
}

impl Momentum {
    pub fn new(lookback: usize, threshold: f64) -> Result<Self, StrategyError> {
        if lookback == 0 {
            return Err(StrategyError::InvalidValue {
                name: "lookback".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(StrategyError::InvalidValue {
                name: "threshold".to_string(),
                reason: format!("must be a non-negative number, got {}", threshold),
            });
        }
        Ok(Self {
            lookback,
            threshold,
        })
    }
}

impl Strategy for Momentum {
    fn strategy_id(&self) -> &str {
        "momentum"
    }

    fn generate_signals(&self, bars: &[Bar]) -> Result<Vec<f64>, StrategyError> {
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.try_into().unwrap_or(0.0))
            .collect();

        let mut signals = vec![0.0; bars.len()];
        for i in self.lookback..bars.len() {
            let base = closes[i - self.lookback];
            if base == 0.0 {
                continue;
            }
            let trailing_return = closes[i] / base - 1.0;
            if trailing_return > self.threshold {
                signals[i] = 1.0;
            } else if trailing_return < -self.threshold {
                signals[i] = -1.0;
            }
        }
        Ok(signals)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), StrategyError> {
        for (name, value) in params {
            match name.as_str() {
                "lookback" => {
                    self.lookback = usize_param(name, value.as_int())?;
                }
                "threshold" => {
                    let threshold =
                        value
                            .as_float()
                            .ok_or_else(|| StrategyError::InvalidValue {
                                name: name.to_string(),
                                reason: "expected a float value".to_string(),
                            })?;
                    if !threshold.is_finite() || threshold < 0.0 {
                        return Err(StrategyError::InvalidValue {
                            name: name.to_string(),
                            reason: format!("must be a non-negative number, got {}", threshold),
                        });
                    }
                    self.threshold = threshold;
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
    fn test_signals_follow_trailing_return() {
        let strategy = Momentum::new(2, 0.05).unwrap();
        let series = bars(&[100.0, 100.0, 110.0, 100.0, 90.0]);
        let signals = strategy.generate_signals(&series).unwrap();

        assert_eq!(signals, vec![0.0, 0.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_threshold_suppresses_noise() {
        let strategy = Momentum::new(1, 0.50).unwrap();
        let series = bars(&[100.0, 101.0, 99.0, 100.0]);
        let signals = strategy.generate_signals(&series).unwrap();
        assert!(signals.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_set_params() {
        let mut strategy = Momentum::new(5, 0.02).unwrap();
        let mut params = ParamSet::new();
        params.insert("lookback".to_string(), ParamValue::Int(10));
        params.insert("threshold".to_string(), ParamValue::Float(0.1));
        strategy.set_params(&params).unwrap();
        assert_eq!(strategy.lookback, 10);
        assert_eq!(strategy.threshold, 0.1);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        assert!(Momentum::new(5, -0.1).is_err());
    }
}
