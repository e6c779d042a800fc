//! Backtest configuration.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BacktestError;

/// How the engine sizes a new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSizing {
    /// `max_position_size` is a fraction of current capital (0-1].
    Percent,
    /// `max_position_size` is an absolute unit count.
    Fixed,
}

/// Configuration for backtest execution. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestOptions {
    /// Starting capital.
    pub initial_capital: Decimal,

    /// Commission as a fraction of traded notional, charged at entry and exit.
    pub commission_rate: f64,

    /// Execution price penalty as a fraction of the fill price, applied
    /// against the trader at entry and exit.
    pub slippage_rate: f64,

    /// Fraction of capital (percent mode) or unit count (fixed mode).
    pub max_position_size: f64,

    /// Position sizing mode.
    pub position_sizing: PositionSizing,

    /// Allow fractional unit counts. When false, sizes truncate to whole units.
    pub use_fractional_sizes: bool,

    /// Annual risk-free rate used by risk-adjusted metrics.
    pub risk_free_rate: f64,

    /// Trading periods per year used for annualization.
    pub trading_days_per_year: u32,

    /// Allow short entries on negative signals.
    #[serde(default)]
    pub enable_short_positions: bool,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::from(10_000),
            commission_rate: 0.001,  // 10 bps per side
            slippage_rate: 0.0005,   // 5 bps per side
            max_position_size: 1.0,  // full capital
            position_sizing: PositionSizing::Percent,
            use_fractional_sizes: true,
            risk_free_rate: 0.0,
            trading_days_per_year: 365, // crypto markets trade daily
            enable_short_positions: false,
        }
    }
}

impl BacktestOptions {
    /// Validate field constraints. Called by the engine before every run.
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(BacktestError::InvalidOptions(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        for (name, value) in [
            ("commission_rate", self.commission_rate),
            ("slippage_rate", self.slippage_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BacktestError::InvalidOptions(format!(
                    "{} must be a non-negative fraction, got {}",
                    name, value
                )));
            }
        }
        if !self.max_position_size.is_finite() || self.max_position_size <= 0.0 {
            return Err(BacktestError::InvalidOptions(format!(
                "max_position_size must be positive, got {}",
                self.max_position_size
            )));
        }
        if self.position_sizing == PositionSizing::Percent && self.max_position_size > 1.0 {
            return Err(BacktestError::InvalidOptions(format!(
                "max_position_size must be at most 1.0 in percent mode, got {}",
                self.max_position_size
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(BacktestError::InvalidOptions(
                "risk_free_rate must be finite".to_string(),
            ));
        }
        if self.trading_days_per_year == 0 {
            return Err(BacktestError::InvalidOptions(
                "trading_days_per_year must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Flatten into a key-value mapping. Round-trips losslessly through
    /// [`BacktestOptions::from_map`].
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// Rebuild options from a flat key-value mapping.
    ///
    /// Unknown keys and malformed values are rejected; missing keys fall
    /// back to their defaults.
    pub fn from_map(map: &HashMap<String, serde_json::Value>) -> Result<Self, BacktestError> {
        let defaults = Self::default().to_map();
        for key in map.keys() {
            if !defaults.contains_key(key) {
                return Err(BacktestError::InvalidOptions(format!(
                    "unknown option `{}`",
                    key
                )));
            }
        }

        let mut merged = defaults;
        for (key, value) in map {
            merged.insert(key.clone(), value.clone());
        }

        let value = serde_json::Value::Object(merged.into_iter().collect());
        let options: Self = serde_json::from_value(value)
            .map_err(|e| BacktestError::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_options_validate() {
        BacktestOptions::default().validate().unwrap();
    }

    #[test]
    fn test_zero_capital_rejected() {
        let options = BacktestOptions {
            initial_capital: Decimal::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(BacktestError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_percent_size_above_one_rejected() {
        let options = BacktestOptions {
            max_position_size: 1.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        // The same size is fine as an absolute unit count.
        let options = BacktestOptions {
            max_position_size: 1.5,
            position_sizing: PositionSizing::Fixed,
            ..Default::default()
        };
        options.validate().unwrap();
    }

    #[test]
    fn test_map_round_trip() {
        let options = BacktestOptions {
            initial_capital: dec!(25000.50),
            commission_rate: 0.00075,
            slippage_rate: 0.0002,
            max_position_size: 0.5,
            position_sizing: PositionSizing::Percent,
            use_fractional_sizes: false,
            risk_free_rate: 0.03,
            trading_days_per_year: 252,
            enable_short_positions: true,
        };

        let restored = BacktestOptions::from_map(&options.to_map()).unwrap();
        assert_eq!(options, restored);
    }

    #[test]
    fn test_from_map_rejects_unknown_key() {
        let mut map = BacktestOptions::default().to_map();
        map.insert("leverage".to_string(), serde_json::json!(10));
        assert!(BacktestOptions::from_map(&map).is_err());
    }

    #[test]
    fn test_from_map_rejects_malformed_value() {
        let mut map = BacktestOptions::default().to_map();
        map.insert("commission_rate".to_string(), serde_json::json!("free"));
        assert!(BacktestOptions::from_map(&map).is_err());
    }

    #[test]
    fn test_from_map_fills_missing_keys_with_defaults() {
        let mut map = HashMap::new();
        map.insert("trading_days_per_year".to_string(), serde_json::json!(252));
        let options = BacktestOptions::from_map(&map).unwrap();
        assert_eq!(options.trading_days_per_year, 252);
        assert_eq!(options.initial_capital, dec!(10000));
    }
}
