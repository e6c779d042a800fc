//! Core market data types.
//!
//! A [`Bar`] is the fundamental unit of historical data consumed by the
//! backtester: one OHLCV observation for a fixed time interval.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV observation for a fixed time interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    /// Open time of the interval.
    pub timestamp: DateTime<Utc>,

    /// Opening price.
    pub open: Decimal,

    /// Highest traded price.
    pub high: Decimal,

    /// Lowest traded price.
    pub low: Decimal,

    /// Closing price. All fills in the simulation happen at the close.
    pub close: Decimal,

    /// Traded volume over the interval.
    pub volume: f64,
}

impl Bar {
    /// Create a bar where all four prices are equal.
    ///
    /// Mostly useful for close-driven simulations and tests, where only
    /// the closing price matters.
    pub fn from_close(timestamp: DateTime<Utc>, close: Decimal, volume: f64) -> Self {
        Self {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_close() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let bar = Bar::from_close(ts, dec!(42000.5), 12.0);
        assert_eq!(bar.open, bar.close);
        assert_eq!(bar.high, dec!(42000.5));
        assert_eq!(bar.low, dec!(42000.5));
    }
}
