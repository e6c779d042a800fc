//! Performance metrics.
//!
//! Pure statistics over an equity curve and trade ledger.

pub mod calculator;

pub use calculator::{MetricsCalculator, PerformanceMetrics};
