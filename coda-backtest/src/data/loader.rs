//! CSV bar loader.
//!
//! Loads historical OHLCV bars from CSV files into the type system for
//! backtesting. Expected schema, one row per bar:
//! - `timestamp` (epoch milliseconds)
//! - `open`, `high`, `low`, `close` (prices)
//! - `volume`
//!
//! Bars must be strictly ordered by timestamp; the loader rejects files
//! that are not.

use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::Bar;

/// Columns every bar file must contain.
pub const REQUIRED_COLUMNS: &[&str] = &["timestamp", "open", "high", "low", "close", "volume"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load bars from a CSV file.
pub fn load_bars_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>, LoaderError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }

    let df = CsvReader::from_path(path)?.has_header(true).finish()?;
    bars_from_dataframe(&df)
}

/// Convert a DataFrame with the expected schema into a bar series.
pub fn bars_from_dataframe(df: &DataFrame) -> Result<Vec<Bar>, LoaderError> {
    let columns = df.get_column_names();
    for required in REQUIRED_COLUMNS {
        if !columns.contains(required) {
            return Err(LoaderError::MissingColumn(required.to_string()));
        }
    }

    let timestamps = df.column("timestamp")?.cast(&DataType::Int64)?;
    let timestamps = timestamps.i64()?;
    let open = df.column("open")?.cast(&DataType::Float64)?;
    let open = open.f64()?;
    let high = df.column("high")?.cast(&DataType::Float64)?;
    let high = high.f64()?;
    let low = df.column("low")?.cast(&DataType::Float64)?;
    let low = low.f64()?;
    let close = df.column("close")?.cast(&DataType::Float64)?;
    let close = close.f64()?;
    let volume = df.column("volume")?.cast(&DataType::Float64)?;
    let volume = volume.f64()?;

    let mut bars = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let millis = timestamps
            .get(idx)
            .ok_or_else(|| LoaderError::InvalidData(format!("null timestamp at row {}", idx)))?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            LoaderError::InvalidData(format!("timestamp out of range at row {}", idx))
        })?;

        bars.push(Bar {
            timestamp,
            open: price_at(open, idx, "open")?,
            high: price_at(high, idx, "high")?,
            low: price_at(low, idx, "low")?,
            close: price_at(close, idx, "close")?,
            volume: volume.get(idx).unwrap_or(0.0),
        });
    }

    for idx in 1..bars.len() {
        if bars[idx].timestamp <= bars[idx - 1].timestamp {
            return Err(LoaderError::InvalidData(format!(
                "bars are not strictly ordered by timestamp at row {}",
                idx
            )));
        }
    }

    Ok(bars)
}

fn price_at(column: &Float64Chunked, idx: usize, name: &str) -> Result<Decimal, LoaderError> {
    let value = column
        .get(idx)
        .ok_or_else(|| LoaderError::InvalidData(format!("null {} at row {}", name, idx)))?;
    Decimal::from_f64_retain(value)
        .ok_or_else(|| LoaderError::InvalidData(format!("non-finite {} at row {}", name, idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_bars_csv() {
        let path = write_fixture(
            "coda_loader_ok.csv",
            "timestamp,open,high,low,close,volume\n\
             1700000000000,100.0,101.0,99.0,100.5,10\n\
             1700000060000,100.5,102.0,100.0,101.5,12\n",
        );

        let bars = load_bars_csv(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close.to_string(), "100.5");
        assert!(bars[1].timestamp > bars[0].timestamp);
    }

    #[test]
    fn test_missing_column_rejected() {
        let path = write_fixture(
            "coda_loader_missing.csv",
            "timestamp,open,high,low,volume\n1700000000000,1,1,1,1\n",
        );

        let err = load_bars_csv(&path).unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumn(c) if c == "close"));
    }

    #[test]
    fn test_unordered_bars_rejected() {
        let path = write_fixture(
            "coda_loader_unordered.csv",
            "timestamp,open,high,low,close,volume\n\
             1700000060000,1,1,1,1,1\n\
             1700000000000,1,1,1,1,1\n",
        );

        let err = load_bars_csv(&path).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidData(_)));
    }

    #[test]
    fn test_file_not_found() {
        let err = load_bars_csv("/nonexistent/bars.csv").unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }
}
