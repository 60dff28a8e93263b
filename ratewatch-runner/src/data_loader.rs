//! Candle loading from CSV files.
//!
//! One file per symbol, `<data_dir>/<SYMBOL>.csv`, with header
//! `timestamp,open,high,low,close,volume` and timestamps formatted as
//! `%Y-%m-%d %H:%M:%S` in local market time. Rows are sorted on load and a
//! repeated timestamp keeps the last row.

use chrono::NaiveDateTime;
use ratewatch_core::domain::{Candle, Timeline};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("bad timestamp '{value}' in {path} (expected {TIMESTAMP_FORMAT})")]
    Timestamp { path: PathBuf, value: String },

    #[error("no candles in {path}")]
    Empty { path: PathBuf },
}

#[derive(Debug, Serialize, Deserialize)]
struct CandleRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Path of a symbol's candle file.
pub fn candle_path(data_dir: &Path, symbol: &str) -> PathBuf {
    data_dir.join(format!("{symbol}.csv"))
}

/// Read one candle file, oldest first.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let mut candles = Vec::new();
    for row in reader.deserialize::<CandleRow>() {
        let row = row.map_err(csv_err)?;
        let timestamp = NaiveDateTime::parse_from_str(row.timestamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|_| LoadError::Timestamp {
                path: path.to_path_buf(),
                value: row.timestamp.clone(),
            })?;
        candles.push(Candle::new(
            timestamp, row.open, row.high, row.low, row.close, row.volume,
        ));
    }

    // Timeline sorts and keeps the last row of a repeated timestamp.
    let candles = Timeline::new(candles).all().to_vec();
    if candles.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(candles)
}

/// Write candles in the format `load_candles` reads.
pub fn write_candles(path: &Path, candles: &[Candle]) -> Result<(), LoadError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    for c in candles {
        writer
            .serialize(CandleRow {
                timestamp: c.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .map_err(|source| LoadError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Symbols with a candle file in `data_dir`, sorted.
pub fn discover_symbols(data_dir: &Path) -> Result<Vec<String>, LoadError> {
    let entries = std::fs::read_dir(data_dir).map_err(|source| LoadError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;
    let mut symbols: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    symbols.sort();
    Ok(symbols)
}

/// Load every requested symbol. Failures are returned per symbol so the
/// caller can skip them.
pub fn load_symbols(
    data_dir: &Path,
    symbols: &[String],
) -> Vec<(String, Result<Vec<Candle>, LoadError>)> {
    symbols
        .iter()
        .map(|s| (s.clone(), load_candles(&candle_path(data_dir, s))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, day)
            .unwrap()
            .and_hms_opt(hour, 30, 0)
            .unwrap()
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = candle_path(dir.path(), "ABC");
        let candles = vec![
            Candle::new(ts(1, 9), 10.0, 11.0, 9.5, 10.5, 1200.0),
            Candle::new(ts(1, 10), 10.5, 10.8, 10.1, 10.2, 900.0),
        ];
        write_candles(&path, &candles).unwrap();
        assert_eq!(load_candles(&path).unwrap(), candles);
        assert_eq!(discover_symbols(dir.path()).unwrap(), vec!["ABC"]);
    }

    #[test]
    fn unsorted_rows_are_ordered_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("X.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-04-01 10:30:00,2,3,1,2.5,10").unwrap();
        writeln!(f, "2024-04-01 09:30:00,1,2,0.5,1.5,10").unwrap();
        writeln!(f, "2024-04-01 10:30:00,2,3,1,2.8,12").unwrap();
        drop(f);

        let candles = load_candles(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, ts(1, 9));
        assert_eq!(candles[1].close, 2.8);
    }

    #[test]
    fn bad_timestamp_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("X.csv");
        std::fs::write(&path, "timestamp,open,high,low,close,volume\n2024/04/01,1,2,0.5,1.5,10\n")
            .unwrap();
        let err = load_candles(&path).unwrap_err();
        assert!(matches!(err, LoadError::Timestamp { .. }));
    }

    #[test]
    fn header_only_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("X.csv");
        std::fs::write(&path, "timestamp,open,high,low,close,volume\n").unwrap();
        assert!(matches!(load_candles(&path).unwrap_err(), LoadError::Empty { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_candles(&dir.path().join("NOPE.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
