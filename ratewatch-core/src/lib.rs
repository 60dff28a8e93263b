//! Ratewatch Core — incremental multi-timeframe indicators, support/resistance
//! zones, backtest-weighted signal ratings and the stop/target/sizing pipeline.
//!
//! This crate contains the per-symbol computation:
//! - Domain types (candles, timelines, positions, timeframes)
//! - Indicator primitives with exact undo (EMA, RSI, MACD, ATR)
//! - Trendline fitting and zone detection per timeframe
//! - `Metrics`: one native feed kept in sync with its 1h/4h/1d bundles
//! - Predicate backtesting, rating state machine and timeframe rollup
//! - Risk pipeline and the `Ticker` that ties everything together

pub mod backtest;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod risk;
pub mod signals;
pub mod ticker;
pub mod trend_lines;
pub mod zones;

pub use config::{Config, ConfigError};
pub use error::CoreError;
pub use ticker::{Ticker, TickerSnapshot};
