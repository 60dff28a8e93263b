//! Ratewatch runner: symbol orchestration, CSV loading and offline replay.
//!
//! This crate builds on `ratewatch-core` to provide:
//! - `TickerBook`, the shared set of live tickers behind one lock
//! - `Orchestrator`, initial load and refresh cycles over a bounded worker pool
//! - `ReplayProvider` and `run_replay` for deterministic offline replays
//! - CSV candle files and TOML runner configuration

pub mod book;
pub mod config;
pub mod data_loader;
pub mod orchestrator;
pub mod replay;

pub use book::TickerBook;
pub use config::{ConfigError, RunnerConfig};
pub use data_loader::{discover_symbols, load_candles, load_symbols, write_candles, LoadError};
pub use orchestrator::{CycleSummary, Orchestrator, OrchestratorError};
pub use replay::{
    run_replay, ReplayError, ReplayOptions, ReplayProvider, ReplayReport, ReplayStep,
};
