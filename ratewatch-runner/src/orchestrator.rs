//! Symbol-level parallelism over a bounded worker pool.
//!
//! Each worker owns whole symbols; a ticker is never touched by two threads
//! at once. The shutdown flag is checked before each symbol starts, so a
//! symbol that has begun always finishes its update.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use ratewatch_core::data::{CalendarProvider, PositionProvider, TimeSeriesProvider};
use ratewatch_core::domain::{Position, Timeframe};
use ratewatch_core::{Config, Ticker};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::book::TickerBook;
use crate::replay::{run_replay, ReplayError, ReplayOptions, ReplayProvider, ReplayReport};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Counts for one load or refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Candles pushed across all symbols.
    pub pushed: usize,
    pub elapsed_ms: u64,
}

enum Outcome {
    Updated { pushed: usize },
    Skipped,
    Failed,
}

impl CycleSummary {
    fn tally(outcomes: impl IntoIterator<Item = Outcome>, started: Instant) -> Self {
        let mut summary = Self::default();
        for o in outcomes {
            match o {
                Outcome::Updated { pushed } => {
                    summary.updated += 1;
                    summary.pushed += pushed;
                }
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        summary
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    pool: rayon::ThreadPool,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, workers: usize) -> Result<Self, OrchestratorError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("ratewatch-worker-{i}"))
            .build()?;
        Ok(Self {
            config,
            pool,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Flag shared with signal handlers. Setting it stops cycles between
    /// symbols.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Fetch full histories and build a ticker per symbol. Symbols with no
    /// data are skipped with a warning and left out of the book.
    pub fn initial_load(
        &self,
        book: &TickerBook,
        symbols: &[String],
        series: &dyn TimeSeriesProvider,
        positions: &dyn PositionProvider,
        calendar: &dyn CalendarProvider,
    ) -> CycleSummary {
        let started = Instant::now();
        let mut tickers = book.write();

        let built: Vec<(String, Option<Ticker>, Outcome)> = self.pool.install(|| {
            symbols
                .par_iter()
                .map(|symbol| {
                    if self.is_shutdown() {
                        return (symbol.clone(), None, Outcome::Skipped);
                    }
                    let history = series.time_series(symbol, Timeframe::Hour1);
                    if history.is_empty() {
                        warn!(symbol = %symbol, provider = series.name(), "no history, skipping");
                        return (symbol.clone(), None, Outcome::Skipped);
                    }
                    let pushed = history.len();
                    match Ticker::new(
                        symbol.as_str(),
                        Arc::clone(&self.config),
                        &history,
                        positions.get_position(symbol),
                        calendar.next_event(symbol),
                    ) {
                        Ok(t) => (symbol.clone(), Some(t), Outcome::Updated { pushed }),
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "failed to build ticker");
                            (symbol.clone(), None, Outcome::Failed)
                        }
                    }
                })
                .collect()
        });

        let outcomes = built.into_iter().map(|(symbol, ticker, outcome)| {
            if let Some(t) = ticker {
                tickers.insert(symbol, t);
            }
            outcome
        });
        let summary = CycleSummary::tally(outcomes, started);
        info!(
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            candles = summary.pushed,
            elapsed_ms = summary.elapsed_ms,
            "initial load finished"
        );
        summary
    }

    /// One update cycle over every ticker in the book: sync position and
    /// calendar state, then push the last closed candle and the current one.
    pub fn refresh(
        &self,
        book: &TickerBook,
        series: &dyn TimeSeriesProvider,
        positions: &dyn PositionProvider,
        calendar: &dyn CalendarProvider,
    ) -> CycleSummary {
        let started = Instant::now();
        let mut guard = book.write();
        let tickers: &mut BTreeMap<String, Ticker> = &mut guard;

        let outcomes: Vec<Outcome> = self.pool.install(|| {
            tickers
                .par_iter_mut()
                .map(|(symbol, ticker)| {
                    if self.is_shutdown() {
                        return Outcome::Skipped;
                    }
                    refresh_one(symbol, ticker, series, positions, calendar)
                })
                .collect()
        });

        let summary = CycleSummary::tally(outcomes, started);
        info!(
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            pushed = summary.pushed,
            elapsed_ms = summary.elapsed_ms,
            "refresh cycle finished"
        );
        summary
    }

    /// Replay every symbol of `provider` in parallel, in symbol order.
    pub fn replay_all(
        &self,
        provider: &ReplayProvider,
        symbols: &[String],
        opts: ReplayOptions,
    ) -> Vec<(String, Result<ReplayReport, ReplayError>)> {
        self.pool.install(|| {
            symbols
                .par_iter()
                .filter(|_| !self.is_shutdown())
                .map(|symbol| {
                    let result = run_replay(provider, symbol, Arc::clone(&self.config), opts);
                    if let Err(e) = &result {
                        warn!(symbol = %symbol, error = %e, "replay failed");
                    }
                    (symbol.clone(), result)
                })
                .collect()
        })
    }
}

fn same_position(a: Option<&Position>, b: Option<&Position>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.shares == b.shares && a.entry_price == b.entry_price && a.entry_time == b.entry_time
        }
        _ => false,
    }
}

fn refresh_one(
    symbol: &str,
    ticker: &mut Ticker,
    series: &dyn TimeSeriesProvider,
    positions: &dyn PositionProvider,
    calendar: &dyn CalendarProvider,
) -> Outcome {
    let position = positions.get_position(symbol);
    if !same_position(ticker.position(), position.as_ref()) {
        debug!(symbol, "position changed");
        ticker.set_position(position);
    }
    let event = calendar.next_event(symbol);
    if ticker.next_event() != event.as_ref() {
        ticker.set_next_event(event);
    }

    let Some((closed, current)) = series.real_time(symbol, Timeframe::Hour1) else {
        warn!(symbol, provider = series.name(), "no real-time candles, skipping");
        return Outcome::Skipped;
    };

    let mut pushed = 0;
    for candle in [closed, current] {
        let Some(last) = ticker.last_candle().map(|c| c.timestamp) else {
            break;
        };
        if candle.timestamp < last {
            continue;
        }
        if let Err(e) = ticker.push_back(candle) {
            warn!(symbol, error = %e, "push failed");
            return Outcome::Failed;
        }
        pushed += 1;
    }
    Outcome::Updated { pushed }
}
