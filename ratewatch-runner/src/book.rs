//! The set of live tickers behind one reader/writer lock.
//!
//! An update cycle takes the writer lock for its whole duration; renderers
//! take the reader lock and only see complete cycles.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ratewatch_core::{Ticker, TickerSnapshot};

#[derive(Debug, Default)]
pub struct TickerBook {
    tickers: RwLock<BTreeMap<String, Ticker>>,
}

impl TickerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the ticker for its symbol.
    pub fn insert(&self, ticker: Ticker) -> Option<Ticker> {
        self.write().insert(ticker.symbol().to_string(), ticker)
    }

    pub fn remove(&self, symbol: &str) -> Option<Ticker> {
        self.write().remove(symbol)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Ticker>> {
        self.tickers.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Ticker>> {
        self.tickers.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self, symbol: &str) -> Option<TickerSnapshot> {
        self.read().get(symbol)?.snapshot()
    }

    /// Snapshots of every ticker, ordered by symbol.
    pub fn snapshots(&self) -> Vec<TickerSnapshot> {
        self.read().values().filter_map(Ticker::snapshot).collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
