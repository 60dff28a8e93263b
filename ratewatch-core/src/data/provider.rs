//! Collaborator traits for market data, positions and calendar events.
//!
//! The core never talks to a network or a broker. Failures on the data side
//! surface as empty results; the caller skips that symbol for the cycle.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Position, Timeframe};

/// Source of candle history and the in-progress candle.
pub trait TimeSeriesProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Full history for a symbol, oldest first. Empty on failure.
    fn time_series(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle>;

    /// The last closed candle and the current one, if available.
    fn real_time(&self, symbol: &str, timeframe: Timeframe) -> Option<(Candle, Candle)>;
}

pub trait PositionProvider: Send + Sync {
    fn get_position(&self, symbol: &str) -> Option<Position>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Earnings,
    Dividend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub symbol: String,
    pub date: NaiveDate,
    pub kind: EventKind,
}

impl CalendarEvent {
    /// Earnings falling within `buffer_days` on or after `today`.
    pub fn is_earnings_within(&self, today: NaiveDate, buffer_days: i64) -> bool {
        if self.kind != EventKind::Earnings {
            return false;
        }
        let days = (self.date - today).num_days();
        (0..=buffer_days).contains(&days)
    }
}

pub trait CalendarProvider: Send + Sync {
    fn next_event(&self, symbol: &str) -> Option<CalendarEvent>;
}

/// Positions held in memory, keyed by symbol.
#[derive(Debug, Default)]
pub struct InMemoryPositions {
    positions: RwLock<HashMap<String, Position>>,
}

impl InMemoryPositions {
    pub fn new(positions: impl IntoIterator<Item = Position>) -> Self {
        Self {
            positions: RwLock::new(
                positions
                    .into_iter()
                    .map(|p| (p.symbol.clone(), p))
                    .collect(),
            ),
        }
    }

    pub fn open(&self, position: Position) {
        if let Ok(mut map) = self.positions.write() {
            map.insert(position.symbol.clone(), position);
        }
    }

    pub fn close(&self, symbol: &str) -> Option<Position> {
        self.positions.write().ok()?.remove(symbol)
    }
}

impl PositionProvider for InMemoryPositions {
    fn get_position(&self, symbol: &str) -> Option<Position> {
        self.positions.read().ok()?.get(symbol).cloned()
    }
}

/// Calendar events held in memory; the earliest event per symbol wins.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: HashMap<String, Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new(events: impl IntoIterator<Item = CalendarEvent>) -> Self {
        let mut map: HashMap<String, Vec<CalendarEvent>> = HashMap::new();
        for e in events {
            map.entry(e.symbol.clone()).or_default().push(e);
        }
        for list in map.values_mut() {
            list.sort_by_key(|e| e.date);
        }
        Self { events: map }
    }
}

impl CalendarProvider for InMemoryCalendar {
    fn next_event(&self, symbol: &str) -> Option<CalendarEvent> {
        self.events.get(symbol)?.first().cloned()
    }
}
