//! Candle — the fundamental market data unit — and the replay Timeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV candle for one symbol over one native time bucket.
///
/// Timestamps are local market time (no timezone), so bucket alignment in
/// [`crate::domain::Timeframe::start_of_interval`] is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high is the maximum, low the minimum, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True range against the previous close (plain high-low for the first candle).
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => hl.max((self.high - pc).abs()).max((self.low - pc).abs()),
            None => hl,
        }
    }

    /// Fold a later candle of the same bucket into this one.
    ///
    /// open stays first, close becomes last, high/low are extrema, volume sums.
    pub fn absorb(&mut self, later: &Candle) {
        self.high = self.high.max(later.high);
        self.low = self.low.min(later.low);
        self.close = later.close;
        self.volume += later.volume;
    }

    /// Combine an ordered, non-empty run of candles into one bucket candle
    /// stamped with `bucket_start`.
    pub fn combine(bucket_start: NaiveDateTime, members: &[Candle]) -> Option<Candle> {
        let (first, rest) = members.split_first()?;
        let mut combined = Candle {
            timestamp: bucket_start,
            ..*first
        };
        for c in rest {
            combined.absorb(c);
        }
        Some(combined)
    }
}

/// Ordered candle sequence plus a cursor.
///
/// The cursor is only meaningful to the replay collaborator: `visible()` is
/// everything up to and including the cursor candle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    candles: Vec<Candle>,
    cursor: usize,
}

impl Timeline {
    /// Build a timeline with the cursor on the first candle.
    ///
    /// Candles are sorted by timestamp and exact-timestamp duplicates dropped
    /// (last one wins) so the strictly-increasing invariant holds.
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for c in candles {
            match deduped.last_mut() {
                Some(last) if last.timestamp == c.timestamp => *last = c,
                _ => deduped.push(c),
            }
        }
        Self {
            candles: deduped,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn all(&self) -> &[Candle] {
        &self.candles
    }

    /// Candles up to and including the cursor.
    pub fn visible(&self) -> &[Candle] {
        if self.candles.is_empty() {
            return &[];
        }
        &self.candles[..=self.cursor]
    }

    pub fn current(&self) -> Option<&Candle> {
        self.candles.get(self.cursor)
    }

    pub fn previous(&self) -> Option<&Candle> {
        self.cursor.checked_sub(1).and_then(|i| self.candles.get(i))
    }

    /// Place the cursor at `index` (clamped to the last candle).
    pub fn seek(&mut self, index: usize) {
        self.cursor = index.min(self.candles.len().saturating_sub(1));
    }

    /// Move the cursor forward one candle. Returns false at the end.
    pub fn advance(&mut self) -> bool {
        if self.cursor + 1 < self.candles.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Move the cursor back one candle. Returns false at the start.
    pub fn rewind(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }
}
