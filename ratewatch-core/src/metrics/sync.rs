//! Multi-timeframe synchronization.
//!
//! `Metrics` owns the native candle buffer and one [`Indicators`] per derived
//! timeframe. Each derived candle is the combination of the native candles in
//! its bucket; the in-progress bucket is re-derived (undo + append) whenever a
//! native candle joins or leaves it.
//!
//! `push_back` and `rollback` are exact inverses. Replaced candles are kept in
//! a bounded journal so a same-timestamp replacement can be reverted too.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::Indicators;
use crate::config::Config;
use crate::domain::{Candle, PerTimeframe, Position, Timeframe};
use crate::error::CoreError;

/// What a `push_back` did to each timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub new_bucket: PerTimeframe<bool>,
    /// The candle replaced the last native candle (same timestamp).
    pub replaced: bool,
}

impl PushOutcome {
    pub fn new_hourly(&self) -> bool {
        self.new_bucket.hour1
    }
}

/// What a `rollback` did to each timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// The timeframe's last bucket disappeared (it had only the removed candle).
    pub removed_bucket: PerTimeframe<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum JournalEntry {
    Appended,
    Replaced(Candle),
}

#[derive(Debug, Clone)]
pub struct Metrics {
    symbol: String,
    candles: Vec<Candle>,
    frames: PerTimeframe<Indicators>,
    /// Native index of the first member of every bucket, per timeframe.
    bucket_starts: PerTimeframe<Vec<usize>>,
    journal: VecDeque<JournalEntry>,
    max_undo_depth: usize,
}

impl Metrics {
    pub fn new(symbol: impl Into<String>, config: &Config) -> Self {
        Self {
            symbol: symbol.into(),
            candles: Vec::new(),
            frames: PerTimeframe::from_fn(|tf| Indicators::new(tf, config)),
            bucket_starts: PerTimeframe::from_fn(|_| Vec::new()),
            journal: VecDeque::new(),
            max_undo_depth: config.metrics.max_undo_depth,
        }
    }

    /// Build from a native history in one pass per timeframe.
    ///
    /// Candles must be strictly increasing; the initial load leaves the undo
    /// journal empty.
    pub fn from_candles(
        symbol: impl Into<String>,
        config: &Config,
        candles: &[Candle],
    ) -> Result<Self, CoreError> {
        let symbol = symbol.into();
        if candles.is_empty() {
            return Err(CoreError::EmptyHistory { symbol });
        }
        for pair in candles.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(CoreError::NonMonotonicTimestamp {
                    last: pair[0].timestamp,
                    got: pair[1].timestamp,
                });
            }
        }

        let mut bucket_starts = PerTimeframe::from_fn(|_| Vec::new());
        let frames = PerTimeframe::from_fn(|tf| {
            let starts = bucket_starts.get_mut(tf);
            let buckets = downsample(tf, candles, starts);
            Indicators::from_candles(tf, config, &buckets)
        });

        debug!(
            symbol = %symbol,
            native = candles.len(),
            hour4 = frames.hour4.len(),
            day1 = frames.day1.len(),
            "metrics built"
        );

        Ok(Self {
            symbol,
            candles: candles.to_vec(),
            frames,
            bucket_starts,
            journal: VecDeque::new(),
            max_undo_depth: config.metrics.max_undo_depth,
        })
    }

    /// Ingest one native candle.
    ///
    /// Same timestamp as the last candle replaces it; an older timestamp is
    /// rejected. The position's high watermark is refreshed afterwards.
    pub fn push_back(
        &mut self,
        candle: Candle,
        position: Option<&mut Position>,
    ) -> Result<PushOutcome, CoreError> {
        let outcome = match self.candles.last().map(|c| c.timestamp) {
            Some(last) if candle.timestamp < last => {
                return Err(CoreError::NonMonotonicTimestamp {
                    last,
                    got: candle.timestamp,
                });
            }
            Some(last) if candle.timestamp == last => {
                let n = self.candles.len();
                let old = std::mem::replace(&mut self.candles[n - 1], candle);
                self.record(JournalEntry::Replaced(old));
                for tf in Timeframe::ALL {
                    self.rebuild_last_bucket(tf);
                }
                PushOutcome {
                    new_bucket: PerTimeframe::from_fn(|_| false),
                    replaced: true,
                }
            }
            _ => {
                self.candles.push(candle);
                self.record(JournalEntry::Appended);
                let native = self.candles.len() - 1;
                let new_bucket = PerTimeframe::from_fn(|tf| {
                    let start = tf.start_of_interval(candle.timestamp);
                    let frame = self.frames.get_mut(tf);
                    let same_bucket = frame.last_candle().map(|c| c.timestamp) == Some(start);
                    if same_bucket {
                        false
                    } else {
                        self.bucket_starts.get_mut(tf).push(native);
                        frame.append(Candle {
                            timestamp: start,
                            ..candle
                        });
                        true
                    }
                });
                for tf in Timeframe::ALL {
                    if !new_bucket.get(tf) {
                        self.rebuild_last_bucket(tf);
                    }
                }
                PushOutcome {
                    new_bucket,
                    replaced: false,
                }
            }
        };

        if let Some(pos) = position {
            pos.refresh_max_seen(&self.candles);
        }
        trace!(
            symbol = %self.symbol,
            ts = %candle.timestamp,
            replaced = outcome.replaced,
            new_hourly = outcome.new_hourly(),
            "push_back"
        );
        Ok(outcome)
    }

    /// Revert the most recent `push_back`. Returns `None` when there is
    /// nothing left to remove.
    pub fn rollback(&mut self, position: Option<&mut Position>) -> Option<RollbackOutcome> {
        if self.candles.is_empty() {
            return None;
        }
        let entry = self.journal.pop_back().unwrap_or(JournalEntry::Appended);
        let outcome = match entry {
            JournalEntry::Replaced(old) => {
                let n = self.candles.len();
                self.candles[n - 1] = old;
                for tf in Timeframe::ALL {
                    self.rebuild_last_bucket(tf);
                }
                RollbackOutcome {
                    removed_bucket: PerTimeframe::from_fn(|_| false),
                }
            }
            JournalEntry::Appended => {
                self.candles.pop();
                let removed = self.candles.len();
                let removed_bucket = PerTimeframe::from_fn(|tf| {
                    let starts = self.bucket_starts.get_mut(tf);
                    if starts.last() == Some(&removed) {
                        starts.pop();
                        self.frames.get_mut(tf).undo();
                        true
                    } else {
                        false
                    }
                });
                for tf in Timeframe::ALL {
                    if !removed_bucket.get(tf) {
                        self.rebuild_last_bucket(tf);
                    }
                }
                RollbackOutcome { removed_bucket }
            }
        };

        if let Some(pos) = position {
            pos.refresh_max_seen(&self.candles);
        }
        trace!(symbol = %self.symbol, remaining = self.candles.len(), "rollback");
        Some(outcome)
    }

    fn record(&mut self, entry: JournalEntry) {
        if self.max_undo_depth == 0 {
            return;
        }
        if self.journal.len() == self.max_undo_depth {
            self.journal.pop_front();
        }
        self.journal.push_back(entry);
    }

    /// Recombine the members of the timeframe's last bucket and swap it in.
    fn rebuild_last_bucket(&mut self, tf: Timeframe) {
        let Some(&start) = self.bucket_starts.get(tf).last() else {
            return;
        };
        let frame = self.frames.get_mut(tf);
        let Some(bucket_ts) = frame.last_candle().map(|c| c.timestamp) else {
            return;
        };
        if let Some(combined) = Candle::combine(bucket_ts, &self.candles[start..]) {
            frame.replace_last(combined);
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn indicators(&self, tf: Timeframe) -> &Indicators {
        self.frames.get(tf)
    }

    pub fn frames(&self) -> &PerTimeframe<Indicators> {
        &self.frames
    }

    /// Number of pushes that can currently be reverted exactly.
    pub fn undo_depth(&self) -> usize {
        self.journal.len()
    }
}

/// Combine native candles into buckets of `tf`, recording each bucket's
/// first native index in `starts`.
fn downsample(tf: Timeframe, candles: &[Candle], starts: &mut Vec<usize>) -> Vec<Candle> {
    let mut buckets: Vec<Candle> = Vec::new();
    for (i, c) in candles.iter().enumerate() {
        let start = tf.start_of_interval(c.timestamp);
        match buckets.last_mut() {
            Some(b) if b.timestamp == start => b.absorb(c),
            _ => {
                starts.push(i);
                buckets.push(Candle {
                    timestamp: start,
                    ..*c
                });
            }
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn series(n: usize) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.41).sin() * 3.0 + i as f64 * 0.02)
            .collect();
        make_candles(&closes)
    }

    fn snapshot(m: &Metrics) -> String {
        format!("{:?}", m.frames())
    }

    #[test]
    fn downsampling_builds_session_buckets() {
        let candles = series(21); // three sessions of seven hourly candles
        let m = Metrics::from_candles("TEST", &Config::default(), &candles).unwrap();
        assert_eq!(m.indicators(Timeframe::Hour1).len(), 21);
        assert_eq!(m.indicators(Timeframe::Hour4).len(), 6);
        assert_eq!(m.indicators(Timeframe::Day1).len(), 3);

        let day = m.indicators(Timeframe::Day1).candle(0);
        let expected = Candle::combine(candles[0].timestamp, &candles[..7]).unwrap();
        assert_eq!(*day, expected);
        let afternoon = m.indicators(Timeframe::Hour4).candle(1);
        assert_eq!(afternoon.open, candles[4].open);
        assert_eq!(afternoon.close, candles[6].close);
    }

    #[test]
    fn incremental_pushes_match_batch_build() {
        let candles = series(70);
        let config = Config::default();
        let batch = Metrics::from_candles("TEST", &config, &candles).unwrap();
        let mut inc = Metrics::new("TEST", &config);
        for c in &candles {
            inc.push_back(*c, None).unwrap();
        }
        assert_eq!(snapshot(&batch), snapshot(&inc));
    }

    #[test]
    fn push_outcome_flags_new_buckets() {
        let candles = series(9);
        let mut m = Metrics::from_candles("TEST", &Config::default(), &candles[..7]).unwrap();
        // 9:30 of the second session opens a bucket everywhere.
        let out = m.push_back(candles[7], None).unwrap();
        assert!(out.new_hourly());
        assert!(out.new_bucket.hour4 && out.new_bucket.day1);
        // 10:30 is a new hour but the same 4h and daily bucket.
        let out = m.push_back(candles[8], None).unwrap();
        assert!(out.new_hourly());
        assert!(!out.new_bucket.hour4 && !out.new_bucket.day1);
    }

    #[test]
    fn push_then_rollback_is_identity() {
        let candles = series(60);
        let mut m = Metrics::from_candles("TEST", &Config::default(), &candles[..50]).unwrap();
        let before = snapshot(&m);
        for c in &candles[50..] {
            m.push_back(*c, None).unwrap();
        }
        for _ in 50..60 {
            m.rollback(None).unwrap();
        }
        assert_eq!(snapshot(&m), before);
        assert_eq!(m.candles(), &candles[..50]);
    }

    #[test]
    fn replacement_and_its_rollback() {
        let candles = series(30);
        let mut m = Metrics::from_candles("TEST", &Config::default(), &candles).unwrap();
        let before = snapshot(&m);
        let mut revised = candles[29];
        revised.close += 1.5;
        revised.high += 1.5;
        let out = m.push_back(revised, None).unwrap();
        assert!(out.replaced);
        assert_eq!(m.len(), 30);
        assert_eq!(m.indicators(Timeframe::Day1).candle(-1).close, revised.close);

        let rb = m.rollback(None).unwrap();
        assert!(!rb.removed_bucket.hour1);
        assert_eq!(snapshot(&m), before);
    }

    #[test]
    fn rollback_reports_removed_buckets() {
        let candles = series(9);
        let mut m = Metrics::from_candles("TEST", &Config::default(), &candles).unwrap();
        // Candle 8 (10:30) was the second member of its 4h and daily bucket.
        let rb = m.rollback(None).unwrap();
        assert!(rb.removed_bucket.hour1);
        assert!(!rb.removed_bucket.hour4 && !rb.removed_bucket.day1);
        // Candle 7 (9:30) opened all three.
        let rb = m.rollback(None).unwrap();
        assert!(rb.removed_bucket.hour1 && rb.removed_bucket.hour4 && rb.removed_bucket.day1);
        assert_eq!(m.indicators(Timeframe::Day1).len(), 1);
    }

    #[test]
    fn older_timestamp_is_rejected() {
        let candles = series(10);
        let mut m = Metrics::from_candles("TEST", &Config::default(), &candles).unwrap();
        let err = m.push_back(candles[3], None).unwrap_err();
        assert!(matches!(err, CoreError::NonMonotonicTimestamp { .. }));
        assert_eq!(m.len(), 10);
    }

    #[test]
    fn empty_history_is_an_error() {
        let err = Metrics::from_candles("NONE", &Config::default(), &[]).unwrap_err();
        assert!(matches!(err, CoreError::EmptyHistory { .. }));
    }

    #[test]
    fn position_watermark_follows_pushes() {
        let candles = series(20);
        let mut m = Metrics::from_candles("TEST", &Config::default(), &candles[..10]).unwrap();
        let mut pos = Position::new("TEST", 10.0, candles[9].close, candles[9].timestamp);
        let mut spike = candles[10];
        spike.high = 150.0;
        m.push_back(spike, Some(&mut pos)).unwrap();
        assert_eq!(pos.max_price_seen, 150.0);
        m.rollback(Some(&mut pos)).unwrap();
        assert!(pos.max_price_seen < 150.0);
    }

    #[test]
    fn journal_depth_is_bounded() {
        let mut config = Config::default();
        config.metrics.max_undo_depth = 3;
        let candles = series(10);
        let mut m = Metrics::new("TEST", &config);
        for c in &candles {
            m.push_back(*c, None).unwrap();
        }
        assert_eq!(m.undo_depth(), 3);
    }

    #[test]
    fn rollback_on_empty_is_none() {
        let mut m = Metrics::new("TEST", &Config::default());
        assert!(m.rollback(None).is_none());
    }
}
