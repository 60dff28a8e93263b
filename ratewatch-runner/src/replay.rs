//! Offline replay.
//!
//! [`ReplayProvider`] serves pre-loaded native candle logs through the
//! `TimeSeriesProvider` interface, showing each symbol only up to its cursor.
//! [`run_replay`] builds a ticker from the first `warmup` candles and then
//! advances one candle at a time, recording the derived state of every step.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDateTime;
use ratewatch_core::data::TimeSeriesProvider;
use ratewatch_core::domain::{Candle, Timeframe, Timeline};
use ratewatch_core::signals::Rating;
use ratewatch_core::{Config, CoreError, Ticker};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("{symbol}: {len} candles is not more than the warmup of {warmup}")]
    TooShort {
        symbol: String,
        len: usize,
        warmup: usize,
    },
    #[error("{symbol}: unknown symbol")]
    UnknownSymbol { symbol: String },
    #[error("{symbol}: state after rollback and re-push differs at {timestamp}")]
    RollbackMismatch {
        symbol: String,
        timestamp: NaiveDateTime,
    },
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Native candle logs with a per-symbol cursor.
#[derive(Debug, Default)]
pub struct ReplayProvider {
    timelines: RwLock<HashMap<String, Timeline>>,
}

impl ReplayProvider {
    pub fn new(series: impl IntoIterator<Item = (String, Vec<Candle>)>) -> Self {
        Self {
            timelines: RwLock::new(
                series
                    .into_iter()
                    .map(|(symbol, candles)| (symbol, Timeline::new(candles)))
                    .collect(),
            ),
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        let map = self.timelines.read().unwrap_or_else(PoisonError::into_inner);
        let mut symbols: Vec<String> = map.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.with_timeline(symbol, |t| t.len()).unwrap_or(0)
    }

    pub fn cursor(&self, symbol: &str) -> Option<usize> {
        self.with_timeline(symbol, |t| t.cursor())
    }

    /// Timestamp of the candle the next `advance` would reveal.
    pub fn peek_next(&self, symbol: &str) -> Option<NaiveDateTime> {
        self.with_timeline(symbol, |t| t.all().get(t.cursor() + 1).map(|c| c.timestamp))
            .flatten()
    }

    pub fn seek(&self, symbol: &str, index: usize) -> bool {
        self.with_timeline_mut(symbol, |t| t.seek(index)).is_some()
    }

    /// Move every cursor to its last candle.
    pub fn seek_end(&self) {
        let mut map = self.timelines.write().unwrap_or_else(PoisonError::into_inner);
        for t in map.values_mut() {
            t.seek(t.len());
        }
    }

    pub fn advance(&self, symbol: &str) -> bool {
        self.with_timeline_mut(symbol, Timeline::advance)
            .unwrap_or(false)
    }

    pub fn rewind(&self, symbol: &str) -> bool {
        self.with_timeline_mut(symbol, Timeline::rewind)
            .unwrap_or(false)
    }

    fn with_timeline<R>(&self, symbol: &str, f: impl FnOnce(&Timeline) -> R) -> Option<R> {
        let map = self.timelines.read().unwrap_or_else(PoisonError::into_inner);
        map.get(symbol).map(f)
    }

    fn with_timeline_mut<R>(&self, symbol: &str, f: impl FnOnce(&mut Timeline) -> R) -> Option<R> {
        let mut map = self.timelines.write().unwrap_or_else(PoisonError::into_inner);
        map.get_mut(symbol).map(f)
    }
}

impl TimeSeriesProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    fn time_series(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        self.with_timeline(symbol, |t| bucketize(timeframe, t.visible()))
            .unwrap_or_default()
    }

    fn real_time(&self, symbol: &str, timeframe: Timeframe) -> Option<(Candle, Candle)> {
        self.with_timeline(symbol, |t| {
            if timeframe == Timeframe::Hour1 {
                return Some((*t.previous()?, *t.current()?));
            }
            let buckets = bucketize(timeframe, t.visible());
            match buckets.as_slice() {
                [.., prev, cur] => Some((*prev, *cur)),
                _ => None,
            }
        })
        .flatten()
    }
}

/// Combine native candles into `timeframe` buckets. The native feed is
/// hourly, so `Hour1` returns the candles unchanged.
fn bucketize(timeframe: Timeframe, candles: &[Candle]) -> Vec<Candle> {
    if timeframe == Timeframe::Hour1 {
        return candles.to_vec();
    }
    let mut out: Vec<Candle> = Vec::new();
    let mut start = 0;
    for i in 1..=candles.len() {
        let boundary = i == candles.len()
            || timeframe.start_of_interval(candles[i].timestamp)
                != timeframe.start_of_interval(candles[start].timestamp);
        if boundary {
            let ts = timeframe.start_of_interval(candles[start].timestamp);
            if let Some(c) = Candle::combine(ts, &candles[start..i]) {
                out.push(c);
            }
            start = i;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    pub warmup: usize,
    pub verify_rollback: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            warmup: 200,
            verify_rollback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub rating: Rating,
    pub score: f64,
    pub stale: bool,
    pub stop: Option<f64>,
    pub target: Option<f64>,
    pub shares: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub symbol: String,
    /// `Config::fingerprint()` of the parameters used.
    pub config_fingerprint: String,
    pub warmup: usize,
    pub steps: Vec<ReplayStep>,
    /// Steps per combined rating.
    pub rating_counts: BTreeMap<String, usize>,
    /// Rating changes keyed `"from->to"`.
    pub transitions: BTreeMap<String, usize>,
    pub verified_rollbacks: usize,
}

impl ReplayReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Replay one symbol of `provider` from its current contents.
pub fn run_replay(
    provider: &ReplayProvider,
    symbol: &str,
    config: Arc<Config>,
    opts: ReplayOptions,
) -> Result<ReplayReport, ReplayError> {
    let len = provider.len(symbol);
    if len == 0 {
        return Err(ReplayError::UnknownSymbol {
            symbol: symbol.to_string(),
        });
    }
    if len <= opts.warmup || opts.warmup == 0 {
        return Err(ReplayError::TooShort {
            symbol: symbol.to_string(),
            len,
            warmup: opts.warmup,
        });
    }

    provider.seek(symbol, opts.warmup - 1);
    let history = provider.time_series(symbol, Timeframe::Hour1);
    let fingerprint = config.fingerprint();
    let mut ticker = Ticker::new(symbol, config, &history, None, None)?;

    let mut steps = Vec::with_capacity(len - opts.warmup);
    let mut rating_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut transitions: BTreeMap<String, usize> = BTreeMap::new();
    let mut verified_rollbacks = 0;
    let mut previous = ticker.combined().rating;

    while provider.advance(symbol) {
        let Some((_, candle)) = provider.real_time(symbol, Timeframe::Hour1) else {
            break;
        };
        ticker.push_back(candle)?;

        if opts.verify_rollback {
            let first = ticker.snapshot();
            ticker.rollback();
            provider.rewind(symbol);
            provider.advance(symbol);
            ticker.push_back(candle)?;
            if ticker.snapshot() != first {
                return Err(ReplayError::RollbackMismatch {
                    symbol: symbol.to_string(),
                    timestamp: candle.timestamp,
                });
            }
            verified_rollbacks += 1;
        }

        let combined = ticker.combined();
        let rating = combined.rating;
        *rating_counts.entry(rating.label().to_string()).or_default() += 1;
        if rating != previous {
            *transitions
                .entry(format!("{}->{}", previous.label(), rating.label()))
                .or_default() += 1;
            debug!(symbol, from = previous.label(), to = rating.label(), ts = %candle.timestamp, "rating changed");
            previous = rating;
        }

        steps.push(ReplayStep {
            timestamp: candle.timestamp,
            close: candle.close,
            rating,
            score: combined.score,
            stale: combined.stale,
            stop: ticker.stop().map(|s| s.price),
            target: ticker.target().map(|t| t.price),
            shares: ticker.sizing().map_or(0.0, |s| s.shares),
        });
    }

    info!(
        symbol,
        steps = steps.len(),
        transitions = transitions.values().sum::<usize>(),
        verified_rollbacks,
        "replay finished"
    );

    Ok(ReplayReport {
        symbol: symbol.to_string(),
        config_fingerprint: fingerprint,
        warmup: opts.warmup,
        steps,
        rating_counts,
        transitions,
        verified_rollbacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candles(n: usize) -> Vec<Candle> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let ts = base
                    + chrono::Duration::days((i / 7) as i64)
                    + chrono::Duration::hours((i % 7) as i64);
                let close = 50.0 + (i as f64 * 0.2).sin() * 2.0 + i as f64 * 0.02;
                Candle::new(ts, close - 0.1, close + 0.4, close - 0.4, close, 5000.0)
            })
            .collect()
    }

    #[test]
    fn provider_shows_up_to_cursor() {
        let provider = ReplayProvider::new([("A".to_string(), candles(20))]);
        assert_eq!(provider.time_series("A", Timeframe::Hour1).len(), 1);
        assert!(provider.real_time("A", Timeframe::Hour1).is_none());
        let next = provider.peek_next("A").unwrap();
        assert!(provider.advance("A"));
        let (prev, cur) = provider.real_time("A", Timeframe::Hour1).unwrap();
        assert_eq!(cur.timestamp, next);
        assert!(prev.timestamp < cur.timestamp);
        assert!(provider.rewind("A"));
        assert!(!provider.rewind("A"));
        assert!(provider.time_series("B", Timeframe::Hour1).is_empty());
    }

    #[test]
    fn provider_downsamples_visible_candles() {
        let provider = ReplayProvider::new([("A".to_string(), candles(21))]);
        provider.seek_end();
        // Seven hourly candles per session: two 4h buckets and one day each.
        assert_eq!(provider.time_series("A", Timeframe::Hour4).len(), 6);
        assert_eq!(provider.time_series("A", Timeframe::Day1).len(), 3);
        let day = provider.time_series("A", Timeframe::Day1);
        assert_eq!(day[0].volume, 7.0 * 5000.0);
    }

    proptest::proptest! {
        #[test]
        fn buckets_conserve_volume_and_order(n in 1usize..80) {
            let native = candles(n);
            let total: f64 = native.iter().map(|c| c.volume).sum();
            for tf in Timeframe::ALL {
                let buckets = bucketize(tf, &native);
                let sum: f64 = buckets.iter().map(|c| c.volume).sum();
                proptest::prop_assert!((sum - total).abs() < 1e-6);
                proptest::prop_assert!(buckets.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
                proptest::prop_assert_eq!(buckets.last().map(|c| c.close), native.last().map(|c| c.close));
            }
        }
    }

    #[test]
    fn replay_records_every_step() {
        let provider = ReplayProvider::new([("A".to_string(), candles(120))]);
        let config = Arc::new(Config::default());
        let opts = ReplayOptions {
            warmup: 80,
            verify_rollback: true,
        };
        let report = run_replay(&provider, "A", config.clone(), opts).unwrap();
        assert_eq!(report.steps.len(), 40);
        assert_eq!(report.verified_rollbacks, 40);
        assert_eq!(report.config_fingerprint, config.fingerprint());
        assert_eq!(report.rating_counts.values().sum::<usize>(), 40);
        assert!(report.steps.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let json = report.to_json().unwrap();
        let back: ReplayReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.steps.len(), 40);
    }

    #[test]
    fn short_series_is_rejected() {
        let provider = ReplayProvider::new([("A".to_string(), candles(10))]);
        let err = run_replay(&provider, "A", Arc::new(Config::default()), ReplayOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReplayError::TooShort { .. }));
        let err = run_replay(&provider, "Z", Arc::new(Config::default()), ReplayOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReplayError::UnknownSymbol { .. }));
    }
}
