//! One tracked symbol: its `Metrics` plus every derived result.
//!
//! Every external mutation (push, rollback, position or calendar change)
//! runs `recompute` exactly once, in a fixed order:
//! stats → stop → stop hits → per-timeframe signals → combined → target → sizing.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::backtest::{self, StatsTable};
use crate::config::Config;
use crate::data::CalendarEvent;
use crate::domain::{Candle, PerTimeframe, Position, Timeframe};
use crate::error::CoreError;
use crate::metrics::{Indicators, Metrics, PushOutcome, RollbackOutcome};
use crate::risk::{profit_target, sizing, stop_loss, PositionSizing, ProfitTarget, StopLoss};
use crate::signals::{
    combine, generate, stop_hit, CombineInputs, CombinedSignal, Fired, MemoryEntry, Signal,
    SignalInputs, SignalMemory, StopHit,
};

#[derive(Debug, Clone)]
pub struct Ticker {
    config: Arc<Config>,
    metrics: Metrics,
    position: Option<Position>,
    next_event: Option<CalendarEvent>,
    memory: PerTimeframe<SignalMemory>,
    stats: PerTimeframe<StatsTable>,
    stats_dirty: bool,
    stop: Option<StopLoss>,
    stop_hits: Vec<Fired<StopHit>>,
    signals: PerTimeframe<Signal>,
    combined: CombinedSignal,
    target: Option<ProfitTarget>,
    sizing: Option<PositionSizing>,
}

/// Serializable view of a ticker's derived state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub combined: CombinedSignal,
    pub signals: PerTimeframe<Signal>,
    pub stop: Option<StopLoss>,
    pub target: Option<ProfitTarget>,
    pub sizing: Option<PositionSizing>,
}

impl Ticker {
    /// Build from a native history. Signal memory is seeded by rating the
    /// last `capacity` buckets of each timeframe in order.
    pub fn new(
        symbol: impl Into<String>,
        config: Arc<Config>,
        history: &[Candle],
        mut position: Option<Position>,
        next_event: Option<CalendarEvent>,
    ) -> Result<Self, CoreError> {
        let metrics = Metrics::from_candles(symbol, &config, history)?;
        if let Some(pos) = position.as_mut() {
            pos.refresh_max_seen(metrics.candles());
        }
        let stats = PerTimeframe::from_fn(|tf| backtest::run(metrics.indicators(tf), &config));
        let memory = PerTimeframe::from_fn(|tf| {
            seed_memory(metrics.indicators(tf), &config, stats.get(tf), position.is_some())
        });
        let Some(session_ts) = metrics.last_candle().map(|c| c.timestamp) else {
            return Err(CoreError::EmptyHistory {
                symbol: metrics.symbol().to_string(),
            });
        };

        let mut ticker = Self {
            config,
            metrics,
            position,
            next_event,
            memory,
            stats,
            stats_dirty: false,
            stop: None,
            stop_hits: Vec::new(),
            signals: PerTimeframe::from_fn(|tf| Signal::skip(tf, session_ts)),
            combined: CombinedSignal::skip(),
            target: None,
            sizing: None,
        };
        ticker.recompute();
        Ok(ticker)
    }

    pub fn push_back(&mut self, candle: Candle) -> Result<PushOutcome, CoreError> {
        let outcome = self.metrics.push_back(candle, self.position.as_mut())?;
        if outcome.new_hourly() {
            self.stats_dirty = true;
        }
        self.recompute();
        Ok(outcome)
    }

    /// Revert the most recent push. The first candle of the history is
    /// never removed.
    pub fn rollback(&mut self) -> Option<RollbackOutcome> {
        if self.metrics.len() <= 1 {
            return None;
        }
        let outcome = self.metrics.rollback(self.position.as_mut())?;
        for tf in Timeframe::ALL {
            if *outcome.removed_bucket.get(tf) {
                self.memory.get_mut(tf).pop();
            }
        }
        if outcome.removed_bucket.hour1 {
            self.stats_dirty = true;
        }
        self.recompute();
        Some(outcome)
    }

    pub fn set_position(&mut self, mut position: Option<Position>) {
        if let Some(pos) = position.as_mut() {
            pos.refresh_max_seen(self.metrics.candles());
        }
        self.position = position;
        self.recompute();
    }

    pub fn set_next_event(&mut self, event: Option<CalendarEvent>) {
        self.next_event = event;
        self.recompute();
    }

    fn recompute(&mut self) {
        let Some(last) = self.metrics.last_candle().copied() else {
            return;
        };
        let config = &*self.config;
        let frames = self.metrics.frames();

        if self.stats_dirty {
            self.stats = PerTimeframe::from_fn(|tf| backtest::run(frames.get(tf), config));
            self.stats_dirty = false;
        }

        self.stop = stop_loss::compute(frames, self.position.as_ref(), &config.risk);

        self.stop_hits = match (self.position.as_ref(), self.stop.as_ref()) {
            (Some(pos), Some(stop)) => {
                stop_hit::evaluate(pos, stop.price, &last, &config.risk.stop, &config.signal)
            }
            _ => Vec::new(),
        };

        let has_position = self.position.is_some();
        for tf in Timeframe::ALL {
            let ind = frames.get(tf);
            let Some(idx) = ind.len().checked_sub(1) else {
                continue;
            };
            let bucket_ts = ind.candles()[idx].timestamp;
            let memory = self.memory.get_mut(tf);
            // The newest entry belongs to the bucket being re-rated.
            let in_progress = memory.last().is_some_and(|e| e.timestamp == bucket_ts);
            let stop_hits: &[Fired<StopHit>] = if tf == Timeframe::Hour1 {
                &self.stop_hits
            } else {
                &[]
            };
            let signal = generate(
                ind,
                idx,
                &SignalInputs {
                    config,
                    stats: self.stats.get(tf),
                    memory_score: memory.score(in_progress),
                    has_position,
                    stop_hits,
                },
            );
            let entry = MemoryEntry::from(&signal);
            if in_progress {
                memory.replace_last(entry);
            } else {
                memory.push(entry);
            }
            *self.signals.get_mut(tf) = signal;
        }

        self.combined = combine(&CombineInputs {
            config,
            signals: &self.signals,
            frames,
            rating_scores: self.memory.map(|_, m| m.rating_score(false)),
            stop_hits: &self.stop_hits,
            next_event: self.next_event.as_ref(),
            now: last.timestamp,
        });

        self.target = self
            .stop
            .as_ref()
            .and_then(|s| profit_target::compute(frames, s, last.close, &config.risk));

        let atr = stop_loss::risk_atr(frames, config.risk.atr_timeframe).map(|(_, a)| a);
        self.sizing = self
            .stop
            .as_ref()
            .map(|s| sizing::compute(&self.combined, s, last.close, atr, &config.risk.sizing));

        debug!(
            symbol = %self.metrics.symbol(),
            ts = %last.timestamp,
            rating = self.combined.rating.label(),
            score = self.combined.score,
            "ticker recomputed"
        );
    }

    pub fn symbol(&self) -> &str {
        self.metrics.symbol()
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn indicators(&self, tf: Timeframe) -> &Indicators {
        self.metrics.indicators(tf)
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.metrics.last_candle()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn next_event(&self) -> Option<&CalendarEvent> {
        self.next_event.as_ref()
    }

    pub fn stats(&self, tf: Timeframe) -> &StatsTable {
        self.stats.get(tf)
    }

    pub fn memory(&self, tf: Timeframe) -> &SignalMemory {
        self.memory.get(tf)
    }

    pub fn stop(&self) -> Option<&StopLoss> {
        self.stop.as_ref()
    }

    pub fn stop_hits(&self) -> &[Fired<StopHit>] {
        &self.stop_hits
    }

    pub fn signal(&self, tf: Timeframe) -> &Signal {
        self.signals.get(tf)
    }

    pub fn combined(&self) -> &CombinedSignal {
        &self.combined
    }

    pub fn target(&self) -> Option<&ProfitTarget> {
        self.target.as_ref()
    }

    pub fn sizing(&self) -> Option<&PositionSizing> {
        self.sizing.as_ref()
    }

    pub fn snapshot(&self) -> Option<TickerSnapshot> {
        let last = self.metrics.last_candle()?;
        Some(TickerSnapshot {
            symbol: self.symbol().to_string(),
            timestamp: last.timestamp,
            price: last.close,
            combined: self.combined.clone(),
            signals: self.signals.clone(),
            stop: self.stop.clone(),
            target: self.target.clone(),
            sizing: self.sizing.clone(),
        })
    }
}

fn seed_memory(
    ind: &Indicators,
    config: &Config,
    stats: &StatsTable,
    has_position: bool,
) -> SignalMemory {
    let capacity = *config.memory.capacity.get(ind.timeframe());
    let mut memory = SignalMemory::new(capacity, config.memory.decay);
    for idx in ind.len().saturating_sub(capacity)..ind.len() {
        let signal = generate(
            ind,
            idx,
            &SignalInputs {
                config,
                stats,
                memory_score: memory.score(false),
                has_position,
                stop_hits: &[],
            },
        );
        memory.push(MemoryEntry::from(&signal));
    }
    memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;
    use crate::signals::Rating;

    fn closes(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.21).sin() * 3.0 + i as f64 * 0.04)
            .collect()
    }

    fn ticker(history: &[Candle], position: Option<Position>) -> Ticker {
        Ticker::new("TEST", Arc::new(Config::default()), history, position, None).unwrap()
    }

    #[test]
    fn memory_is_seeded_and_aligned() {
        let candles = make_candles(&closes(120));
        let t = ticker(&candles, None);
        for tf in Timeframe::ALL {
            let mem = t.memory(tf);
            let ind = t.indicators(tf);
            assert!(mem.len() <= mem.capacity());
            assert_eq!(mem.len(), ind.len().min(mem.capacity()));
            assert_eq!(
                mem.last().unwrap().timestamp,
                ind.last_candle().unwrap().timestamp
            );
            assert_eq!(t.signal(tf).timestamp, ind.last_candle().unwrap().timestamp);
        }
        assert!(t.stop().is_some());
        assert!(t.sizing().is_some());
    }

    #[test]
    fn push_then_rollback_restores_everything() {
        let candles = make_candles(&closes(121));
        let mut t = ticker(&candles[..120], None);
        let before = format!("{t:?}");
        let outcome = t.push_back(candles[120]).unwrap();
        assert!(outcome.new_hourly());
        let rb = t.rollback().unwrap();
        assert!(rb.removed_bucket.hour1);
        assert_eq!(format!("{t:?}"), before);
    }

    #[test]
    fn replacement_keeps_memory_length() {
        let candles = make_candles(&closes(100));
        let mut t = ticker(&candles, None);
        let lens: Vec<usize> = Timeframe::ALL.iter().map(|tf| t.memory(*tf).len()).collect();
        let mut revised = candles[99];
        revised.close += 0.5;
        revised.high += 0.5;
        let outcome = t.push_back(revised).unwrap();
        assert!(outcome.replaced);
        let after: Vec<usize> = Timeframe::ALL.iter().map(|tf| t.memory(*tf).len()).collect();
        assert_eq!(lens, after);
        assert_eq!(t.last_candle().unwrap().close, revised.close);
    }

    #[test]
    fn stop_loss_hit_forces_exit() {
        let mut series = vec![100.0; 80];
        series.push(60.0);
        let candles = make_candles(&series);
        let pos = Position::new("TEST", 10.0, 100.0, candles[0].timestamp);
        let mut t = ticker(&candles[..80], Some(pos));
        assert_ne!(t.combined().rating, Rating::Exit);
        t.push_back(candles[80]).unwrap();
        assert!(t.stop_hits().iter().any(|h| h.kind == StopHit::StopLossHit));
        assert_eq!(t.combined().rating, Rating::Exit);
        assert_eq!(t.combined().stop_hit, Some(StopHit::StopLossHit));
        assert_eq!(t.sizing().unwrap().shares, 0.0);
    }

    #[test]
    fn older_candle_is_rejected() {
        let candles = make_candles(&closes(40));
        let mut t = ticker(&candles, None);
        let err = t.push_back(candles[10]).unwrap_err();
        assert!(matches!(err, CoreError::NonMonotonicTimestamp { .. }));
        assert_eq!(t.metrics().len(), 40);
    }

    #[test]
    fn first_candle_cannot_be_rolled_back() {
        let candles = make_candles(&closes(2));
        let mut t = ticker(&candles, None);
        assert!(t.rollback().is_some());
        assert!(t.rollback().is_none());
        assert_eq!(t.metrics().len(), 1);
    }

    #[test]
    fn empty_history_is_an_error() {
        let err = Ticker::new("NONE", Arc::new(Config::default()), &[], None, None).unwrap_err();
        assert!(matches!(err, CoreError::EmptyHistory { .. }));
    }

    #[test]
    fn snapshot_serializes() {
        let candles = make_candles(&closes(60));
        let t = ticker(&candles, None);
        let snap = t.snapshot().unwrap();
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"symbol\":\"TEST\""));
        assert!(json.contains("\"1h\""));
    }
}
