//! Predicate backtesting.
//!
//! Every reason and hint is evaluated at each warmed index of the lookback
//! window. A trigger simulates a forward exit from that candle's close: a
//! long for entry-class predicates, a short for exit-class ones. Exit
//! priority within a candle is profit, then stop; the last candle of the
//! horizon closes the trade at its close. Zone predicates use the zone set
//! of the latest candle for every historical index.

pub mod importance;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BacktestConfig, Config};
use crate::metrics::Indicators;
use crate::signals::{fire_all, Class, EvalContext, Hint, Predicate, PredicateKey, Reason};

/// Outcome of one simulated trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub pnl: f64,
    pub holding: usize,
    pub clean_profit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalStats {
    pub trig_rate: f64,
    pub avg_pnl: f64,
    pub win_rate: f64,
    pub avg_profit: f64,
    pub avg_loss: f64,
    pub pnl_volatility: f64,
    pub sample_size: usize,
    pub avg_winning_holding_period: f64,
    pub importance: f64,
}

impl SignalStats {
    /// Aggregate the samples of one predicate over `evaluated` indices.
    pub fn from_samples(samples: &[Sample], evaluated: usize) -> Self {
        let n = samples.len();
        let trig_rate = if evaluated > 0 {
            n as f64 / evaluated as f64
        } else {
            0.0
        };
        if n == 0 {
            return Self {
                trig_rate,
                ..Self::default()
            };
        }

        let avg_pnl = samples.iter().map(|s| s.pnl).sum::<f64>() / n as f64;
        let variance = samples
            .iter()
            .map(|s| (s.pnl - avg_pnl).powi(2))
            .sum::<f64>()
            / n as f64;

        let wins: Vec<&Sample> = samples.iter().filter(|s| s.pnl > 0.0).collect();
        let losses: Vec<&Sample> = samples.iter().filter(|s| s.pnl < 0.0).collect();
        let gross_profit: f64 = wins.iter().map(|s| s.pnl).sum();
        let gross_loss: f64 = losses.iter().map(|s| -s.pnl).sum();
        let avg_profit = if wins.is_empty() {
            0.0
        } else {
            gross_profit / wins.len() as f64
        };
        let avg_loss = if losses.is_empty() {
            0.0
        } else {
            gross_loss / losses.len() as f64
        };
        let avg_winning_holding_period = if wins.is_empty() {
            0.0
        } else {
            wins.iter().map(|s| s.holding as f64).sum::<f64>() / wins.len() as f64
        };

        let pnl_volatility = variance.sqrt();
        let pf = importance::profit_factor(avg_profit, avg_loss);

        Self {
            trig_rate,
            avg_pnl,
            win_rate: wins.len() as f64 / n as f64,
            avg_profit,
            avg_loss,
            pnl_volatility,
            sample_size: n,
            avg_winning_holding_period,
            importance: importance::importance(pf, avg_pnl, pnl_volatility, trig_rate, n),
        }
    }
}

/// Backtest results for one timeframe, keyed by predicate. Empty when the
/// window contained no warmed index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsTable {
    stats: BTreeMap<PredicateKey, SignalStats>,
    evaluated: usize,
}

impl StatsTable {
    pub fn get(&self, key: PredicateKey) -> Option<&SignalStats> {
        self.stats.get(&key)
    }

    pub fn importance(&self, key: PredicateKey) -> Option<f64> {
        self.stats.get(&key).map(|s| s.importance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PredicateKey, &SignalStats)> {
        self.stats.iter()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Number of indices the predicates were evaluated at.
    pub fn evaluated(&self) -> usize {
        self.evaluated
    }
}

/// Simulate a trade entered at `entry_idx`'s close.
pub fn simulate(ind: &Indicators, entry_idx: usize, class: Class, cfg: &BacktestConfig) -> Option<Sample> {
    let candles = ind.candles();
    let last = (entry_idx + cfg.max_candles).min(candles.len().checked_sub(1)?);
    if last <= entry_idx {
        return None;
    }
    let entry = candles[entry_idx].close;
    let (target, stop) = match class {
        Class::Entry => (entry * (1.0 + cfg.profit_pct), entry * (1.0 - cfg.stop_pct)),
        Class::Exit => (entry * (1.0 - cfg.profit_pct), entry * (1.0 + cfg.stop_pct)),
    };

    for j in (entry_idx + 1)..=last {
        let c = &candles[j];
        let holding = j - entry_idx;
        let (hit_target, hit_stop) = match class {
            Class::Entry => (c.high >= target, c.low <= stop),
            Class::Exit => (c.low <= target, c.high >= stop),
        };
        if hit_target {
            return Some(Sample {
                pnl: cfg.profit_pct,
                holding,
                clean_profit: true,
            });
        }
        if hit_stop {
            return Some(Sample {
                pnl: -cfg.stop_pct,
                holding,
                clean_profit: false,
            });
        }
    }

    let exit = candles[last].close;
    let pnl = match class {
        Class::Entry => (exit - entry) / entry,
        Class::Exit => (entry - exit) / entry,
    };
    Some(Sample {
        pnl,
        holding: last - entry_idx,
        clean_profit: false,
    })
}

/// Backtest all predicates over one timeframe's lookback window.
pub fn run(ind: &Indicators, config: &Config) -> StatsTable {
    let bt = config.backtest.get(ind.timeframe());
    let n = ind.len();
    if n < 2 {
        return StatsTable::default();
    }
    let start = ind.warm_up().max(n.saturating_sub(bt.lookback));
    // The last index has no following candle.
    let end = n - 1;
    if start >= end {
        return StatsTable::default();
    }

    let mut samples: BTreeMap<PredicateKey, Vec<Sample>> =
        PredicateKey::all().map(|k| (k, Vec::new())).collect();

    for i in start..end {
        let ctx = EvalContext::new(ind, i, &config.signal, &config.trend);
        let reasons = fire_all::<Reason>(&ctx).into_iter().map(|f| f.kind.key());
        let hints = fire_all::<Hint>(&ctx).into_iter().map(|f| f.kind.key());
        for key in reasons.chain(hints) {
            if let Some(sample) = simulate(ind, i, key.meta().class, bt) {
                samples.entry(key).or_default().push(sample);
            }
        }
    }

    let evaluated = end - start;
    let stats: BTreeMap<PredicateKey, SignalStats> = samples
        .into_iter()
        .map(|(k, s)| (k, SignalStats::from_samples(&s, evaluated)))
        .collect();

    debug!(
        timeframe = %ind.timeframe(),
        evaluated,
        fired = stats.values().filter(|s| s.sample_size > 0).count(),
        "backtest refreshed"
    );
    StatsTable { stats, evaluated }
}
