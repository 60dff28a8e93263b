//! Per-timeframe rating state machine.
//!
//! entry_w = Σ importance · severity_weight · score over entry-class predicates
//! (hints scaled by `hint_weight`), exit_w likewise. The rating follows a
//! fixed precedence; the score is
//! tanh((entry_w · w − exit_w · (1 − w)) · squash) blended with the memory score.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::context::EvalContext;
use super::meta::{Class, Meta, Severity};
use super::{fire_all, Fired, Hint, Predicate, Reason, StopHit};
use crate::backtest::StatsTable;
use crate::config::Config;
use crate::domain::Timeframe;
use crate::metrics::Indicators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Entry,
    Exit,
    Watchlist,
    Caution,
    HoldCautiously,
    Mixed,
    None,
    Skip,
}

impl Rating {
    /// Contribution to the decayed memory rating score.
    pub fn memory_value(self) -> f64 {
        match self {
            Rating::Entry => 2.0,
            Rating::Watchlist => 1.0,
            Rating::HoldCautiously => -0.5,
            Rating::Caution => -1.0,
            Rating::Exit => -2.0,
            Rating::Mixed | Rating::None | Rating::Skip => 0.0,
        }
    }

    pub fn is_bullish(self) -> bool {
        matches!(self, Rating::Entry | Rating::Watchlist)
    }

    pub fn label(self) -> &'static str {
        match self {
            Rating::Entry => "entry",
            Rating::Exit => "exit",
            Rating::Watchlist => "watchlist",
            Rating::Caution => "caution",
            Rating::HoldCautiously => "hold_cautiously",
            Rating::Mixed => "mixed",
            Rating::None => "none",
            Rating::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,
    pub rating: Rating,
    pub score: f64,
    pub reasons: Vec<Fired<Reason>>,
    pub hints: Vec<Fired<Hint>>,
    pub stop_hits: Vec<Fired<StopHit>>,
    pub entry_weight: f64,
    pub exit_weight: f64,
}

impl Signal {
    pub fn skip(timeframe: Timeframe, timestamp: NaiveDateTime) -> Self {
        Self {
            timeframe,
            timestamp,
            rating: Rating::Skip,
            score: 0.0,
            reasons: Vec::new(),
            hints: Vec::new(),
            stop_hits: Vec::new(),
            entry_weight: 0.0,
            exit_weight: 0.0,
        }
    }
}

pub struct SignalInputs<'a> {
    pub config: &'a Config,
    pub stats: &'a StatsTable,
    /// Decayed score of the previous buckets' signals.
    pub memory_score: f64,
    pub has_position: bool,
    pub stop_hits: &'a [Fired<StopHit>],
}

/// Rate index `idx` of one timeframe.
pub fn generate(ind: &Indicators, idx: usize, inputs: &SignalInputs) -> Signal {
    let timestamp = ind.candles()[idx].timestamp;
    if !ind.is_warm(idx) {
        return Signal::skip(ind.timeframe(), timestamp);
    }
    let cfg = &inputs.config.signal;
    let ctx = EvalContext::new(ind, idx, cfg, &inputs.config.trend);

    let mut reasons = fire_all::<Reason>(&ctx);
    let mut hints = fire_all::<Hint>(&ctx);
    attach_importance(&mut reasons, inputs);
    attach_importance(&mut hints, inputs);
    let stop_hits = inputs.stop_hits.to_vec();

    let mut entry_w = 0.0;
    let mut exit_w = 0.0;
    let mut tally = |meta: Meta, weight: f64| match meta.class {
        Class::Entry => entry_w += weight,
        Class::Exit => exit_w += weight,
    };
    for r in &reasons {
        tally(r.kind.meta(), r.importance * r.kind.meta().severity.weight() * r.score);
    }
    for h in &hints {
        tally(
            h.kind.meta(),
            cfg.hint_weight * h.importance * h.kind.meta().severity.weight() * h.score,
        );
    }
    for s in &stop_hits {
        tally(s.kind.meta(), s.importance * s.kind.meta().severity.weight() * s.score);
    }

    let has_entry_reason = reasons.iter().any(|r| r.kind.meta().class == Class::Entry);
    let has_exit_reason =
        reasons.iter().any(|r| r.kind.meta().class == Class::Exit) || !stop_hits.is_empty();
    let strong_hint = |class: Class| {
        hints.iter().any(|h| {
            let m = h.kind.meta();
            m.class == class && m.severity >= Severity::High
        })
    };
    let urgent_exit_hint = hints.iter().any(|h| {
        let m = h.kind.meta();
        m.class == Class::Exit && m.severity == Severity::Urgent
    });
    let cautious = if inputs.has_position {
        Rating::HoldCautiously
    } else {
        Rating::Caution
    };

    let rating = if entry_w >= cfg.entry_threshold
        && exit_w <= cfg.watchlist_threshold
        && has_entry_reason
    {
        Rating::Entry
    } else if exit_w >= cfg.entry_threshold
        && entry_w <= cfg.watchlist_threshold
        && has_exit_reason
    {
        if inputs.has_position {
            Rating::Exit
        } else {
            Rating::Caution
        }
    } else if entry_w >= cfg.mixed_min && exit_w >= cfg.mixed_min {
        Rating::Mixed
    } else if urgent_exit_hint {
        Rating::Caution
    } else if entry_w >= cfg.entry_min {
        Rating::Watchlist
    } else if exit_w >= cfg.exit_min {
        cautious
    } else if strong_hint(Class::Entry) {
        Rating::Watchlist
    } else if strong_hint(Class::Exit) {
        Rating::Caution
    } else {
        Rating::None
    };

    let w = cfg.entry_bias;
    let raw = ((entry_w * w - exit_w * (1.0 - w)) * cfg.squash).tanh();
    let score = (1.0 - cfg.memory_alpha) * raw + cfg.memory_alpha * inputs.memory_score;

    Signal {
        timeframe: ind.timeframe(),
        timestamp,
        rating,
        score,
        reasons,
        hints,
        stop_hits,
        entry_weight: entry_w,
        exit_weight: exit_w,
    }
}

fn attach_importance<P: Predicate>(fired: &mut [Fired<P>], inputs: &SignalInputs) {
    let default = inputs.config.signal.default_importance;
    for f in fired {
        f.importance = inputs.stats.importance(f.kind.key()).unwrap_or(default);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn inputs<'a>(config: &'a Config, stats: &'a StatsTable) -> SignalInputs<'a> {
        SignalInputs {
            config,
            stats,
            memory_score: 0.0,
            has_position: false,
            stop_hits: &[],
        }
    }

    #[test]
    fn unwarmed_index_is_skip() {
        let config = Config::default();
        let stats = StatsTable::default();
        let candles = make_candles(&[100.0; 10]);
        let ind = Indicators::from_candles(Timeframe::Hour1, &config, &candles);
        let sig = generate(&ind, 9, &inputs(&config, &stats));
        assert_eq!(sig.rating, Rating::Skip);
    }

    #[test]
    fn flat_market_is_quiet() {
        let config = Config::default();
        let stats = StatsTable::default();
        let candles = make_candles(&[100.0; 60]);
        let ind = Indicators::from_candles(Timeframe::Hour1, &config, &candles);
        let sig = generate(&ind, 59, &inputs(&config, &stats));
        assert!(sig.reasons.is_empty());
        assert!(matches!(sig.rating, Rating::None | Rating::Caution | Rating::Watchlist));
        assert!(sig.score.abs() <= 1.0);
    }

    #[test]
    fn crossover_with_default_importance_is_weighted() {
        let config = Config::default();
        let stats = StatsTable::default();
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + 0.1 * i as f64).collect();
        let ind = Indicators::from_candles(Timeframe::Hour1, &config, &make_candles(&closes));
        let sig = generate(&ind, 20, &inputs(&config, &stats));
        let cross = sig
            .reasons
            .iter()
            .find(|r| r.kind == Reason::EmaCrossover)
            .unwrap();
        assert_eq!(cross.importance, config.signal.default_importance);
        assert!(sig.entry_weight > 0.0);
        assert!(sig.score > 0.0);
    }

    #[test]
    fn stop_hits_push_exit_weight() {
        let config = Config::default();
        let stats = StatsTable::default();
        let candles = make_candles(&[100.0; 60]);
        let ind = Indicators::from_candles(Timeframe::Hour1, &config, &candles);
        let mut hit = Fired::new(StopHit::StopLossHit, 1.8);
        hit.importance = 1.0;
        let hits = [hit];
        let mut inp = inputs(&config, &stats);
        inp.has_position = true;
        inp.stop_hits = &hits;
        let sig = generate(&ind, 59, &inp);
        assert!(sig.exit_weight >= 3.6 - 1e-9);
        assert_eq!(sig.rating, Rating::Exit);
    }

    #[test]
    fn memory_values() {
        assert_eq!(Rating::Entry.memory_value(), 2.0);
        assert_eq!(Rating::HoldCautiously.memory_value(), -0.5);
        assert_eq!(Rating::Skip.memory_value(), 0.0);
    }
}
