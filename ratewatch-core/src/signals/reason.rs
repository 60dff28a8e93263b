//! Reasons: discrete events that can justify an Entry or an Exit on their own.
//!
//! Crossovers fire when the relation flips against the previous index; an
//! unwarmed previous index counts as "not crossed".

use serde::{Deserialize, Serialize};

use super::context::EvalContext;
use super::meta::{Class, Meta, Severity, Source};
use super::{Predicate, PredicateKey};
use crate::metrics::Indicators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    EmaCrossover,
    MacdBullishCross,
    RsiOversoldBounce,
    SupportBounce,
    ResistanceBreakout,
    EmaCrossunder,
    MacdBearishCross,
    RsiOverboughtReversal,
    SupportBreakdown,
    ResistanceRejection,
}

const REASONS: [Reason; 10] = [
    Reason::EmaCrossover,
    Reason::MacdBullishCross,
    Reason::RsiOversoldBounce,
    Reason::SupportBounce,
    Reason::ResistanceBreakout,
    Reason::EmaCrossunder,
    Reason::MacdBearishCross,
    Reason::RsiOverboughtReversal,
    Reason::SupportBreakdown,
    Reason::ResistanceRejection,
];

impl Predicate for Reason {
    const ALL: &'static [Self] = &REASONS;

    fn meta(self) -> Meta {
        use Class::{Entry, Exit};
        use Severity::{High, Medium, Urgent};
        match self {
            Reason::EmaCrossover => Meta::new(High, Source::Ema, Entry, "EMA9 crossed above EMA21"),
            Reason::MacdBullishCross => {
                Meta::new(Medium, Source::Macd, Entry, "MACD crossed above signal")
            }
            Reason::RsiOversoldBounce => {
                Meta::new(Medium, Source::Rsi, Entry, "RSI recovered from oversold")
            }
            Reason::SupportBounce => {
                Meta::new(High, Source::SupportResistance, Entry, "Bounced off support")
            }
            Reason::ResistanceBreakout => {
                Meta::new(High, Source::SupportResistance, Entry, "Broke out above resistance")
            }
            Reason::EmaCrossunder => Meta::new(High, Source::Ema, Exit, "EMA9 crossed below EMA21"),
            Reason::MacdBearishCross => {
                Meta::new(Medium, Source::Macd, Exit, "MACD crossed below signal")
            }
            Reason::RsiOverboughtReversal => {
                Meta::new(Medium, Source::Rsi, Exit, "RSI fell back from overbought")
            }
            Reason::SupportBreakdown => {
                Meta::new(Urgent, Source::SupportResistance, Exit, "Broke down through support")
            }
            Reason::ResistanceRejection => {
                Meta::new(High, Source::SupportResistance, Exit, "Rejected at resistance")
            }
        }
    }

    fn key(self) -> PredicateKey {
        PredicateKey::Reason(self)
    }

    fn raw_score(self, ctx: &EvalContext) -> Option<f64> {
        let ind = ctx.ind;
        let i = ctx.idx;
        match self {
            Reason::EmaCrossover => {
                crossed(i, |k| ema_relation(ind, k) == Some(true)).then(|| ema_spread(ctx))
            }
            Reason::EmaCrossunder => {
                crossed(i, |k| ema_relation(ind, k) == Some(false)).then(|| -ema_spread(ctx))
            }
            Reason::MacdBullishCross => {
                crossed(i, |k| macd_relation(ind, k) == Some(true)).then(|| macd_spread(ctx))
            }
            Reason::MacdBearishCross => {
                crossed(i, |k| macd_relation(ind, k) == Some(false)).then(|| -macd_spread(ctx))
            }
            Reason::RsiOversoldBounce => {
                let (prev, now) = rsi_pair(ind, i)?;
                (prev < ctx.cfg.rsi_oversold && now >= ctx.cfg.rsi_oversold)
                    .then(|| (now - prev) / 5.0)
            }
            Reason::RsiOverboughtReversal => {
                let (prev, now) = rsi_pair(ind, i)?;
                (prev > ctx.cfg.rsi_overbought && now <= ctx.cfg.rsi_overbought)
                    .then(|| (prev - now) / 5.0)
            }
            Reason::SupportBounce => {
                let atr = ctx.atr()?;
                let c = ctx.candle();
                let z = ind
                    .support()
                    .nearest_below_zone(c.close, ctx.cfg.zone_confidence)?;
                (c.low <= z.hi && c.close > z.hi && c.close > c.open)
                    .then(|| 2.0 * z.confidence - 1.0 + (c.close - z.hi) / atr)
            }
            Reason::ResistanceBreakout => {
                let atr = ctx.atr()?;
                let c = ctx.candle();
                let prev = ctx.prev_candle()?;
                let z = ind
                    .resistance()
                    .nearest_above_zone(prev.close, ctx.cfg.zone_confidence)?;
                (prev.close <= z.hi && c.close > z.hi)
                    .then(|| z.confidence + (c.close - z.hi) / atr - 0.5)
            }
            Reason::SupportBreakdown => {
                let atr = ctx.atr()?;
                let c = ctx.candle();
                let prev = ctx.prev_candle()?;
                let z = ind
                    .support()
                    .nearest_below_zone(prev.close, ctx.cfg.zone_confidence)?;
                (prev.close >= z.lo && c.close < z.lo)
                    .then(|| z.confidence + (z.lo - c.close) / atr - 0.5)
            }
            Reason::ResistanceRejection => {
                let atr = ctx.atr()?;
                let c = ctx.candle();
                let z = ind
                    .resistance()
                    .nearest_above_zone(c.close, ctx.cfg.zone_confidence)?;
                (c.high >= z.lo && c.close < z.lo && c.close < c.open)
                    .then(|| 2.0 * z.confidence - 1.0 + (z.lo - c.close) / atr)
            }
        }
    }
}

/// The relation holds at `i` but not at `i - 1` (or `i - 1` does not exist).
fn crossed(i: usize, holds: impl Fn(usize) -> bool) -> bool {
    holds(i) && !(i > 0 && holds(i - 1))
}

/// `Some(fast > mid)` once EMA mid is warm at `k`.
fn ema_relation(ind: &Indicators, k: usize) -> Option<bool> {
    if !ind.ema_mid().is_warm(k) {
        return None;
    }
    let fast = ind.ema_fast().values()[k];
    let mid = ind.ema_mid().values()[k];
    if fast == mid {
        return None;
    }
    Some(fast > mid)
}

/// `Some(macd > signal)` once MACD is warm at `k`.
fn macd_relation(ind: &Indicators, k: usize) -> Option<bool> {
    let macd = ind.macd();
    if !macd.is_warm(k) {
        return None;
    }
    let m = macd.macd()[k];
    let s = macd.signal()[k];
    if m == s {
        return None;
    }
    Some(m > s)
}

fn ema_spread(ctx: &EvalContext) -> f64 {
    let i = ctx.idx;
    let spread = ctx.ind.ema_fast().values()[i] - ctx.ind.ema_mid().values()[i];
    match ctx.atr() {
        Some(atr) => spread / atr * 4.0,
        None => 0.0,
    }
}

fn macd_spread(ctx: &EvalContext) -> f64 {
    let hist = ctx.ind.macd().histogram()[ctx.idx];
    match ctx.atr() {
        Some(atr) => hist / atr * 8.0,
        None => 0.0,
    }
}

fn rsi_pair(ind: &Indicators, i: usize) -> Option<(f64, f64)> {
    let rsi = ind.rsi();
    if i == 0 || !rsi.is_warm(i - 1) {
        return None;
    }
    Some((rsi.values()[i - 1], rsi.values()[i]))
}
