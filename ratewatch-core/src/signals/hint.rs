//! Hints: state conditions that lean a rating one way without justifying a
//! trade on their own. They count at `hint_weight` of a reason.

use serde::{Deserialize, Serialize};

use super::context::EvalContext;
use super::meta::{Class, Meta, Severity, Source};
use super::{Predicate, PredicateKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    PriceUptrend,
    RsiRising,
    MacdHistogramRising,
    NearSupport,
    BullishEmaStack,
    PriceDowntrend,
    RsiOverbought,
    MacdHistogramFalling,
    NearResistance,
    ExtendedAboveEma,
    VolatilitySpike,
}

const HINTS: [Hint; 11] = [
    Hint::PriceUptrend,
    Hint::RsiRising,
    Hint::MacdHistogramRising,
    Hint::NearSupport,
    Hint::BullishEmaStack,
    Hint::PriceDowntrend,
    Hint::RsiOverbought,
    Hint::MacdHistogramFalling,
    Hint::NearResistance,
    Hint::ExtendedAboveEma,
    Hint::VolatilitySpike,
];

impl Predicate for Hint {
    const ALL: &'static [Self] = &HINTS;

    fn meta(self) -> Meta {
        use Class::{Entry, Exit};
        use Severity::{High, Low, Medium, Urgent};
        match self {
            Hint::PriceUptrend => Meta::new(Medium, Source::Price, Entry, "Price in uptrend"),
            Hint::RsiRising => Meta::new(Low, Source::Rsi, Entry, "RSI trending up"),
            Hint::MacdHistogramRising => {
                Meta::new(Low, Source::Macd, Entry, "MACD histogram rising")
            }
            Hint::NearSupport => {
                Meta::new(Medium, Source::SupportResistance, Entry, "Trading near support")
            }
            Hint::BullishEmaStack => Meta::new(High, Source::Ema, Entry, "EMA9 > EMA21 > EMA50"),
            Hint::PriceDowntrend => Meta::new(High, Source::Price, Exit, "Price in downtrend"),
            Hint::RsiOverbought => Meta::new(Medium, Source::Rsi, Exit, "RSI overbought"),
            Hint::MacdHistogramFalling => {
                Meta::new(Low, Source::Macd, Exit, "MACD histogram falling")
            }
            Hint::NearResistance => {
                Meta::new(Medium, Source::SupportResistance, Exit, "Trading near resistance")
            }
            Hint::ExtendedAboveEma => {
                Meta::new(Low, Source::Ema, Exit, "Extended far above EMA21")
            }
            Hint::VolatilitySpike => {
                Meta::new(Urgent, Source::Price, Exit, "Bearish volatility spike")
            }
        }
    }

    fn key(self) -> PredicateKey {
        PredicateKey::Hint(self)
    }

    fn raw_score(self, ctx: &EvalContext) -> Option<f64> {
        let ind = ctx.ind;
        let i = ctx.idx;
        let cfg = ctx.cfg;
        match self {
            Hint::PriceUptrend | Hint::PriceDowntrend => {
                let atr = ctx.atr()?;
                let line = ctx.trusted(ctx.price_line)?;
                let rising = line.slope > 0.0;
                let wanted = matches!(self, Hint::PriceUptrend);
                (line.slope != 0.0 && rising == wanted)
                    .then(|| 2.0 * line.r2 - 1.0 + line.slope.abs() / atr * 5.0)
            }
            Hint::RsiRising => {
                let line = ctx.trusted(ctx.rsi_line)?;
                let rsi = ind.rsi().values()[i];
                (line.slope > 0.0 && rsi < cfg.rsi_overbought).then(|| line.slope - 0.5)
            }
            Hint::RsiOverbought => {
                if !ind.rsi().is_warm(i) {
                    return None;
                }
                let rsi = ind.rsi().values()[i];
                (rsi >= cfg.rsi_overbought).then(|| (rsi - cfg.rsi_overbought) / 5.0)
            }
            Hint::MacdHistogramRising | Hint::MacdHistogramFalling => {
                let atr = ctx.atr()?;
                let macd = ind.macd();
                if i < 2 || !macd.is_warm(i - 2) {
                    return None;
                }
                let h = macd.histogram();
                let (a, b, c) = (h[i - 2], h[i - 1], h[i]);
                let rising = a < b && b < c;
                let falling = a > b && b > c;
                match self {
                    Hint::MacdHistogramRising if rising => Some((c - a) / atr * 10.0),
                    Hint::MacdHistogramFalling if falling => Some((a - c) / atr * 10.0),
                    _ => None,
                }
            }
            Hint::NearSupport => {
                let atr = ctx.atr()?;
                let close = ctx.close();
                let z = ind.support().nearest_below_zone(close, cfg.zone_confidence)?;
                let distance = (close - z.hi).max(0.0);
                (distance <= cfg.near_zone_atr * atr)
                    .then(|| 2.0 * z.confidence - distance / atr)
            }
            Hint::NearResistance => {
                let atr = ctx.atr()?;
                let close = ctx.close();
                let z = ind
                    .resistance()
                    .nearest_above_zone(close, cfg.zone_confidence)?;
                let distance = (z.lo - close).max(0.0);
                (distance <= cfg.near_zone_atr * atr)
                    .then(|| 2.0 * z.confidence - distance / atr)
            }
            Hint::BullishEmaStack => {
                let atr = ctx.atr()?;
                ind.bullish_stack(i).then(|| {
                    (ind.ema_fast().values()[i] - ind.ema_slow().values()[i]) / atr
                })
            }
            Hint::ExtendedAboveEma => {
                let atr = ctx.atr()?;
                if !ind.ema_mid().is_warm(i) {
                    return None;
                }
                let stretch = (ctx.close() - ind.ema_mid().values()[i]) / atr;
                (stretch >= cfg.extended_atr).then(|| stretch - cfg.extended_atr)
            }
            Hint::VolatilitySpike => {
                if i == 0 {
                    return None;
                }
                let prev_atr = super::context::atr_at(ind, i - 1)?;
                let c = ctx.candle();
                let tr = ind.atr().true_ranges()[i];
                let ratio = tr / prev_atr;
                (ratio >= cfg.volatility_spike_atr && c.close < c.open)
                    .then(|| ratio - cfg.volatility_spike_atr)
            }
        }
    }
}
