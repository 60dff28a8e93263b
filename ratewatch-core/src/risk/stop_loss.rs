//! Stop-loss derivation.
//!
//! Initial stop, with `ref` the entry price (position) or the current close:
//!
//! ```text
//! stop = max(ref − k·ATR, support.lo · buffer, ref · (1 − hard_max_loss))
//! ```
//!
//! Only candidates below the current close are considered, and the result
//! is never below the hard floor. Once an open position gains more than
//! `trailing_trigger_atr · ATR`, a trailing stop
//! `min(max_seen − k_trail·ATR, max_seen · (1 − hard_trailing))` takes over.
//! The stop is then reported as trailing and priced at the tighter of the
//! trail and the initial stop.

use serde::{Deserialize, Serialize};

use crate::config::{RiskConfig, StopConfig};
use crate::domain::{PerTimeframe, Position, Timeframe};
use crate::metrics::Indicators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Initial,
    Trailing,
}

/// Candidate that set the final stop price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopComponent {
    Atr,
    Support,
    HardFloor,
    TrailingAtr,
    TrailingHard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLoss {
    pub kind: StopKind,
    pub price: f64,
    /// Entry price with a position, otherwise the close the stop was set against.
    pub reference: f64,
    pub hard_floor: f64,
    pub atr: Option<f64>,
    pub atr_timeframe: Option<Timeframe>,
    pub support_timeframe: Option<Timeframe>,
    pub component: StopComponent,
    pub rationale: String,
}

impl StopLoss {
    /// Distance from `price` to the stop as a fraction of `price`.
    pub fn distance_pct(&self, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        (price - self.price) / price
    }
}

/// Everything the stop depends on, already resolved from the frames.
#[derive(Debug, Clone, Copy)]
pub struct StopInputs<'a> {
    pub close: f64,
    pub position: Option<&'a Position>,
    pub atr: Option<(Timeframe, f64)>,
    /// Low edge of the preferred support zone below the close.
    pub support: Option<(Timeframe, f64)>,
}

/// ATR of `preferred`, falling back to shorter timeframes while it is unwarmed.
pub fn risk_atr(frames: &PerTimeframe<Indicators>, preferred: Timeframe) -> Option<(Timeframe, f64)> {
    Timeframe::preference_order()
        .into_iter()
        .skip_while(|tf| *tf != preferred)
        .find_map(|tf| {
            frames
                .get(tf)
                .atr()
                .last_warm()
                .filter(|a| *a > 0.0)
                .map(|a| (tf, a))
        })
}

/// Nearest qualifying support below `price`, daily zones first.
pub fn preferred_support(
    frames: &PerTimeframe<Indicators>,
    price: f64,
    min_confidence: f64,
) -> Option<(Timeframe, f64)> {
    Timeframe::preference_order().into_iter().find_map(|tf| {
        frames
            .get(tf)
            .support()
            .nearest_below_zone(price, min_confidence)
            .filter(|z| z.lo < price)
            .map(|z| (tf, z.lo))
    })
}

pub fn compute(
    frames: &PerTimeframe<Indicators>,
    position: Option<&Position>,
    cfg: &RiskConfig,
) -> Option<StopLoss> {
    let close = frames.hour1.last_candle()?.close;
    let inputs = StopInputs {
        close,
        position,
        atr: risk_atr(frames, cfg.atr_timeframe),
        support: preferred_support(frames, close, cfg.zone_confidence),
    };
    Some(derive(&inputs, &cfg.stop))
}

pub fn derive(inputs: &StopInputs, cfg: &StopConfig) -> StopLoss {
    let close = inputs.close;
    let reference = inputs.position.map_or(close, |p| p.entry_price);
    let hard_floor = reference * (1.0 - cfg.hard_max_loss_pct);
    let atr = inputs.atr.map(|(_, a)| a);

    let mut candidates: Vec<(StopComponent, f64)> = Vec::with_capacity(3);
    if let Some(a) = atr {
        candidates.push((StopComponent::Atr, reference - cfg.atr_multiplier * a));
    }
    if let Some((_, lo)) = inputs.support {
        candidates.push((StopComponent::Support, lo * cfg.support_buffer));
    }
    candidates.push((StopComponent::HardFloor, hard_floor));

    let (mut component, mut price) = candidates
        .iter()
        .copied()
        .filter(|(_, p)| *p < close)
        .fold(None, |best: Option<(StopComponent, f64)>, c| match best {
            Some(b) if b.1 >= c.1 => Some(b),
            _ => Some(c),
        })
        .unwrap_or((StopComponent::HardFloor, hard_floor));
    if price < hard_floor {
        component = StopComponent::HardFloor;
        price = hard_floor;
    }

    let mut kind = StopKind::Initial;
    let mut rationale = match component {
        StopComponent::Atr => format!(
            "{:.2}x ATR below {:.2}",
            cfg.atr_multiplier, reference
        ),
        StopComponent::Support => match inputs.support {
            Some((tf, lo)) => format!("below {tf} support at {lo:.2}"),
            None => String::from("below support"),
        },
        _ => format!("hard {:.1}% max loss", cfg.hard_max_loss_pct * 100.0),
    };

    if let (Some(pos), Some(a)) = (inputs.position, atr) {
        if close - pos.entry_price > cfg.trailing_trigger_atr * a {
            let by_atr = pos.max_price_seen - cfg.trailing_atr_multiplier * a;
            let by_pct = pos.max_price_seen * (1.0 - cfg.hard_trailing_pct);
            let (trail_component, trail) = if by_atr <= by_pct {
                (StopComponent::TrailingAtr, by_atr)
            } else {
                (StopComponent::TrailingHard, by_pct)
            };
            kind = StopKind::Trailing;
            if trail > price {
                component = trail_component;
                price = trail;
                rationale = format!("trailing from high {:.2}", pos.max_price_seen);
            } else {
                // The stop only ratchets up: a looser trail keeps the initial level.
                rationale = format!(
                    "trailing from high {:.2}, held at {rationale}",
                    pos.max_price_seen
                );
            }
        }
    }

    StopLoss {
        kind,
        price,
        reference,
        hard_floor,
        atr,
        atr_timeframe: inputs.atr.map(|(tf, _)| tf),
        support_timeframe: inputs.support.map(|(tf, _)| tf),
        component,
        rationale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::indicators::{assert_approx, make_candles};
    use chrono::NaiveDate;

    fn position(entry: f64, max_seen: f64) -> Position {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let mut p = Position::new("X", 10.0, entry, at);
        p.max_price_seen = max_seen;
        p
    }

    fn inputs(close: f64, atr: Option<f64>, support: Option<f64>) -> StopInputs<'static> {
        StopInputs {
            close,
            position: None,
            atr: atr.map(|a| (Timeframe::Day1, a)),
            support: support.map(|s| (Timeframe::Day1, s)),
        }
    }

    #[test]
    fn atr_stop_when_tightest() {
        let cfg = StopConfig::default();
        let stop = derive(&inputs(100.0, Some(2.0), None), &cfg);
        assert_approx(stop.price, 96.0, 1e-12);
        assert_eq!(stop.component, StopComponent::Atr);
        assert_eq!(stop.kind, StopKind::Initial);
    }

    #[test]
    fn support_beats_wide_atr() {
        let cfg = StopConfig::default();
        let stop = derive(&inputs(100.0, Some(5.0), Some(95.0)), &cfg);
        assert_approx(stop.price, 95.0 * 0.995, 1e-12);
        assert_eq!(stop.component, StopComponent::Support);
        assert_eq!(stop.support_timeframe, Some(Timeframe::Day1));
    }

    #[test]
    fn never_below_hard_floor() {
        let cfg = StopConfig::default();
        let stop = derive(&inputs(100.0, Some(10.0), Some(50.0)), &cfg);
        assert_approx(stop.price, 92.0, 1e-12);
        assert_eq!(stop.component, StopComponent::HardFloor);
        assert!(stop.price >= stop.hard_floor);
    }

    #[test]
    fn candidates_above_close_are_ignored() {
        let cfg = StopConfig::default();
        let pos = position(100.0, 100.0);
        // Price fell below the ATR stop: only the hard floor remains below.
        let stop = derive(
            &StopInputs {
                close: 95.0,
                position: Some(&pos),
                atr: Some((Timeframe::Day1, 1.0)),
                support: None,
            },
            &cfg,
        );
        assert_approx(stop.price, 92.0, 1e-12);
        assert_eq!(stop.reference, 100.0);
    }

    #[test]
    fn trailing_engages_after_gain() {
        let cfg = StopConfig::default();
        let pos = position(100.0, 120.0);
        let stop = derive(
            &StopInputs {
                close: 118.0,
                position: Some(&pos),
                atr: Some((Timeframe::Day1, 2.0)),
                support: None,
            },
            &cfg,
        );
        // min(120 - 2.5 * 2, 120 * 0.9) = 108
        assert_eq!(stop.kind, StopKind::Trailing);
        assert_eq!(stop.component, StopComponent::TrailingHard);
        assert_approx(stop.price, 108.0, 1e-12);
    }

    #[test]
    fn looser_trail_keeps_initial_level() {
        let cfg = StopConfig::default();
        let pos = position(100.0, 105.0);
        let stop = derive(
            &StopInputs {
                close: 105.0,
                position: Some(&pos),
                atr: Some((Timeframe::Day1, 2.0)),
                support: None,
            },
            &cfg,
        );
        // Gain 5 > 2 * 2 engages trailing; min(105 - 5, 94.5) = 94.5 is below 96.
        assert_eq!(stop.kind, StopKind::Trailing);
        assert_eq!(stop.component, StopComponent::Atr);
        assert_approx(stop.price, 96.0, 1e-12);
        assert!(stop.rationale.starts_with("trailing from high 105.00"));
    }

    #[test]
    fn trailing_needs_enough_gain() {
        let cfg = StopConfig::default();
        let pos = position(100.0, 104.0);
        let stop = derive(
            &StopInputs {
                close: 103.0,
                position: Some(&pos),
                atr: Some((Timeframe::Day1, 2.0)),
                support: None,
            },
            &cfg,
        );
        assert_eq!(stop.kind, StopKind::Initial);
        assert_approx(stop.price, 96.0, 1e-12);
    }

    #[test]
    fn atr_falls_back_to_shorter_timeframe() {
        let config = Config::default();
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 0.1).collect();
        let candles = make_candles(&closes);
        let mut frames = PerTimeframe::from_fn(|tf| Indicators::from_candles(tf, &config, &candles));
        frames.day1 = Indicators::from_candles(Timeframe::Day1, &config, &candles[..5]);
        let (tf, atr) = risk_atr(&frames, Timeframe::Day1).unwrap();
        assert_eq!(tf, Timeframe::Hour4);
        assert!(atr > 0.0);

        let stop = compute(&frames, None, &config.risk).unwrap();
        assert_eq!(stop.atr_timeframe, Some(Timeframe::Hour4));
        assert!(stop.price < closes[39]);
    }
}
