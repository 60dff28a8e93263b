//! Profit target from resistance or a fixed percentage.
//!
//! The reference is the current close: the reward still available from the
//! market against the stop as it stands now, trailing or not.
//!
//! risk = reference − stop. The percentage target is
//! `reference + max(base_target_pct · reference, min_rr · risk)`, so it always
//! meets the minimum reward-to-risk. The nearest qualifying resistance
//! (daily, then 4h, then 1h) wins when its R:R is at least the percentage
//! target's R:R divided by `rr_tolerance` and at least `min_resistance_rr`.

use serde::{Deserialize, Serialize};

use super::StopLoss;
use crate::config::{RiskConfig, TargetConfig};
use crate::domain::{PerTimeframe, Timeframe};
use crate::metrics::Indicators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Resistance,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitTarget {
    pub kind: TargetKind,
    pub price: f64,
    pub risk_reward: f64,
    pub percentage_price: f64,
    pub resistance: Option<(Timeframe, f64)>,
    pub rationale: String,
}

/// Low edge of the nearest qualifying resistance above `price`.
pub fn preferred_resistance(
    frames: &PerTimeframe<Indicators>,
    price: f64,
    min_confidence: f64,
) -> Option<(Timeframe, f64)> {
    Timeframe::preference_order().into_iter().find_map(|tf| {
        frames
            .get(tf)
            .resistance()
            .nearest_above_zone(price, min_confidence)
            .filter(|z| z.lo > price)
            .map(|z| (tf, z.lo))
    })
}

pub fn compute(
    frames: &PerTimeframe<Indicators>,
    stop: &StopLoss,
    close: f64,
    cfg: &RiskConfig,
) -> Option<ProfitTarget> {
    let resistance = preferred_resistance(frames, close, cfg.zone_confidence);
    derive(close, stop.price, resistance, &cfg.target)
}

/// `None` when the stop is not below the reference.
pub fn derive(
    reference: f64,
    stop: f64,
    resistance: Option<(Timeframe, f64)>,
    cfg: &TargetConfig,
) -> Option<ProfitTarget> {
    let risk = reference - stop;
    if risk <= 0.0 {
        return None;
    }
    let percentage_price = reference + (cfg.base_target_pct * reference).max(cfg.min_rr * risk);
    let pct_rr = (percentage_price - reference) / risk;

    if let Some((tf, lo)) = resistance {
        let rr = (lo - reference) / risk;
        if rr >= pct_rr / cfg.rr_tolerance && rr >= cfg.min_resistance_rr {
            return Some(ProfitTarget {
                kind: TargetKind::Resistance,
                price: lo,
                risk_reward: rr,
                percentage_price,
                resistance,
                rationale: format!("{tf} resistance at {lo:.2}"),
            });
        }
    }

    Some(ProfitTarget {
        kind: TargetKind::Percentage,
        price: percentage_price,
        risk_reward: pct_rr,
        percentage_price,
        resistance,
        rationale: format!("{:.1}R percentage target", pct_rr),
    })
}
