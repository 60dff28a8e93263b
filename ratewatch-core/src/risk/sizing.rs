//! Position sizing.
//!
//! ```text
//! base_shares = capital · max_risk_pct / (price − stop)
//! multiplier  = quality · forecast · max(min_multiplier, 1 − risk_score / 10)
//! shares      = floor(min(base_shares · multiplier, capital · max_fraction / price))
//! ```
//!
//! The risk score (0–10) adds a volatility component (0–4, ATR% of price
//! against `atr_pct_full_scale`), trend misalignment (0–3) and conflicting
//! signals (0–3).

use serde::{Deserialize, Serialize};

use super::StopLoss;
use crate::config::SizingConfig;
use crate::signals::{CombinedSignal, Direction, Rating};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    StrongBuy,
    Buy,
    WeakBuy,
    Caution,
    Avoid,
}

impl Tier {
    pub fn from_multiplier(multiplier: f64) -> Self {
        if multiplier >= 1.0 {
            Tier::StrongBuy
        } else if multiplier >= 0.7 {
            Tier::Buy
        } else if multiplier >= 0.45 {
            Tier::WeakBuy
        } else if multiplier >= 0.25 {
            Tier::Caution
        } else {
            Tier::Avoid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskScore {
    pub volatility: f64,
    pub trend: f64,
    pub conflict: f64,
}

impl RiskScore {
    pub fn total(&self) -> f64 {
        self.volatility + self.trend + self.conflict
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    pub tier: Tier,
    pub shares: f64,
    pub recommended_capital: f64,
    pub max_risk_amount: f64,
    pub risk_per_share: f64,
    pub risk_score: RiskScore,
    pub quality_multiplier: f64,
    pub forecast_multiplier: f64,
    pub risk_multiplier: f64,
    pub multiplier: f64,
}

pub fn risk_score(combined: &CombinedSignal, price: f64, atr: Option<f64>, cfg: &SizingConfig) -> RiskScore {
    let volatility = match atr {
        Some(a) if price > 0.0 && cfg.atr_pct_full_scale > 0.0 => {
            4.0 * (a / price / cfg.atr_pct_full_scale).clamp(0.0, 1.0)
        }
        _ => 0.0,
    };

    let trend = [
        !combined.ratings.hour4.is_bullish(),
        !combined.ratings.day1.is_bullish(),
        combined
            .forecast
            .is_some_and(|f| f.direction == Direction::Down),
    ]
    .iter()
    .filter(|b| **b)
    .count() as f64;

    let f = &combined.filters;
    let conflict = [f.higher_timeframe_exit, f.near_stop, f.daily_bearish]
        .iter()
        .filter(|b| **b)
        .count() as f64;

    RiskScore {
        volatility,
        trend,
        conflict,
    }
}

fn quality_multiplier(combined: &CombinedSignal) -> f64 {
    let base = match combined.rating {
        Rating::Entry if combined.stale => 0.8,
        Rating::Entry => 1.1,
        Rating::Watchlist => 0.8,
        Rating::Mixed => 0.5,
        Rating::HoldCautiously => 0.4,
        Rating::None => 0.3,
        Rating::Exit | Rating::Skip | Rating::Caution => 0.0,
    };
    base * (1.0 + 0.2 * combined.score.clamp(-1.0, 1.0))
}

fn forecast_multiplier(combined: &CombinedSignal) -> f64 {
    match combined.forecast {
        Some(f) => match f.direction {
            Direction::Up => 1.0 + 0.2 * f.confidence,
            Direction::Down => 1.0 - 0.4 * f.confidence,
            Direction::Flat => 1.0,
        },
        None => 1.0,
    }
}

pub fn compute(
    combined: &CombinedSignal,
    stop: &StopLoss,
    price: f64,
    atr: Option<f64>,
    cfg: &SizingConfig,
) -> PositionSizing {
    let score = risk_score(combined, price, atr, cfg);
    let quality = quality_multiplier(combined);
    let forecast = forecast_multiplier(combined);
    let risk = (1.0 - score.total() / 10.0).max(cfg.min_multiplier);
    let multiplier = quality * forecast * risk;

    let max_risk_amount = cfg.capital_usd * cfg.max_risk_pct;
    let risk_per_share = price - stop.price;
    let blocked = matches!(combined.rating, Rating::Exit | Rating::Skip | Rating::Caution);

    let shares = if blocked || risk_per_share <= 0.0 || price <= 0.0 {
        0.0
    } else {
        let base = max_risk_amount / risk_per_share;
        let cap = cfg.capital_usd * cfg.max_position_fraction / price;
        (base * multiplier).min(cap).max(0.0).floor()
    };

    PositionSizing {
        tier: if blocked {
            Tier::Avoid
        } else {
            Tier::from_multiplier(multiplier)
        },
        shares,
        recommended_capital: shares * price,
        max_risk_amount,
        risk_per_share,
        risk_score: score,
        quality_multiplier: quality,
        forecast_multiplier: forecast,
        risk_multiplier: risk,
        multiplier,
    }
}
