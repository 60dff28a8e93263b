//! Timeframe rollup.
//!
//! The 1h rating leads. Rules apply in this order:
//! 1. a stop-loss hit or time exit forces Exit;
//! 2. a 4h/1d Exit or weak HoldCautiously downgrades 1h Entry/Watchlist to Mixed;
//! 3. a strong 4h/1d Watchlist/Entry upgrades a 1h Watchlist to Entry;
//! 4. a high memory rating score promotes None to a stale Watchlist;
//! 5. trading near the stop caps Entry/Watchlist at Mixed and None at HoldCautiously;
//! 6. daily bearish alignment suppresses Entry/Watchlist to None;
//! 7. earnings inside the buffer turn Entry into Skip.
//!
//! Confirmations are only collected for a final Entry.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Fired, Rating, Signal, StopHit};
use crate::config::Config;
use crate::data::CalendarEvent;
use crate::domain::{PerTimeframe, Timeframe};
use crate::metrics::Indicators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

/// Trendline projection of the 1h price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub direction: Direction,
    /// Projected move over the horizon as a fraction of the current price.
    pub expected_move_pct: f64,
    /// r² of the line the projection came from.
    pub confidence: f64,
    pub horizon: usize,
}

impl Forecast {
    pub fn from_indicators(ind: &Indicators, horizon: usize) -> Option<Forecast> {
        let line = ind.price_trend().best()?;
        let price = ind.last_candle()?.close;
        if price <= 0.0 {
            return None;
        }
        let expected_move_pct = line.slope * horizon as f64 / price;
        let direction = if line.slope > 0.0 {
            Direction::Up
        } else if line.slope < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        };
        Some(Forecast {
            direction,
            expected_move_pct,
            confidence: line.r2.clamp(0.0, 1.0),
            horizon,
        })
    }
}

/// Which rollup rules were active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filters {
    pub higher_timeframe_exit: bool,
    pub higher_timeframe_upgrade: bool,
    pub near_stop: bool,
    pub daily_bearish: bool,
    pub earnings_soon: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    MultiTimeframeAlignment,
    DailyTrend,
    /// The 1h EMA21 trendline is rising with a trusted fit.
    EmaTrend,
    VolumeExpansion,
    MacdMomentum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSignal {
    pub rating: Rating,
    pub score: f64,
    /// The rating is a Watchlist carried over from memory rather than fresh evidence.
    pub stale: bool,
    pub stop_hit: Option<StopHit>,
    pub filters: Filters,
    pub forecast: Option<Forecast>,
    pub confirmations: Vec<Confirmation>,
    pub ratings: PerTimeframe<Rating>,
}

impl CombinedSignal {
    pub fn skip() -> Self {
        Self {
            rating: Rating::Skip,
            score: 0.0,
            stale: false,
            stop_hit: None,
            filters: Filters::default(),
            forecast: None,
            confirmations: Vec::new(),
            ratings: PerTimeframe::from_fn(|_| Rating::Skip),
        }
    }
}

pub struct CombineInputs<'a> {
    pub config: &'a Config,
    pub signals: &'a PerTimeframe<Signal>,
    pub frames: &'a PerTimeframe<Indicators>,
    /// Memory rating score per timeframe, current bucket included.
    pub rating_scores: PerTimeframe<f64>,
    pub stop_hits: &'a [Fired<StopHit>],
    pub next_event: Option<&'a CalendarEvent>,
    pub now: NaiveDateTime,
}

pub fn combine(inputs: &CombineInputs) -> CombinedSignal {
    let cfg = &inputs.config.combined;
    let signals = inputs.signals;
    let higher = [Timeframe::Hour4, Timeframe::Day1];

    let weight_sum: f64 = cfg.weights.iter().map(|(_, w)| *w).sum();
    let score = if weight_sum > 0.0 {
        cfg.weights
            .iter()
            .map(|(tf, w)| w * signals.get(tf).score)
            .sum::<f64>()
            / weight_sum
    } else {
        signals.hour1.score
    };

    let mut filters = Filters::default();
    let mut stale = false;
    let mut rating = signals.hour1.rating;

    let forced = inputs
        .stop_hits
        .iter()
        .map(|h| h.kind)
        .find(|k| k.forces_exit());

    if forced.is_some() {
        rating = Rating::Exit;
    } else {
        let higher_exit = higher.iter().any(|&tf| {
            let s = signals.get(tf);
            s.rating == Rating::Exit
                || (s.rating == Rating::HoldCautiously && s.score < cfg.weak_hold_score)
        });
        if higher_exit && rating.is_bullish() {
            filters.higher_timeframe_exit = true;
            rating = Rating::Mixed;
        }

        let higher_support = higher.iter().any(|&tf| {
            let s = signals.get(tf);
            s.rating.is_bullish() && s.score >= cfg.upgrade_score
        });
        if rating == Rating::Watchlist && higher_support {
            filters.higher_timeframe_upgrade = true;
            rating = Rating::Entry;
        }

        let remembered = inputs
            .rating_scores
            .iter()
            .any(|(_, s)| *s >= inputs.config.memory.stale_rating_score);
        if rating == Rating::None && remembered {
            stale = true;
            rating = Rating::Watchlist;
        }

        if inputs.stop_hits.iter().any(|h| h.kind == StopHit::NearStop) {
            filters.near_stop = true;
            rating = match rating {
                Rating::Entry | Rating::Watchlist => Rating::Mixed,
                Rating::None => Rating::HoldCautiously,
                other => other,
            };
        }

        if daily_bearish(&inputs.frames.day1) {
            filters.daily_bearish = true;
            if rating.is_bullish() {
                rating = Rating::None;
                stale = false;
            }
        }

        let earnings = inputs.next_event.is_some_and(|e| {
            e.is_earnings_within(inputs.now.date(), cfg.earnings_buffer_days)
        });
        if earnings {
            filters.earnings_soon = true;
            if rating == Rating::Entry {
                rating = Rating::Skip;
            }
        }
    }

    let confirmations = if rating == Rating::Entry {
        confirmations(inputs)
    } else {
        Vec::new()
    };

    CombinedSignal {
        rating,
        score,
        stale,
        stop_hit: forced,
        filters,
        forecast: Forecast::from_indicators(&inputs.frames.hour1, cfg.forecast_horizon),
        confirmations,
        ratings: signals.map(|_, s| s.rating),
    }
}

/// EMA9 < EMA21 < EMA50 on the last daily candle with a falling daily price trend.
fn daily_bearish(day: &Indicators) -> bool {
    let Some(last) = day.len().checked_sub(1) else {
        return false;
    };
    day.bearish_stack(last) && day.price_trend().best().is_some_and(|l| l.slope < 0.0)
}

fn confirmations(inputs: &CombineInputs) -> Vec<Confirmation> {
    let mut out = Vec::new();
    let signals = inputs.signals;
    let frames = inputs.frames;

    if signals.hour4.rating.is_bullish() && signals.day1.rating.is_bullish() {
        out.push(Confirmation::MultiTimeframeAlignment);
    }
    if frames.day1.price_trend().best().is_some_and(|l| l.slope > 0.0) {
        out.push(Confirmation::DailyTrend);
    }

    let hour = &frames.hour1;
    let min_r2 = inputs.config.trend.min_r2;
    if hour
        .ema_trend()
        .best()
        .is_some_and(|l| l.slope > 0.0 && l.r2 >= min_r2)
    {
        out.push(Confirmation::EmaTrend);
    }
    if let Some(last) = hour.len().checked_sub(1) {
        let volume = hour.candles()[last].volume;
        if hour
            .average_volume(last)
            .is_some_and(|avg| avg > 0.0 && volume >= inputs.config.combined.volume_confirmation * avg)
        {
            out.push(Confirmation::VolumeExpansion);
        }
        let macd = hour.macd();
        if last >= 1 && macd.is_warm(last - 1) {
            let h = macd.histogram();
            if h[last] > 0.0 && h[last] > h[last - 1] {
                out.push(Confirmation::MacdMomentum);
            }
        }
    }
    out
}
