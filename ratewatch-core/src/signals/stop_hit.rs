//! Stop hits: position-level exit pressure derived from the current stop.

use serde::{Deserialize, Serialize};

use super::meta::{self, Class, Meta, Severity, Source};
use super::Fired;
use crate::config::{SignalConfig, StopConfig};
use crate::domain::{Candle, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopHit {
    StopLossHit,
    TimeExit,
    NearStop,
}

impl StopHit {
    pub const ALL: [StopHit; 3] = [StopHit::StopLossHit, StopHit::TimeExit, StopHit::NearStop];

    pub fn meta(self) -> Meta {
        match self {
            StopHit::StopLossHit => {
                Meta::new(Severity::Urgent, Source::Stop, Class::Exit, "Stop loss hit")
            }
            StopHit::TimeExit => Meta::new(
                Severity::High,
                Source::Stop,
                Class::Exit,
                "Held too long without progress",
            ),
            StopHit::NearStop => {
                Meta::new(Severity::Medium, Source::Stop, Class::Exit, "Trading near stop")
            }
        }
    }

    /// Hits that force an Exit in the combined rating.
    pub fn forces_exit(self) -> bool {
        matches!(self, StopHit::StopLossHit | StopHit::TimeExit)
    }
}

/// Evaluate stop hits for an open position against the latest native candle.
pub fn evaluate(
    position: &Position,
    stop_price: f64,
    last: &Candle,
    stop_cfg: &StopConfig,
    signal_cfg: &SignalConfig,
) -> Vec<Fired<StopHit>> {
    let reshape = |raw: f64| meta::reshape(raw, signal_cfg.score_floor, signal_cfg.score_ceiling);
    let mut hits = Vec::new();

    if last.low <= stop_price {
        hits.push(Fired::new(StopHit::StopLossHit, reshape(3.0)));
    } else if last.close > 0.0 {
        let distance = (last.close - stop_price) / last.close;
        if distance < stop_cfg.near_stop_pct {
            let raw = 1.0 - 2.0 * distance / stop_cfg.near_stop_pct;
            hits.push(Fired::new(StopHit::NearStop, reshape(raw)));
        }
    }

    let held_days = (last.timestamp - position.entry_time).num_days();
    if held_days > stop_cfg.max_holding_days
        && position.unrealized_pct(last.close) < stop_cfg.time_exit_min_gain
    {
        hits.push(Fired::new(StopHit::TimeExit, reshape(1.0)));
    }

    for hit in &mut hits {
        hit.importance = signal_cfg.stop_importance;
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn candle(at: NaiveDateTime, low: f64, close: f64) -> Candle {
        Candle::new(at, close, close + 1.0, low, close, 1000.0)
    }

    fn kinds(hits: &[Fired<StopHit>]) -> Vec<StopHit> {
        hits.iter().map(|h| h.kind).collect()
    }

    #[test]
    fn low_through_stop_is_a_hit() {
        let pos = Position::new("X", 10.0, 100.0, ts(2));
        let hits = evaluate(
            &pos,
            95.0,
            &candle(ts(3), 94.5, 96.0),
            &StopConfig::default(),
            &SignalConfig::default(),
        );
        assert_eq!(kinds(&hits), vec![StopHit::StopLossHit]);
        assert_eq!(hits[0].importance, SignalConfig::default().stop_importance);
    }

    #[test]
    fn close_near_stop_warns() {
        let pos = Position::new("X", 10.0, 100.0, ts(2));
        let hits = evaluate(
            &pos,
            95.0,
            &candle(ts(3), 95.5, 96.0),
            &StopConfig::default(),
            &SignalConfig::default(),
        );
        assert_eq!(kinds(&hits), vec![StopHit::NearStop]);
    }

    #[test]
    fn stale_position_triggers_time_exit() {
        let pos = Position::new("X", 10.0, 100.0, ts(1));
        let late = ts(1) + Duration::days(45);
        let hits = evaluate(
            &pos,
            90.0,
            &candle(late, 100.0, 100.5),
            &StopConfig::default(),
            &SignalConfig::default(),
        );
        assert_eq!(kinds(&hits), vec![StopHit::TimeExit]);
        assert!(StopHit::TimeExit.forces_exit());
        assert!(!StopHit::NearStop.forces_exit());
    }

    #[test]
    fn healthy_position_has_no_hits() {
        let pos = Position::new("X", 10.0, 100.0, ts(2));
        let hits = evaluate(
            &pos,
            92.0,
            &candle(ts(5), 104.0, 105.0),
            &StopConfig::default(),
            &SignalConfig::default(),
        );
        assert!(hits.is_empty());
    }
}
