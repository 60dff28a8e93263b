//! End-to-end tests: a Ticker fed candle by candle.

use std::sync::Arc;

use ratewatch_core::data::{CalendarEvent, EventKind};
use ratewatch_core::domain::{Candle, Position, Timeframe};
use ratewatch_core::risk::{StopKind, Tier};
use ratewatch_core::signals::{Rating, StopHit};
use ratewatch_core::{Config, Ticker};

fn candles(closes: &[f64]) -> Vec<Candle> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 2, 5)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let ts = base
                + chrono::Duration::days((i / 7) as i64)
                + chrono::Duration::hours((i % 7) as i64);
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(ts, open, open.max(close) + 0.5, open.min(close) - 0.5, close, 10_000.0)
        })
        .collect()
}

fn wave(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + (i as f64 * 0.12).sin() * 8.0 + i as f64 * 0.03)
        .collect()
}

#[test]
fn replay_keeps_invariants_every_step() {
    let closes = wave(400);
    let all = candles(&closes);
    let config = Arc::new(Config::default());
    let mut ticker = Ticker::new("WAVE", config.clone(), &all[..150], None, None).unwrap();

    for c in &all[150..] {
        ticker.push_back(*c).unwrap();

        for tf in Timeframe::ALL {
            let mem = ticker.memory(tf);
            assert!(mem.len() <= mem.capacity());
            let ind = ticker.indicators(tf);
            assert_eq!(mem.last().unwrap().timestamp, ind.last_candle().unwrap().timestamp);
        }

        let stop = ticker.stop().unwrap();
        assert!(stop.price >= stop.hard_floor);
        assert_eq!(stop.kind, StopKind::Initial);

        let sizing = ticker.sizing().unwrap();
        let cap = config.risk.sizing.capital_usd * config.risk.sizing.max_position_fraction;
        assert!(sizing.recommended_capital <= cap + 1e-6);
        if matches!(
            ticker.combined().rating,
            Rating::Exit | Rating::Skip | Rating::Caution
        ) {
            assert_eq!(sizing.shares, 0.0);
            assert_eq!(sizing.tier, Tier::Avoid);
        }

        if let Some(target) = ticker.target() {
            assert!(target.price > stop.reference);
        }
    }
}

#[test]
fn rollback_then_repush_is_deterministic() {
    let all = candles(&wave(260));
    let config = Arc::new(Config::default());
    let mut ticker = Ticker::new("WAVE", config, &all[..200], None, None).unwrap();

    for c in &all[200..] {
        ticker.push_back(*c).unwrap();
        let first = ticker.snapshot().unwrap();
        ticker.rollback().unwrap();
        ticker.push_back(*c).unwrap();
        assert_eq!(ticker.snapshot().unwrap(), first);
    }
}

#[test]
fn earnings_block_entries() {
    let all = candles(&wave(300));
    let config = Arc::new(Config::default());
    let last_date = all[299].timestamp.date();
    let event = CalendarEvent {
        symbol: "WAVE".into(),
        date: last_date + chrono::Duration::days(2),
        kind: EventKind::Earnings,
    };
    let ticker = Ticker::new("WAVE", config, &all, None, Some(event)).unwrap();
    assert!(ticker.combined().filters.earnings_soon);
    assert_ne!(ticker.combined().rating, Rating::Entry);
}

#[test]
fn position_gets_trailing_stop_after_rally() {
    let mut closes: Vec<f64> = vec![100.0; 150];
    closes.extend((1..=60).map(|i| 100.0 + i as f64 * 0.5));
    let all = candles(&closes);
    let pos = Position::new("RALLY", 50.0, 100.0, all[149].timestamp);
    let config = Arc::new(Config::default());
    let ticker = Ticker::new("RALLY", config, &all, Some(pos), None).unwrap();

    let position = ticker.position().unwrap();
    assert!((position.max_price_seen - 130.5).abs() < 1e-9);
    let stop = ticker.stop().unwrap();
    assert_eq!(stop.kind, StopKind::Trailing);
    assert!(stop.price > 100.0);
    assert!(stop.price < 130.0);
    assert!(ticker.stop_hits().iter().all(|h| h.kind != StopHit::StopLossHit));

    // The target is measured from the current close, not the entry.
    let close = ticker.last_candle().unwrap().close;
    let target = ticker.target().unwrap();
    assert!(target.price > close);
    assert!(target.risk_reward > 0.0);
}

#[test]
fn set_position_recomputes() {
    let all = candles(&wave(200));
    let config = Arc::new(Config::default());
    let mut ticker = Ticker::new("WAVE", config, &all, None, None).unwrap();
    let close = all[199].close;
    assert_eq!(ticker.stop().unwrap().reference, close);

    let entry = close * 1.2;
    ticker.set_position(Some(Position::new("WAVE", 10.0, entry, all[190].timestamp)));
    assert_eq!(ticker.stop().unwrap().reference, entry);
    // Entry far above the market: the hard floor sits above the close.
    assert!(ticker
        .stop_hits()
        .iter()
        .any(|h| h.kind == StopHit::StopLossHit));
    assert_eq!(ticker.combined().rating, Rating::Exit);
}

#[test]
fn relative_candle_access_through_metrics() {
    let all = candles(&wave(70));
    let ticker = Ticker::new("WAVE", Arc::new(Config::default()), &all, None, None).unwrap();
    let day = ticker.metrics().indicators(Timeframe::Day1);
    assert_eq!(day.len(), 10);
    assert_eq!(day.candle(-1), day.last_candle().unwrap());
    assert_eq!(day.candle(-10).timestamp, all[0].timestamp);
    assert_eq!(day.index(-1), 9);
}

#[test]
#[should_panic(expected = "out of range")]
fn candle_past_the_end_panics_through_metrics() {
    let all = candles(&wave(70));
    let ticker = Ticker::new("WAVE", Arc::new(Config::default()), &all, None, None).unwrap();
    let hour = ticker.metrics().indicators(Timeframe::Hour1);
    hour.candle(hour.len() as isize);
}

#[test]
#[should_panic(expected = "out of range")]
fn candle_before_the_start_panics_through_metrics() {
    let all = candles(&wave(70));
    let ticker = Ticker::new("WAVE", Arc::new(Config::default()), &all, None, None).unwrap();
    ticker.metrics().indicators(Timeframe::Day1).candle(-11);
}
