//! Incremental indicator primitives.
//!
//! Every primitive keeps one value per input index and supports O(1)
//! `append` plus an exact O(1) `undo`. The per-index smoothing state is kept
//! alongside the values, so any number of consecutive undos reproduces the
//! earlier arrays bit for bit. Batch construction (`from_series`) is a loop of
//! appends, which makes batch and incremental results identical.

pub mod atr;
pub mod ema;
pub mod macd;
pub mod rsi;

pub use atr::Atr;
pub use ema::Ema;
pub use macd::Macd;
pub use rsi::Rsi;

/// Resolve a possibly negative index against a sequence of `len` elements.
///
/// `idx < 0` means `len + idx`. Anything outside `[-len, len - 1]` is a
/// caller bug and panics.
pub fn resolve_index(len: usize, idx: isize) -> usize {
    let resolved = if idx < 0 {
        len as isize + idx
    } else {
        idx
    };
    assert!(
        resolved >= 0 && (resolved as usize) < len,
        "index {idx} out of range for length {len}"
    );
    resolved as usize
}

/// Create synthetic hourly candles from close prices for testing.
///
/// Seven candles per session (9:30 through 15:30) on consecutive dates.
/// open = prev_close (or close for the first candle), high = max(open,close) + 1.0,
/// low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    use crate::domain::Candle;
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let day = (i / 7) as i64;
            let slot = (i % 7) as i64;
            let ts = base + chrono::Duration::days(day) + chrono::Duration::hours(slot);
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            Candle::new(ts, open, high, low, close, 1000.0)
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_end() {
        assert_eq!(resolve_index(5, 0), 0);
        assert_eq!(resolve_index(5, 4), 4);
        assert_eq!(resolve_index(5, -1), 4);
        assert_eq!(resolve_index(5, -5), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn index_past_end_panics() {
        resolve_index(5, 5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn index_before_start_panics() {
        resolve_index(5, -6);
    }

    #[test]
    fn synthetic_candles_follow_session_slots() {
        let candles = make_candles(&[1.0; 9]);
        assert_eq!(candles[0].timestamp.format("%H:%M").to_string(), "09:30");
        assert_eq!(candles[6].timestamp.format("%H:%M").to_string(), "15:30");
        assert_eq!(candles[7].timestamp.format("%d %H:%M").to_string(), "03 09:30");
    }
}
