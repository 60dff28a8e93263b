//! Swing point detection.
//!
//! A candle is a swing low (high) when its low (high) is strictly below
//! (above) every neighbour out to a window `w`. The window grows from 1 while
//! dominance holds, up to `max_swing_window`; the candle qualifies when the
//! reached window is at least `min_swing_window`.

use crate::config::ZoneConfig;
use crate::domain::Candle;

use super::Polarity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub window: usize,
    /// Mean ATR over `[index - window, index + window]`.
    pub atr: f64,
}

fn extreme(c: &Candle, polarity: Polarity) -> f64 {
    match polarity {
        Polarity::Support => c.low,
        Polarity::Resistance => c.high,
    }
}

fn dominates(a: f64, b: f64, polarity: Polarity) -> bool {
    match polarity {
        Polarity::Support => a < b,
        Polarity::Resistance => a > b,
    }
}

/// Swing points among the last `cfg.lookback` candles. `atr` is index-aligned
/// with `candles` and may contain NaN during warm-up.
pub fn find_swings(
    candles: &[Candle],
    atr: &[f64],
    polarity: Polarity,
    cfg: &ZoneConfig,
) -> Vec<SwingPoint> {
    let n = candles.len();
    let start = n.saturating_sub(cfg.lookback);
    let mut swings = Vec::new();

    for i in start..n {
        let price = extreme(&candles[i], polarity);
        let mut w = 0;
        while w < cfg.max_swing_window {
            let next = w + 1;
            if next > i || i + next >= n {
                break;
            }
            let left = extreme(&candles[i - next], polarity);
            let right = extreme(&candles[i + next], polarity);
            if !(dominates(price, left, polarity) && dominates(price, right, polarity)) {
                break;
            }
            w = next;
        }
        if w < cfg.min_swing_window {
            continue;
        }
        swings.push(SwingPoint {
            index: i,
            price,
            window: w,
            atr: window_atr(candles, atr, i - w, i + w),
        });
    }
    swings
}

/// Mean ATR over an inclusive range, falling back to the mean high-low range
/// when ATR is not yet defined anywhere in it.
fn window_atr(candles: &[Candle], atr: &[f64], lo: usize, hi: usize) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in atr.iter().take(hi + 1).skip(lo) {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
    }
    if count > 0 {
        return sum / count as f64;
    }
    let span = &candles[lo..=hi];
    span.iter().map(Candle::range).sum::<f64>() / span.len() as f64
}
