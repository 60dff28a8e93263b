//! Per-index evaluation context shared by all predicates.
//!
//! Trendlines are only cached by `Indicators` for the last index; for
//! historical indices they are fitted here, once per index.

use crate::config::{SignalConfig, TrendConfig};
use crate::domain::Candle;
use crate::metrics::Indicators;
use crate::trend_lines::{TrendLine, TrendLines};

pub struct EvalContext<'a> {
    pub ind: &'a Indicators,
    pub idx: usize,
    pub cfg: &'a SignalConfig,
    pub min_r2: f64,
    pub price_line: Option<TrendLine>,
    pub rsi_line: Option<TrendLine>,
}

impl<'a> EvalContext<'a> {
    pub fn new(ind: &'a Indicators, idx: usize, cfg: &'a SignalConfig, trend: &TrendConfig) -> Self {
        let is_last = idx + 1 == ind.len();
        let (price_line, rsi_line) = if is_last {
            (
                ind.price_trend().best().copied(),
                ind.rsi_trend().best().copied(),
            )
        } else {
            let gap = trend.min_period_gap;
            (
                TrendLines::compute(ind.closes(), idx, &trend.price, gap)
                    .best()
                    .copied(),
                TrendLines::compute(ind.rsi().values(), idx, &trend.rsi, gap)
                    .best()
                    .copied(),
            )
        };
        Self {
            ind,
            idx,
            cfg,
            min_r2: trend.min_r2,
            price_line,
            rsi_line,
        }
    }

    pub fn candle(&self) -> &Candle {
        &self.ind.candles()[self.idx]
    }

    pub fn prev_candle(&self) -> Option<&Candle> {
        self.idx.checked_sub(1).map(|i| &self.ind.candles()[i])
    }

    pub fn close(&self) -> f64 {
        self.candle().close
    }

    /// Warm, finite, positive ATR at the context index.
    pub fn atr(&self) -> Option<f64> {
        atr_at(self.ind, self.idx)
    }

    /// The line, if its r² reaches the configured minimum.
    pub fn trusted(&self, line: Option<TrendLine>) -> Option<TrendLine> {
        line.filter(|l| l.r2 >= self.min_r2)
    }
}

pub fn atr_at(ind: &Indicators, idx: usize) -> Option<f64> {
    let atr = ind.atr();
    if !atr.is_warm(idx) {
        return None;
    }
    let v = atr.values()[idx];
    (v.is_finite() && v > 0.0).then_some(v)
}
