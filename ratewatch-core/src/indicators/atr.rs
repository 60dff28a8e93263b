//! Average True Range (ATR) with Wilder smoothing.
//!
//! TR[0] = high - low; TR[t] = max(high - low, |high - prev_close|, |low - prev_close|).
//! The first `period` TRs are averaged with a running mean, then
//! ATR[t] = (ATR[t-1] * (period - 1) + TR[t]) / period.
//! The first `period - 1` values are NaN.

use super::resolve_index;
use crate::domain::Candle;

#[derive(Debug, Clone, PartialEq)]
pub struct Atr {
    period: usize,
    closes: Vec<f64>,
    true_ranges: Vec<f64>,
    smoothed: Vec<f64>,
    values: Vec<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            closes: Vec::new(),
            true_ranges: Vec::new(),
            smoothed: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn from_candles(period: usize, candles: &[Candle]) -> Self {
        let mut atr = Self::new(period);
        for c in candles {
            atr.append(c);
        }
        atr
    }

    pub fn append(&mut self, candle: &Candle) {
        let i = self.closes.len();
        let tr = candle.true_range(self.closes.last().copied());
        let avg = match self.smoothed.last() {
            None => tr,
            Some(&prev) if i < self.period => prev + (tr - prev) / (i as f64 + 1.0),
            Some(&prev) => {
                let k = self.period as f64;
                (prev * (k - 1.0) + tr) / k
            }
        };
        self.closes.push(candle.close);
        self.true_ranges.push(tr);
        self.smoothed.push(avg);
        self.values.push(if i + 1 < self.period { f64::NAN } else { avg });
    }

    pub fn undo(&mut self) -> Option<f64> {
        self.closes.pop()?;
        self.true_ranges.pop();
        self.smoothed.pop();
        self.values.pop()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn warm_up(&self) -> usize {
        self.period - 1
    }

    pub fn is_warm(&self, idx: usize) -> bool {
        idx >= self.warm_up() && idx < self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn true_ranges(&self) -> &[f64] {
        &self.true_ranges
    }

    pub fn get(&self, idx: isize) -> f64 {
        self.values[resolve_index(self.values.len(), idx)]
    }

    /// Latest warmed value, if any.
    pub fn last_warm(&self) -> Option<f64> {
        self.values.last().copied().filter(|v| !v.is_nan())
    }
}
