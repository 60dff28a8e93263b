//! MACD: macd = EMA(fast) - EMA(slow), signal = EMA(macd, signal_period),
//! histogram = macd - signal. Warm from index slow - 1 + signal - 1.

use super::{resolve_index, Ema};

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    macd: Vec<f64>,
    histogram: Vec<f64>,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && slow >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be < slow period");
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            macd: Vec::new(),
            histogram: Vec::new(),
        }
    }

    pub fn from_series(fast: usize, slow: usize, signal: usize, series: &[f64]) -> Self {
        let mut macd = Self::new(fast, slow, signal);
        for &p in series {
            macd.append(p);
        }
        macd
    }

    pub fn append(&mut self, p: f64) {
        self.fast.append(p);
        self.slow.append(p);
        let (Some(f), Some(s)) = (self.fast.last(), self.slow.last()) else {
            return;
        };
        let m = f - s;
        self.signal.append(m);
        let sig = self.signal.last().unwrap_or(m);
        self.macd.push(m);
        self.histogram.push(m - sig);
    }

    pub fn undo(&mut self) -> Option<f64> {
        self.fast.undo()?;
        self.slow.undo();
        self.signal.undo();
        self.histogram.pop();
        self.macd.pop()
    }

    pub fn warm_up(&self) -> usize {
        self.slow.warm_up() + self.signal.warm_up()
    }

    pub fn is_warm(&self, idx: usize) -> bool {
        idx >= self.warm_up() && idx < self.macd.len()
    }

    pub fn len(&self) -> usize {
        self.macd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }

    pub fn macd(&self) -> &[f64] {
        &self.macd
    }

    pub fn signal(&self) -> &[f64] {
        self.signal.values()
    }

    pub fn histogram(&self) -> &[f64] {
        &self.histogram
    }

    pub fn macd_at(&self, idx: isize) -> f64 {
        self.macd[resolve_index(self.macd.len(), idx)]
    }

    pub fn signal_at(&self, idx: isize) -> f64 {
        self.signal.get(idx)
    }

    pub fn histogram_at(&self, idx: isize) -> f64 {
        self.histogram[resolve_index(self.histogram.len(), idx)]
    }
}
