//! Exponential Moving Average (EMA).
//!
//! Seed: while i < period, v[i] = v[i-1] + (p[i] - v[i-1]) / (i + 1)
//! (running simple mean of everything seen so far).
//! Recursive: v[i] = (p[i] - v[i-1]) * alpha + v[i-1], alpha = 2 / (period + 1).
//! Warm from index period - 1.

use super::resolve_index;

#[derive(Debug, Clone, PartialEq)]
pub struct Ema {
    period: usize,
    alpha: f64,
    values: Vec<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            values: Vec::new(),
        }
    }

    pub fn from_series(period: usize, series: &[f64]) -> Self {
        let mut ema = Self::new(period);
        for &p in series {
            ema.append(p);
        }
        ema
    }

    pub fn append(&mut self, p: f64) {
        let i = self.values.len();
        let v = match self.values.last() {
            None => p,
            Some(&prev) if i < self.period => prev + (p - prev) / (i as f64 + 1.0),
            Some(&prev) => (p - prev) * self.alpha + prev,
        };
        self.values.push(v);
    }

    /// Remove the most recent value. The previous values are untouched, so
    /// the state after undo equals the state before the matching append.
    pub fn undo(&mut self) -> Option<f64> {
        self.values.pop()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// First index whose value is a true EMA rather than a seed mean.
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

    pub fn get(&self, idx: isize) -> f64 {
        self.values[resolve_index(self.values.len(), idx)]
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }
}
