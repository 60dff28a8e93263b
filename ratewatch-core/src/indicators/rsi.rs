//! Relative Strength Index (RSI) with Wilder smoothing.
//!
//! Over the first `period` price changes the average gain/loss is a running
//! mean; afterwards avg = (avg * (period - 1) + x) / period.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss); avg_loss == 0 gives 100.
//! The first `period` values are NaN.

use super::resolve_index;

#[derive(Debug, Clone, PartialEq)]
pub struct Rsi {
    period: usize,
    prices: Vec<f64>,
    avg_gain: Vec<f64>,
    avg_loss: Vec<f64>,
    values: Vec<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            prices: Vec::new(),
            avg_gain: Vec::new(),
            avg_loss: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn from_series(period: usize, series: &[f64]) -> Self {
        let mut rsi = Self::new(period);
        for &p in series {
            rsi.append(p);
        }
        rsi
    }

    pub fn append(&mut self, p: f64) {
        let i = self.prices.len();
        let (gain, loss) = match self.prices.last() {
            None => {
                self.prices.push(p);
                self.avg_gain.push(0.0);
                self.avg_loss.push(0.0);
                self.values.push(f64::NAN);
                return;
            }
            Some(&prev) => {
                let change = p - prev;
                (change.max(0.0), (-change).max(0.0))
            }
        };

        let prev_gain = self.avg_gain[i - 1];
        let prev_loss = self.avg_loss[i - 1];
        let (ag, al) = if i <= self.period {
            let n = i as f64;
            (prev_gain + (gain - prev_gain) / n, prev_loss + (loss - prev_loss) / n)
        } else {
            let k = self.period as f64;
            (
                (prev_gain * (k - 1.0) + gain) / k,
                (prev_loss * (k - 1.0) + loss) / k,
            )
        };

        let value = if i < self.period {
            f64::NAN
        } else if al == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + ag / al)
        };

        self.prices.push(p);
        self.avg_gain.push(ag);
        self.avg_loss.push(al);
        self.values.push(value);
    }

    pub fn undo(&mut self) -> Option<f64> {
        self.prices.pop()?;
        self.avg_gain.pop();
        self.avg_loss.pop();
        self.values.pop()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn warm_up(&self) -> usize {
        self.period
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
