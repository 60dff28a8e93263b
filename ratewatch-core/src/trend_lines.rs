//! Sliding-window least-squares trendlines.
//!
//! For a series and an end index, every window length from `max_period` down
//! to `min_period` is fitted by OLS over the last `period` points, using the
//! absolute index as x. Windows containing NaN are skipped. The set keeps the
//! best `top_n` fits by r², never two periods within `min_gap` of each other.

use serde::{Deserialize, Serialize};

use crate::config::TrendWindow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub period: usize,
    pub r2: f64,
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    /// Fit the `period` points ending at `end` (inclusive).
    ///
    /// Returns `None` when the window does not fit inside the series or
    /// contains a NaN.
    pub fn fit(series: &[f64], end: usize, period: usize) -> Option<TrendLine> {
        if period == 0 || end >= series.len() || end + 1 < period {
            return None;
        }
        let start = end + 1 - period;
        let window = &series[start..=end];
        if window.iter().any(|v| v.is_nan()) {
            return None;
        }

        let n = period as f64;
        let mean_x = start as f64 + (n - 1.0) / 2.0;
        let mean_y = window.iter().sum::<f64>() / n;

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (k, &y) in window.iter().enumerate() {
            let dx = (start + k) as f64 - mean_x;
            sxy += dx * (y - mean_y);
            sxx += dx * dx;
        }
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - slope * mean_x;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (k, &y) in window.iter().enumerate() {
            let fitted = slope * (start + k) as f64 + intercept;
            ss_res += (y - fitted).powi(2);
            ss_tot += (y - mean_y).powi(2);
        }
        let r2 = if period < 2 || ss_tot == 0.0 {
            0.0
        } else {
            1.0 - ss_res / ss_tot
        };

        Some(TrendLine {
            period,
            r2,
            slope,
            intercept,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// The selected trendlines for one series at one end index, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendLines {
    lines: Vec<TrendLine>,
}

impl TrendLines {
    pub fn compute(series: &[f64], end: usize, window: &TrendWindow, min_gap: usize) -> Self {
        let mut candidates: Vec<TrendLine> = (window.min_period..=window.max_period)
            .rev()
            .filter_map(|period| TrendLine::fit(series, end, period))
            .collect();
        // Stable: equal r² keeps the longer window first.
        candidates.sort_by(|a, b| b.r2.total_cmp(&a.r2));

        let mut lines: Vec<TrendLine> = Vec::with_capacity(window.top_n);
        for line in candidates {
            if lines.len() == window.top_n {
                break;
            }
            if lines.iter().all(|kept| kept.period.abs_diff(line.period) > min_gap) {
                lines.push(line);
            }
        }
        Self { lines }
    }

    pub fn lines(&self) -> &[TrendLine] {
        &self.lines
    }

    pub fn best(&self) -> Option<&TrendLine> {
        self.lines.first()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
