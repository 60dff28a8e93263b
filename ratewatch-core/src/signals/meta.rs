//! Static predicate metadata and score reshaping.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Urgent,
}

impl Severity {
    pub fn weight(self) -> f64 {
        match self {
            Severity::Low => 0.5,
            Severity::Medium => 1.0,
            Severity::High => 1.5,
            Severity::Urgent => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Price,
    Ema,
    Rsi,
    Macd,
    SupportResistance,
    Stop,
}

/// Whether a predicate argues for opening (Entry) or closing (Exit) a long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Class {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub severity: Severity,
    pub source: Source,
    pub class: Class,
    pub label: &'static str,
}

impl Meta {
    pub const fn new(severity: Severity, source: Source, class: Class, label: &'static str) -> Self {
        Self {
            severity,
            source,
            class,
            label,
        }
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Map a raw heuristic score onto `[floor, ceiling]` through a sigmoid.
pub fn reshape(raw: f64, floor: f64, ceiling: f64) -> f64 {
    if raw.is_nan() {
        return floor;
    }
    floor + (ceiling - floor) * sigmoid(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_stays_in_band() {
        for raw in [-1e9, -5.0, 0.0, 3.0, 1e9, f64::NAN] {
            let s = reshape(raw, 0.3, 2.0);
            assert!((0.3..=2.0).contains(&s), "raw {raw} → {s}");
        }
        assert!((reshape(0.0, 0.3, 2.0) - 1.15).abs() < 1e-12);
    }

    #[test]
    fn severity_weights_increase() {
        let w: Vec<f64> = [Severity::Low, Severity::Medium, Severity::High, Severity::Urgent]
            .iter()
            .map(|s| s.weight())
            .collect();
        assert_eq!(w, vec![0.5, 1.0, 1.5, 2.0]);
    }
}
