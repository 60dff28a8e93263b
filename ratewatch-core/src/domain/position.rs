use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Candle;

/// An open long position as reported by the position collaborator.
///
/// `max_price_seen` is maintained by `Metrics` from candles at or after
/// `entry_time`; it never falls below `entry_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: f64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub max_price_seen: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>, shares: f64, entry_price: f64, entry_time: NaiveDateTime) -> Self {
        Self {
            symbol: symbol.into(),
            shares,
            entry_price,
            entry_time,
            max_price_seen: entry_price,
        }
    }

    pub fn cost_basis(&self) -> f64 {
        self.shares * self.entry_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares * (price - self.entry_price)
    }

    /// Unrealized P&L as a fraction of cost. Zero-cost positions report 0.
    pub fn unrealized_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price
    }

    /// Recompute the high watermark from the native candle buffer.
    ///
    /// Scans backwards and stops at the first candle before entry, so the
    /// cost is proportional to the holding period.
    pub fn refresh_max_seen(&mut self, candles: &[Candle]) {
        let mut max_seen = self.entry_price;
        for c in candles.iter().rev() {
            if c.timestamp < self.entry_time {
                break;
            }
            max_seen = max_seen.max(c.high);
        }
        self.max_price_seen = max_seen;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    #[test]
    fn pnl_helpers() {
        let pos = Position::new("AAPL", 10.0, 100.0, ts(10));
        assert_eq!(pos.cost_basis(), 1000.0);
        assert_eq!(pos.unrealized_pnl(110.0), 100.0);
        assert!((pos.unrealized_pct(110.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn zero_cost_pct_is_zero() {
        let pos = Position::new("FREE", 10.0, 0.0, ts(10));
        assert_eq!(pos.unrealized_pct(50.0), 0.0);
    }

    #[test]
    fn max_seen_only_counts_candles_since_entry() {
        let candles = vec![
            Candle::new(ts(9), 100.0, 150.0, 99.0, 100.0, 1.0),
            Candle::new(ts(10), 100.0, 104.0, 99.0, 103.0, 1.0),
            Candle::new(ts(11), 103.0, 107.0, 102.0, 105.0, 1.0),
        ];
        let mut pos = Position::new("AAPL", 1.0, 101.0, ts(10));
        pos.refresh_max_seen(&candles);
        assert_eq!(pos.max_price_seen, 107.0);
    }
}
