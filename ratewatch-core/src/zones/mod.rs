//! Support/resistance zones.
//!
//! One detector serves both polarities; the polarity decides which side of
//! the candle (low or high) forms swings and which direction counts as a
//! touch, a clean exit or a break.

pub mod detector;
pub mod swing;

use serde::{Deserialize, Serialize};

pub use detector::{detect, merge, raw_zones};
pub use swing::{find_swings, SwingPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Support,
    Resistance,
}

/// Inclusive candle-index interval during which price visited a zone.
pub type Hit = (usize, usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub lo: f64,
    pub hi: f64,
    /// Normalized so the strongest zone of the set is 1.0.
    pub confidence: f64,
    pub hits: Vec<Hit>,
    /// Candle indices of the swing points that formed the zone.
    pub swing_points: Vec<usize>,
}

impl Zone {
    pub fn mid(&self) -> f64 {
        (self.lo + self.hi) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn contains(&self, price: f64) -> bool {
        self.lo <= price && price <= self.hi
    }
}

/// The ranked zones of one polarity for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSet {
    pub polarity: Polarity,
    /// Sorted by `lo` ascending.
    pub zones: Vec<Zone>,
}

impl ZoneSet {
    pub fn empty(polarity: Polarity) -> Self {
        Self {
            polarity,
            zones: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    /// Index of the zone containing `price`, else the closest zone entirely
    /// below it (by distance from its top edge).
    pub fn nearest_below(&self, price: f64, min_confidence: f64) -> Option<usize> {
        self.containing(price, min_confidence).or_else(|| {
            self.qualifying(min_confidence)
                .filter(|(_, z)| z.hi < price)
                .min_by(|(_, a), (_, b)| (price - a.hi).total_cmp(&(price - b.hi)))
                .map(|(i, _)| i)
        })
    }

    /// Index of the zone containing `price`, else the closest zone entirely
    /// above it (by distance from its bottom edge).
    pub fn nearest_above(&self, price: f64, min_confidence: f64) -> Option<usize> {
        self.containing(price, min_confidence).or_else(|| {
            self.qualifying(min_confidence)
                .filter(|(_, z)| z.lo > price)
                .min_by(|(_, a), (_, b)| (a.lo - price).total_cmp(&(b.lo - price)))
                .map(|(i, _)| i)
        })
    }

    pub fn nearest_below_zone(&self, price: f64, min_confidence: f64) -> Option<&Zone> {
        self.nearest_below(price, min_confidence)
            .and_then(|i| self.zones.get(i))
    }

    pub fn nearest_above_zone(&self, price: f64, min_confidence: f64) -> Option<&Zone> {
        self.nearest_above(price, min_confidence)
            .and_then(|i| self.zones.get(i))
    }

    fn qualifying(&self, min_confidence: f64) -> impl Iterator<Item = (usize, &Zone)> {
        self.zones
            .iter()
            .enumerate()
            .filter(move |(_, z)| z.confidence >= min_confidence)
    }

    fn containing(&self, price: f64, min_confidence: f64) -> Option<usize> {
        self.qualifying(min_confidence)
            .filter(|(_, z)| z.contains(price))
            .max_by(|(_, a), (_, b)| a.confidence.total_cmp(&b.confidence))
            .map(|(i, _)| i)
    }
}
