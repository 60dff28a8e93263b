//! Derived timeframes and session-anchored bucket alignment.
//!
//! Buckets are anchored to the 9:30 session open of each trading date:
//! 1h buckets start at 9:30, 10:30, ...; 4h buckets at 9:30 and 13:30;
//! the 1d bucket at 9:30. Instants before 9:30 belong to the previous
//! date's session.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session open used as the bucket anchor.
pub const SESSION_OPEN: (u32, u32) = (9, 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Timeframe {
    /// All timeframes, shortest first. Array position equals [`Timeframe::index`].
    pub const ALL: [Timeframe; 3] = [Timeframe::Hour1, Timeframe::Hour4, Timeframe::Day1];

    pub fn index(self) -> usize {
        match self {
            Timeframe::Hour1 => 0,
            Timeframe::Hour4 => 1,
            Timeframe::Day1 => 2,
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
            Timeframe::Day1 => 1440,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }

    /// Parse "1h" / "4h" / "1d" (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "1h" | "hour" | "hourly" => Some(Timeframe::Hour1),
            "4h" => Some(Timeframe::Hour4),
            "1d" | "day" | "daily" => Some(Timeframe::Day1),
            _ => None,
        }
    }

    /// Higher timeframes, daily first (the order zone lookups prefer).
    pub fn preference_order() -> [Timeframe; 3] {
        [Timeframe::Day1, Timeframe::Hour4, Timeframe::Hour1]
    }

    /// Start of the bucket of this timeframe that contains `t`.
    pub fn start_of_interval(self, t: NaiveDateTime) -> NaiveDateTime {
        let open = session_time();
        let mut anchor = t.date().and_time(open);
        if t < anchor {
            anchor -= Duration::days(1);
        }
        let elapsed = (t - anchor).num_minutes();
        let step = self.minutes();
        anchor + Duration::minutes(elapsed.div_euclid(step) * step)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn session_time() -> NaiveTime {
    // 9:30:00 is always a valid wall-clock time.
    NaiveTime::from_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, 0).unwrap_or(NaiveTime::MIN)
}

/// One value per timeframe, addressable by [`Timeframe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerTimeframe<T> {
    #[serde(rename = "1h")]
    pub hour1: T,
    #[serde(rename = "4h")]
    pub hour4: T,
    #[serde(rename = "1d")]
    pub day1: T,
}

impl<T> PerTimeframe<T> {
    pub fn new(hour1: T, hour4: T, day1: T) -> Self {
        Self { hour1, hour4, day1 }
    }

    pub fn from_fn(mut f: impl FnMut(Timeframe) -> T) -> Self {
        Self {
            hour1: f(Timeframe::Hour1),
            hour4: f(Timeframe::Hour4),
            day1: f(Timeframe::Day1),
        }
    }

    pub fn get(&self, tf: Timeframe) -> &T {
        match tf {
            Timeframe::Hour1 => &self.hour1,
            Timeframe::Hour4 => &self.hour4,
            Timeframe::Day1 => &self.day1,
        }
    }

    pub fn get_mut(&mut self, tf: Timeframe) -> &mut T {
        match tf {
            Timeframe::Hour1 => &mut self.hour1,
            Timeframe::Hour4 => &mut self.hour4,
            Timeframe::Day1 => &mut self.day1,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timeframe, &T)> {
        Timeframe::ALL.into_iter().map(move |tf| (tf, self.get(tf)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Timeframe, &T) -> U) -> PerTimeframe<U> {
        PerTimeframe::from_fn(|tf| f(tf, self.get(tf)))
    }
}
