//! Bounded, exponentially decayed history of past signals.
//!
//! One entry per bucket of the timeframe, newest last. Entries evicted by a
//! push are kept on a stack (also bounded by capacity) so `pop` can restore
//! them and a rollback leaves the memory exactly as it was.
//!
//! score        = Σ decay^age · score / Σ decay^age
//! rating_score = Σ decay^age · rating_value

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::rating::{Rating, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: NaiveDateTime,
    pub rating: Rating,
    pub score: f64,
}

impl From<&Signal> for MemoryEntry {
    fn from(signal: &Signal) -> Self {
        Self {
            timestamp: signal.timestamp,
            rating: signal.rating,
            score: signal.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalMemory {
    capacity: usize,
    decay: f64,
    entries: VecDeque<MemoryEntry>,
    evicted: VecDeque<MemoryEntry>,
}

impl SignalMemory {
    pub fn new(capacity: usize, decay: f64) -> Self {
        assert!(capacity >= 1, "SignalMemory capacity must be >= 1");
        Self {
            capacity,
            decay,
            entries: VecDeque::with_capacity(capacity),
            evicted: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: MemoryEntry) {
        if self.entries.len() == self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                if self.evicted.len() == self.capacity {
                    self.evicted.pop_front();
                }
                self.evicted.push_back(oldest);
            }
        }
        self.entries.push_back(entry);
    }

    /// Remove the newest entry, restoring the most recently evicted one.
    pub fn pop(&mut self) -> Option<MemoryEntry> {
        let newest = self.entries.pop_back()?;
        if let Some(restored) = self.evicted.pop_back() {
            self.entries.push_front(restored);
        }
        Some(newest)
    }

    /// Overwrite the newest entry (the bucket is still in progress).
    pub fn replace_last(&mut self, entry: MemoryEntry) {
        match self.entries.back_mut() {
            Some(last) => *last = entry,
            None => self.push(entry),
        }
    }

    pub fn last(&self) -> Option<&MemoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter()
    }

    /// Decayed mean score. With `skip_last` the newest entry is ignored and
    /// ages count from the one before it.
    pub fn score(&self, skip_last: bool) -> f64 {
        let mut num = 0.0;
        let mut den = 0.0;
        for (w, e) in self.weighted(skip_last) {
            num += w * e.score;
            den += w;
        }
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    }

    /// Decayed sum of rating values.
    pub fn rating_score(&self, skip_last: bool) -> f64 {
        self.weighted(skip_last)
            .map(|(w, e)| w * e.rating.memory_value())
            .sum()
    }

    fn weighted(&self, skip_last: bool) -> impl Iterator<Item = (f64, &MemoryEntry)> {
        let skip = usize::from(skip_last);
        let decay = self.decay;
        self.entries
            .iter()
            .rev()
            .skip(skip)
            .scan(1.0, move |w, e| {
                let current = *w;
                *w *= decay;
                Some((current, e))
            })
    }
}
