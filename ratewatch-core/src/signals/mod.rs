//! Signal generation.
//!
//! Predicates come in three closed families: [`Reason`]s (events), [`Hint`]s
//! (states) and [`StopHit`]s (position risk). Each variant carries static
//! [`meta::Meta`]; a fired predicate carries a score in `[score_floor, score_ceiling]`.
//! Per-timeframe [`Signal`]s are rated from the weighted predicates plus
//! [`SignalMemory`], then rolled up into one [`CombinedSignal`].

pub mod combined;
pub mod context;
pub mod hint;
pub mod memory;
pub mod meta;
pub mod rating;
pub mod reason;
pub mod stop_hit;

use serde::{Deserialize, Serialize};

pub use combined::{combine, CombineInputs, CombinedSignal, Confirmation, Direction, Filters, Forecast};
pub use context::EvalContext;
pub use hint::Hint;
pub use memory::{MemoryEntry, SignalMemory};
pub use meta::{Class, Meta, Severity, Source};
pub use rating::{generate, Rating, Signal, SignalInputs};
pub use reason::Reason;
pub use stop_hit::StopHit;

/// A closed family of predicates evaluated against one indicator index.
pub trait Predicate: Copy + std::fmt::Debug + 'static {
    const ALL: &'static [Self];

    fn meta(self) -> Meta;

    fn key(self) -> PredicateKey;

    /// Raw heuristic score when the predicate fires at the context index.
    fn raw_score(self, ctx: &EvalContext) -> Option<f64>;
}

/// Identifies a backtested predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKey {
    Reason(Reason),
    Hint(Hint),
}

impl PredicateKey {
    pub fn meta(self) -> Meta {
        match self {
            PredicateKey::Reason(r) => r.meta(),
            PredicateKey::Hint(h) => h.meta(),
        }
    }

    pub fn all() -> impl Iterator<Item = PredicateKey> {
        Reason::ALL
            .iter()
            .map(|r| PredicateKey::Reason(*r))
            .chain(Hint::ALL.iter().map(|h| PredicateKey::Hint(*h)))
    }
}

/// A predicate that fired, with its reshaped score and the importance it was
/// weighted with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fired<K> {
    pub kind: K,
    pub score: f64,
    pub importance: f64,
}

impl<K> Fired<K> {
    pub fn new(kind: K, score: f64) -> Self {
        Self {
            kind,
            score,
            importance: 0.0,
        }
    }
}

/// Evaluate every predicate of a family at the context index.
pub fn fire_all<P: Predicate>(ctx: &EvalContext) -> Vec<Fired<P>> {
    P::ALL
        .iter()
        .filter_map(|p| {
            p.raw_score(ctx).map(|raw| {
                Fired::new(*p, meta::reshape(raw, ctx.cfg.score_floor, ctx.cfg.score_ceiling))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_keys_cover_both_families() {
        let keys: Vec<PredicateKey> = PredicateKey::all().collect();
        assert_eq!(keys.len(), Reason::ALL.len() + Hint::ALL.len());
        let mut dedup = keys.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), keys.len());
    }
}
