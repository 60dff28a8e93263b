//! Per-timeframe indicator bundles and the native-feed synchronizer.

pub mod indicators;
pub mod sync;

pub use indicators::Indicators;
pub use sync::{Metrics, PushOutcome, RollbackOutcome};
