//! Domain types for ratewatch

pub mod candle;
pub mod position;
pub mod timeframe;

pub use candle::{Candle, Timeline};
pub use position::Position;
pub use timeframe::{PerTimeframe, Timeframe, SESSION_OPEN};

/// Symbol type alias
pub type Symbol = String;
