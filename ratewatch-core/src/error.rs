use chrono::NaiveDateTime;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no candle history for {symbol}")]
    EmptyHistory { symbol: String },
    #[error("candle at {got} is older than the last candle at {last}")]
    NonMonotonicTimestamp {
        last: NaiveDateTime,
        got: NaiveDateTime,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
