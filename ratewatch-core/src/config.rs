//! Immutable engine configuration.
//!
//! Every tunable constant of the pipeline lives here and is threaded through
//! constructors (the `Ticker` holds an `Arc<Config>`). Plain serde structs
//! with `#[serde(default)]`, so a TOML file only needs the keys it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PerTimeframe, Timeframe};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub indicators: IndicatorConfig,
    pub trend: TrendConfig,
    pub zones: PerTimeframe<ZoneConfig>,
    pub backtest: PerTimeframe<BacktestConfig>,
    pub signal: SignalConfig,
    pub memory: MemoryConfig,
    pub combined: CombinedConfig,
    pub risk: RiskConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Content hash of the parameter set (hex blake3 of the canonical JSON form).
    pub fn fingerprint(&self) -> String {
        // Serializing plain structs of numbers cannot fail; an empty body
        // still yields a stable hash.
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ind = &self.indicators;
        for (name, period) in [
            ("ema_fast", ind.ema_fast),
            ("ema_mid", ind.ema_mid),
            ("ema_slow", ind.ema_slow),
            ("rsi_period", ind.rsi_period),
            ("macd_fast", ind.macd_fast),
            ("macd_slow", ind.macd_slow),
            ("macd_signal", ind.macd_signal),
            ("atr_period", ind.atr_period),
            ("volume_period", ind.volume_period),
        ] {
            if period == 0 {
                return invalid(format!("indicators.{name} must be >= 1"));
            }
        }
        if !(ind.ema_fast < ind.ema_mid && ind.ema_mid < ind.ema_slow) {
            return invalid("indicators: ema_fast < ema_mid < ema_slow required".into());
        }
        if ind.macd_fast >= ind.macd_slow {
            return invalid("indicators: macd_fast must be < macd_slow".into());
        }

        for (name, w) in [
            ("price", &self.trend.price),
            ("rsi", &self.trend.rsi),
            ("ema", &self.trend.ema),
        ] {
            if w.min_period < 2 || w.min_period > w.max_period || w.top_n == 0 {
                return invalid(format!(
                    "trend.{name}: need 2 <= min_period <= max_period and top_n >= 1"
                ));
            }
        }

        for (tf, z) in self.zones.iter() {
            if z.min_swing_window == 0 || z.min_swing_window > z.max_swing_window {
                return invalid(format!("zones.{tf}: need 1 <= min_swing_window <= max_swing_window"));
            }
            if z.n_zones == 0 || z.n_candles_in_zone == 0 || z.lookback == 0 {
                return invalid(format!("zones.{tf}: n_zones, n_candles_in_zone, lookback must be >= 1"));
            }
            if !(z.max_zone_width_pct > 0.0) || !(0.0..=1.0).contains(&z.min_zone_confidence) {
                return invalid(format!("zones.{tf}: width must be > 0, confidence in [0,1]"));
            }
        }

        for (tf, b) in self.backtest.iter() {
            if b.lookback == 0 || b.max_candles == 0 || !(b.profit_pct > 0.0) || !(b.stop_pct > 0.0) {
                return invalid(format!("backtest.{tf}: lookback, max_candles, profit_pct, stop_pct must be > 0"));
            }
        }

        for (tf, cap) in self.memory.capacity.iter() {
            if *cap == 0 {
                return invalid(format!("memory.capacity.{tf} must be >= 1"));
            }
        }
        if !(0.0..1.0).contains(&self.memory.decay) {
            return invalid("memory.decay must be in [0, 1)".into());
        }

        let s = &self.signal;
        if !(0.0..=1.0).contains(&s.memory_alpha) || !(0.0..=1.0).contains(&s.entry_bias) {
            return invalid("signal: memory_alpha and entry_bias must be in [0, 1]".into());
        }
        if s.score_floor >= s.score_ceiling {
            return invalid("signal: score_floor must be < score_ceiling".into());
        }

        let stop = &self.risk.stop;
        for (name, pct) in [
            ("hard_max_loss_pct", stop.hard_max_loss_pct),
            ("hard_trailing_pct", stop.hard_trailing_pct),
            ("sizing.max_risk_pct", self.risk.sizing.max_risk_pct),
            ("sizing.max_position_fraction", self.risk.sizing.max_position_fraction),
        ] {
            if !(pct > 0.0 && pct < 1.0) {
                return invalid(format!("risk.{name} must be in (0, 1)"));
            }
        }
        if self.risk.target.min_rr <= 0.0 || self.risk.sizing.capital_usd <= 0.0 {
            return invalid("risk: min_rr and capital_usd must be > 0".into());
        }
        Ok(())
    }
}

fn invalid(msg: String) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg))
}

/// Indicator periods shared by all timeframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_mid: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,
    /// Window for the average-volume comparison used by confirmations.
    pub volume_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_mid: 21,
            ema_slow: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
            volume_period: 20,
        }
    }
}

/// Candidate window range for one trendline series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendWindow {
    pub min_period: usize,
    pub max_period: usize,
    pub top_n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub price: TrendWindow,
    pub rsi: TrendWindow,
    pub ema: TrendWindow,
    /// Kept periods must differ by more than this.
    pub min_period_gap: usize,
    /// Minimum r² for a trendline to back a trend hint.
    pub min_r2: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            price: TrendWindow {
                min_period: 10,
                max_period: 60,
                top_n: 3,
            },
            rsi: TrendWindow {
                min_period: 7,
                max_period: 30,
                top_n: 3,
            },
            ema: TrendWindow {
                min_period: 10,
                max_period: 60,
                top_n: 3,
            },
            min_period_gap: 5,
            min_r2: 0.6,
        }
    }
}

/// Per-timeframe zone detection parameters. A TOML table for one timeframe
/// must be complete; omit the whole `[zones]` section to keep the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Only the last `lookback` candles seed swing points.
    pub lookback: usize,
    pub min_swing_window: usize,
    pub max_swing_window: usize,
    /// Forward scan length when counting hits.
    pub n_candles_in_zone: usize,
    /// Merge when a zone starts within this fraction above the previous zone's top.
    pub merge_tolerance: f64,
    /// Merged zones are capped at this fraction of their midpoint.
    pub max_zone_width_pct: f64,
    pub min_zone_confidence: f64,
    pub n_zones: usize,
}

impl ZoneConfig {
    fn with(lookback: usize, n_candles_in_zone: usize, max_zone_width_pct: f64) -> Self {
        Self {
            lookback,
            n_candles_in_zone,
            max_zone_width_pct,
            ..Self::default()
        }
    }
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            lookback: 400,
            min_swing_window: 2,
            max_swing_window: 12,
            n_candles_in_zone: 120,
            merge_tolerance: 0.002,
            max_zone_width_pct: 0.015,
            min_zone_confidence: 0.1,
            n_zones: 6,
        }
    }
}

impl Default for PerTimeframe<ZoneConfig> {
    fn default() -> Self {
        PerTimeframe::new(
            ZoneConfig::with(400, 120, 0.015),
            ZoneConfig::with(300, 90, 0.03),
            ZoneConfig::with(250, 60, 0.05),
        )
    }
}

/// Forward-exit simulation parameters for predicate backtesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub lookback: usize,
    pub profit_pct: f64,
    pub stop_pct: f64,
    pub max_candles: usize,
}

impl Default for PerTimeframe<BacktestConfig> {
    fn default() -> Self {
        PerTimeframe::new(
            BacktestConfig {
                lookback: 500,
                profit_pct: 0.03,
                stop_pct: 0.02,
                max_candles: 24,
            },
            BacktestConfig {
                lookback: 300,
                profit_pct: 0.05,
                stop_pct: 0.03,
                max_candles: 30,
            },
            BacktestConfig {
                lookback: 250,
                profit_pct: 0.08,
                stop_pct: 0.05,
                max_candles: 20,
            },
        )
    }
}

/// Rating thresholds and predicate parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub entry_threshold: f64,
    /// Maximum opposing weight tolerated for a clean Entry/Exit.
    pub watchlist_threshold: f64,
    pub mixed_min: f64,
    pub entry_min: f64,
    pub exit_min: f64,
    /// Hints count at this fraction of a reason's weight.
    pub hint_weight: f64,
    /// `w` in `tanh((entry_w·w − exit_w·(1−w))·squash)`.
    pub entry_bias: f64,
    pub squash: f64,
    /// Share of the decayed memory score in the final signal score.
    pub memory_alpha: f64,
    /// Importance used for predicates that have never been backtested.
    pub default_importance: f64,
    /// Fixed importance for stop-derived predicates.
    pub stop_importance: f64,
    pub score_floor: f64,
    pub score_ceiling: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Zones below this normalized confidence are ignored by predicates.
    pub zone_confidence: f64,
    /// "Near" a zone means within this many ATRs of its edge.
    pub near_zone_atr: f64,
    /// Close this many ATRs above EMA21 counts as extended.
    pub extended_atr: f64,
    /// True range this many ATRs wide counts as a volatility spike.
    pub volatility_spike_atr: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            entry_threshold: 1.0,
            watchlist_threshold: 0.5,
            mixed_min: 0.6,
            entry_min: 0.4,
            exit_min: 0.4,
            hint_weight: 0.5,
            entry_bias: 0.5,
            squash: 0.8,
            memory_alpha: 0.3,
            default_importance: 0.25,
            stop_importance: 1.0,
            score_floor: 0.3,
            score_ceiling: 2.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            zone_confidence: 0.3,
            near_zone_atr: 1.0,
            extended_atr: 3.0,
            volatility_spike_atr: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub capacity: PerTimeframe<usize>,
    /// Per-step decay applied to older entries.
    pub decay: f64,
    /// Decayed rating score at which a None rating is promoted to a stale watchlist.
    pub stale_rating_score: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: PerTimeframe::new(16, 12, 8),
            decay: 0.75,
            stale_rating_score: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinedConfig {
    /// Weights of each timeframe's score in the combined score.
    pub weights: PerTimeframe<f64>,
    /// A higher-timeframe HoldCautiously below this score counts as weak.
    pub weak_hold_score: f64,
    /// Higher-timeframe watchlist score needed to upgrade a 1h watchlist.
    pub upgrade_score: f64,
    pub earnings_buffer_days: i64,
    /// Forecast horizon in 1h candles.
    pub forecast_horizon: usize,
    /// Volume above this multiple of its average confirms an entry.
    pub volume_confirmation: f64,
}

impl Default for CombinedConfig {
    fn default() -> Self {
        Self {
            weights: PerTimeframe::new(0.5, 0.3, 0.2),
            weak_hold_score: -0.2,
            upgrade_score: 0.5,
            earnings_buffer_days: 5,
            forecast_horizon: 10,
            volume_confirmation: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Timeframe whose ATR drives stops and sizing (shorter ones are used while it warms up).
    pub atr_timeframe: Timeframe,
    /// Minimum zone confidence for stop/target anchoring.
    pub zone_confidence: f64,
    pub stop: StopConfig,
    pub target: TargetConfig,
    pub sizing: SizingConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            atr_timeframe: Timeframe::Day1,
            zone_confidence: 0.5,
            stop: StopConfig::default(),
            target: TargetConfig::default(),
            sizing: SizingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub atr_multiplier: f64,
    /// Support-anchored stops sit at `zone.lo × support_buffer`.
    pub support_buffer: f64,
    pub hard_max_loss_pct: f64,
    /// Trailing mode engages once gain exceeds this many ATRs.
    pub trailing_trigger_atr: f64,
    pub trailing_atr_multiplier: f64,
    pub hard_trailing_pct: f64,
    pub near_stop_pct: f64,
    pub max_holding_days: i64,
    pub time_exit_min_gain: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            atr_multiplier: 2.0,
            support_buffer: 0.995,
            hard_max_loss_pct: 0.08,
            trailing_trigger_atr: 2.0,
            trailing_atr_multiplier: 2.5,
            hard_trailing_pct: 0.10,
            near_stop_pct: 0.015,
            max_holding_days: 30,
            time_exit_min_gain: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub min_rr: f64,
    pub base_target_pct: f64,
    /// Resistance target wins when its R:R is within this factor of the percentage target's.
    pub rr_tolerance: f64,
    pub min_resistance_rr: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            min_rr: 2.0,
            base_target_pct: 0.10,
            rr_tolerance: 1.2,
            min_resistance_rr: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub capital_usd: f64,
    /// Fraction of capital risked per trade.
    pub max_risk_pct: f64,
    pub max_position_fraction: f64,
    /// ATR% of price at which the volatility component of the risk score saturates.
    pub atr_pct_full_scale: f64,
    pub min_multiplier: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            capital_usd: 100_000.0,
            max_risk_pct: 0.01,
            max_position_fraction: 0.20,
            atr_pct_full_scale: 0.05,
            min_multiplier: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Replaced-candle journal depth for exact rollback.
    pub max_undo_depth: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { max_undo_depth: 256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn memory_capacities_match_timeframes() {
        let c = Config::default();
        assert_eq!(*c.memory.capacity.get(Timeframe::Hour1), 16);
        assert_eq!(*c.memory.capacity.get(Timeframe::Hour4), 12);
        assert_eq!(*c.memory.capacity.get(Timeframe::Day1), 8);
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let text = r#"
            [signal]
            entry_threshold = 1.5

            [backtest]
            1h = { lookback = 500, profit_pct = 0.03, stop_pct = 0.02, max_candles = 24 }
            4h = { lookback = 300, profit_pct = 0.05, stop_pct = 0.03, max_candles = 30 }
            1d = { lookback = 100, profit_pct = 0.08, stop_pct = 0.05, max_candles = 20 }

            [risk]
            atr_timeframe = "4h"
        "#;
        let c = Config::from_toml_str(text).unwrap();
        assert_eq!(c.signal.entry_threshold, 1.5);
        assert_eq!(c.signal.exit_min, SignalConfig::default().exit_min);
        assert_eq!(c.backtest.day1.lookback, 100);
        assert_eq!(c.backtest.day1.profit_pct, 0.08);
        assert_eq!(c.zones, Config::default().zones);
        assert_eq!(c.risk.atr_timeframe, Timeframe::Hour4);
    }

    #[test]
    fn toml_roundtrip_preserves_config() {
        let c = Config::default();
        let text = c.to_toml_string().unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(c, back);
        assert_eq!(c.fingerprint(), back.fingerprint());
    }

    #[test]
    fn incomplete_timeframe_table_rejected() {
        let text = r#"
            [backtest.1d]
            lookback = 100
        "#;
        assert!(matches!(Config::from_toml_str(text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_ema_order_rejected() {
        let mut c = Config::default();
        c.indicators.ema_mid = 5;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn fingerprint_changes_with_params() {
        let a = Config::default();
        let mut b = Config::default();
        b.risk.stop.atr_multiplier = 3.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
