//! Indicator state for one timeframe of one symbol.
//!
//! Primitive series are index-aligned with `candles`. Trendlines and zones
//! are derived from the current arrays and recomputed after every mutation,
//! so they follow rollbacks exactly.

use crate::config::{Config, IndicatorConfig, TrendConfig, ZoneConfig};
use crate::domain::{Candle, Timeframe};
use crate::indicators::{resolve_index, Atr, Ema, Macd, Rsi};
use crate::trend_lines::TrendLines;
use crate::zones::{self, Polarity, ZoneSet};

#[derive(Debug, Clone)]
pub struct Indicators {
    timeframe: Timeframe,
    params: IndicatorConfig,
    trend_cfg: TrendConfig,
    zone_cfg: ZoneConfig,

    candles: Vec<Candle>,
    closes: Vec<f64>,
    ema_fast: Ema,
    ema_mid: Ema,
    ema_slow: Ema,
    rsi: Rsi,
    macd: Macd,
    atr: Atr,

    price_trend: TrendLines,
    rsi_trend: TrendLines,
    ema_trend: TrendLines,
    support: ZoneSet,
    resistance: ZoneSet,
}

impl Indicators {
    pub fn new(timeframe: Timeframe, config: &Config) -> Self {
        let p = &config.indicators;
        Self {
            timeframe,
            params: p.clone(),
            trend_cfg: config.trend.clone(),
            zone_cfg: config.zones.get(timeframe).clone(),
            candles: Vec::new(),
            closes: Vec::new(),
            ema_fast: Ema::new(p.ema_fast),
            ema_mid: Ema::new(p.ema_mid),
            ema_slow: Ema::new(p.ema_slow),
            rsi: Rsi::new(p.rsi_period),
            macd: Macd::new(p.macd_fast, p.macd_slow, p.macd_signal),
            atr: Atr::new(p.atr_period),
            price_trend: TrendLines::default(),
            rsi_trend: TrendLines::default(),
            ema_trend: TrendLines::default(),
            support: ZoneSet::empty(Polarity::Support),
            resistance: ZoneSet::empty(Polarity::Resistance),
        }
    }

    /// Batch construction: sequential appends, then one derived refresh.
    pub fn from_candles(timeframe: Timeframe, config: &Config, candles: &[Candle]) -> Self {
        let mut ind = Self::new(timeframe, config);
        for c in candles {
            ind.append_primitives(*c);
        }
        ind.refresh_derived();
        ind
    }

    pub fn append(&mut self, candle: Candle) {
        self.append_primitives(candle);
        self.refresh_derived();
    }

    pub fn undo(&mut self) -> Option<Candle> {
        let removed = self.undo_primitives()?;
        self.refresh_derived();
        Some(removed)
    }

    /// Undo the last entry and append `candle` in its place.
    pub fn replace_last(&mut self, candle: Candle) {
        self.undo_primitives();
        self.append_primitives(candle);
        self.refresh_derived();
    }

    fn append_primitives(&mut self, candle: Candle) {
        self.closes.push(candle.close);
        self.ema_fast.append(candle.close);
        self.ema_mid.append(candle.close);
        self.ema_slow.append(candle.close);
        self.rsi.append(candle.close);
        self.macd.append(candle.close);
        self.atr.append(&candle);
        self.candles.push(candle);
    }

    fn undo_primitives(&mut self) -> Option<Candle> {
        let removed = self.candles.pop()?;
        self.closes.pop();
        self.ema_fast.undo();
        self.ema_mid.undo();
        self.ema_slow.undo();
        self.rsi.undo();
        self.macd.undo();
        self.atr.undo();
        Some(removed)
    }

    /// Recompute trendlines and zones from the current arrays.
    pub fn refresh_derived(&mut self) {
        let Some(end) = self.candles.len().checked_sub(1) else {
            self.price_trend = TrendLines::default();
            self.rsi_trend = TrendLines::default();
            self.ema_trend = TrendLines::default();
            self.support = ZoneSet::empty(Polarity::Support);
            self.resistance = ZoneSet::empty(Polarity::Resistance);
            return;
        };
        let gap = self.trend_cfg.min_period_gap;
        self.price_trend = TrendLines::compute(&self.closes, end, &self.trend_cfg.price, gap);
        self.rsi_trend = TrendLines::compute(self.rsi.values(), end, &self.trend_cfg.rsi, gap);
        self.ema_trend =
            TrendLines::compute(self.ema_mid.values(), end, &self.trend_cfg.ema, gap);
        self.support = zones::detect(&self.candles, self.atr.values(), Polarity::Support, &self.zone_cfg);
        self.resistance =
            zones::detect(&self.candles, self.atr.values(), Polarity::Resistance, &self.zone_cfg);
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn candle(&self, idx: isize) -> &Candle {
        &self.candles[resolve_index(self.candles.len(), idx)]
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Resolve a relative index against this timeframe's length.
    pub fn index(&self, idx: isize) -> usize {
        resolve_index(self.candles.len(), idx)
    }

    /// First index at which the core series (EMA mid, RSI, ATR) are warm.
    /// Predicates that need EMA slow or MACD check those separately.
    pub fn warm_up(&self) -> usize {
        self.ema_mid
            .warm_up()
            .max(self.rsi.warm_up())
            .max(self.atr.warm_up())
    }

    pub fn is_warm(&self, idx: usize) -> bool {
        idx >= self.warm_up() && idx < self.candles.len()
    }

    pub fn ema_fast(&self) -> &Ema {
        &self.ema_fast
    }

    pub fn ema_mid(&self) -> &Ema {
        &self.ema_mid
    }

    pub fn ema_slow(&self) -> &Ema {
        &self.ema_slow
    }

    pub fn rsi(&self) -> &Rsi {
        &self.rsi
    }

    pub fn macd(&self) -> &Macd {
        &self.macd
    }

    pub fn atr(&self) -> &Atr {
        &self.atr
    }

    pub fn price_trend(&self) -> &TrendLines {
        &self.price_trend
    }

    pub fn rsi_trend(&self) -> &TrendLines {
        &self.rsi_trend
    }

    pub fn ema_trend(&self) -> &TrendLines {
        &self.ema_trend
    }

    pub fn support(&self) -> &ZoneSet {
        &self.support
    }

    pub fn resistance(&self) -> &ZoneSet {
        &self.resistance
    }

    pub fn zones(&self, polarity: Polarity) -> &ZoneSet {
        match polarity {
            Polarity::Support => &self.support,
            Polarity::Resistance => &self.resistance,
        }
    }

    /// Mean volume over the `volume_period` candles before `idx` (exclusive).
    /// `None` until a full window exists.
    pub fn average_volume(&self, idx: usize) -> Option<f64> {
        let period = self.params.volume_period;
        if idx < period || idx >= self.candles.len() {
            return None;
        }
        let window = &self.candles[idx - period..idx];
        Some(window.iter().map(|c| c.volume).sum::<f64>() / period as f64)
    }

    /// EMA fast < mid < slow at `idx`, all warm.
    pub fn bearish_stack(&self, idx: usize) -> bool {
        self.ema_slow.is_warm(idx)
            && self.ema_fast.values()[idx] < self.ema_mid.values()[idx]
            && self.ema_mid.values()[idx] < self.ema_slow.values()[idx]
    }

    /// EMA fast > mid > slow at `idx`, all warm.
    pub fn bullish_stack(&self, idx: usize) -> bool {
        self.ema_slow.is_warm(idx)
            && self.ema_fast.values()[idx] > self.ema_mid.values()[idx]
            && self.ema_mid.values()[idx] > self.ema_slow.values()[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn closes(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 4.0 + i as f64 * 0.05)
            .collect()
    }

    #[test]
    fn series_stay_index_aligned() {
        let candles = make_candles(&closes(80));
        let ind = Indicators::from_candles(Timeframe::Hour1, &Config::default(), &candles);
        assert_eq!(ind.len(), 80);
        assert_eq!(ind.ema_fast().len(), 80);
        assert_eq!(ind.ema_slow().len(), 80);
        assert_eq!(ind.rsi().len(), 80);
        assert_eq!(ind.macd().len(), 80);
        assert_eq!(ind.atr().len(), 80);
        assert_eq!(ind.closes().len(), 80);
    }

    #[test]
    fn incremental_matches_batch() {
        let candles = make_candles(&closes(90));
        let config = Config::default();
        let batch = Indicators::from_candles(Timeframe::Hour4, &config, &candles);
        let mut inc = Indicators::new(Timeframe::Hour4, &config);
        for c in &candles {
            inc.append(*c);
        }
        assert_eq!(format!("{batch:?}"), format!("{inc:?}"));
    }

    #[test]
    fn undo_restores_derived_state() {
        let candles = make_candles(&closes(100));
        let config = Config::default();
        let mut ind = Indicators::from_candles(Timeframe::Hour1, &config, &candles[..95]);
        let before = format!("{ind:?}");
        for c in &candles[95..] {
            ind.append(*c);
        }
        for _ in 95..100 {
            ind.undo();
        }
        assert_eq!(format!("{ind:?}"), before);
    }

    #[test]
    fn replace_last_equals_fresh_build() {
        let candles = make_candles(&closes(60));
        let config = Config::default();
        let mut ind = Indicators::from_candles(Timeframe::Day1, &config, &candles);
        let mut altered = candles[59];
        altered.close += 2.0;
        altered.high += 2.0;
        ind.replace_last(altered);

        let mut expected_input = candles.clone();
        expected_input[59] = altered;
        let fresh = Indicators::from_candles(Timeframe::Day1, &config, &expected_input);
        assert_eq!(format!("{ind:?}"), format!("{fresh:?}"));
    }

    #[test]
    fn warm_up_follows_core_series() {
        let ind = Indicators::new(Timeframe::Hour1, &Config::default());
        assert_eq!(ind.warm_up(), 20);
    }

    #[test]
    fn average_volume_needs_full_window() {
        let candles = make_candles(&closes(30));
        let ind = Indicators::from_candles(Timeframe::Hour1, &Config::default(), &candles);
        assert_eq!(ind.average_volume(19), None);
        assert_eq!(ind.average_volume(20), Some(1000.0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn candle_index_out_of_range_panics() {
        let candles = make_candles(&closes(5));
        let ind = Indicators::from_candles(Timeframe::Hour1, &Config::default(), &candles);
        ind.candle(-6);
    }
}
