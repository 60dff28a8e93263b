//! Zone construction: raw zones from swings, forward hit scan, merging,
//! confidence scoring and ranking.
//!
//! confidence = 0.4 * bounce + 0.6 * proximity
//!   bounce     = 1 - exp(-sum(hit_weight))
//!   hit_weight = 0.4 * (1 - inside_fraction) + 0.6 * exp(-age / n_candles_in_zone)
//!   proximity  = exp(-|price - mid| / price)

use crate::config::ZoneConfig;
use crate::domain::Candle;

use super::swing::{find_swings, SwingPoint};
use super::{Hit, Polarity, Zone, ZoneSet};

/// Detect the zones of one polarity as of the last candle.
pub fn detect(candles: &[Candle], atr: &[f64], polarity: Polarity, cfg: &ZoneConfig) -> ZoneSet {
    let Some(last) = candles.last() else {
        return ZoneSet::empty(polarity);
    };
    let raw = raw_zones(candles, atr, polarity, cfg, last.close);
    let mut zones: Vec<Zone> = merge(raw, cfg)
        .into_iter()
        .filter(|z| !z.hits.is_empty() && z.confidence >= cfg.min_zone_confidence)
        .collect();

    zones.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    zones.truncate(cfg.n_zones);
    if let Some(top) = zones.first().map(|z| z.confidence) {
        if top > 0.0 {
            for z in &mut zones {
                z.confidence = (z.confidence / top).clamp(0.0, 1.0);
            }
        }
    }
    zones.sort_by(|a, b| a.lo.total_cmp(&b.lo));

    ZoneSet { polarity, zones }
}

/// One unmerged zone per swing point, scored against `price`.
pub fn raw_zones(
    candles: &[Candle],
    atr: &[f64],
    polarity: Polarity,
    cfg: &ZoneConfig,
    price: f64,
) -> Vec<Zone> {
    find_swings(candles, atr, polarity, cfg)
        .into_iter()
        .map(|swing| raw_zone(candles, &swing, polarity, cfg, price))
        .collect()
}

fn raw_zone(
    candles: &[Candle],
    swing: &SwingPoint,
    polarity: Polarity,
    cfg: &ZoneConfig,
    price: f64,
) -> Zone {
    let lo = swing.price - swing.atr;
    let hi = swing.price + swing.atr;
    let hits = scan_hits(candles, swing.index, lo, hi, polarity, cfg.n_candles_in_zone);
    let mut zone = Zone {
        lo,
        hi,
        confidence: 0.0,
        hits,
        swing_points: vec![swing.index],
    };
    zone.confidence = confidence(candles, &zone, cfg, price);
    zone
}

/// Forward scan from the candle after `from`. A hit opens when price enters
/// the zone and closes on a clean exit; a close through the far side breaks
/// the zone and ends the scan.
fn scan_hits(
    candles: &[Candle],
    from: usize,
    lo: f64,
    hi: f64,
    polarity: Polarity,
    max_candles: usize,
) -> Vec<Hit> {
    let end = (from + max_candles).min(candles.len().saturating_sub(1));
    let mut hits = Vec::new();
    let mut entered: Option<usize> = None;

    for j in (from + 1)..=end {
        let c = &candles[j];
        let (broken, touching, exited) = match polarity {
            Polarity::Support => (c.close < lo, c.low <= hi, c.low > hi),
            Polarity::Resistance => (c.close > hi, c.high >= lo, c.high < lo),
        };
        if broken {
            break;
        }
        match entered {
            None if touching => entered = Some(j),
            Some(start) if exited => {
                hits.push((start, j - 1));
                entered = None;
            }
            _ => {}
        }
    }
    hits
}

fn confidence(candles: &[Candle], zone: &Zone, cfg: &ZoneConfig, price: f64) -> f64 {
    let last = candles.len().saturating_sub(1);
    let horizon = cfg.n_candles_in_zone.max(1) as f64;

    let total_weight: f64 = zone
        .hits
        .iter()
        .map(|&(l, r)| {
            let span = &candles[l..=r];
            let inside = span.iter().filter(|c| zone.contains(c.close)).count();
            let inside_fraction = inside as f64 / span.len() as f64;
            let age = last.saturating_sub(r) as f64;
            let recency = (-age / horizon).exp();
            0.4 * (1.0 - inside_fraction) + 0.6 * recency
        })
        .sum();

    let bounce = 1.0 - (-total_weight).exp();
    let proximity = if price > 0.0 {
        (-(price - zone.mid()).abs() / price).exp()
    } else {
        0.0
    };
    (0.4 * bounce + 0.6 * proximity).clamp(0.0, 1.0)
}

/// Merge overlapping or nearly touching zones (sorted by `lo`).
pub fn merge(mut raw: Vec<Zone>, cfg: &ZoneConfig) -> Vec<Zone> {
    raw.sort_by(|a, b| a.lo.total_cmp(&b.lo));
    let mut merged: Vec<(Zone, usize)> = Vec::with_capacity(raw.len());

    for zone in raw {
        match merged.last_mut() {
            Some((prev, count)) if zone.lo <= prev.hi * (1.0 + cfg.merge_tolerance) => {
                let k = *count as f64;
                prev.confidence = (prev.confidence * k + zone.confidence) / (k + 1.0);
                prev.lo = prev.lo.min(zone.lo);
                prev.hi = prev.hi.max(zone.hi);
                prev.hits.extend(zone.hits);
                prev.hits.sort_unstable();
                prev.hits.dedup();
                prev.swing_points.extend(zone.swing_points);
                prev.swing_points.sort_unstable();
                prev.swing_points.dedup();

                let mid = prev.mid();
                let max_width = cfg.max_zone_width_pct * mid;
                if prev.width() > max_width {
                    prev.lo = mid - max_width / 2.0;
                    prev.hi = mid + max_width / 2.0;
                }
                *count += 1;
            }
            _ => merged.push((zone, 1)),
        }
    }
    merged.into_iter().map(|(z, _)| z).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, Atr};

    fn zigzag(n: usize) -> Vec<Candle> {
        // Oscillates between 95 and 105 with a 12-candle cycle; each candle
        // spans close ± 1 so extremes are strict.
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + 5.0 * ((i as f64) * std::f64::consts::TAU / 12.0).sin())
            .collect();
        make_candles(&closes)
            .into_iter()
            .map(|mut c| {
                c.open = c.close;
                c.high = c.close + 1.0;
                c.low = c.close - 1.0;
                c
            })
            .collect()
    }

    fn cfg() -> ZoneConfig {
        ZoneConfig {
            lookback: 200,
            min_swing_window: 2,
            max_swing_window: 12,
            n_candles_in_zone: 60,
            merge_tolerance: 0.002,
            max_zone_width_pct: 0.05,
            min_zone_confidence: 0.1,
            n_zones: 6,
        }
    }

    #[test]
    fn oscillation_yields_support_and_resistance() {
        let candles = zigzag(120);
        let atr = Atr::from_candles(14, &candles);
        let support = detect(&candles, atr.values(), Polarity::Support, &cfg());
        let resistance = detect(&candles, atr.values(), Polarity::Resistance, &cfg());
        assert!(!support.is_empty());
        assert!(!resistance.is_empty());

        let best_support = support
            .zones
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .unwrap();
        assert!(best_support.mid() < 100.0);
        let best_resistance = resistance
            .zones
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .unwrap();
        assert!(best_resistance.mid() > 100.0);
    }

    #[test]
    fn zones_are_well_formed_and_normalized() {
        let candles = zigzag(150);
        let atr = Atr::from_candles(14, &candles);
        for polarity in [Polarity::Support, Polarity::Resistance] {
            let set = detect(&candles, atr.values(), polarity, &cfg());
            assert!(set.len() <= cfg().n_zones);
            let top = set.zones.iter().map(|z| z.confidence).fold(0.0, f64::max);
            assert!((top - 1.0).abs() < 1e-12);
            for z in &set.zones {
                assert!(z.lo <= z.hi);
                assert!((0.0..=1.0).contains(&z.confidence));
                assert!(!z.hits.is_empty());
                assert!(z.hits.iter().all(|&(l, r)| l <= r));
            }
            for pair in set.zones.windows(2) {
                assert!(pair[0].lo <= pair[1].lo);
            }
        }
    }

    #[test]
    fn scan_stops_at_break() {
        let mut candles = make_candles(&[100.0; 10]);
        // Enter at 1, exit cleanly at 3 → hit (1, 2); close through at 5.
        for c in candles.iter_mut() {
            c.low = 110.0;
            c.close = 111.0;
            c.high = 112.0;
        }
        candles[1].low = 104.0;
        candles[2].low = 103.0;
        candles[5].close = 90.0;
        candles[5].low = 89.0;
        candles[7].low = 104.0;
        candles[9].low = 104.0;
        let hits = scan_hits(&candles, 0, 100.0, 105.0, Polarity::Support, 20);
        assert_eq!(hits, vec![(1, 2)]);
    }

    #[test]
    fn merge_unions_hits_and_caps_width() {
        let a = Zone {
            lo: 100.0,
            hi: 104.0,
            confidence: 0.6,
            hits: vec![(3, 4)],
            swing_points: vec![2],
        };
        let b = Zone {
            lo: 104.1,
            hi: 110.0,
            confidence: 0.3,
            hits: vec![(8, 9), (3, 4)],
            swing_points: vec![7],
        };
        let c = Zone {
            lo: 130.0,
            hi: 131.0,
            confidence: 0.9,
            hits: vec![(20, 21)],
            swing_points: vec![19],
        };
        let mut config = cfg();
        config.max_zone_width_pct = 0.05;
        let merged = merge(vec![c, b, a], &config);
        assert_eq!(merged.len(), 2);
        let m = &merged[0];
        assert_eq!(m.hits, vec![(3, 4), (8, 9)]);
        assert_eq!(m.swing_points, vec![2, 7]);
        assert!((m.confidence - 0.45).abs() < 1e-12);
        assert!((m.mid() - 105.0).abs() < 1e-9);
        assert!(m.width() <= 0.05 * 105.0 + 1e-9);
    }

    #[test]
    fn empty_input_yields_empty_set() {
        let set = detect(&[], &[], Polarity::Support, &cfg());
        assert!(set.is_empty());
    }
}
