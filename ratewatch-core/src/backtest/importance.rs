//! Importance of a backtested predicate.
//!
//! importance = 0.5 · sigmoid(2 · (pf − 1.5))
//!            + 0.3 · consistency
//!            + 0.2 · sweet_spot(trig_rate)
//!
//! consistency = max(0, tanh(avg_pnl / pnl_volatility)); the sweet spot is a
//! triangle that is 0 at 0, 1 on [5%, 15%] and 0 again at 50%. Rarely firing
//! predicates (trig_rate < 1%) are scaled down linearly and fewer than three
//! samples give exactly 0.

use crate::signals::meta::sigmoid;

pub const MIN_SAMPLES: usize = 3;
pub const PROFIT_FACTOR_CAP: f64 = 10.0;
const RARE_TRIGGER_RATE: f64 = 0.01;

pub fn sweet_spot(trig_rate: f64) -> f64 {
    if trig_rate <= 0.0 || trig_rate >= 0.5 {
        0.0
    } else if trig_rate < 0.05 {
        trig_rate / 0.05
    } else if trig_rate <= 0.15 {
        1.0
    } else {
        (0.5 - trig_rate) / 0.35
    }
}

/// Average win over average loss, capped. No losses caps at the maximum
/// when there was any profit, otherwise 0.
pub fn profit_factor(avg_profit: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        if avg_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        }
    } else {
        (avg_profit / avg_loss).min(PROFIT_FACTOR_CAP)
    }
}

pub fn consistency(avg_pnl: f64, volatility: f64) -> f64 {
    if volatility <= 0.0 {
        if avg_pnl > 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        (avg_pnl / volatility).tanh().max(0.0)
    }
}

pub fn importance(
    profit_factor: f64,
    avg_pnl: f64,
    volatility: f64,
    trig_rate: f64,
    sample_size: usize,
) -> f64 {
    if sample_size < MIN_SAMPLES {
        return 0.0;
    }
    let mut value = 0.5 * sigmoid(2.0 * (profit_factor - 1.5))
        + 0.3 * consistency(avg_pnl, volatility)
        + 0.2 * sweet_spot(trig_rate);
    if trig_rate < RARE_TRIGGER_RATE {
        value *= trig_rate / RARE_TRIGGER_RATE;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    #[test]
    fn sweet_spot_triangle() {
        assert_eq!(sweet_spot(0.0), 0.0);
        assert_approx(sweet_spot(0.025), 0.5, 1e-12);
        assert_eq!(sweet_spot(0.05), 1.0);
        assert_eq!(sweet_spot(0.15), 1.0);
        assert_approx(sweet_spot(0.325), 0.5, 1e-12);
        assert_eq!(sweet_spot(0.5), 0.0);
        assert_eq!(sweet_spot(0.9), 0.0);
    }

    #[test]
    fn too_few_samples_is_zero() {
        assert_eq!(importance(5.0, 0.02, 0.01, 0.1, 2), 0.0);
        assert!(importance(5.0, 0.02, 0.01, 0.1, 3) > 0.0);
    }

    #[test]
    fn rare_predicates_are_scaled() {
        let common = importance(3.0, 0.01, 0.02, 0.01, 10);
        let rare = importance(3.0, 0.01, 0.02, 0.005, 10);
        // sweet_spot(0.005) = 0.1 vs sweet_spot(0.01) = 0.2 before scaling.
        let unscaled_rare = common - 0.2 * 0.2 + 0.2 * 0.1;
        assert_approx(rare, unscaled_rare * 0.5, 1e-12);
    }

    #[test]
    fn profit_factor_caps() {
        assert_eq!(profit_factor(1.0, 0.0), PROFIT_FACTOR_CAP);
        assert_eq!(profit_factor(0.0, 0.0), 0.0);
        assert_eq!(profit_factor(100.0, 1.0), PROFIT_FACTOR_CAP);
        assert_approx(profit_factor(3.0, 2.0), 1.5, 1e-12);
    }

    #[test]
    fn zero_volatility_consistency() {
        assert_eq!(consistency(0.01, 0.0), 1.0);
        assert_eq!(consistency(-0.01, 0.0), 0.0);
        assert_eq!(consistency(-0.01, 0.02), 0.0);
    }

    #[test]
    fn importance_is_bounded() {
        for pf in [0.0, 1.0, 1.5, 4.0, 10.0] {
            for rate in [0.0, 0.001, 0.05, 0.3, 1.0] {
                let v = importance(pf, 0.05, 0.01, rate, 50);
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
