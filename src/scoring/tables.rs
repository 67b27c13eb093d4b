//! Fixed scoring configuration tables (spec §4.3, §4.4).
//!
//! Expressed as plain Rust data — const arrays and match arms over the
//! fixed `EventType` enum — so that bumping a weight requires a new
//! `model_version` rather than a config file edit.

use crate::models::EventType;

/// Per-event-type weight contributing to `baseSignalScore`.
pub fn signal_weight(event_type: EventType) -> f64 {
    match event_type {
        EventType::Probate => 28.0,
        EventType::PreForeclosure => 26.0,
        EventType::TaxLien => 22.0,
        EventType::Bankruptcy => 24.0,
        EventType::Inherited => 25.0,
        EventType::Divorce => 20.0,
        EventType::Fsbo => 16.0,
        EventType::CodeViolation => 14.0,
        EventType::Vacant => 12.0,
        EventType::Absentee => 10.0,
        EventType::WaterShutoff => 35.0,
    }
}

/// Severity (0-10) -> tier multiplier.
pub fn severity_multiplier(severity: u8) -> f64 {
    match severity {
        0..=2 => 1.0,
        3..=5 => 1.25,
        6..=8 => 1.5,
        _ => 1.8,
    }
}

/// `exp(-0.015 * min(days, 365))`.
pub fn recency_decay(days_since_event: i64) -> f64 {
    let capped = days_since_event.max(0).min(365) as f64;
    (-0.015 * capped).exp()
}

/// Largest applicable stacking bonus for a signal count.
pub fn stacking_bonus(signal_count: usize) -> f64 {
    match signal_count {
        0 | 1 => 0.0,
        2 => 6.0,
        3 => 14.0,
        4 => 22.0,
        _ => 30.0,
    }
}

pub const OWNER_FACTOR_ABSENTEE: f64 = 5.0;
pub const OWNER_FACTOR_CORPORATE: f64 = -3.0;
pub const OWNER_FACTOR_INHERITED: f64 = 8.0;
pub const OWNER_FACTOR_ELDERLY: f64 = 4.0;
pub const OWNER_FACTOR_OUT_OF_STATE: f64 = 6.0;

/// Feature weights for the predictive scorer; must sum to 1.0.
pub const FEATURE_WEIGHT_OWNER_AGE: f64 = 0.12;
pub const FEATURE_WEIGHT_EQUITY_BURN_RATE: f64 = 0.18;
pub const FEATURE_WEIGHT_ABSENTEE_DURATION: f64 = 0.10;
pub const FEATURE_WEIGHT_TAX_DELINQUENCY_TREND: f64 = 0.16;
pub const FEATURE_WEIGHT_LIFE_EVENT_PROBABILITY: f64 = 0.20;
pub const FEATURE_WEIGHT_SIGNAL_VELOCITY: f64 = 0.10;
pub const FEATURE_WEIGHT_OWNERSHIP_STRESS: f64 = 0.08;
pub const FEATURE_WEIGHT_MARKET_EXPOSURE: f64 = 0.06;

/// Base rate for the life-event-probability feature, per signal type.
pub fn life_event_base_rate(event_type: EventType) -> Option<f64> {
    match event_type {
        EventType::Probate => Some(0.035),
        EventType::Divorce => Some(0.025),
        EventType::Bankruptcy => Some(0.018),
        EventType::PreForeclosure => Some(0.022),
        EventType::TaxLien => Some(0.040),
        EventType::CodeViolation => Some(0.015),
        EventType::Inherited => Some(0.030),
        _ => None,
    }
}

/// Rounds half-away-from-zero, the convention used throughout the scorers.
pub fn round_half_away_from_zero(value: f64) -> f64 {
    value.round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_weights_sum_to_one() {
        let sum = FEATURE_WEIGHT_OWNER_AGE
            + FEATURE_WEIGHT_EQUITY_BURN_RATE
            + FEATURE_WEIGHT_ABSENTEE_DURATION
            + FEATURE_WEIGHT_TAX_DELINQUENCY_TREND
            + FEATURE_WEIGHT_LIFE_EVENT_PROBABILITY
            + FEATURE_WEIGHT_SIGNAL_VELOCITY
            + FEATURE_WEIGHT_OWNERSHIP_STRESS
            + FEATURE_WEIGHT_MARKET_EXPOSURE;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn severity_tiers_match_spec_bands() {
        assert_eq!(severity_multiplier(0), 1.0);
        assert_eq!(severity_multiplier(2), 1.0);
        assert_eq!(severity_multiplier(3), 1.25);
        assert_eq!(severity_multiplier(5), 1.25);
        assert_eq!(severity_multiplier(6), 1.5);
        assert_eq!(severity_multiplier(8), 1.5);
        assert_eq!(severity_multiplier(9), 1.8);
        assert_eq!(severity_multiplier(10), 1.8);
    }

    #[test]
    fn recency_decay_is_bounded_and_monotonic() {
        let fresh = recency_decay(0);
        let old = recency_decay(365);
        let beyond = recency_decay(1000);
        assert_eq!(fresh, 1.0);
        assert!(old < fresh);
        assert_eq!(old, beyond);
    }

    #[test]
    fn stacking_bonus_picks_largest_applicable_tier() {
        assert_eq!(stacking_bonus(0), 0.0);
        assert_eq!(stacking_bonus(1), 0.0);
        assert_eq!(stacking_bonus(2), 6.0);
        assert_eq!(stacking_bonus(3), 14.0);
        assert_eq!(stacking_bonus(4), 22.0);
        assert_eq!(stacking_bonus(7), 30.0);
    }
}
