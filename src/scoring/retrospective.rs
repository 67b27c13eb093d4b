//! Retrospective Scorer (C3), model version `"v2.0"`.
//!
//! A pure function over its inputs: no wall-clock, no PRNG, no
//! iteration-order dependence (P1). Everything here is total — the scorer
//! never raises, per spec.md §7's propagation policy.

use crate::models::{EventType, ScoreFactor};
use crate::scoring::tables::{
    recency_decay, round_half_away_from_zero, severity_multiplier, signal_weight, stacking_bonus,
    OWNER_FACTOR_ABSENTEE, OWNER_FACTOR_CORPORATE, OWNER_FACTOR_ELDERLY, OWNER_FACTOR_INHERITED,
    OWNER_FACTOR_OUT_OF_STATE,
};

pub const MODEL_VERSION: &str = "v2.0";

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerFlagsInput {
    pub absentee: bool,
    pub corporate: bool,
    pub inherited: bool,
    pub elderly: bool,
    pub out_of_state: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SignalInput {
    pub event_type: EventType,
    pub severity: u8,
    pub days_since_event: i64,
}

#[derive(Debug, Clone)]
pub struct RetrospectiveInput {
    pub signals: Vec<SignalInput>,
    pub owner_flags: OwnerFlagsInput,
    /// Percentage points, e.g. 72.0 for 72%.
    pub equity_percent: f64,
    pub comp_ratio: f64,
    /// In `[0, 1]`.
    pub historical_conversion_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatLabel {
    Fire,
    Hot,
    Warm,
    Cold,
}

impl HeatLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeatLabel::Fire => "fire",
            HeatLabel::Hot => "hot",
            HeatLabel::Warm => "warm",
            HeatLabel::Cold => "cold",
        }
    }

    fn from_composite(composite: u8) -> Self {
        if composite >= 85 {
            HeatLabel::Fire
        } else if composite >= 65 {
            HeatLabel::Hot
        } else if composite >= 40 {
            HeatLabel::Warm
        } else {
            HeatLabel::Cold
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrospectiveOutput {
    pub composite: u8,
    pub motivation: u8,
    pub deal: u8,
    pub label: HeatLabel,
    pub severity_multiplier: f64,
    pub recency_decay: f64,
    pub stacking_bonus: f64,
    pub owner_factor_score: f64,
    pub equity_factor_score: f64,
    pub ai_boost: f64,
    pub factors: Vec<ScoreFactor>,
}

fn owner_factor_total(flags: OwnerFlagsInput) -> f64 {
    let mut total = 0.0;
    if flags.absentee {
        total += OWNER_FACTOR_ABSENTEE;
    }
    if flags.corporate {
        total += OWNER_FACTOR_CORPORATE;
    }
    if flags.inherited {
        total += OWNER_FACTOR_INHERITED;
    }
    if flags.elderly {
        total += OWNER_FACTOR_ELDERLY;
    }
    if flags.out_of_state {
        total += OWNER_FACTOR_OUT_OF_STATE;
    }
    total
}

fn clamp_score(value: f64) -> u8 {
    round_half_away_from_zero(value).clamp(0.0, 100.0) as u8
}

/// Computes the v2.0 retrospective composite/motivation/deal scores.
pub fn score(input: &RetrospectiveInput) -> RetrospectiveOutput {
    let per_signal: Vec<(SignalInput, f64, f64, f64)> = input
        .signals
        .iter()
        .map(|s| {
            let sev_mult = severity_multiplier(s.severity);
            let recency = recency_decay(s.days_since_event);
            let contribution = signal_weight(s.event_type) * sev_mult * recency;
            (*s, sev_mult, recency, contribution)
        })
        .collect();

    let base_signal_score: f64 = per_signal.iter().map(|(_, _, _, c)| c).sum();

    let weighted_severity = per_signal
        .iter()
        .map(|(_, sev, _, _)| *sev)
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        })
        .unwrap_or(1.0);

    let weighted_recency = per_signal
        .iter()
        .map(|(_, _, rec, _)| *rec)
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        })
        .unwrap_or(1.0);

    let stacking = stacking_bonus(per_signal.len());
    let owner_factors = owner_factor_total(input.owner_flags);
    let equity_component = input.equity_percent * 0.15;
    let comp_component = input.comp_ratio * 0.10 * 100.0;
    let equity_factors = equity_component + comp_component;
    let ai_boost = round_half_away_from_zero(input.historical_conversion_rate * 15.0);

    let composite_raw = base_signal_score * weighted_severity * weighted_recency
        + stacking
        + owner_factors
        + equity_factors
        + ai_boost;
    let composite = clamp_score(composite_raw);

    let motivation = clamp_score(base_signal_score * weighted_recency * 1.2);
    let deal = clamp_score(equity_factors * 2.0 + ai_boost + stacking * 0.5);

    let mut factors = Vec::with_capacity(per_signal.len() + 5);
    for (signal, sev_mult, recency, contribution) in &per_signal {
        factors.push(ScoreFactor {
            name: signal.event_type.as_str().to_string(),
            value: signal_weight(signal.event_type),
            contribution: (contribution * 10.0).round() / 10.0,
        });
        let _ = sev_mult;
        let _ = recency;
    }
    if stacking != 0.0 {
        factors.push(ScoreFactor {
            name: "stacking_bonus".to_string(),
            value: stacking,
            contribution: stacking,
        });
    }
    if owner_factors != 0.0 {
        factors.push(ScoreFactor {
            name: "owner_factors".to_string(),
            value: owner_factors,
            contribution: owner_factors,
        });
    }
    if equity_component != 0.0 {
        factors.push(ScoreFactor {
            name: "equity".to_string(),
            value: input.equity_percent,
            contribution: equity_component,
        });
    }
    if comp_component != 0.0 {
        factors.push(ScoreFactor {
            name: "comp_ratio".to_string(),
            value: input.comp_ratio,
            contribution: comp_component,
        });
    }
    if ai_boost != 0.0 {
        factors.push(ScoreFactor {
            name: "ai_boost".to_string(),
            value: input.historical_conversion_rate,
            contribution: ai_boost,
        });
    }

    RetrospectiveOutput {
        composite,
        motivation,
        deal,
        label: HeatLabel::from_composite(composite),
        severity_multiplier: weighted_severity,
        recency_decay: weighted_recency,
        stacking_bonus: stacking,
        owner_factor_score: owner_factors,
        equity_factor_score: equity_factors,
        ai_boost,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(event_type: EventType, severity: u8, days: i64) -> SignalInput {
        SignalInput {
            event_type,
            severity,
            days_since_event: days,
        }
    }

    /// Scenario 1 (spec.md §8): empty signals, the detector's default
    /// `absentee` severity-3 fallback, equity 50%, compRatio 1.1,
    /// historicalConversionRate 0.5. Expected composite in [25, 32].
    #[test]
    fn scenario_empty_signals_baseline() {
        let input = RetrospectiveInput {
            signals: vec![signal(EventType::Absentee, 3, 180)],
            owner_flags: OwnerFlagsInput::default(),
            equity_percent: 50.0,
            comp_ratio: 1.1,
            historical_conversion_rate: 0.5,
        };
        let out = score(&input);
        assert!(
            (25..=32).contains(&out.composite),
            "composite {} out of expected range",
            out.composite
        );
    }

    /// Scenario 2: probate + vacant, high equity, inherited+elderly owner.
    #[test]
    fn scenario_probate_vacant_high_equity_is_fire() {
        let input = RetrospectiveInput {
            signals: vec![signal(EventType::Probate, 9, 30), signal(EventType::Vacant, 6, 60)],
            owner_flags: OwnerFlagsInput {
                inherited: true,
                elderly: true,
                ..Default::default()
            },
            equity_percent: 72.0,
            comp_ratio: 1.35,
            historical_conversion_rate: 0.82,
        };
        let out = score(&input);
        assert!(out.composite >= 85, "composite {} expected >= 85", out.composite);
        assert_eq!(out.label, HeatLabel::Fire);
        assert!(out.motivation >= 80);
        assert_eq!(out.stacking_bonus, 6.0);
        assert_eq!(out.ai_boost, 12.0);
    }

    #[test]
    fn no_signals_default_to_neutral_multipliers() {
        let input = RetrospectiveInput {
            signals: vec![],
            owner_flags: OwnerFlagsInput::default(),
            equity_percent: 0.0,
            comp_ratio: 0.0,
            historical_conversion_rate: 0.0,
        };
        let out = score(&input);
        assert_eq!(out.severity_multiplier, 1.0);
        assert_eq!(out.recency_decay, 1.0);
        assert_eq!(out.composite, 0);
        assert!(out.factors.is_empty());
    }

    #[test]
    fn composite_monotonic_in_signal_count() {
        let base = RetrospectiveInput {
            signals: vec![signal(EventType::Vacant, 3, 90)],
            owner_flags: OwnerFlagsInput::default(),
            equity_percent: 10.0,
            comp_ratio: 1.0,
            historical_conversion_rate: 0.0,
        };
        let mut with_more = base.clone();
        with_more.signals.push(signal(EventType::TaxLien, 6, 60));
        assert!(score(&with_more).composite >= score(&base).composite);
    }

    #[test]
    fn composite_non_increasing_when_recency_doubles() {
        let fresh = RetrospectiveInput {
            signals: vec![signal(EventType::PreForeclosure, 9, 20)],
            owner_flags: OwnerFlagsInput::default(),
            equity_percent: 0.0,
            comp_ratio: 0.0,
            historical_conversion_rate: 0.0,
        };
        let mut stale = fresh.clone();
        stale.signals[0].days_since_event *= 2;
        assert!(score(&stale).composite <= score(&fresh).composite);
    }

    #[test]
    fn scores_always_clamped_to_0_100() {
        let extreme = RetrospectiveInput {
            signals: vec![signal(EventType::WaterShutoff, 10, 0); 10],
            owner_flags: OwnerFlagsInput {
                absentee: true,
                inherited: true,
                elderly: true,
                out_of_state: true,
                corporate: false,
            },
            equity_percent: 100.0,
            comp_ratio: 5.0,
            historical_conversion_rate: 1.0,
        };
        let out = score(&extreme);
        assert!(out.composite <= 100);
        assert!(out.motivation <= 100);
        assert!(out.deal <= 100);
    }
}
