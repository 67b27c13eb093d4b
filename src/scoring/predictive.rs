//! Predictive Scorer (C4), model version `"pred-v2.0"`.
//!
//! Forward-looking distress probability and time-to-distress, built from
//! eight weighted features. Like the retrospective scorer this is a pure,
//! total function: it never raises and never reads the clock.

use crate::models::{EventType, ScoreFactor};
use crate::scoring::tables::{
    life_event_base_rate, round_half_away_from_zero, FEATURE_WEIGHT_ABSENTEE_DURATION,
    FEATURE_WEIGHT_EQUITY_BURN_RATE, FEATURE_WEIGHT_LIFE_EVENT_PROBABILITY,
    FEATURE_WEIGHT_MARKET_EXPOSURE, FEATURE_WEIGHT_OWNERSHIP_STRESS, FEATURE_WEIGHT_OWNER_AGE,
    FEATURE_WEIGHT_SIGNAL_VELOCITY, FEATURE_WEIGHT_TAX_DELINQUENCY_TREND,
};

pub const MODEL_VERSION: &str = "pred-v2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeclosureStage {
    Notice,
    AuctionOrSale,
}

#[derive(Debug, Clone, Copy)]
pub struct ActiveSignal {
    pub event_type: EventType,
    pub severity: u8,
    pub days_since_event: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PredictiveInput {
    pub owner_age: Option<f64>,
    pub ownership_years: Option<f64>,
    pub owner_is_corporate: bool,
    pub current_equity_percent: Option<f64>,
    pub previous_equity_percent: Option<f64>,
    pub months_between_equity_readings: Option<f64>,
    pub loan_balance: Option<f64>,
    pub estimated_value: Option<f64>,
    pub last_sale_days_ago: Option<i64>,
    pub last_sale_price: Option<f64>,
    pub absentee: bool,
    pub absentee_since_days_ago: Option<i64>,
    pub vacant: bool,
    pub current_tax_delinquent_amount: Option<f64>,
    pub previous_tax_delinquent_amount: Option<f64>,
    pub tax_assessed_value: Option<f64>,
    pub signals: Vec<ActiveSignal>,
    /// Past composite scores, oldest first.
    pub historical_scores: Vec<f64>,
    pub free_and_clear: bool,
    pub foreclosure_stage: Option<ForeclosureStage>,
    pub default_amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistressLabel {
    Imminent,
    Likely,
    Possible,
    Unlikely,
}

impl DistressLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistressLabel::Imminent => "imminent",
            DistressLabel::Likely => "likely",
            DistressLabel::Possible => "possible",
            DistressLabel::Unlikely => "unlikely",
        }
    }

    fn from_score(score: u8) -> Self {
        if score >= 80 {
            DistressLabel::Imminent
        } else if score >= 55 {
            DistressLabel::Likely
        } else if score >= 30 {
            DistressLabel::Possible
        } else {
            DistressLabel::Unlikely
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictiveOutput {
    pub predictive_score: u8,
    pub days_until_distress: u32,
    pub confidence: u8,
    pub label: DistressLabel,
    pub owner_age_inference: Option<f64>,
    pub equity_burn_rate: Option<f64>,
    pub absentee_duration_days: Option<i64>,
    pub tax_delinquency_trend: Option<f64>,
    pub life_event_probability: Option<f64>,
    pub factors: Vec<ScoreFactor>,
}

fn owner_age_inference(input: &PredictiveInput) -> Option<f64> {
    if let Some(age) = input.owner_age {
        return Some(age);
    }
    if input.owner_is_corporate {
        return None;
    }
    input.ownership_years.map(|years| (33.0 + years).clamp(25.0, 100.0))
}

fn owner_age_sub_score(age: Option<f64>) -> f64 {
    match age {
        None => 40.0,
        Some(a) if a >= 85.0 => 95.0,
        Some(a) if a >= 75.0 => 82.0,
        Some(a) if a >= 65.0 => 65.0,
        Some(a) if a >= 55.0 => 48.0,
        Some(a) if a >= 45.0 => 35.0,
        Some(a) if a >= 35.0 => 22.0,
        Some(_) => 12.0,
    }
}

fn equity_burn_rate(input: &PredictiveInput) -> Option<f64> {
    if let (Some(cur), Some(prev), Some(months)) = (
        input.current_equity_percent,
        input.previous_equity_percent,
        input.months_between_equity_readings,
    ) {
        if months > 0.0 {
            let rate = ((prev - cur) / months * 12.0) / 100.0;
            return Some(rate.max(0.0));
        }
    }
    if let (Some(loan), Some(value), Some(days)) =
        (input.loan_balance, input.estimated_value, input.last_sale_days_ago)
    {
        if value > 0.0 && days > 0 {
            let years = (days as f64 / 365.0).max(1.0);
            let implied_equity_pct = (value - loan) / value * 100.0;
            let rate = (implied_equity_pct / years) / 100.0;
            return Some(rate.max(0.0));
        }
    }
    None
}

fn equity_burn_sub_score(rate: Option<f64>) -> f64 {
    match rate {
        None => 20.0,
        Some(r) if r >= 0.20 => 95.0,
        Some(r) if r >= 0.15 => 80.0,
        Some(r) if r >= 0.10 => 65.0,
        Some(r) if r >= 0.05 => 45.0,
        Some(r) if r >= 0.02 => 25.0,
        Some(_) => 10.0,
    }
}

fn absentee_duration_days(input: &PredictiveInput) -> Option<i64> {
    input.absentee_since_days_ago.or(input.last_sale_days_ago)
}

fn absentee_duration_sub_score(input: &PredictiveInput, days: Option<i64>) -> f64 {
    match days {
        Some(d) => {
            let base = (d as f64 / 365.0) * 30.0 + if input.vacant { 25.0 } else { 0.0 };
            base.min(100.0)
        }
        None if input.absentee => 35.0,
        None => 5.0,
    }
}

fn tax_delinquency_trend(input: &PredictiveInput) -> Option<f64> {
    if let (Some(prev), Some(cur)) =
        (input.previous_tax_delinquent_amount, input.current_tax_delinquent_amount)
    {
        if prev > 0.0 {
            return Some((cur - prev) / prev);
        }
    }
    if let Some(cur) = input.current_tax_delinquent_amount {
        let base = input.tax_assessed_value.or(input.estimated_value);
        if let Some(base) = base {
            if base > 0.0 {
                return Some(cur / base);
            }
        }
    }
    None
}

fn tax_delinquency_sub_score(trend: Option<f64>) -> f64 {
    match trend {
        None => 10.0,
        Some(t) if t >= 0.50 => 95.0,
        Some(t) if t >= 0.30 => 80.0,
        Some(t) if t >= 0.15 => 60.0,
        Some(t) if t >= 0.05 => 40.0,
        Some(t) if t > 0.0 => 25.0,
        Some(_) => 10.0,
    }
}

fn life_event_probability(input: &PredictiveInput, inferred_age: Option<f64>) -> f64 {
    let signal_sum: f64 = input
        .signals
        .iter()
        .filter_map(|s| {
            let base = life_event_base_rate(s.event_type)?;
            let recency_mult = if s.days_since_event < 90 {
                2.0
            } else if s.days_since_event < 180 {
                1.5
            } else {
                1.0
            };
            let severity_mult = if s.severity >= 8 {
                1.8
            } else if s.severity >= 5 {
                1.3
            } else {
                1.0
            };
            Some(base * recency_mult * severity_mult)
        })
        .sum();

    let stacking_mult = match input.signals.len() {
        0 | 1 => 1.0,
        2 => 1.3,
        3 => 1.6,
        _ => 2.0,
    };

    let age_kicker = match inferred_age {
        Some(a) if a >= 75.0 => 0.12,
        Some(a) if a >= 65.0 => 0.06,
        Some(a) if a >= 55.0 => 0.03,
        _ => 0.0,
    };

    let foreclosure_kicker = match input.foreclosure_stage {
        Some(ForeclosureStage::AuctionOrSale) => 0.25,
        Some(ForeclosureStage::Notice) => 0.15,
        None => 0.08,
    };

    let default_pressure = match (input.default_amount, input.estimated_value) {
        (Some(amount), Some(value)) if value > 0.0 => (amount / value * 2.0).min(0.20),
        _ => 0.0,
    };

    (signal_sum * stacking_mult + age_kicker + foreclosure_kicker + default_pressure).clamp(0.0, 1.0)
}

fn life_event_sub_score(prob: f64) -> f64 {
    (round_half_away_from_zero(prob * 200.0)).min(100.0)
}

fn signal_velocity_sub_score(input: &PredictiveInput) -> f64 {
    let total = input.signals.len().max(1) as f64;
    let recent_count = input.signals.iter().filter(|s| s.days_since_event <= 90).count();
    let ratio = recent_count as f64 / total;
    let score_trend = if input.historical_scores.len() >= 2 {
        let first = input.historical_scores[0];
        let last = *input.historical_scores.last().unwrap();
        (last - first) / 100.0
    } else {
        0.0
    };
    let velocity = ratio * 3.0 + recent_count as f64 * 0.8 + score_trend * 2.0;
    (round_half_away_from_zero(velocity * 20.0)).clamp(0.0, 100.0)
}

fn ownership_stress_sub_score(input: &PredictiveInput) -> f64 {
    let mut stress = 0.0;
    if let Some(years) = input.ownership_years {
        if years > 20.0 {
            stress += 20.0;
        } else if years > 10.0 {
            stress += 10.0;
        }
    }
    if let Some(equity) = input.current_equity_percent {
        if equity < 10.0 {
            stress += 35.0;
        } else if equity < 20.0 {
            stress += 20.0;
        } else if equity < 30.0 {
            stress += 10.0;
        }
    }
    if input.vacant && input.absentee {
        stress += 25.0;
    } else if input.vacant {
        stress += 15.0;
    }
    let delinquent = input.current_tax_delinquent_amount.unwrap_or(0.0) > 0.0;
    if input.free_and_clear && delinquent {
        stress += 30.0;
    }
    stress.clamp(0.0, 100.0)
}

fn market_exposure_sub_score(input: &PredictiveInput) -> f64 {
    let mut exposure = 0.0;
    if let Some(value) = input.estimated_value {
        if value < 150_000.0 {
            exposure += 25.0;
        } else if value < 250_000.0 {
            exposure += 15.0;
        } else if value < 400_000.0 {
            exposure += 8.0;
        }
    }
    if let Some(days) = input.last_sale_days_ago {
        let years = days as f64 / 365.0;
        if years > 15.0 {
            exposure += 25.0;
        } else if years > 10.0 {
            exposure += 15.0;
        } else if years > 5.0 {
            exposure += 8.0;
        }
    }
    let active = input.signals.len();
    if active >= 3 {
        exposure += 20.0;
    } else if active >= 2 {
        exposure += 10.0;
    }
    exposure.clamp(0.0, 100.0)
}

fn days_until_distress(predictive_score: u8, input: &PredictiveInput) -> u32 {
    let base: f64 = match predictive_score {
        s if s >= 90 => 14.0,
        s if s >= 80 => 30.0,
        s if s >= 70 => 60.0,
        s if s >= 60 => 90.0,
        s if s >= 50 => 120.0,
        s if s >= 40 => 180.0,
        s if s >= 25 => 270.0,
        _ => 365.0,
    };

    let stage_tightened = match input.foreclosure_stage {
        Some(ForeclosureStage::AuctionOrSale) => base.min(14.0),
        Some(ForeclosureStage::Notice) => base.min(45.0),
        None => base,
    };

    let very_recent = input.signals.iter().filter(|s| s.days_since_event < 30).count();
    let recency_tightened = if very_recent >= 2 {
        stage_tightened * 0.6
    } else if very_recent >= 1 {
        stage_tightened * 0.8
    } else {
        stage_tightened
    };

    recency_tightened.round().max(7.0) as u32
}

fn confidence(input: &PredictiveInput, owner_age: Option<f64>) -> u8 {
    let mut points = 0.0;
    if owner_age.is_some() {
        points += 12.0;
    }
    if input.current_equity_percent.is_some() {
        points += 10.0;
    }
    if input.previous_equity_percent.is_some() {
        points += 8.0;
    }
    if input.estimated_value.is_some() {
        points += 10.0;
    }
    if input.loan_balance.is_some() {
        points += 8.0;
    }
    if input.last_sale_days_ago.is_some() {
        points += 6.0;
    }
    if input.last_sale_price.is_some() {
        points += 6.0;
    }
    if input.absentee {
        points += 4.0;
    }
    if input.current_tax_delinquent_amount.is_some() {
        points += 8.0;
    }
    if !input.signals.is_empty() {
        points += 10.0;
    }
    if input.signals.len() >= 2 {
        points += 6.0;
    }
    if input.historical_scores.len() >= 2 {
        points += 8.0;
    }
    if input.foreclosure_stage.is_some() {
        points += 4.0;
    }
    round_half_away_from_zero(points).clamp(15.0, 98.0) as u8
}

/// Computes the pred-v2.0 predictive score and its forward-looking
/// derivatives (days-until-distress, confidence).
pub fn score(input: &PredictiveInput) -> PredictiveOutput {
    let owner_age = owner_age_inference(input);
    let burn_rate = equity_burn_rate(input);
    let absentee_days = absentee_duration_days(input);
    let tax_trend = tax_delinquency_trend(input);
    let life_event_prob = life_event_probability(input, owner_age);

    let owner_age_sub = owner_age_sub_score(owner_age);
    let equity_burn_sub = equity_burn_sub_score(burn_rate);
    let absentee_sub = absentee_duration_sub_score(input, absentee_days);
    let tax_sub = tax_delinquency_sub_score(tax_trend);
    let life_event_sub = life_event_sub_score(life_event_prob);
    let velocity_sub = signal_velocity_sub_score(input);
    let ownership_sub = ownership_stress_sub_score(input);
    let market_sub = market_exposure_sub_score(input);

    let weighted_sum = owner_age_sub * FEATURE_WEIGHT_OWNER_AGE
        + equity_burn_sub * FEATURE_WEIGHT_EQUITY_BURN_RATE
        + absentee_sub * FEATURE_WEIGHT_ABSENTEE_DURATION
        + tax_sub * FEATURE_WEIGHT_TAX_DELINQUENCY_TREND
        + life_event_sub * FEATURE_WEIGHT_LIFE_EVENT_PROBABILITY
        + velocity_sub * FEATURE_WEIGHT_SIGNAL_VELOCITY
        + ownership_sub * FEATURE_WEIGHT_OWNERSHIP_STRESS
        + market_sub * FEATURE_WEIGHT_MARKET_EXPOSURE;

    let predictive_score = round_half_away_from_zero(weighted_sum).clamp(0.0, 100.0) as u8;

    let factors = vec![
        ScoreFactor {
            name: "owner_age".to_string(),
            value: owner_age_sub,
            contribution: owner_age_sub * FEATURE_WEIGHT_OWNER_AGE,
        },
        ScoreFactor {
            name: "equity_burn_rate".to_string(),
            value: equity_burn_sub,
            contribution: equity_burn_sub * FEATURE_WEIGHT_EQUITY_BURN_RATE,
        },
        ScoreFactor {
            name: "absentee_duration".to_string(),
            value: absentee_sub,
            contribution: absentee_sub * FEATURE_WEIGHT_ABSENTEE_DURATION,
        },
        ScoreFactor {
            name: "tax_delinquency_trend".to_string(),
            value: tax_sub,
            contribution: tax_sub * FEATURE_WEIGHT_TAX_DELINQUENCY_TREND,
        },
        ScoreFactor {
            name: "life_event_probability".to_string(),
            value: life_event_sub,
            contribution: life_event_sub * FEATURE_WEIGHT_LIFE_EVENT_PROBABILITY,
        },
        ScoreFactor {
            name: "signal_velocity".to_string(),
            value: velocity_sub,
            contribution: velocity_sub * FEATURE_WEIGHT_SIGNAL_VELOCITY,
        },
        ScoreFactor {
            name: "ownership_stress".to_string(),
            value: ownership_sub,
            contribution: ownership_sub * FEATURE_WEIGHT_OWNERSHIP_STRESS,
        },
        ScoreFactor {
            name: "market_exposure".to_string(),
            value: market_sub,
            contribution: market_sub * FEATURE_WEIGHT_MARKET_EXPOSURE,
        },
    ];

    PredictiveOutput {
        predictive_score,
        days_until_distress: days_until_distress(predictive_score, input),
        confidence: confidence(input, owner_age),
        label: DistressLabel::from_score(predictive_score),
        owner_age_inference: owner_age,
        equity_burn_rate: burn_rate,
        absentee_duration_days: absentee_days,
        tax_delinquency_trend: tax_trend,
        life_event_probability: Some(life_event_prob),
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_in_range_and_unlikely() {
        let input = PredictiveInput::default();
        let out = score(&input);
        assert!(out.predictive_score <= 100);
        assert!(out.days_until_distress >= 7);
        assert!((15..=98).contains(&out.confidence));
        assert_eq!(out.label, DistressLabel::Unlikely);
    }

    #[test]
    fn confidence_rises_with_more_known_data_points() {
        let sparse = PredictiveInput::default();
        let mut rich = PredictiveInput::default();
        rich.owner_age = Some(70.0);
        rich.current_equity_percent = Some(40.0);
        rich.previous_equity_percent = Some(55.0);
        rich.estimated_value = Some(300_000.0);
        rich.loan_balance = Some(100_000.0);
        rich.last_sale_days_ago = Some(3000);
        rich.last_sale_price = Some(200_000.0);
        rich.absentee = true;
        rich.current_tax_delinquent_amount = Some(5_000.0);
        rich.signals = vec![
            ActiveSignal { event_type: EventType::Probate, severity: 9, days_since_event: 10 },
            ActiveSignal { event_type: EventType::Vacant, severity: 5, days_since_event: 40 },
        ];
        rich.historical_scores = vec![40.0, 55.0, 70.0];
        rich.foreclosure_stage = Some(ForeclosureStage::Notice);

        assert!(confidence(&rich, owner_age_inference(&rich)) > confidence(&sparse, None));
    }

    #[test]
    fn days_until_distress_tightens_near_auction() {
        let mut input = PredictiveInput::default();
        input.foreclosure_stage = Some(ForeclosureStage::AuctionOrSale);
        assert!(days_until_distress(95, &input) <= 14);
    }

    #[test]
    fn days_until_distress_never_below_minimum() {
        let mut input = PredictiveInput::default();
        input.foreclosure_stage = Some(ForeclosureStage::AuctionOrSale);
        input.signals = vec![
            ActiveSignal { event_type: EventType::Probate, severity: 9, days_since_event: 5 },
            ActiveSignal { event_type: EventType::TaxLien, severity: 9, days_since_event: 2 },
        ];
        assert!(days_until_distress(10, &input) >= 7);
    }

    #[test]
    fn owner_age_prefers_explicit_over_derived() {
        let mut input = PredictiveInput::default();
        input.owner_age = Some(50.0);
        input.ownership_years = Some(40.0);
        assert_eq!(owner_age_inference(&input), Some(50.0));
    }

    #[test]
    fn owner_age_derives_from_ownership_years_when_absent() {
        let mut input = PredictiveInput::default();
        input.ownership_years = Some(10.0);
        assert_eq!(owner_age_inference(&input), Some(43.0));
    }

    #[test]
    fn corporate_owner_has_no_age_inference() {
        let mut input = PredictiveInput::default();
        input.ownership_years = Some(10.0);
        input.owner_is_corporate = true;
        assert_eq!(owner_age_inference(&input), None);
    }
}
