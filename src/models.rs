//! Domain model for the distress-lead intelligence core.
//!
//! `Property` is the golden record, `DistressEvent`/`ScoringRecord`/
//! `Prediction`/`EventLog` are append-only, and `Lead` is the one mutable
//! workflow envelope the lifecycle manager owns.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Milliseconds since the Unix epoch, UTC.
pub type Millis = i64;

pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

/// The eleven distress indicators the normalizer can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Probate,
    PreForeclosure,
    TaxLien,
    CodeViolation,
    Vacant,
    Divorce,
    Bankruptcy,
    Fsbo,
    Absentee,
    Inherited,
    WaterShutoff,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Probate => "probate",
            EventType::PreForeclosure => "pre_foreclosure",
            EventType::TaxLien => "tax_lien",
            EventType::CodeViolation => "code_violation",
            EventType::Vacant => "vacant",
            EventType::Divorce => "divorce",
            EventType::Bankruptcy => "bankruptcy",
            EventType::Fsbo => "fsbo",
            EventType::Absentee => "absentee",
            EventType::Inherited => "inherited",
            EventType::WaterShutoff => "water_shutoff",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "probate" => Some(EventType::Probate),
            "pre_foreclosure" => Some(EventType::PreForeclosure),
            "tax_lien" => Some(EventType::TaxLien),
            "code_violation" => Some(EventType::CodeViolation),
            "vacant" => Some(EventType::Vacant),
            "divorce" => Some(EventType::Divorce),
            "bankruptcy" => Some(EventType::Bankruptcy),
            "fsbo" => Some(EventType::Fsbo),
            "absentee" => Some(EventType::Absentee),
            "inherited" => Some(EventType::Inherited),
            "water_shutoff" => Some(EventType::WaterShutoff),
            _ => None,
        }
    }
}

/// Owner flags read by the scorers. Additional keys (e.g. the spatial
/// `lat`/`lng` carried through from the vendor record) may be present in
/// the underlying bag but are not read by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerFlags {
    #[serde(flatten)]
    pub raw: serde_json::Map<String, Json>,
}

impl OwnerFlags {
    pub fn bool_flag(&self, key: &str) -> bool {
        self.raw.get(key).map(json_truthy).unwrap_or(false)
    }

    pub fn absentee(&self) -> bool {
        self.bool_flag("absentee")
    }
    pub fn corporate(&self) -> bool {
        self.bool_flag("corporate")
    }
    pub fn inherited(&self) -> bool {
        self.bool_flag("inherited")
    }
    pub fn elderly(&self) -> bool {
        self.bool_flag("elderly")
    }
    pub fn out_of_state(&self) -> bool {
        self.bool_flag("outOfState")
    }

    pub fn set(&mut self, key: &str, value: Json) {
        self.raw.insert(key.to_string(), value);
    }
}

/// Boolean coercion rule shared by the normalizer and owner-flag readers:
/// `"1"`, `"Yes"`, `"True"`/`"true"`, the integer 1, and `true` are truthy.
pub fn json_truthy(value: &Json) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        Json::String(s) => matches!(s.as_str(), "1" | "Yes" | "True" | "true"),
        _ => false,
    }
}

/// The golden record. Identity is `(apn, county)`; upserts never create a
/// second row for the same pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub apn: String,
    pub county: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub owner_name: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_email: Option<String>,
    pub estimated_value: Option<i64>,
    pub equity_percent: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub sqft: Option<i32>,
    pub year_built: Option<i32>,
    pub lot_size: Option<f64>,
    pub property_type: Option<String>,
    pub owner_flags: OwnerFlags,
    pub created_at: Millis,
    pub updated_at: Millis,
}

/// A `Property` shape before an id/timestamps have been assigned — what the
/// normalizer (C1) produces from a vendor record.
#[derive(Debug, Clone, Default)]
pub struct NewProperty {
    pub apn: String,
    pub county: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub owner_name: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_email: Option<String>,
    pub estimated_value: Option<i64>,
    pub equity_percent: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<f64>,
    pub sqft: Option<i32>,
    pub year_built: Option<i32>,
    pub lot_size: Option<f64>,
    pub property_type: Option<String>,
    pub owner_flags: OwnerFlags,
}

/// A detected distress indicator, before fingerprinting/persistence.
#[derive(Debug, Clone)]
pub struct DistressSignal {
    pub event_type: EventType,
    pub severity: u8,
    pub days_since_event: i64,
    pub source: String,
    pub raw_data: Json,
    pub confidence: Option<f64>,
}

/// The append-only persisted form of a `DistressSignal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistressEvent {
    pub id: Uuid,
    pub property_id: Uuid,
    pub event_type: EventType,
    pub source: String,
    pub severity: u8,
    pub fingerprint: String,
    pub raw_data: Json,
    pub confidence: Option<f64>,
    pub created_at: Millis,
}

/// One factor in a `factors` attribution list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub name: String,
    pub value: f64,
    pub contribution: f64,
}

/// A v2.0 retrospective score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRecord {
    pub id: Uuid,
    pub property_id: Uuid,
    pub model_version: String,
    pub composite_score: u8,
    pub motivation_score: u8,
    pub deal_score: u8,
    pub severity_multiplier: f64,
    pub recency_decay: f64,
    pub stacking_bonus: f64,
    pub owner_factor_score: f64,
    pub equity_factor_score: f64,
    pub ai_boost: f64,
    pub factors: Vec<ScoreFactor>,
    pub created_at: Millis,
}

/// A pred-v2.0 forward-looking prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub property_id: Uuid,
    pub model_version: String,
    pub predictive_score: u8,
    pub days_until_distress: u32,
    pub confidence: u8,
    pub owner_age_inference: Option<f64>,
    pub equity_burn_rate: Option<f64>,
    pub absentee_duration_days: Option<i64>,
    pub tax_delinquency_trend: Option<f64>,
    pub life_event_probability: Option<f64>,
    pub features: Json,
    pub factors: Vec<ScoreFactor>,
    pub created_at: Millis,
}

/// The fixed lead workflow state machine (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Prospect,
    Lead,
    MyLead,
    Negotiation,
    Disposition,
    Nurture,
    Dead,
    Closed,
}

impl LeadStatus {
    /// Active statuses are the ones the "at most one active lead per
    /// property" invariant (P8) is scoped to.
    pub fn is_active(&self) -> bool {
        matches!(self, LeadStatus::Prospect | LeadStatus::Lead | LeadStatus::Negotiation)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::Dead | LeadStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Prospect => "prospect",
            LeadStatus::Lead => "lead",
            LeadStatus::MyLead => "my_lead",
            LeadStatus::Negotiation => "negotiation",
            LeadStatus::Disposition => "disposition",
            LeadStatus::Nurture => "nurture",
            LeadStatus::Dead => "dead",
            LeadStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "prospect" => Some(LeadStatus::Prospect),
            "lead" => Some(LeadStatus::Lead),
            "my_lead" => Some(LeadStatus::MyLead),
            "negotiation" => Some(LeadStatus::Negotiation),
            "disposition" => Some(LeadStatus::Disposition),
            "nurture" => Some(LeadStatus::Nurture),
            "dead" => Some(LeadStatus::Dead),
            "closed" => Some(LeadStatus::Closed),
            _ => None,
        }
    }
}

/// The mutable workflow envelope. Only the lifecycle manager (C7) writes
/// these rows, and only via optimistic concurrency on `lock_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub property_id: Uuid,
    pub status: LeadStatus,
    pub assigned_to: Option<String>,
    pub priority: u8,
    pub source: String,
    pub tags: BTreeSet<String>,
    pub notes: Option<String>,
    pub claimed_at: Option<Millis>,
    pub claim_expires_at: Option<Millis>,
    pub promoted_at: Millis,
    pub last_contact_at: Option<Millis>,
    pub follow_up_date: Option<Millis>,
    pub lock_version: u32,
    pub created_at: Millis,
    pub updated_at: Millis,
}

/// An append-only audit trail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: Json,
    pub created_at: Millis,
}

impl EventLog {
    /// The actor id used for system-initiated events (scheduled ingests).
    pub fn system_actor() -> Uuid {
        Uuid::nil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_truthy_matches_coercion_rule() {
        assert!(json_truthy(&Json::Bool(true)));
        assert!(json_truthy(&Json::String("1".into())));
        assert!(json_truthy(&Json::String("Yes".into())));
        assert!(json_truthy(&Json::String("True".into())));
        assert!(json_truthy(&Json::String("true".into())));
        assert!(json_truthy(&serde_json::json!(1)));
        assert!(!json_truthy(&Json::String("0".into())));
        assert!(!json_truthy(&Json::String("no".into())));
        assert!(!json_truthy(&Json::Null));
    }

    #[test]
    fn owner_flags_read_known_keys() {
        let mut flags = OwnerFlags::default();
        flags.set("absentee", serde_json::json!(true));
        flags.set("corporate", serde_json::json!("false"));
        assert!(flags.absentee());
        assert!(!flags.corporate());
        assert!(!flags.elderly());
    }

    #[test]
    fn lead_status_active_set_matches_spec() {
        assert!(LeadStatus::Prospect.is_active());
        assert!(LeadStatus::Lead.is_active());
        assert!(LeadStatus::Negotiation.is_active());
        assert!(!LeadStatus::MyLead.is_active());
        assert!(!LeadStatus::Disposition.is_active());
        assert!(LeadStatus::Dead.is_terminal());
        assert!(LeadStatus::Closed.is_terminal());
        assert!(!LeadStatus::Nurture.is_terminal());
    }

    #[test]
    fn event_type_round_trips_through_str() {
        for et in [
            EventType::Probate,
            EventType::PreForeclosure,
            EventType::TaxLien,
            EventType::CodeViolation,
            EventType::Vacant,
            EventType::Divorce,
            EventType::Bankruptcy,
            EventType::Fsbo,
            EventType::Absentee,
            EventType::Inherited,
            EventType::WaterShutoff,
        ] {
            assert_eq!(EventType::from_str(et.as_str()), Some(et));
        }
    }
}
