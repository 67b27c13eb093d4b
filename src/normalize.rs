//! Signal Normalizer (C1).
//!
//! Input is an opaque vendor record (string/number/boolean bag); output is
//! a canonical `NewProperty` plus the set of `DistressSignal`s the fixed
//! decision table detects. Pure and total — unparseable values become
//! `None`, never an error.

use chrono::Utc;
use serde_json::{Map, Value as Json};

use crate::models::{json_truthy, DistressSignal, EventType, NewProperty, OwnerFlags};

const DAYS_FRESH: i64 = 30;
const DAYS_MID: i64 = 60;
const DAYS_ABSENTEE_OR_LIEN: i64 = 90;
const DAYS_DEFAULT: i64 = 180;

pub(crate) fn get<'a>(map: &'a Map<String, Json>, keys: &[&str]) -> Option<&'a Json> {
    keys.iter().find_map(|k| map.get(*k))
}

fn coerce_numeric(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, '$' | ',' | '%')).collect();
            let parsed: f64 = cleaned.trim().parse().ok()?;
            (!parsed.is_nan()).then_some(parsed)
        }
        _ => None,
    }
}

fn coerce_integer(value: &Json) -> Option<i64> {
    coerce_numeric(value).map(|f| f.round() as i64)
}

fn coerce_bool(value: &Json) -> bool {
    json_truthy(value)
}

pub(crate) fn get_str(map: &Map<String, Json>, keys: &[&str]) -> Option<String> {
    get(map, keys).and_then(|v| match v {
        Json::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn get_num(map: &Map<String, Json>, keys: &[&str]) -> Option<f64> {
    get(map, keys).and_then(coerce_numeric)
}

pub(crate) fn get_int(map: &Map<String, Json>, keys: &[&str]) -> Option<i32> {
    get(map, keys).and_then(coerce_integer).map(|i| i as i32)
}

pub(crate) fn get_bool(map: &Map<String, Json>, keys: &[&str]) -> bool {
    get(map, keys).map(coerce_bool).unwrap_or(false)
}

/// Strips internal whitespace from a free-form vendor APN string.
pub(crate) fn normalize_apn(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Title-cases the county name and strips a trailing literal "County".
pub(crate) fn normalize_county(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_suffix("County")
        .or_else(|| trimmed.strip_suffix("county"))
        .unwrap_or(trimmed)
        .trim();
    stripped
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Days since a vendor date field, clamped to >= 1; falls back to `default`.
pub(crate) fn days_since(map: &Map<String, Json>, keys: &[&str], default: i64) -> i64 {
    for key in keys {
        if let Some(v) = map.get(*key) {
            match v {
                Json::String(s) => {
                    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                        let today = Utc::now().date_naive();
                        return (today - date).num_days().max(1);
                    }
                }
                Json::Number(n) => {
                    if let Some(d) = n.as_i64() {
                        return d.max(1);
                    }
                }
                _ => {}
            }
        }
    }
    default
}

/// Maps a vendor property record to a canonical property (minus
/// id/timestamps) and the set of DistressSignals the decision table fires.
pub fn normalize(raw: &Json, source: &str) -> (NewProperty, Vec<DistressSignal>) {
    let empty = Map::new();
    let map = raw.as_object().unwrap_or(&empty);

    let apn = get_str(map, &["APN", "apn"]).map(|s| normalize_apn(&s)).unwrap_or_default();
    let county = get_str(map, &["County", "county"]).map(|s| normalize_county(&s)).unwrap_or_default();

    let mut owner_flags = OwnerFlags::default();
    if let Some(lat) = get_num(map, &["Lat", "lat", "Latitude"]) {
        owner_flags.set("lat", serde_json::json!(lat));
    }
    if let Some(lng) = get_num(map, &["Lng", "lng", "Longitude"]) {
        owner_flags.set("lng", serde_json::json!(lng));
    }
    owner_flags.set("absentee", serde_json::json!(get_bool(map, &["NotSameMailingAddress"])));
    owner_flags.set("corporate", serde_json::json!(get_bool(map, &["CorporateOwned", "Corporate"])));
    owner_flags.set("inherited", serde_json::json!(get_bool(map, &["Inherited", "Deceased"])));
    owner_flags.set("elderly", serde_json::json!(get_bool(map, &["ElderlyOwner", "Elderly"])));
    owner_flags.set("outOfState", serde_json::json!(get_bool(map, &["OutOfStateOwner", "OutOfState"])));

    let property = NewProperty {
        apn,
        county,
        street: get_str(map, &["Address", "FullAddress"]),
        city: get_str(map, &["City"]),
        state: get_str(map, &["State"]),
        zip: get_str(map, &["ZipFive", "Zip"]),
        owner_name: get_str(map, &["Owner", "Taxpayer"]),
        owner_phone: get_str(map, &["OwnerPhone", "Phone"]),
        owner_email: get_str(map, &["OwnerEmail", "Email"]),
        estimated_value: get_num(map, &["AVM"]).map(|v| v.round() as i64),
        equity_percent: get_num(map, &["EquityPercent"]).map(|v| v.clamp(-50.0, 100.0)),
        bedrooms: get_int(map, &["Beds"]),
        bathrooms: get_num(map, &["Baths"]),
        sqft: get_int(map, &["SqFt"]),
        year_built: get_int(map, &["YearBuilt"]),
        lot_size: get_num(map, &["LotSize"]),
        property_type: get_str(map, &["PType", "PropertyType"]),
        owner_flags,
    };

    (property, detect_signals(map, source))
}

fn detect_signals(map: &Map<String, Json>, source: &str) -> Vec<DistressSignal> {
    let mut signals = Vec::new();

    let push = |signals: &mut Vec<DistressSignal>, event_type, severity, days, raw: &Map<String, Json>, source: &str| {
        signals.push(DistressSignal {
            event_type,
            severity,
            days_since_event: days,
            source: source.to_string(),
            raw_data: Json::Object(raw.clone()),
            confidence: None,
        });
    };

    if get_bool(map, &["Deceased"]) {
        let days = days_since(map, &["DeceasedDate"], DAYS_FRESH);
        push(&mut signals, EventType::Probate, 9, days, map, source);
    }

    if get_bool(map, &["PreForeclosure", "Foreclosure"]) {
        let default_amount = get_num(map, &["DefaultAmount"]).unwrap_or(0.0);
        let severity = if default_amount > 50_000.0 { 9 } else { 7 };
        let days = days_since(map, &["ForeclosureDate", "DefaultDate"], DAYS_FRESH);
        push(&mut signals, EventType::PreForeclosure, severity, days, map, source);
    }

    let mut tax_lien_fired = false;
    if get_bool(map, &["TaxDelinquent"]) {
        let delinquent_amount = get_num(map, &["DelinquentAmount"]).unwrap_or(0.0);
        let severity = if delinquent_amount > 10_000.0 { 8 } else { 6 };
        let days = days_since(map, &["TaxDelinquentDate", "DelinquentDate"], DAYS_ABSENTEE_OR_LIEN);
        push(&mut signals, EventType::TaxLien, severity, days, map, source);
        tax_lien_fired = true;
    }

    if get_bool(map, &["Bankruptcy"]) {
        let days = days_since(map, &["BankruptcyDate"], DAYS_MID);
        push(&mut signals, EventType::Bankruptcy, 8, days, map, source);
    }

    if get_bool(map, &["Divorce"]) {
        let days = days_since(map, &["DivorceDate"], DAYS_MID);
        push(&mut signals, EventType::Divorce, 7, days, map, source);
    }

    if get_bool(map, &["SiteVacant"]) || get_bool(map, &["MailVacant"]) {
        let days = days_since(map, &["VacantDate"], DAYS_MID);
        push(&mut signals, EventType::Vacant, 5, days, map, source);
    }

    if get_bool(map, &["NotSameMailingAddress"]) {
        let days = days_since(map, &["NotSameMailingAddressDate"], DAYS_ABSENTEE_OR_LIEN);
        push(&mut signals, EventType::Absentee, 4, days, map, source);
    }

    if get_bool(map, &["HasOpenLiens"]) && !tax_lien_fired {
        let days = days_since(map, &["LienDate"], DAYS_ABSENTEE_OR_LIEN);
        push(&mut signals, EventType::TaxLien, 5, days, map, source);
    }

    if signals.is_empty() {
        push(&mut signals, EventType::Absentee, 3, DAYS_DEFAULT, map, source);
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, Json)]) -> Json {
        let mut map = Map::new();
        for (k, v) in fields {
            map.insert(k.to_string(), v.clone());
        }
        Json::Object(map)
    }

    #[test]
    fn apn_strips_internal_whitespace() {
        let raw = record(&[("APN", serde_json::json!("123 456 789")), ("County", serde_json::json!("Travis"))]);
        let (property, _) = normalize(&raw, "test");
        assert_eq!(property.apn, "123456789");
    }

    #[test]
    fn county_strips_suffix_and_title_cases() {
        let raw = record(&[("APN", serde_json::json!("1")), ("County", serde_json::json!("TRAVIS COUNTY"))]);
        let (property, _) = normalize(&raw, "test");
        assert_eq!(property.county, "Travis");
    }

    #[test]
    fn numeric_coercion_strips_currency_formatting() {
        let raw = record(&[("AVM", serde_json::json!("$250,000.00"))]);
        let (property, _) = normalize(&raw, "test");
        assert_eq!(property.estimated_value, Some(250_000));
    }

    #[test]
    fn deceased_flag_fires_probate_nine() {
        let raw = record(&[("Deceased", serde_json::json!(true))]);
        let (_, signals) = normalize(&raw, "test");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].event_type, EventType::Probate);
        assert_eq!(signals[0].severity, 9);
    }

    #[test]
    fn preforeclosure_severity_depends_on_default_amount() {
        let big = record(&[("PreForeclosure", serde_json::json!(true)), ("DefaultAmount", serde_json::json!(75_000))]);
        let small = record(&[("PreForeclosure", serde_json::json!(true)), ("DefaultAmount", serde_json::json!(5_000))]);
        assert_eq!(normalize(&big, "test").1[0].severity, 9);
        assert_eq!(normalize(&small, "test").1[0].severity, 7);
    }

    #[test]
    fn no_triggers_fires_default_absentee_severity_three() {
        let raw = record(&[("APN", serde_json::json!("1"))]);
        let (_, signals) = normalize(&raw, "test");
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].event_type, EventType::Absentee);
        assert_eq!(signals[0].severity, 3);
        assert_eq!(signals[0].days_since_event, DAYS_DEFAULT);
    }

    #[test]
    fn open_liens_is_suppressed_when_tax_lien_already_fired() {
        let raw = record(&[
            ("TaxDelinquent", serde_json::json!(true)),
            ("DelinquentAmount", serde_json::json!(2_000)),
            ("HasOpenLiens", serde_json::json!(true)),
        ]);
        let (_, signals) = normalize(&raw, "test");
        assert_eq!(signals.iter().filter(|s| s.event_type == EventType::TaxLien).count(), 1);
    }

    #[test]
    fn all_matches_fire_simultaneously() {
        let raw = record(&[
            ("Deceased", serde_json::json!(true)),
            ("SiteVacant", serde_json::json!(true)),
            ("Bankruptcy", serde_json::json!(true)),
        ]);
        let (_, signals) = normalize(&raw, "test");
        assert_eq!(signals.len(), 3);
    }

    #[test]
    fn boolean_coercion_accepts_spec_truthy_values() {
        for v in [serde_json::json!("1"), serde_json::json!("Yes"), serde_json::json!("True"), serde_json::json!(true)] {
            let raw = record(&[("Deceased", v)]);
            assert_eq!(normalize(&raw, "test").1[0].event_type, EventType::Probate);
        }
    }
}
