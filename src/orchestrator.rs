//! Ingestion Orchestrator (C8).
//!
//! Wires C1 (normalize) → C2 (dedup, inside C6's insert) → C6 (persistence)
//! → C3/C4 (scoring) → C5 (blend) → C7 (lifecycle) → audit log for both the
//! single-record and bulk paths (spec.md §4.7). Scoring is pure and total;
//! every fallible step after it is individually non-fatal the way
//! spec.md §7's propagation policy requires, except Property upsert, which
//! aborts the record.

use std::collections::BTreeSet;
use std::time::Instant;

use rayon::prelude::*;
use serde_json::{Map, Value as Json};
use tracing::warn;
use uuid::Uuid;

use crate::dedup;
use crate::error::IngestError;
use crate::models::{DistressSignal, EventLog, EventType, NewProperty, OwnerFlags, Property};
use crate::normalize::{self, get_bool, get_num, normalize_apn, normalize_county};
use crate::scoring::predictive::{self, ActiveSignal, ForeclosureStage, PredictiveInput};
use crate::scoring::retrospective::{self, OwnerFlagsInput, RetrospectiveInput, SignalInput};
use crate::scoring::blend;
use crate::store::{InsertOutcome, Repository};
use crate::vendor::propertyradar::{Lookup, PropertyRadarClient};
use crate::{config, lifecycle};

/// Default comp ratio / historical conversion rate used when the vendor
/// payload carries no value for them. Neither field has a canonical home
/// in `Property`; both are read straight off the vendor record when
/// present.
const DEFAULT_COMP_RATIO: f64 = 1.0;
const DEFAULT_HISTORICAL_CONVERSION_RATE: f64 = 0.5;

fn as_map(raw: &Json) -> Map<String, Json> {
    raw.as_object().cloned().unwrap_or_default()
}

fn owner_flags_input(flags: &OwnerFlags) -> OwnerFlagsInput {
    OwnerFlagsInput {
        absentee: flags.absentee(),
        corporate: flags.corporate(),
        inherited: flags.inherited(),
        elderly: flags.elderly(),
        out_of_state: flags.out_of_state(),
    }
}

/// Builds the retrospective scorer's input from whatever owns the owner
/// flags and equity figure at the call site — `Property` for the
/// single-record path, `NewProperty` for bulk scoring before the upsert
/// that assigns an id has happened.
fn retrospective_input_from_parts(
    owner_flags: &OwnerFlags,
    equity_percent: Option<f64>,
    signals: &[DistressSignal],
    raw: &Json,
) -> RetrospectiveInput {
    let map = as_map(raw);
    RetrospectiveInput {
        signals: signals
            .iter()
            .map(|s| SignalInput {
                event_type: s.event_type,
                severity: s.severity,
                days_since_event: s.days_since_event,
            })
            .collect(),
        owner_flags: owner_flags_input(owner_flags),
        equity_percent: equity_percent.unwrap_or(0.0),
        comp_ratio: get_num(&map, &["CompRatio"]).unwrap_or(DEFAULT_COMP_RATIO),
        historical_conversion_rate: get_num(&map, &["HistoricalConversionRate"])
            .unwrap_or(DEFAULT_HISTORICAL_CONVERSION_RATE),
    }
}

fn assemble_retrospective_input(
    property: &Property,
    signals: &[DistressSignal],
    raw: &Json,
) -> RetrospectiveInput {
    retrospective_input_from_parts(&property.owner_flags, property.equity_percent, signals, raw)
}

fn foreclosure_stage(map: &Map<String, Json>) -> Option<ForeclosureStage> {
    if get_bool(map, &["AuctionScheduled", "Sale", "AtAuction"]) {
        Some(ForeclosureStage::AuctionOrSale)
    } else if get_bool(map, &["PreForeclosure", "Foreclosure", "NoticeOfDefault"]) {
        Some(ForeclosureStage::Notice)
    } else {
        None
    }
}

/// Builds the predictive scorer's input from the canonical property, the
/// signals just detected, and the vendor's raw payload. The scorer's last-N
/// ScoringRecords input is intentionally left empty here: the persistence
/// layer's seven methods (spec.md §9) expose no history query, and every
/// predictive feature that consumes `historical_scores` degrades to its
/// documented no-data default when the list is empty.
fn assemble_predictive_input(
    property: &Property,
    signals: &[DistressSignal],
    raw: &Json,
) -> PredictiveInput {
    let map = &as_map(raw);
    let owner_is_corporate = property.owner_flags.corporate();
    let absentee = property.owner_flags.absentee();

    PredictiveInput {
        owner_age: get_num(map, &["OwnerAge"]),
        ownership_years: get_num(map, &["OwnershipYears", "YearsOwned"]),
        owner_is_corporate,
        current_equity_percent: property.equity_percent,
        previous_equity_percent: get_num(map, &["PreviousEquityPercent"]),
        months_between_equity_readings: get_num(map, &["MonthsBetweenEquityReadings"]),
        loan_balance: get_num(map, &["LoanBalance"]),
        estimated_value: property.estimated_value.map(|v| v as f64),
        last_sale_days_ago: {
            let days = normalize::days_since(map, &["LastSaleDate"], 0);
            (days > 0).then_some(days)
        },
        last_sale_price: get_num(map, &["LastSalePrice"]),
        absentee,
        absentee_since_days_ago: {
            let days = normalize::days_since(map, &["NotSameMailingAddressDate"], 0);
            (days > 0).then_some(days)
        },
        vacant: get_bool(map, &["SiteVacant", "MailVacant"]),
        current_tax_delinquent_amount: get_num(map, &["DelinquentAmount"]),
        previous_tax_delinquent_amount: get_num(map, &["PreviousDelinquentAmount"]),
        tax_assessed_value: get_num(map, &["TaxAssessedValue"]),
        signals: signals
            .iter()
            .map(|s| ActiveSignal {
                event_type: s.event_type,
                severity: s.severity,
                days_since_event: s.days_since_event,
            })
            .collect(),
        historical_scores: Vec::new(),
        free_and_clear: get_bool(map, &["FreeAndClear"]),
        foreclosure_stage: foreclosure_stage(map),
        default_amount: get_num(map, &["DefaultAmount"]),
    }
}

// ---------------------------------------------------------------------
// `/ingest` — generic, vendor-agnostic webhook (spec.md §6.1).
// ---------------------------------------------------------------------

/// One pre-classified record as the generic webhook receives it: the
/// caller already names the distress type, so there is no C1 detection
/// table to run, only field validation, property upsert, and the
/// resulting event's dedup outcome.
#[derive(Debug, Clone)]
pub struct IngestRecordInput {
    pub apn: String,
    pub county: String,
    pub address: Option<String>,
    pub owner_name: Option<String>,
    pub distress_type: String,
    pub raw_data: Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Ingested,
    Duplicate,
    UpsertFailed,
    EventFailed,
    Invalid,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Ingested => "ingested",
            RecordStatus::Duplicate => "duplicate",
            RecordStatus::UpsertFailed => "upsert_failed",
            RecordStatus::EventFailed => "event_failed",
            RecordStatus::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub apn: String,
    pub county: String,
    pub status: RecordStatus,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookIngestResult {
    pub source: String,
    pub received: usize,
    pub upserted: usize,
    pub deduped: usize,
    pub errors: usize,
    pub records: Vec<RecordOutcome>,
}

/// The severity assigned to a generically-tagged webhook record: the
/// caller only supplies a distress type, not a severity, so this takes
/// the decision table's mid-tier value (spec.md §4.1's 6-8 tier) rather
/// than guessing a tier from fields the webhook body doesn't carry.
const WEBHOOK_DEFAULT_SEVERITY: u8 = 6;

pub async fn ingest_webhook(
    repo: &dyn Repository,
    source: &str,
    records: Vec<IngestRecordInput>,
) -> WebhookIngestResult {
    let received = records.len();
    let mut upserted = 0;
    let mut deduped = 0;
    let mut errors = 0;
    let mut outcomes = Vec::with_capacity(received);

    for record in records {
        let apn = normalize_apn(record.apn.trim());
        let county = normalize_county(record.county.trim());

        if apn.is_empty() || county.is_empty() {
            errors += 1;
            outcomes.push(RecordOutcome { apn, county, status: RecordStatus::Invalid, fingerprint: None });
            continue;
        }

        let Some(event_type) = EventType::from_str(&record.distress_type) else {
            errors += 1;
            outcomes.push(RecordOutcome { apn, county, status: RecordStatus::Invalid, fingerprint: None });
            continue;
        };

        let new_property = NewProperty {
            apn: apn.clone(),
            county: county.clone(),
            street: record.address.clone(),
            owner_name: record.owner_name.clone(),
            ..Default::default()
        };

        let property = match repo.upsert_property(new_property).await {
            Ok(p) => p,
            Err(e) => {
                warn!(apn = %apn, county = %county, error = %e, "ingest.upsert_failed");
                errors += 1;
                outcomes.push(RecordOutcome { apn, county, status: RecordStatus::UpsertFailed, fingerprint: None });
                continue;
            }
        };

        let fingerprint = dedup::fingerprint(&apn, &county, event_type, source);
        let signal = DistressSignal {
            event_type,
            severity: WEBHOOK_DEFAULT_SEVERITY,
            days_since_event: 1,
            source: source.to_string(),
            raw_data: record.raw_data,
            confidence: None,
        };

        match repo.insert_distress_event(property.id, signal, fingerprint.clone()).await {
            Ok((InsertOutcome::Inserted, _)) => {
                upserted += 1;
                outcomes.push(RecordOutcome {
                    apn,
                    county,
                    status: RecordStatus::Ingested,
                    fingerprint: Some(fingerprint),
                });
            }
            Ok((InsertOutcome::Duplicate, _)) => {
                deduped += 1;
                outcomes.push(RecordOutcome {
                    apn,
                    county,
                    status: RecordStatus::Duplicate,
                    fingerprint: Some(fingerprint),
                });
            }
            Err(e) => {
                warn!(apn = %apn, county = %county, error = %e, "ingest.event_failed");
                errors += 1;
                outcomes.push(RecordOutcome { apn, county, status: RecordStatus::EventFailed, fingerprint: None });
            }
        }
    }

    WebhookIngestResult { source: source.to_string(), received, upserted, deduped, errors, records: outcomes }
}

// ---------------------------------------------------------------------
// `/ingest/propertyradar` — single property from the named vendor.
// ---------------------------------------------------------------------

pub struct SingleLookupRequest {
    pub address: Option<String>,
    pub apn: Option<String>,
    pub radar_id: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SignalSummary {
    pub event_type: EventType,
    pub severity: u8,
}

pub struct SingleIngestResult {
    pub apn: String,
    pub heat_score: u8,
    pub label: &'static str,
    pub property_id: Uuid,
    pub lead_id: Uuid,
    pub signals: Vec<SignalSummary>,
    pub scoring_composite: u8,
    pub scoring_motivation: u8,
    pub scoring_deal: u8,
    pub scoring_model: &'static str,
    pub events_inserted: usize,
    pub events_deduped: usize,
    pub elapsed_ms: u64,
}

pub async fn ingest_propertyradar_single(
    repo: &dyn Repository,
    vendor: &PropertyRadarClient,
    request: SingleLookupRequest,
    actor: Uuid,
) -> Result<SingleIngestResult, IngestError> {
    let start = Instant::now();

    let lookup = if let Some(radar_id) = request.radar_id.as_deref() {
        Lookup::RadarId(radar_id)
    } else if let Some(apn) = request.apn.as_deref() {
        Lookup::Apn(apn)
    } else if let Some(address) = request.address.as_deref() {
        Lookup::Address {
            address,
            city: request.city.as_deref(),
            state: request.state.as_deref(),
            zip: request.zip.as_deref(),
        }
    } else {
        return Err(IngestError::MalformedRequest(
            "one of address, apn, or radarId is required".to_string(),
        ));
    };

    let response = vendor.lookup(lookup).await.map_err(|e| IngestError::VendorUnavailable(e.to_string()))?;

    let raw = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| IngestError::VendorNoResult("no matching property at propertyradar".to_string()))?;

    let (new_property, signals) = normalize::normalize(&raw, "propertyradar");
    if new_property.apn.is_empty() {
        return Err(IngestError::VendorMissingIdentity);
    }

    let property =
        repo.upsert_property(new_property).await.map_err(|e| IngestError::StoreError(e.to_string()))?;

    let (events_inserted, events_deduped) =
        persist_signals(repo, &property, &signals, "propertyradar").await;

    let retro_input = assemble_retrospective_input(&property, &signals, &raw);
    let retro = retrospective::score(&retro_input);
    persist_scoring_record(repo, &property, &retro).await;

    let pred_input = assemble_predictive_input(&property, &signals, &raw);
    let pred = predictive::score(&pred_input);
    persist_prediction(repo, &property, &pred).await;

    let blended = blend::blend(retro.composite, pred.predictive_score);
    let tags: BTreeSet<String> = signals.iter().map(|s| s.event_type.as_str().to_string()).collect();

    let lead = lifecycle::promote(repo, property.id, blended, "propertyradar", tags)
        .await
        .map_err(|e| IngestError::Internal(e.to_string()))?;

    let elapsed_ms = start.elapsed().as_millis() as u64;

    if let Err(e) = repo
        .append_event_log(EventLog {
            id: Uuid::new_v4(),
            user_id: actor,
            action: "propertyradar.ingest".to_string(),
            entity_type: "property".to_string(),
            entity_id: property.id,
            details: serde_json::json!({
                "apn": property.apn,
                "heat_score": blended,
                "label": retro.label.as_str(),
                "events_inserted": events_inserted,
                "events_deduped": events_deduped,
                "elapsed_ms": elapsed_ms,
            }),
            created_at: crate::models::now_millis(),
        })
        .await
    {
        warn!(property_id = %property.id, error = %e, "ingest.event_log_failed");
    }

    Ok(SingleIngestResult {
        apn: property.apn,
        heat_score: blended,
        label: retro.label.as_str(),
        property_id: property.id,
        lead_id: lead.id,
        signals: signals.iter().map(|s| SignalSummary { event_type: s.event_type, severity: s.severity }).collect(),
        scoring_composite: retro.composite,
        scoring_motivation: retro.motivation,
        scoring_deal: retro.deal,
        scoring_model: retrospective::MODEL_VERSION,
        events_inserted,
        events_deduped,
        elapsed_ms,
    })
}

async fn persist_signals(
    repo: &dyn Repository,
    property: &Property,
    signals: &[DistressSignal],
    source: &str,
) -> (usize, usize) {
    let mut inserted = 0;
    let mut deduped = 0;
    for signal in signals {
        let fingerprint = dedup::fingerprint(&property.apn, &property.county, signal.event_type, source);
        match repo.insert_distress_event(property.id, signal.clone(), fingerprint).await {
            Ok((InsertOutcome::Inserted, _)) => inserted += 1,
            Ok((InsertOutcome::Duplicate, _)) => deduped += 1,
            Err(e) => warn!(property_id = %property.id, error = %e, "ingest.event_insert_failed"),
        }
    }
    (inserted, deduped)
}

async fn persist_scoring_record(
    repo: &dyn Repository,
    property: &Property,
    retro: &retrospective::RetrospectiveOutput,
) {
    let record = crate::models::ScoringRecord {
        id: Uuid::new_v4(),
        property_id: property.id,
        model_version: retrospective::MODEL_VERSION.to_string(),
        composite_score: retro.composite,
        motivation_score: retro.motivation,
        deal_score: retro.deal,
        severity_multiplier: retro.severity_multiplier,
        recency_decay: retro.recency_decay,
        stacking_bonus: retro.stacking_bonus,
        owner_factor_score: retro.owner_factor_score,
        equity_factor_score: retro.equity_factor_score,
        ai_boost: retro.ai_boost,
        factors: retro.factors.clone(),
        created_at: crate::models::now_millis(),
    };
    if let Err(e) = repo.insert_scoring_record(record).await {
        warn!(property_id = %property.id, error = %e, "ingest.scoring_record_failed");
    }
}

async fn persist_prediction(repo: &dyn Repository, property: &Property, pred: &predictive::PredictiveOutput) {
    let prediction = crate::models::Prediction {
        id: Uuid::new_v4(),
        property_id: property.id,
        model_version: predictive::MODEL_VERSION.to_string(),
        predictive_score: pred.predictive_score,
        days_until_distress: pred.days_until_distress,
        confidence: pred.confidence,
        owner_age_inference: pred.owner_age_inference,
        equity_burn_rate: pred.equity_burn_rate,
        absentee_duration_days: pred.absentee_duration_days,
        tax_delinquency_trend: pred.tax_delinquency_trend,
        life_event_probability: pred.life_event_probability,
        features: Json::Object(
            pred.factors.iter().map(|f| (f.name.clone(), serde_json::json!(f.value))).collect::<Map<_, _>>(),
        ),
        factors: pred.factors.clone(),
        created_at: crate::models::now_millis(),
    };
    if let Err(e) = repo.insert_prediction(prediction).await {
        warn!(property_id = %property.id, error = %e, "ingest.prediction_failed");
    }
}

// ---------------------------------------------------------------------
// `/ingest/propertyradar/bulk-seed` — bulk elite pull.
// ---------------------------------------------------------------------

const BULK_PAGE_SIZE: u32 = 200;

pub struct BulkSeedRequest {
    pub limit: u32,
    pub counties: Vec<String>,
}

pub struct BulkSeedResult {
    pub inserted: usize,
    pub updated: usize,
    pub errored: usize,
    pub total_fetched: usize,
    pub total_scored: usize,
    pub above_cutoff: usize,
    pub events_inserted: usize,
    pub events_deduped: usize,
    pub top_score: u8,
    pub top_address: Option<String>,
    pub elapsed_ms: u64,
}

struct ScoredRecord {
    raw: Json,
    property: NewProperty,
    signals: Vec<DistressSignal>,
    composite: u8,
}

pub async fn bulk_seed(
    repo: &dyn Repository,
    vendor: &PropertyRadarClient,
    elite_cutoff: u8,
    request: BulkSeedRequest,
    actor: Uuid,
) -> Result<BulkSeedResult, IngestError> {
    let start = Instant::now();
    let limit = request.limit.min(1000);

    let mut fetched: Vec<Json> = Vec::new();
    let mut offset = 0;
    while (fetched.len() as u32) < limit {
        let page_limit = BULK_PAGE_SIZE.min(limit - fetched.len() as u32);
        let page = vendor
            .search_page(&request.counties, page_limit, offset)
            .await
            .map_err(|e| IngestError::VendorUnavailable(e.to_string()))?;
        if page.results.is_empty() {
            break;
        }
        offset += page.results.len() as u32;
        fetched.extend(page.results);
    }

    let total_fetched = fetched.len();

    // Pure CPU work: every fetched record gets a retrospective score,
    // computed in parallel, with no shared mutable state (spec.md §5).
    let scored: Vec<ScoredRecord> = fetched
        .into_par_iter()
        .map(|raw| {
            let (property, signals) = normalize::normalize(&raw, "propertyradar");
            let input = retrospective_input_from_parts(
                &property.owner_flags,
                property.equity_percent,
                &signals,
                &raw,
            );
            let composite = retrospective::score(&input).composite;
            ScoredRecord { raw, property, signals, composite }
        })
        .collect();

    let total_scored = scored.len();
    let elite: Vec<ScoredRecord> = scored.into_iter().filter(|r| r.composite >= elite_cutoff).collect();
    let above_cutoff = elite.len();

    let top_score = elite.iter().map(|r| r.composite).max().unwrap_or(0);
    let top_address =
        elite.iter().max_by_key(|r| r.composite).and_then(|r| r.property.street.clone());

    let mut inserted = 0;
    let mut updated = 0;
    let mut errored = 0;
    let mut events_inserted = 0;
    let mut events_deduped = 0;

    // Persistence is serialized per property so EventLog ordering for a
    // given property holds even though scoring ran concurrently.
    for record in elite {
        match ingest_scored_record(repo, record).await {
            Ok((was_insert, ev_inserted, ev_deduped)) => {
                if was_insert {
                    inserted += 1;
                } else {
                    updated += 1;
                }
                events_inserted += ev_inserted;
                events_deduped += ev_deduped;
            }
            Err(e) => {
                warn!(error = %e, "bulk_seed.record_failed");
                errored += 1;
            }
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;

    if let Err(e) = repo
        .append_event_log(EventLog {
            id: Uuid::new_v4(),
            user_id: actor,
            action: "propertyradar.bulk_seed".to_string(),
            entity_type: "batch".to_string(),
            entity_id: Uuid::new_v4(),
            details: serde_json::json!({
                "total_fetched": total_fetched,
                "total_scored": total_scored,
                "above_cutoff": above_cutoff,
                "inserted": inserted,
                "updated": updated,
                "errored": errored,
                "top_score": top_score,
                "elapsed_ms": elapsed_ms,
            }),
            created_at: crate::models::now_millis(),
        })
        .await
    {
        warn!(error = %e, "bulk_seed.event_log_failed");
    }

    Ok(BulkSeedResult {
        inserted,
        updated,
        errored,
        total_fetched,
        total_scored,
        above_cutoff,
        events_inserted,
        events_deduped,
        top_score,
        top_address,
        elapsed_ms,
    })
}

/// Steps 2-7 of spec.md §4.7 for one already-scored elite record. Returns
/// whether this was a fresh Property row (`created_at == updated_at` is the
/// only signal the 7-method Repository contract exposes for that) plus the
/// event insert/dedup counts.
async fn ingest_scored_record(
    repo: &dyn Repository,
    record: ScoredRecord,
) -> anyhow::Result<(bool, usize, usize)> {
    let property = repo.upsert_property(record.property).await?;
    let was_insert = property.created_at == property.updated_at;

    let (events_inserted, events_deduped) =
        persist_signals(repo, &property, &record.signals, "propertyradar").await;

    let retro_input = assemble_retrospective_input(&property, &record.signals, &record.raw);
    let retro = retrospective::score(&retro_input);
    persist_scoring_record(repo, &property, &retro).await;

    let pred_input = assemble_predictive_input(&property, &record.signals, &record.raw);
    let pred = predictive::score(&pred_input);
    persist_prediction(repo, &property, &pred).await;

    let blended = blend::blend(retro.composite, pred.predictive_score);
    let tags: BTreeSet<String> =
        record.signals.iter().map(|s| s.event_type.as_str().to_string()).collect();

    lifecycle::promote(repo, property.id, blended, "propertyradar.bulk_seed", tags).await?;

    Ok((was_insert, events_inserted, events_deduped))
}

/// Resolves the bulk-seed auth gate: bearer cron secret, or `user_id`
/// resolving to an admin. The `is_admin` lookup is supplied by the caller.
pub fn authorize_bulk_seed(
    headers: &axum::http::HeaderMap,
    cfg: &config::Config,
    user_id: Option<&str>,
    is_admin: impl FnOnce(&str) -> bool,
) -> Result<(), IngestError> {
    crate::middleware::auth::require_cron_secret_or_admin(headers, &cfg.cron_secret, user_id, is_admin)
}
