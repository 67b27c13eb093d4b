//! Ingest endpoint handlers (spec.md §6.1).
//!
//! Each handler does its own auth check against the parsed request before
//! calling into `orchestrator`; there's no `axum::middleware` layer for
//! this because the bulk-seed gate needs the body's `userId`, which isn't
//! available to a request-level middleware without buffering the body
//! twice.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json_;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::IngestError;
use crate::middleware::auth;
use crate::models::EventLog;
use crate::orchestrator::{self, BulkSeedRequest, IngestRecordInput, SingleLookupRequest};

#[derive(Debug, Deserialize)]
pub struct WebhookRecord {
    pub apn: String,
    pub county: String,
    pub address: Option<String>,
    pub owner_name: Option<String>,
    pub distress_type: String,
    #[serde(default)]
    pub raw_data: Json_,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub source: String,
    pub records: Vec<WebhookRecord>,
}

#[derive(Debug, Serialize)]
pub struct WebhookRecordResponse {
    pub apn: String,
    pub county: String,
    pub status: &'static str,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub source: String,
    pub received: usize,
    pub upserted: usize,
    pub deduped: usize,
    pub errors: usize,
    pub records: Vec<WebhookRecordResponse>,
    pub timestamp: i64,
}

pub async fn ingest_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, IngestError> {
    auth::require_webhook_secret(&headers, &state.config.ingest_webhook_secret)?;

    let records = body
        .records
        .into_iter()
        .map(|r| IngestRecordInput {
            apn: r.apn,
            county: r.county,
            address: r.address,
            owner_name: r.owner_name,
            distress_type: r.distress_type,
            raw_data: r.raw_data,
        })
        .collect();

    let result = orchestrator::ingest_webhook(state.repo.as_ref(), &body.source, records).await;

    Ok(Json(WebhookResponse {
        success: true,
        source: result.source,
        received: result.received,
        upserted: result.upserted,
        deduped: result.deduped,
        errors: result.errors,
        records: result
            .records
            .into_iter()
            .map(|r| WebhookRecordResponse {
                apn: r.apn,
                county: r.county,
                status: r.status.as_str(),
                fingerprint: r.fingerprint,
            })
            .collect(),
        timestamp: crate::models::now_millis(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PropertyRadarLookupRequest {
    pub address: Option<String>,
    pub apn: Option<String>,
    #[serde(rename = "radarId")]
    pub radar_id: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignalResponse {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub severity: u8,
}

#[derive(Debug, Serialize)]
pub struct ScoringResponse {
    pub composite: u8,
    pub motivation: u8,
    pub deal: u8,
    pub model: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PropertyRadarIngestResponse {
    pub success: bool,
    pub apn: String,
    #[serde(rename = "heatScore")]
    pub heat_score: u8,
    pub label: &'static str,
    pub property_id: Uuid,
    pub lead_id: Uuid,
    pub signals: Vec<SignalResponse>,
    pub scoring: ScoringResponse,
    pub events_inserted: usize,
    pub events_deduped: usize,
    pub elapsed_ms: u64,
}

pub async fn ingest_propertyradar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PropertyRadarLookupRequest>,
) -> Result<Json<PropertyRadarIngestResponse>, IngestError> {
    auth::require_cron_secret(&headers, &state.config.cron_secret)?;

    let request = SingleLookupRequest {
        address: body.address,
        apn: body.apn,
        radar_id: body.radar_id,
        city: body.city,
        state: body.state,
        zip: body.zip,
    };

    let result = orchestrator::ingest_propertyradar_single(
        state.repo.as_ref(),
        state.vendor.as_ref(),
        request,
        EventLog::system_actor(),
    )
    .await?;

    Ok(Json(PropertyRadarIngestResponse {
        success: true,
        apn: result.apn,
        heat_score: result.heat_score,
        label: result.label,
        property_id: result.property_id,
        lead_id: result.lead_id,
        signals: result
            .signals
            .into_iter()
            .map(|s| SignalResponse { event_type: s.event_type.as_str(), severity: s.severity })
            .collect(),
        scoring: ScoringResponse {
            composite: result.scoring_composite,
            motivation: result.scoring_motivation,
            deal: result.scoring_deal,
            model: result.scoring_model,
        },
        events_inserted: result.events_inserted,
        events_deduped: result.events_deduped,
        elapsed_ms: result.elapsed_ms,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BulkSeedHttpRequest {
    pub limit: u32,
    #[serde(default)]
    pub counties: Vec<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkSeedResponse {
    pub success: bool,
    pub inserted: usize,
    pub updated: usize,
    pub errored: usize,
    #[serde(rename = "totalFetched")]
    pub total_fetched: usize,
    #[serde(rename = "totalScored")]
    pub total_scored: usize,
    #[serde(rename = "aboveCutoff")]
    pub above_cutoff: usize,
    #[serde(rename = "eventsInserted")]
    pub events_inserted: usize,
    #[serde(rename = "eventsDeduped")]
    pub events_deduped: usize,
    #[serde(rename = "topScore")]
    pub top_score: u8,
    #[serde(rename = "topAddress")]
    pub top_address: Option<String>,
    pub elapsed_ms: u64,
}

/// RBAC is a deliberate non-goal (spec.md §1): there is no user/role store
/// to resolve `userId` against, so the admin branch of the bulk-seed gate
/// never succeeds here. The cron-secret branch is the only one a caller
/// without that external system can use.
fn no_admin_store(_user_id: &str) -> bool {
    false
}

pub async fn bulk_seed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BulkSeedHttpRequest>,
) -> Result<Json<BulkSeedResponse>, IngestError> {
    orchestrator::authorize_bulk_seed(&headers, &state.config, body.user_id.as_deref(), no_admin_store)?;

    let request = BulkSeedRequest { limit: body.limit, counties: body.counties };

    let result = orchestrator::bulk_seed(
        state.repo.as_ref(),
        state.vendor.as_ref(),
        state.config.elite_cutoff,
        request,
        EventLog::system_actor(),
    )
    .await?;

    Ok(Json(BulkSeedResponse {
        success: true,
        inserted: result.inserted,
        updated: result.updated,
        errored: result.errored,
        total_fetched: result.total_fetched,
        total_scored: result.total_scored,
        above_cutoff: result.above_cutoff,
        events_inserted: result.events_inserted,
        events_deduped: result.events_deduped,
        top_score: result.top_score,
        top_address: result.top_address,
        elapsed_ms: result.elapsed_ms,
    }))
}
