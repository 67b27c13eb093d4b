//! HTTP surface: the three ingest endpoints (spec.md §6.1).

pub mod ingest;

use std::sync::Arc;

use axum::routing::post;
use axum::Router;

use crate::config::Config;
use crate::store::Repository;
use crate::vendor::propertyradar::PropertyRadarClient;

/// Shared application state, the same shape the auth module's `AuthState`
/// used: one `Arc` per long-lived dependency, cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub vendor: Arc<PropertyRadarClient>,
    pub config: Arc<Config>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ingest", post(ingest::ingest_webhook))
        .route("/ingest/propertyradar", post(ingest::ingest_propertyradar))
        .route("/ingest/propertyradar/bulk-seed", post(ingest::bulk_seed))
}
