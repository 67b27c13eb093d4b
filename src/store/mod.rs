//! Persistence Layer (C6) abstraction.
//!
//! Re-expresses the "as any" type escape from the source as a small
//! repository trait with strongly typed methods (spec.md §9 design note).

pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{DistressEvent, DistressSignal, EventLog, Lead, NewProperty, Prediction, Property, ScoringRecord};

/// Outcome of inserting a `DistressEvent`: duplicates are a no-op success,
/// never an error (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// `upsert_lead` fails this way when the caller's `lock_version` no longer
/// matches the stored row (spec.md §4.6's optimistic concurrency).
#[derive(Debug)]
pub enum UpsertLeadError {
    Conflict,
    Other(anyhow::Error),
}

impl std::fmt::Display for UpsertLeadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertLeadError::Conflict => write!(f, "lead lock_version conflict"),
            UpsertLeadError::Other(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for UpsertLeadError {}

impl From<anyhow::Error> for UpsertLeadError {
    fn from(e: anyhow::Error) -> Self {
        UpsertLeadError::Other(e)
    }
}

/// The repository trait every persistence backend implements. All methods
/// are async to leave room for a non-blocking backend; the SQLite
/// implementation runs its (fast, WAL-mode) queries synchronously under a
/// `parking_lot::Mutex`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Upserts on `(apn, county)`. Atomic from the caller's perspective —
    /// concurrent ingests of the same property never race-double-insert.
    async fn upsert_property(&self, property: NewProperty) -> anyhow::Result<Property>;

    /// Inserts a distress event under its fingerprint; a duplicate
    /// fingerprint returns `Duplicate` and the pre-existing row, not an
    /// error.
    async fn insert_distress_event(
        &self,
        property_id: Uuid,
        signal: DistressSignal,
        fingerprint: String,
    ) -> anyhow::Result<(InsertOutcome, DistressEvent)>;

    async fn insert_scoring_record(&self, record: ScoringRecord) -> anyhow::Result<()>;

    async fn insert_prediction(&self, prediction: Prediction) -> anyhow::Result<()>;

    /// The at-most-one lead with `status ∈ {prospect, lead, negotiation}`
    /// for this property (spec.md §3's single-active-lead invariant).
    async fn find_active_lead_by_property(&self, property_id: Uuid) -> anyhow::Result<Option<Lead>>;

    /// Creates (when `expected_lock_version` is `None`) or CAS-updates a
    /// lead row. Returns `UpsertLeadError::Conflict` when the stored
    /// `lock_version` no longer matches.
    async fn upsert_lead(
        &self,
        lead: Lead,
        expected_lock_version: Option<u32>,
    ) -> Result<Lead, UpsertLeadError>;

    async fn append_event_log(&self, entry: EventLog) -> anyhow::Result<()>;
}
