//! SQLite-backed `Repository` implementation.
//!
//! Grounded on the teacher's `signals::db_storage::DbSignalStorage`: WAL
//! pragmas, a `parking_lot::Mutex<Connection>` guarding a single
//! connection, and `INSERT OR IGNORE` for dedup-safe inserts. SQLite
//! transactions are fast enough that holding the mutex across a query is
//! not a meaningful bottleneck at this scale.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    now_millis, DistressEvent, DistressSignal, EventLog, EventType, Lead, LeadStatus, NewProperty,
    OwnerFlags, Prediction, Property, ScoringRecord,
};
use crate::store::{InsertOutcome, Repository, UpsertLeadError};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS properties (
    id TEXT PRIMARY KEY,
    apn TEXT NOT NULL,
    county TEXT NOT NULL,
    street TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    owner_name TEXT,
    owner_phone TEXT,
    owner_email TEXT,
    estimated_value INTEGER,
    equity_percent REAL,
    bedrooms INTEGER,
    bathrooms REAL,
    sqft INTEGER,
    year_built INTEGER,
    lot_size REAL,
    property_type TEXT,
    owner_flags TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (apn, county)
);

CREATE TABLE IF NOT EXISTS distress_events (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    event_type TEXT NOT NULL,
    source TEXT NOT NULL,
    severity INTEGER NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    raw_data TEXT NOT NULL,
    confidence REAL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_distress_events_property ON distress_events(property_id, created_at DESC);

CREATE TABLE IF NOT EXISTS scoring_records (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    model_version TEXT NOT NULL,
    composite_score INTEGER NOT NULL,
    motivation_score INTEGER NOT NULL,
    deal_score INTEGER NOT NULL,
    severity_multiplier REAL NOT NULL,
    recency_decay REAL NOT NULL,
    stacking_bonus REAL NOT NULL,
    owner_factor_score REAL NOT NULL,
    equity_factor_score REAL NOT NULL,
    ai_boost REAL NOT NULL,
    factors TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scoring_records_property ON scoring_records(property_id, created_at DESC);

CREATE TABLE IF NOT EXISTS predictions (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    model_version TEXT NOT NULL,
    predictive_score INTEGER NOT NULL,
    days_until_distress INTEGER NOT NULL,
    confidence INTEGER NOT NULL,
    owner_age_inference REAL,
    equity_burn_rate REAL,
    absentee_duration_days INTEGER,
    tax_delinquency_trend REAL,
    life_event_probability REAL,
    features TEXT NOT NULL,
    factors TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_predictions_property ON predictions(property_id, created_at DESC);

CREATE TABLE IF NOT EXISTS leads (
    id TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    status TEXT NOT NULL,
    assigned_to TEXT,
    priority INTEGER NOT NULL,
    source TEXT NOT NULL,
    tags TEXT NOT NULL,
    notes TEXT,
    claimed_at INTEGER,
    claim_expires_at INTEGER,
    promoted_at INTEGER NOT NULL,
    last_contact_at INTEGER,
    follow_up_date INTEGER,
    lock_version INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_leads_property_status ON leads(property_id, status);
CREATE INDEX IF NOT EXISTS idx_leads_active ON leads(property_id)
    WHERE status IN ('prospect', 'lead', 'negotiation');

CREATE TABLE IF NOT EXISTS event_log (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    details TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_event_log_entity ON event_log(entity_id, created_at DESC);
"#;

pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open database at {db_path}"))?;

        conn.execute_batch(SCHEMA_SQL).context("failed to initialize schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!(%journal_mode, "WAL mode not active");
        }

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// An in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL).context("failed to initialize schema")?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

fn row_to_property(row: &Row) -> rusqlite::Result<Property> {
    let owner_flags_json: String = row.get("owner_flags")?;
    let owner_flags: OwnerFlags = serde_json::from_str(&owner_flags_json).unwrap_or_default();
    Ok(Property {
        id: row.get::<_, String>("id")?.parse().unwrap_or_default(),
        apn: row.get("apn")?,
        county: row.get("county")?,
        street: row.get("street")?,
        city: row.get("city")?,
        state: row.get("state")?,
        zip: row.get("zip")?,
        owner_name: row.get("owner_name")?,
        owner_phone: row.get("owner_phone")?,
        owner_email: row.get("owner_email")?,
        estimated_value: row.get("estimated_value")?,
        equity_percent: row.get("equity_percent")?,
        bedrooms: row.get("bedrooms")?,
        bathrooms: row.get("bathrooms")?,
        sqft: row.get("sqft")?,
        year_built: row.get("year_built")?,
        lot_size: row.get("lot_size")?,
        property_type: row.get("property_type")?,
        owner_flags,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_distress_event(row: &Row) -> rusqlite::Result<DistressEvent> {
    let event_type_str: String = row.get("event_type")?;
    let raw_data_json: String = row.get("raw_data")?;
    Ok(DistressEvent {
        id: row.get::<_, String>("id")?.parse().unwrap_or_default(),
        property_id: row.get::<_, String>("property_id")?.parse().unwrap_or_default(),
        event_type: EventType::from_str(&event_type_str).unwrap_or(EventType::Absentee),
        source: row.get("source")?,
        severity: row.get("severity")?,
        fingerprint: row.get("fingerprint")?,
        raw_data: serde_json::from_str(&raw_data_json).unwrap_or(serde_json::Value::Null),
        confidence: row.get("confidence")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_lead(row: &Row) -> rusqlite::Result<Lead> {
    let status_str: String = row.get("status")?;
    let tags_json: String = row.get("tags")?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    Ok(Lead {
        id: row.get::<_, String>("id")?.parse().unwrap_or_default(),
        property_id: row.get::<_, String>("property_id")?.parse().unwrap_or_default(),
        status: LeadStatus::from_str(&status_str).unwrap_or(LeadStatus::Prospect),
        assigned_to: row.get("assigned_to")?,
        priority: row.get("priority")?,
        source: row.get("source")?,
        tags,
        notes: row.get("notes")?,
        claimed_at: row.get("claimed_at")?,
        claim_expires_at: row.get("claim_expires_at")?,
        promoted_at: row.get("promoted_at")?,
        last_contact_at: row.get("last_contact_at")?,
        follow_up_date: row.get("follow_up_date")?,
        lock_version: row.get("lock_version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert_property(&self, property: NewProperty) -> Result<Property> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4();
        let now = now_millis();
        let owner_flags_json = serde_json::to_string(&property.owner_flags)?;

        conn.execute(
            "INSERT INTO properties (
                id, apn, county, street, city, state, zip, owner_name, owner_phone, owner_email,
                estimated_value, equity_percent, bedrooms, bathrooms, sqft, year_built, lot_size,
                property_type, owner_flags, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)
            ON CONFLICT(apn, county) DO UPDATE SET
                street = excluded.street,
                city = excluded.city,
                state = excluded.state,
                zip = excluded.zip,
                owner_name = excluded.owner_name,
                owner_phone = excluded.owner_phone,
                owner_email = excluded.owner_email,
                estimated_value = excluded.estimated_value,
                equity_percent = excluded.equity_percent,
                bedrooms = excluded.bedrooms,
                bathrooms = excluded.bathrooms,
                sqft = excluded.sqft,
                year_built = excluded.year_built,
                lot_size = excluded.lot_size,
                property_type = excluded.property_type,
                owner_flags = excluded.owner_flags,
                updated_at = excluded.updated_at",
            params![
                id.to_string(),
                property.apn,
                property.county,
                property.street,
                property.city,
                property.state,
                property.zip,
                property.owner_name,
                property.owner_phone,
                property.owner_email,
                property.estimated_value,
                property.equity_percent,
                property.bedrooms,
                property.bathrooms,
                property.sqft,
                property.year_built,
                property.lot_size,
                property.property_type,
                owner_flags_json,
                now,
                now,
            ],
        )
        .context("property upsert failed")?;

        conn.query_row(
            "SELECT * FROM properties WHERE apn = ?1 AND county = ?2",
            params![property.apn.clone(), property.county.clone()],
            row_to_property,
        )
        .context("failed to read back upserted property")
    }

    async fn insert_distress_event(
        &self,
        property_id: Uuid,
        signal: DistressSignal,
        fingerprint: String,
    ) -> Result<(InsertOutcome, DistressEvent)> {
        let conn = self.conn.lock();
        let id = Uuid::new_v4();
        let now = now_millis();
        let raw_data_json = serde_json::to_string(&signal.raw_data)?;

        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO distress_events (
                    id, property_id, event_type, source, severity, fingerprint, raw_data,
                    confidence, created_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    id.to_string(),
                    property_id.to_string(),
                    signal.event_type.as_str(),
                    signal.source,
                    signal.severity,
                    fingerprint,
                    raw_data_json,
                    signal.confidence,
                    now,
                ],
            )
            .context("distress event insert failed")?;

        let outcome = if changed > 0 { InsertOutcome::Inserted } else { InsertOutcome::Duplicate };

        let event = conn
            .query_row(
                "SELECT * FROM distress_events WHERE fingerprint = ?1",
                params![fingerprint],
                row_to_distress_event,
            )
            .context("failed to read back distress event")?;

        Ok((outcome, event))
    }

    async fn insert_scoring_record(&self, record: ScoringRecord) -> Result<()> {
        let conn = self.conn.lock();
        let factors_json = serde_json::to_string(&record.factors)?;
        conn.execute(
            "INSERT INTO scoring_records (
                id, property_id, model_version, composite_score, motivation_score, deal_score,
                severity_multiplier, recency_decay, stacking_bonus, owner_factor_score,
                equity_factor_score, ai_boost, factors, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                record.id.to_string(),
                record.property_id.to_string(),
                record.model_version,
                record.composite_score,
                record.motivation_score,
                record.deal_score,
                record.severity_multiplier,
                record.recency_decay,
                record.stacking_bonus,
                record.owner_factor_score,
                record.equity_factor_score,
                record.ai_boost,
                factors_json,
                record.created_at,
            ],
        )
        .context("scoring record insert failed")?;
        Ok(())
    }

    async fn insert_prediction(&self, prediction: Prediction) -> Result<()> {
        let conn = self.conn.lock();
        let features_json = serde_json::to_string(&prediction.features)?;
        let factors_json = serde_json::to_string(&prediction.factors)?;
        conn.execute(
            "INSERT INTO predictions (
                id, property_id, model_version, predictive_score, days_until_distress, confidence,
                owner_age_inference, equity_burn_rate, absentee_duration_days,
                tax_delinquency_trend, life_event_probability, features, factors, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                prediction.id.to_string(),
                prediction.property_id.to_string(),
                prediction.model_version,
                prediction.predictive_score,
                prediction.days_until_distress,
                prediction.confidence,
                prediction.owner_age_inference,
                prediction.equity_burn_rate,
                prediction.absentee_duration_days,
                prediction.tax_delinquency_trend,
                prediction.life_event_probability,
                features_json,
                factors_json,
                prediction.created_at,
            ],
        )
        .context("prediction insert failed")?;
        Ok(())
    }

    async fn find_active_lead_by_property(&self, property_id: Uuid) -> Result<Option<Lead>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM leads
             WHERE property_id = ?1 AND status IN ('prospect', 'lead', 'negotiation')
             LIMIT 1",
            params![property_id.to_string()],
            row_to_lead,
        )
        .optional()
        .context("failed to query active lead")
    }

    async fn upsert_lead(
        &self,
        lead: Lead,
        expected_lock_version: Option<u32>,
    ) -> Result<Lead, UpsertLeadError> {
        let conn = self.conn.lock();
        let tags_json = serde_json::to_string(&lead.tags).map_err(|e| UpsertLeadError::Other(e.into()))?;

        match expected_lock_version {
            None => {
                conn.execute(
                    "INSERT INTO leads (
                        id, property_id, status, assigned_to, priority, source, tags, notes,
                        claimed_at, claim_expires_at, promoted_at, last_contact_at, follow_up_date,
                        lock_version, created_at, updated_at
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
                    params![
                        lead.id.to_string(),
                        lead.property_id.to_string(),
                        lead.status.as_str(),
                        lead.assigned_to,
                        lead.priority,
                        lead.source,
                        tags_json,
                        lead.notes,
                        lead.claimed_at,
                        lead.claim_expires_at,
                        lead.promoted_at,
                        lead.last_contact_at,
                        lead.follow_up_date,
                        lead.lock_version,
                        lead.created_at,
                        lead.updated_at,
                    ],
                )
                .map_err(|e| UpsertLeadError::Other(e.into()))?;
            }
            Some(expected) => {
                let rows = conn
                    .execute(
                        "UPDATE leads SET
                            status = ?1, assigned_to = ?2, priority = ?3, source = ?4, tags = ?5,
                            notes = ?6, claimed_at = ?7, claim_expires_at = ?8, promoted_at = ?9,
                            last_contact_at = ?10, follow_up_date = ?11, lock_version = lock_version + 1,
                            updated_at = ?12
                         WHERE id = ?13 AND lock_version = ?14",
                        params![
                            lead.status.as_str(),
                            lead.assigned_to,
                            lead.priority,
                            lead.source,
                            tags_json,
                            lead.notes,
                            lead.claimed_at,
                            lead.claim_expires_at,
                            lead.promoted_at,
                            lead.last_contact_at,
                            lead.follow_up_date,
                            lead.updated_at,
                            lead.id.to_string(),
                            expected,
                        ],
                    )
                    .map_err(|e| UpsertLeadError::Other(e.into()))?;
                if rows == 0 {
                    return Err(UpsertLeadError::Conflict);
                }
            }
        }

        conn.query_row(
            "SELECT * FROM leads WHERE id = ?1",
            params![lead.id.to_string()],
            row_to_lead,
        )
        .map_err(|e| UpsertLeadError::Other(anyhow::Error::new(e).context("failed to read back lead")))
    }

    async fn append_event_log(&self, entry: EventLog) -> Result<()> {
        let conn = self.conn.lock();
        let details_json = serde_json::to_string(&entry.details)?;
        conn.execute(
            "INSERT INTO event_log (id, user_id, action, entity_type, entity_id, details, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                entry.id.to_string(),
                entry.user_id.to_string(),
                entry.action,
                entry.entity_type,
                entry.entity_id.to_string(),
                details_json,
                entry.created_at,
            ],
        )
        .context("event log append failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, NewProperty};

    fn sample_property() -> NewProperty {
        NewProperty {
            apn: "123456".to_string(),
            county: "Travis".to_string(),
            owner_name: Some("Jane Doe".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_property_is_idempotent() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let first = repo.upsert_property(sample_property()).await.unwrap();
        let second = repo.upsert_property(sample_property()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn duplicate_fingerprint_is_reported_not_errored() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let property = repo.upsert_property(sample_property()).await.unwrap();
        let signal = DistressSignal {
            event_type: EventType::Probate,
            severity: 9,
            days_since_event: 10,
            source: "test".to_string(),
            raw_data: serde_json::json!({}),
            confidence: None,
        };
        let fp = crate::dedup::fingerprint(&property.apn, &property.county, signal.event_type, &signal.source);

        let (first, _) = repo.insert_distress_event(property.id, signal.clone(), fp.clone()).await.unwrap();
        let (second, _) = repo.insert_distress_event(property.id, signal, fp).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Duplicate);
    }

    #[tokio::test]
    async fn lead_upsert_rejects_stale_lock_version() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let property = repo.upsert_property(sample_property()).await.unwrap();
        let lead = Lead {
            id: Uuid::new_v4(),
            property_id: property.id,
            status: LeadStatus::Prospect,
            assigned_to: None,
            priority: 50,
            source: "propertyradar".to_string(),
            tags: BTreeSet::new(),
            notes: None,
            claimed_at: None,
            claim_expires_at: None,
            promoted_at: now_millis(),
            last_contact_at: None,
            follow_up_date: None,
            lock_version: 0,
            created_at: now_millis(),
            updated_at: now_millis(),
        };
        let created = repo.upsert_lead(lead.clone(), None).await.unwrap();
        assert_eq!(created.lock_version, 0);

        let mut stale = created.clone();
        stale.status = LeadStatus::Lead;
        let err = repo.upsert_lead(stale, Some(999)).await.unwrap_err();
        assert!(matches!(err, UpsertLeadError::Conflict));
    }
}
