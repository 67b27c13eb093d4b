//! Lifecycle Manager (C7).
//!
//! Owns every mutation of `Lead` rows: promotion from a completed ingest,
//! status transitions (including the implicit claim into `my_lead`), and
//! the audit trail those transitions emit. All writes go through the
//! repository's optimistic-concurrency `upsert_lead`, retried up to three
//! times on a CAS conflict (spec.md §4.6) the way the teacher's
//! `auth::jwt::JwtHandler` computes its own expiry instants with
//! `checked_add_signed`.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use chrono::Duration;
use uuid::Uuid;

use crate::models::{now_millis, EventLog, Lead, LeadStatus};
use crate::store::{Repository, UpsertLeadError};

const CLAIM_DURATION: Duration = Duration::hours(24);
const MAX_CAS_RETRIES: u32 = 3;

/// Creates a new prospect lead, or updates the priority/tags of the
/// existing active one, per spec.md §4.6's promotion rule.
pub async fn promote(
    repo: &dyn Repository,
    property_id: Uuid,
    blended_priority: u8,
    source: &str,
    detected_tags: BTreeSet<String>,
) -> Result<Lead> {
    match repo.find_active_lead_by_property(property_id).await? {
        Some(existing) => {
            let mut updated = existing.clone();
            updated.priority = blended_priority;
            updated.tags = detected_tags;
            let saved = cas_upsert(repo, updated, existing.lock_version).await?;
            Ok(saved)
        }
        None => {
            let now = now_millis();
            let lead = Lead {
                id: Uuid::new_v4(),
                property_id,
                status: LeadStatus::Prospect,
                assigned_to: None,
                priority: blended_priority,
                source: source.to_string(),
                tags: detected_tags,
                notes: None,
                claimed_at: None,
                claim_expires_at: None,
                promoted_at: now,
                last_contact_at: None,
                follow_up_date: None,
                lock_version: 0,
                created_at: now,
                updated_at: now,
            };
            let saved = repo
                .upsert_lead(lead, None)
                .await
                .map_err(|e| anyhow!("failed to create lead: {e}"))?;
            Ok(saved)
        }
    }
}

/// Moves a lead to `to`, applying the implicit-claim rule when the
/// destination is `my_lead` and the lead is currently unclaimed. Writes the
/// `lead.status_changed` (and, on claim, `lead.claimed`) audit events.
pub async fn transition(
    repo: &dyn Repository,
    mut lead: Lead,
    to: LeadStatus,
    actor: Uuid,
    actor_label: &str,
) -> Result<Lead> {
    let from = lead.status;
    let mut claimed = false;

    lead.status = to;
    if to == LeadStatus::MyLead && lead.assigned_to.is_none() {
        let now = now_millis();
        lead.assigned_to = Some(actor_label.to_string());
        lead.claimed_at = Some(now);
        lead.claim_expires_at = Some(now + CLAIM_DURATION.num_milliseconds());
        claimed = true;
    }
    lead.updated_at = now_millis();

    let expected_version = lead.lock_version;
    let saved = cas_upsert(repo, lead, expected_version).await?;

    repo.append_event_log(EventLog {
        id: Uuid::new_v4(),
        user_id: actor,
        action: "lead.status_changed".to_string(),
        entity_type: "lead".to_string(),
        entity_id: saved.id,
        details: serde_json::json!({ "from": from.as_str(), "to": to.as_str() }),
        created_at: now_millis(),
    })
    .await?;

    if claimed {
        repo.append_event_log(EventLog {
            id: Uuid::new_v4(),
            user_id: actor,
            action: "lead.claimed".to_string(),
            entity_type: "lead".to_string(),
            entity_id: saved.id,
            details: serde_json::json!({
                "assigned_to": actor_label,
                "claimed_at": saved.claimed_at,
                "claim_expires_at": saved.claim_expires_at,
            }),
            created_at: now_millis(),
        })
        .await?;
    }

    Ok(saved)
}

/// Retries `upsert_lead` up to `MAX_CAS_RETRIES` times on a CAS conflict,
/// re-reading the current row and re-applying the caller's intended
/// mutation each time is the caller's responsibility; here we simply retry
/// the exact write and surface `Conflict` if it never lands.
async fn cas_upsert(repo: &dyn Repository, lead: Lead, expected_version: u32) -> Result<Lead> {
    let mut attempt = 0;
    loop {
        match repo.upsert_lead(lead.clone(), Some(expected_version)).await {
            Ok(saved) => return Ok(saved),
            Err(UpsertLeadError::Conflict) if attempt < MAX_CAS_RETRIES => {
                attempt += 1;
                continue;
            }
            Err(UpsertLeadError::Conflict) => {
                return Err(anyhow!("lead {} conflict after {MAX_CAS_RETRIES} retries", lead.id))
            }
            Err(UpsertLeadError::Other(e)) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteRepository;

    async fn seed_property(repo: &SqliteRepository) -> Uuid {
        let property = repo
            .upsert_property(crate::models::NewProperty {
                apn: "999".to_string(),
                county: "Hays".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        property.id
    }

    #[tokio::test]
    async fn promote_creates_prospect_then_updates_in_place() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let property_id = seed_property(&repo).await;

        let first = promote(&repo, property_id, 40, "propertyradar", BTreeSet::new()).await.unwrap();
        assert_eq!(first.status, LeadStatus::Prospect);
        assert_eq!(first.priority, 40);

        let mut tags = BTreeSet::new();
        tags.insert("vacant".to_string());
        let second = promote(&repo, property_id, 60, "propertyradar", tags.clone()).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.priority, 60);
        assert_eq!(second.tags, tags);
        assert_eq!(second.status, LeadStatus::Prospect);
    }

    #[tokio::test]
    async fn transition_into_my_lead_claims_when_unclaimed() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let property_id = seed_property(&repo).await;
        let lead = promote(&repo, property_id, 50, "propertyradar", BTreeSet::new()).await.unwrap();

        let claimed = transition(&repo, lead, LeadStatus::MyLead, Uuid::new_v4(), "agent-a").await.unwrap();
        assert_eq!(claimed.assigned_to.as_deref(), Some("agent-a"));
        assert!(claimed.claimed_at.is_some());
        assert_eq!(
            claimed.claim_expires_at.unwrap() - claimed.claimed_at.unwrap(),
            CLAIM_DURATION.num_milliseconds()
        );
    }

    #[tokio::test]
    async fn transition_into_my_lead_does_not_reclaim_when_already_assigned() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let property_id = seed_property(&repo).await;
        let lead = promote(&repo, property_id, 50, "propertyradar", BTreeSet::new()).await.unwrap();
        let claimed = transition(&repo, lead, LeadStatus::MyLead, Uuid::new_v4(), "agent-a").await.unwrap();

        let reassigned =
            transition(&repo, claimed, LeadStatus::Negotiation, Uuid::new_v4(), "agent-b").await.unwrap();
        let moved_back =
            transition(&repo, reassigned, LeadStatus::MyLead, Uuid::new_v4(), "agent-b").await.unwrap();

        assert_eq!(moved_back.assigned_to.as_deref(), Some("agent-a"));
    }
}
