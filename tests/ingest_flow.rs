//! End-to-end exercise of the webhook ingest path and the lead lifecycle,
//! against a real (in-memory) SQLite store. No vendor HTTP call is
//! involved, so these cover the dedup and claim-lifecycle scenarios
//! without needing a mock of `PropertyRadarClient`.

use std::collections::BTreeSet;

use leadsignal_core::lifecycle;
use leadsignal_core::models::LeadStatus;
use leadsignal_core::orchestrator::{self, IngestRecordInput};
use leadsignal_core::store::sqlite::SqliteRepository;
use leadsignal_core::store::Repository;
use uuid::Uuid;

fn webhook_record(apn: &str, county: &str) -> IngestRecordInput {
    IngestRecordInput {
        apn: apn.to_string(),
        county: county.to_string(),
        address: Some("123 Main St".to_string()),
        owner_name: Some("Jane Doe".to_string()),
        distress_type: "pre_foreclosure".to_string(),
        raw_data: serde_json::json!({"source": "county-clerk-feed"}),
    }
}

#[tokio::test]
async fn repeated_webhook_ingest_dedupes_the_second_event() {
    let repo = SqliteRepository::open_in_memory().unwrap();

    let first = orchestrator::ingest_webhook(
        &repo,
        "county-clerk",
        vec![webhook_record("111-222-333", "Travis County")],
    )
    .await;
    assert_eq!(first.upserted, 1);
    assert_eq!(first.deduped, 0);
    assert_eq!(first.records[0].status.as_str(), "ingested");

    let second = orchestrator::ingest_webhook(
        &repo,
        "county-clerk",
        vec![webhook_record("111-222-333", "Travis County")],
    )
    .await;
    assert_eq!(second.upserted, 0);
    assert_eq!(second.deduped, 1);
    assert_eq!(second.records[0].status.as_str(), "duplicate");
    assert_eq!(second.records[0].fingerprint, first.records[0].fingerprint);

    // Property upsert is idempotent on (apn, county): still exactly one row.
    // `ingest_webhook` normalizes the county the same way the propertyradar
    // path does, so "Travis County" is stored as "Travis".
    let property = repo.upsert_property(leadsignal_core::models::NewProperty {
        apn: "111-222-333".to_string(),
        county: "Travis".to_string(),
        ..Default::default()
    }).await.unwrap();
    assert_eq!(repo.upsert_property(leadsignal_core::models::NewProperty {
        apn: "111-222-333".to_string(),
        county: "Travis".to_string(),
        ..Default::default()
    }).await.unwrap().id, property.id);
}

#[tokio::test]
async fn invalid_distress_type_is_rejected_without_touching_the_store() {
    let repo = SqliteRepository::open_in_memory().unwrap();

    let mut record = webhook_record("444-555-666", "Hays County");
    record.distress_type = "not_a_real_type".to_string();

    let result = orchestrator::ingest_webhook(&repo, "county-clerk", vec![record]).await;
    assert_eq!(result.errors, 1);
    assert_eq!(result.upserted, 0);
    assert_eq!(result.records[0].status.as_str(), "invalid");
}

#[tokio::test]
async fn claiming_an_unclaimed_lead_assigns_it_and_a_second_claim_does_not_steal_it() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    let property = repo
        .upsert_property(leadsignal_core::models::NewProperty {
            apn: "777-888-999".to_string(),
            county: "Williamson".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let lead = lifecycle::promote(&repo, property.id, 72, "propertyradar", BTreeSet::new()).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Prospect);
    assert!(lead.assigned_to.is_none());

    let agent_a = Uuid::new_v4();
    let claimed = lifecycle::transition(&repo, lead, LeadStatus::MyLead, agent_a, "agent-a").await.unwrap();
    assert_eq!(claimed.assigned_to.as_deref(), Some("agent-a"));
    assert!(claimed.claimed_at.is_some());
    assert_eq!(
        claimed.claim_expires_at.unwrap() - claimed.claimed_at.unwrap(),
        24 * 60 * 60 * 1000
    );

    // Move it along the pipeline and back into my_lead under a different actor.
    let agent_b = Uuid::new_v4();
    let negotiating =
        lifecycle::transition(&repo, claimed, LeadStatus::Negotiation, agent_b, "agent-b").await.unwrap();
    let moved_back =
        lifecycle::transition(&repo, negotiating, LeadStatus::MyLead, agent_b, "agent-b").await.unwrap();

    // Implicit claim only fires on an unclaimed lead; agent-a keeps it.
    assert_eq!(moved_back.assigned_to.as_deref(), Some("agent-a"));

    // At most one active lead for this property throughout.
    let active = repo.find_active_lead_by_property(property.id).await.unwrap();
    assert!(active.is_none(), "my_lead is not in the active set");
}
