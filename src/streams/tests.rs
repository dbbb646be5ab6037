//! Tests for the stream catalogue

use super::*;
use crate::config::HubConfig;
use crate::http::{HttpClient, HttpClientConfig};
use crate::state::SharedState;
use crate::types::{ExtractionWindow, ReplicationMethod};
use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Arc<HttpClient> {
    Arc::new(HttpClient::with_config(
        HttpClientConfig::builder()
            .base_url(server.uri())
            .max_retries(0)
            .no_rate_limit()
            .build(),
    ))
}

fn window() -> ExtractionWindow {
    ExtractionWindow::new(
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
    )
}

fn config() -> HubConfig {
    HubConfig::new("2023-01-01T00:00:00Z", "id", "secret", "refresh")
}

async fn drain(source: &mut Box<dyn RecordSource>) -> Vec<Value> {
    let mut records = Vec::new();
    while let Some(record) = source.next_record().await.unwrap() {
        records.push(record);
    }
    records
}

// ============================================================================
// Descriptor Tests
// ============================================================================

#[test]
fn test_descriptor_builders() {
    let contacts = StreamDescriptor::incremental("contacts", "updatedAt")
        .replicated_on(&["properties", "lastmodifieddate"])
        .with_properties_sync("contacts")
        .with_lookback(Duration::days(1));

    assert_eq!(contacts.bookmark_field.as_deref(), Some("updatedAt"));
    assert_eq!(contacts.replication_method, ReplicationMethod::Incremental);
    assert_eq!(contacts.properties_stream().as_deref(), Some("contacts_properties"));
    assert!(!contacts.is_custom_object());

    let submissions = StreamDescriptor::full_table("submissions");
    assert!(submissions.bookmark_field.is_none());
    assert_eq!(submissions.replication_method, ReplicationMethod::FullTable);
    assert!(submissions.properties_stream().is_none());
}

#[test]
fn test_replication_value_encodings() {
    let engagements = StreamDescriptor::incremental("engagements", "lastUpdated")
        .replicated_on(&["engagement", "lastUpdated"]);
    let record = engagements.replication_value(&json!({"engagement": {"lastUpdated": 1672531200000_i64}}));
    assert_eq!(record, Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()));

    let owners = StreamDescriptor::incremental("owners", "updatedAt").replicated_on(&["updatedAt"]);
    assert_eq!(
        owners.replication_value(&json!({"updatedAt": "2023-01-01T12:00:00.000Z"})),
        Some(Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap())
    );
    assert_eq!(owners.replication_value(&json!({"updatedAt": null})), None);

    let full = StreamDescriptor::full_table("submissions");
    assert_eq!(full.replication_value(&json!({"submittedAt": 1})), None);
}

// ============================================================================
// Registry Tests
// ============================================================================

#[test]
fn test_standard_registry_order() {
    let registry = StreamRegistry::standard(&config());
    assert_eq!(
        registry.names(),
        vec!["owners", "companies", "deal_pipelines", "forms", "contacts", "deals"]
    );
}

#[test]
fn test_advanced_and_custom_streams() {
    let registry = StreamRegistry::standard(
        &config()
            .with_advanced_features(true)
            .with_custom_object("pets", 4242),
    );
    assert_eq!(
        registry.names(),
        vec![
            "owners",
            "companies",
            "deal_pipelines",
            "forms",
            "contacts",
            "deals",
            "engagements",
            "email_events",
            "submissions",
            "contacts_events",
            "pets"
        ]
    );

    let pets = registry.get("pets").unwrap();
    assert_eq!(pets.descriptor().portal_id, Some(4242));
    assert_eq!(pets.descriptor().properties_object.as_deref(), Some("p4242_pets"));
    assert!(registry.get("contacts_events").unwrap().descriptor().advanced);
    assert_eq!(
        registry.get("contacts").unwrap().descriptor().lookback,
        Duration::days(CONTACTS_LOOKBACK_DAYS)
    );
}

#[test]
fn test_select_keeps_sync_order() {
    let registry = StreamRegistry::standard(&config());
    let selected = registry
        .select(&["deals".to_string(), "owners".to_string()])
        .unwrap();
    let names: Vec<_> = selected.iter().map(|h| h.descriptor().name.clone()).collect();
    assert_eq!(names, vec!["owners", "deals"]);

    assert_eq!(registry.select(&[]).unwrap().len(), registry.len());
}

#[test]
fn test_select_unknown_stream() {
    let registry = StreamRegistry::standard(&config());
    let err = registry.select(&["tickets".to_string()]).err().unwrap();
    assert!(matches!(err, crate::Error::StreamNotFound { ref stream } if stream == "tickets"));
}

// ============================================================================
// Listing Stream Tests
// ============================================================================

#[tokio::test]
async fn test_windowed_listing_sends_millisecond_bounds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/email/public/v1/events"))
        .and(query_param("startTimestamp", "1672531200000"))
        .and(query_param("endTimestamp", "1672617600000"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [{"id": "e1", "created": 1672531200001_i64}],
            "hasMore": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = StreamRegistry::standard(&config().with_advanced_features(true));
    let handler = registry.get("email_events").unwrap();
    let ctx = StreamContext::new(client(&server), window(), 250);
    let mut shared = SharedState::new();

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    let records = drain(&mut source).await;

    assert_eq!(records.len(), 1);
    let paired = handler.source_record(records[0].clone());
    assert_eq!(
        paired.replication_value,
        Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(1))
    );
}

#[tokio::test]
async fn test_forms_listing_marks_submission_forms() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FORMS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"guid": "form-a", "updatedAt": 1672531200000_i64},
            {"guid": "form-b", "updatedAt": 1672531300000_i64}
        ])))
        .mount(&server)
        .await;

    let registry = StreamRegistry::standard(&config());
    let handler = registry.get("forms").unwrap();
    let ctx = StreamContext::new(client(&server), window(), 250);
    let mut shared = SharedState::new();

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    for record in drain(&mut source).await {
        handler.observe(&record, &mut shared);
    }

    assert_eq!(
        shared.iter_submission_forms().collect::<Vec<_>>(),
        vec!["form-a", "form-b"]
    );
}

// ============================================================================
// Search Stream Tests
// ============================================================================

#[tokio::test]
async fn test_contacts_open_fetches_properties_and_records_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v3/properties/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "email"}, {"name": "lastmodifieddate"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts/search"))
        .and(body_partial_json(json!({"properties": ["email", "lastmodifieddate"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "7", "properties": {"hs_object_id": "7", "lastmodifieddate": "2023-01-01T06:00:00Z"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/associations/contacts/companies/batch/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = StreamRegistry::standard(&config());
    let handler = registry.get("contacts").unwrap();
    let ctx = StreamContext::new(client(&server), window(), 250);
    let mut shared = SharedState::new();

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    assert_eq!(shared.activity_window(), Some(window()));

    let records = drain(&mut source).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["associations"]["companies"]["results"], json!([]));
    assert_eq!(
        handler.source_record(records[0].clone()).replication_value,
        Some(Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_search_uses_synced_properties() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v3/properties/p7_pets"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/p7_pets/search"))
        .and(body_partial_json(json!({"properties": ["name"], "limit": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = StreamRegistry::standard(&config().with_custom_object("pets", 7));
    let handler = registry.get("pets").unwrap();
    let ctx = StreamContext::new(client(&server), window(), 250)
        .with_properties(vec!["name".to_string()]);
    let mut shared = SharedState::new();

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    assert!(!source.ordered());
    assert!(drain(&mut source).await.is_empty());
    assert!(shared.activity_window().is_none());
}

#[tokio::test]
async fn test_search_page_size_follows_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .and(body_partial_json(json!({"limit": 20})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = StreamRegistry::standard(&config());
    let handler = registry.get("deals").unwrap();
    let ctx = StreamContext::new(client(&server), window(), 20)
        .with_properties(vec!["dealname".to_string()]);

    let mut source = handler.open(&ctx, &mut SharedState::new()).await.unwrap();
    assert!(!source.ordered());
    assert!(drain(&mut source).await.is_empty());
}

// ============================================================================
// Dependent Stream Tests
// ============================================================================

#[tokio::test]
async fn test_submissions_merge_forms_and_skip_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FORMS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"guid": "guid-b"},
            {"guid": "guid-a"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(submissions_path("guid-a")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"submittedAt": 1672531200000_i64, "values": []}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(submissions_path("guid-b")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let handler = SubmissionsStream::default();
    let ctx = StreamContext::new(client(&server), window(), 250);
    let mut shared = SharedState::new();
    shared.mark_submission_form("guid-a");

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    let records = drain(&mut source).await;

    assert_eq!(shared.submission_form_count(), 2);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["form_id"], "guid-a");
    assert!(handler.final_bookmark(&shared).is_none());
}

#[tokio::test]
async fn test_contact_events_per_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("objectId", "101"))
        .and(query_param("objectType", "contact"))
        .and(query_param("occurredAfter", "2023-01-01T00:00:00.000000Z"))
        .and(query_param("occurredBefore", "2023-01-02T00:00:00.000000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "ev-1"}, {"id": "ev-2"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .and(query_param("objectId", "102"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "ev-3"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Enterprise probe
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;

    let handler = ContactEventsStream::default();
    let ctx = StreamContext::new(client(&server), window(), 250);
    let mut shared = SharedState::new();
    shared.set_activity_window(window());
    shared.mark_activity_candidate("101");
    shared.mark_activity_candidate("102");

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    let ids: Vec<_> = drain(&mut source)
        .await
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();

    assert_eq!(ids, vec!["ev-1", "ev-2", "ev-3"]);
    assert_eq!(handler.final_bookmark(&shared), Some(window().end));
}

#[tokio::test]
async fn test_contact_events_without_scope_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("scope missing"))
        .expect(1)
        .mount(&server)
        .await;

    let handler = ContactEventsStream::default();
    let ctx = StreamContext::new(client(&server), window(), 250);
    let mut shared = SharedState::new();
    shared.set_activity_window(window());
    shared.mark_activity_candidate("101");

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    assert!(drain(&mut source).await.is_empty());
}

#[tokio::test]
async fn test_contact_events_without_contacts_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let handler = ContactEventsStream::default();
    let ctx = StreamContext::new(client(&server), window(), 250);
    let mut shared = SharedState::new();

    let mut source = handler.open(&ctx, &mut shared).await.unwrap();
    assert!(drain(&mut source).await.is_empty());
    assert!(handler.final_bookmark(&shared).is_none());
}
