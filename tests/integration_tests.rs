//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: config → authenticated requests →
//! RECORD/STATE messages → persisted bookmarks

use chrono::{DateTime, Utc};
use hubspot_sync::auth::AuthConfig;
use hubspot_sync::config::HubConfig;
use hubspot_sync::engine::{ExitStatus, Message, MemorySink, StreamOutcome, SyncEngine};
use hubspot_sync::error::FailureKind;
use hubspot_sync::http::{HttpClient, HttpClientConfig};
use hubspot_sync::state::{State, StateManager};
use hubspot_sync::types::BackoffType;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

// ============================================================================
// Fixtures
// ============================================================================

const T1: &str = "2023-01-02T00:00:00Z";
const T2: &str = "2023-01-03T00:00:00Z";
const T3: &str = "2023-01-04T00:00:00Z";

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn config(server: &MockServer) -> HubConfig {
    HubConfig::new("2023-01-01T00:00:00Z", "client", "secret", "refresh")
        .with_base_url(server.uri())
        .with_access_token("test-token")
}

fn fast_client(config: &HubConfig) -> HttpClient {
    HttpClient::with_auth(
        HttpClientConfig::builder()
            .base_url(config.base_url.clone())
            .max_retries(1)
            .backoff(
                BackoffType::Constant,
                Duration::from_millis(1),
                Duration::from_millis(1),
            )
            .no_jitter()
            .no_rate_limit()
            .build(),
        config.auth_config(),
    )
}

fn engine(config: HubConfig, state: StateManager) -> SyncEngine {
    let client = fast_client(&config);
    SyncEngine::with_client(config, client, state)
}

fn deal(id: u64, modified: &str) -> Value {
    json!({
        "id": id.to_string(),
        "properties": {"hs_object_id": id.to_string(), "hs_lastmodifieddate": modified}
    })
}

/// Deals search answering three pages keyed on the request's `after`
async fn mount_deals(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/crm/v3/properties/deals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "dealname"}, {"name": "hs_lastmodifieddate"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .respond_with(|req: &Request| {
            let body: Value = req.body_json().unwrap();
            let page = match body["after"].as_u64().unwrap_or(0) {
                0 => json!({
                    "results": [deal(1, T1), deal(2, T2)],
                    "paging": {"next": {"after": "2"}}
                }),
                2 => json!({
                    "results": [deal(3, T2)],
                    "paging": {"next": {"after": "3"}}
                }),
                _ => json!({"results": [deal(4, T3)]}),
            };
            ResponseTemplate::new(200).set_body_json(page)
        })
        .mount(server)
        .await;

    for target in ["contacts", "companies"] {
        Mock::given(method("POST"))
            .and(path(format!("/crm/v3/associations/deals/{target}/batch/read")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"from": {"id": "1"}, "to": [{"id": format!("{target}-9")}]}]
            })))
            .mount(server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/batch/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(server)
        .await;
}

fn bookmarks_in(states: &[&State], stream: &str, field: &str) -> Vec<DateTime<Utc>> {
    states
        .iter()
        .filter_map(|s| s.bookmark_datetime(stream, field))
        .collect()
}

// ============================================================================
// End-to-End Runs
// ============================================================================

#[tokio::test]
async fn test_deals_run_checkpoints_after_last_page() {
    let server = MockServer::start().await;
    mount_deals(&server).await;

    let config = config(&server).with_streams(["deals"]);
    let mut engine = engine(config, StateManager::in_memory());
    let mut sink = MemorySink::new();

    let report = engine.run(&mut sink).await.unwrap();
    assert_eq!(report.exit_status(), ExitStatus::Success);

    let ids: Vec<&str> = sink
        .records("deals")
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert_eq!(sink.records("deals_properties").len(), 2);

    // Enrichment merged before emission
    let first = sink.records("deals")[0];
    assert_eq!(first["associations"]["contacts"]["results"], json!([{"id": "contacts-9"}]));
    assert_eq!(first["associations"]["companies"]["results"], json!([{"id": "companies-9"}]));

    let kinds: Vec<char> = sink
        .messages()
        .iter()
        .filter(|m| m.stream() != Some("deals_properties"))
        .map(|m| if m.is_record() { 'R' } else { 'S' })
        .collect();
    // Search pages are not in timestamp order, so one checkpoint at the end
    assert_eq!(kinds, vec!['R', 'R', 'R', 'R', 'S']);

    assert_eq!(
        bookmarks_in(&sink.states(), "deals", "hs_lastmodifieddate"),
        vec![utc(T3)]
    );

    assert_eq!(
        engine.state().bookmark("deals", "hs_lastmodifieddate"),
        Some(utc(T3))
    );
    assert_eq!(report.streams[0].records, 4);
    assert_eq!(engine.stats().records_synced, 6);
    assert_eq!(engine.stats().streams_synced, 1);
}

#[tokio::test]
async fn test_state_file_resumes_next_run() {
    let server = MockServer::start().await;
    mount_deals(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");

    let config = config(&server).with_streams(["deals"]);
    let mut first = engine(config.clone(), StateManager::from_file(&state_path).unwrap());
    first.run(&mut MemorySink::new()).await.unwrap();

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&state_path).unwrap()).unwrap();
    assert_eq!(saved["bookmarks"]["deals"]["replication_method"], "INCREMENTAL");

    let reloaded = StateManager::from_file(&state_path).unwrap();
    assert_eq!(reloaded.bookmark("deals", "hs_lastmodifieddate"), Some(utc(T3)));

    let second = engine(config, reloaded);
    let window = second
        .window_for(second.registry().get("deals").unwrap().descriptor())
        .unwrap();
    assert_eq!(window.start, utc(T3));
}

#[tokio::test]
async fn test_resumed_search_filters_from_bookmark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/crm/v3/properties/deals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    // 2023-01-04T00:00:00Z in milliseconds
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/search"))
        .and(body_partial_json(json!({
            "filterGroups": [{"filters": [
                {"propertyName": "hs_lastmodifieddate", "operator": "GTE", "value": "1672790400000"}
            ]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let state = StateManager::from_json(
        r#"{"bookmarks": {"deals": {"hs_lastmodifieddate": "2023-01-04T00:00:00.000000+00:00"}}}"#,
    )
    .unwrap();
    let mut engine = engine(config(&server).with_streams(["deals"]), state);
    let mut sink = MemorySink::new();

    let report = engine.run(&mut sink).await.unwrap();
    assert_eq!(report.exit_status(), ExitStatus::Success);
    assert!(sink.records("deals").is_empty());
    assert!(sink.states().is_empty());
}

#[tokio::test]
async fn test_contacts_feed_contact_events() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/properties/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "email"}, {"name": "lastmodifieddate"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/contacts/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": "101", "properties": {
                    "hs_object_id": "101",
                    "lastmodifieddate": "2023-01-02T00:00:00Z",
                    "hs_analytics_last_timestamp": "2023-01-02T00:00:00Z",
                    "hs_calculated_form_submissions": "form-a:1672617600000"
                }},
                {"id": "102", "properties": {
                    "hs_object_id": "102",
                    "lastmodifieddate": "2023-01-03T00:00:00Z"
                }}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/associations/contacts/companies/batch/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/events/v3/events"))
        .and(query_param("objectId", "101"))
        .and(query_param("objectType", "contact"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "ev-1", "occurredAt": "2023-01-02T00:00:00Z"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Scope probe
    Mock::given(method("GET"))
        .and(path("/events/v3/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .with_priority(10)
        .mount(&server)
        .await;

    let config = config(&server)
        .with_advanced_features(true)
        .with_streams(["contacts", "contacts_events"]);
    let mut engine = engine(config, StateManager::in_memory());
    let mut sink = MemorySink::new();

    let report = engine.run(&mut sink).await.unwrap();
    assert_eq!(report.exit_status(), ExitStatus::Success);

    assert_eq!(sink.records("contacts").len(), 2);
    assert_eq!(sink.records("contacts_events").len(), 1);
    assert_eq!(sink.records("contacts_events")[0]["id"], "ev-1");

    let candidates: Vec<&str> = engine.shared().iter_activity_candidates().collect();
    assert_eq!(candidates, vec!["101"]);
    let forms: Vec<&str> = engine.shared().iter_submission_forms().collect();
    assert_eq!(forms, vec!["form-a"]);

    // Events bookmark is the end of the contacts window
    let window_end = engine.shared().activity_window().unwrap().end;
    assert_eq!(
        engine.state().bookmark("contacts_events", "lastSynced"),
        Some(window_end)
    );
    assert_eq!(
        engine.state().bookmark("contacts", "updatedAt"),
        Some(utc("2023-01-03T00:00:00Z"))
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_search_failing_mid_window_keeps_bookmark() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/properties/p7_pets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"name": "hs_lastmodifieddate"}]
        })))
        .mount(&server)
        .await;

    // Ordered by id, so the second page may still hold older pets
    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/p7_pets/search"))
        .respond_with(|req: &Request| {
            let body: Value = req.body_json().unwrap();
            match body["after"].as_u64().unwrap_or(0) {
                0 => ResponseTemplate::new(200).set_body_json(json!({
                    "results": [deal(1, "2023-01-02T00:00:00Z"), deal(2, "2023-01-05T00:00:00Z")],
                    "paging": {"next": {"after": "2"}}
                })),
                _ => ResponseTemplate::new(400).set_body_json(json!({
                    "status": "error",
                    "message": "search failed"
                })),
            }
        })
        .mount(&server)
        .await;

    let config = config(&server)
        .with_custom_object("pets", 7)
        .with_streams(["pets"]);
    let mut engine = engine(config, StateManager::in_memory());
    let mut sink = MemorySink::new();

    let report = engine.run(&mut sink).await.unwrap();

    assert!(!report.streams[0].is_completed());
    assert_eq!(report.streams[0].records, 2);
    assert_eq!(sink.records("pets").len(), 2);
    assert!(sink.states().is_empty());
    assert_eq!(engine.state().bookmark("pets", "hs_lastmodifieddate"), None);

    // The next run starts over from the configured start date
    let descriptor = engine.registry().get("pets").unwrap().descriptor().clone();
    assert_eq!(
        engine.window_for(&descriptor).unwrap().start,
        utc("2023-01-01T00:00:00Z")
    );
}

#[tokio::test]
async fn test_missing_scope_skips_stream() {
    let server = MockServer::start().await;
    mount_deals(&server).await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/owners"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            r#"{"category":"MISSING_SCOPES","message":"This app hasn't been granted all required scopes"}"#,
        ))
        .mount(&server)
        .await;

    let config = config(&server).with_streams(["owners", "deals"]);
    let mut engine = engine(config, StateManager::in_memory());
    let mut sink = MemorySink::new();

    let report = engine.run(&mut sink).await.unwrap();

    assert_eq!(report.exit_status(), ExitStatus::PartialSuccess);
    assert_eq!(report.exit_status().code(), 2);
    let skipped: Vec<&str> = report.skipped().map(|r| r.stream.as_str()).collect();
    assert_eq!(skipped, vec!["owners"]);
    assert_eq!(sink.records("deals").len(), 4);
}

#[tokio::test]
async fn test_rejected_token_aborts_with_credentials_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/v1/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "BAD_REFRESH_TOKEN",
            "message": "missing or invalid refresh token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/owners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(0)
        .mount(&server)
        .await;

    let config = HubConfig::new("2023-01-01T00:00:00Z", "client", "secret", "revoked")
        .with_base_url(server.uri())
        .with_streams(["owners", "companies"]);
    assert!(matches!(config.auth_config(), AuthConfig::Oauth2Refresh { .. }));

    let mut engine = engine(config, StateManager::in_memory());
    let report = engine.run(&mut MemorySink::new()).await.unwrap();

    assert_eq!(report.exit_status(), ExitStatus::InvalidCredentials);
    assert_eq!(report.exit_status().code(), 3);
    assert_eq!(report.streams.len(), 1);
    assert!(matches!(
        report.streams[0].outcome,
        StreamOutcome::Aborted {
            kind: FailureKind::InvalidCredentials,
            ..
        }
    ));
}

#[tokio::test]
async fn test_refreshed_token_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 1800
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/owners"))
        .and(header("Authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "o1", "updatedAt": "2023-02-01T00:00:00Z"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = HubConfig::new("2023-01-01T00:00:00Z", "client", "secret", "refresh")
        .with_base_url(server.uri())
        .with_streams(["owners"]);
    let mut engine = engine(config, StateManager::in_memory());
    let mut sink = MemorySink::new();

    let report = engine.run(&mut sink).await.unwrap();
    assert_eq!(report.exit_status(), ExitStatus::Success);

    match sink.messages().last() {
        Some(Message::State { value }) => {
            assert_eq!(
                value.bookmark_datetime("owners", "updatedAt"),
                Some(utc("2023-02-01T00:00:00Z"))
            );
        }
        other => panic!("expected trailing state, got {other:?}"),
    }
}
