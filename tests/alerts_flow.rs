//! Integration tests for the alert endpoints using wiremock.
//!
//! These tests mock the Sophos Central Common API to verify list, get,
//! paginate, and action operations on alerts.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use sophos_central::alerts::*;
use sophos_central::auth::TokenProvider;
use sophos_central::client::{RetryPolicy, SophosClient};
use sophos_central::error::SophosError;
use sophos_central::query::Query;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper: creates a client pointed at the given wiremock server.
fn mock_client(server: &MockServer) -> SophosClient {
    SophosClient::builder(TokenProvider::with_token("mock-token"))
        .base_url(&server.uri())
        .retry_policy(RetryPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..RetryPolicy::default()
        })
        .build()
        .unwrap()
}

// ── List alerts ─────────────────────────────────────────────────────────

#[tokio::test]
async fn list_alerts_returns_collection() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("GET"))
        .and(path("/common/v1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "alert-001",
                    "category": "malware",
                    "severity": "high",
                    "product": "endpoint",
                    "description": "Malware detected",
                    "allowedActions": ["acknowledge", "cleanVirus"]
                },
                {
                    "id": "alert-002",
                    "category": "policy",
                    "severity": "low",
                    "product": "firewall"
                }
            ],
            "pages": {"size": 50}
        })))
        .mount(&server)
        .await;

    let page = list_alerts(&client, &Query::new()).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(!page.has_more());
    assert_eq!(page.items[0].severity, Some(AlertSeverity::High));
    assert_eq!(page.items[0].allowed_actions, vec!["acknowledge", "cleanVirus"]);
    // "policy" is not a known category and must not fail the page.
    assert_eq!(page.items[1].category, Some(AlertCategory::Unknown));
    assert_eq!(page.items[1].product, Some(AlertProduct::Firewall));
}

#[tokio::test]
async fn list_alerts_sends_list_and_date_filters() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("GET"))
        .and(path("/common/v1/alerts"))
        .and(query_param("severity", "high,medium"))
        .and(query_param("product", "endpoint"))
        .and(query_param("raisedAt", "between:2024-05-01T00:00:00Z,2024-05-02T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "alert-high-001", "severity": "high"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
    let query = Query::new().filter(|f| {
        f.in_list("severity", ["high", "medium"])
            .in_list("product", ["endpoint"])
            .date_range("raisedAt", Some(start), Some(end))
    });
    let page = list_alerts(&client, &query).await.unwrap();
    assert_eq!(page.items[0].id, "alert-high-001");
}

#[tokio::test]
async fn paginate_alerts_honours_limit() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    // Every page points at another page; the limit is what stops it.
    Mock::given(method("GET"))
        .and(path("/common/v1/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
            "pages": {"nextKey": "more"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let query = Query::new().page_size(3).limit(5);
    let mut pager = paginate_alerts(&client, &query, None).unwrap();
    let alerts = pager.collect_all(None).await.unwrap();
    assert_eq!(alerts.len(), 5);
}

// ── Get alert ───────────────────────────────────────────────────────────

#[tokio::test]
async fn get_alert_returns_full_alert() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("GET"))
        .and(path("/common/v1/alerts/alert-001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "alert-001",
            "category": "malware",
            "severity": "high",
            "raisedAt": "2024-05-01T10:00:00Z",
            "managedAgent": {"id": "ep-1", "type": "computer"},
            "person": {"id": "p-1", "name": "Jane Doe"},
            "tenant": {"id": "t-1", "name": "Acme"},
            "type": "Event::Endpoint::Threat::Detected",
            "data": {"threatName": "EICAR-AV-Test"}
        })))
        .mount(&server)
        .await;

    let alert = get_alert(&client, "alert-001").await.unwrap();
    assert_eq!(alert.managed_agent.unwrap().id, "ep-1");
    assert_eq!(alert.person.unwrap().name.as_deref(), Some("Jane Doe"));
    assert_eq!(alert.raised_at, Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()));
    assert_eq!(alert.data.unwrap()["threatName"], "EICAR-AV-Test");
}

// ── Actions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn perform_action_posts_action_and_message() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path("/common/v1/alerts/alert-001/actions"))
        .and(body_json(json!({"action": "acknowledge", "message": "seen it"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "act-1",
            "alertId": "alert-001",
            "action": "acknowledge",
            "status": "requested"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = perform_alert_action(&client, "alert-001", AlertAction::Acknowledge, Some("seen it"))
        .await
        .unwrap();
    assert_eq!(result["status"], "requested");
}

#[tokio::test]
async fn rejected_action_is_not_retried() {
    let server = MockServer::start().await;
    let client = mock_client(&server);

    Mock::given(method("POST"))
        .and(path("/common/v1/alerts/alert-001/actions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = perform_alert_action(&client, "alert-001", AlertAction::ClearThreat, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SophosError::Server { attempts: 1, .. }), "got {err:?}");
}

#[test]
fn action_names_parse_case_insensitively() {
    assert_eq!("ClearThreat".parse::<AlertAction>().unwrap(), AlertAction::ClearThreat);
    assert_eq!("sendmsgpua".parse::<AlertAction>().unwrap(), AlertAction::SendMsgPua);
}
